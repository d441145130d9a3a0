//! Surface Mixer
//!
//! Maps a MIDI control surface onto per-application audio sessions and
//! system devices: learned mappings, channel strips with mute/solo/record,
//! identity-stable targets that survive session restarts, and surface
//! feedback for LEDs and motor faders.

pub mod backend;
pub mod cli;
pub mod config;
pub mod engine;
pub mod learn;
pub mod mapping;
pub mod midi;
pub mod mixer;
pub mod paths;
pub mod persistence;
pub mod router;
pub mod surface;
pub mod target;
