//! Configuration management for Surface Mixer
//!
//! Handles loading, parsing, and hot-reloading of the YAML configuration file.

pub mod watcher;

use crate::backend::SimulatedTarget;
use crate::mixer::DEFAULT_CHANNEL_COUNT;
use crate::persistence::DEFAULT_DEBOUNCE_MS;
use crate::router::RouterSettings;
use crate::target::ResolverSettings;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

pub use watcher::ConfigWatcher;

/// Upper bound on the channel bank size
pub const MAX_CHANNEL_COUNT: usize = 64;

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub midi: MidiConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    /// Sessions and devices the console backend pretends to see
    #[serde(default)]
    pub simulated_targets: Vec<SimulatedTarget>,
}

/// Control surface ports, matched by case-insensitive substring
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MidiConfig {
    #[serde(default = "default_port")]
    pub input_port: String,
    #[serde(default = "default_port")]
    pub output_port: String,
    /// How long incoming pitch bend is ignored after a motor fader echo
    #[serde(default = "default_squelch_ms")]
    pub pitch_bend_squelch_ms: u64,
}

impl Default for MidiConfig {
    fn default() -> Self {
        Self {
            input_port: default_port(),
            output_port: default_port(),
            pitch_bend_squelch_ms: default_squelch_ms(),
        }
    }
}

/// Mixer engine tunables
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EngineConfig {
    #[serde(default = "default_channel_count")]
    pub channel_count: usize,
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,
    /// How long an unseen target survives before eviction
    #[serde(default = "default_stale_grace_ms")]
    pub stale_grace_ms: u64,
    #[serde(default = "default_directory_capacity")]
    pub directory_capacity: usize,
    /// Peak level above which a channel counts as active
    #[serde(default = "default_activity_threshold")]
    pub activity_threshold: f32,
    #[serde(default = "default_activity_quiet_ms")]
    pub activity_quiet_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            channel_count: default_channel_count(),
            refresh_interval_ms: default_refresh_interval_ms(),
            stale_grace_ms: default_stale_grace_ms(),
            directory_capacity: default_directory_capacity(),
            activity_threshold: default_activity_threshold(),
            activity_quiet_ms: default_activity_quiet_ms(),
        }
    }
}

impl EngineConfig {
    pub fn router_settings(&self) -> RouterSettings {
        RouterSettings {
            channel_count: self.channel_count,
            resolver: ResolverSettings {
                stale_grace: Duration::from_millis(self.stale_grace_ms),
                capacity: self.directory_capacity,
            },
            activity_threshold: self.activity_threshold,
            activity_quiet: Duration::from_millis(self.activity_quiet_ms),
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }
}

/// Snapshot persistence settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PersistenceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Overrides the state directory picked from the run mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: default_debounce_ms(),
            state_dir: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from file with validation
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: AppConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let yaml = serde_yaml::to_string(self).context("Failed to serialize config to YAML")?;

        fs::write(path, yaml)
            .await
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        if self.midi.input_port.trim().is_empty() {
            anyhow::bail!("MIDI input_port cannot be empty");
        }
        if self.midi.output_port.trim().is_empty() {
            anyhow::bail!("MIDI output_port cannot be empty");
        }

        let engine = &self.engine;
        if engine.channel_count == 0 || engine.channel_count > MAX_CHANNEL_COUNT {
            anyhow::bail!(
                "engine.channel_count must be between 1 and {} (got {})",
                MAX_CHANNEL_COUNT,
                engine.channel_count
            );
        }
        if engine.refresh_interval_ms == 0 {
            anyhow::bail!("engine.refresh_interval_ms must be greater than 0");
        }
        if engine.directory_capacity == 0 {
            anyhow::bail!("engine.directory_capacity must be greater than 0");
        }
        if !(0.0..=1.0).contains(&engine.activity_threshold) {
            anyhow::bail!(
                "engine.activity_threshold must be within 0.0..=1.0 (got {})",
                engine.activity_threshold
            );
        }

        for (idx, target) in self.simulated_targets.iter().enumerate() {
            if target.name.trim().is_empty() {
                anyhow::bail!("Simulated target {} name cannot be empty", idx);
            }
            if !(0.0..=1.0).contains(&target.level) {
                anyhow::bail!(
                    "Simulated target '{}' level must be within 0.0..=1.0 (got {})",
                    target.name,
                    target.level
                );
            }
        }

        Ok(())
    }
}

fn default_port() -> String { "X-Touch".to_string() }
fn default_squelch_ms() -> u64 { 250 }
fn default_channel_count() -> usize { DEFAULT_CHANNEL_COUNT }
fn default_refresh_interval_ms() -> u64 { 50 }
fn default_stale_grace_ms() -> u64 { 5000 }
fn default_directory_capacity() -> usize { 64 }
fn default_activity_threshold() -> f32 { 0.01 }
fn default_activity_quiet_ms() -> u64 { 500 }
fn default_true() -> bool { true }
fn default_debounce_ms() -> u64 { DEFAULT_DEBOUNCE_MS }
