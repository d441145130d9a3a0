//! MIDI channel voice messages and their mapping to control events
//!
//! The surface speaks three message kinds: notes for buttons (and their
//! LEDs), control changes for knobs and 7-bit faders, pitch bend for 14-bit
//! motor faders. Everything else is ignored.

use crate::mapping::{ControlEvent, ControlNumber, Edge, MAX_SOURCE_CHANNEL, PITCH_BEND_MAX, SEVEN_BIT_MAX};
use std::fmt;

/// Channel voice messages the mixer reads and writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiMessage {
    /// Note Off: channel (0-15), note (0-127), velocity (0-127)
    NoteOff { channel: u8, note: u8, velocity: u8 },

    /// Note On: channel (0-15), note (0-127), velocity (1-127)
    NoteOn { channel: u8, note: u8, velocity: u8 },

    /// Control Change: channel (0-15), cc (0-127), value (0-127)
    ControlChange { channel: u8, cc: u8, value: u8 },

    /// Pitch Bend: channel (0-15), value (0-16383, 14-bit)
    PitchBend { channel: u8, value: u16 },
}

impl MidiMessage {
    /// Parse a message from raw bytes; None for anything else or truncated data
    pub fn parse(data: &[u8]) -> Option<Self> {
        let (&status, rest) = data.split_first()?;
        if !(0x80..0xF0).contains(&status) || rest.len() < 2 {
            return None;
        }

        let channel = status & 0x0F;
        let (d1, d2) = (rest[0] & 0x7F, rest[1] & 0x7F);

        match status & 0xF0 {
            0x80 => Some(MidiMessage::NoteOff {
                channel,
                note: d1,
                velocity: d2,
            }),
            // Note On with velocity 0 is a Note Off
            0x90 if d2 == 0 => Some(MidiMessage::NoteOff {
                channel,
                note: d1,
                velocity: 0,
            }),
            0x90 => Some(MidiMessage::NoteOn {
                channel,
                note: d1,
                velocity: d2,
            }),
            0xB0 => Some(MidiMessage::ControlChange {
                channel,
                cc: d1,
                value: d2,
            }),
            0xE0 => Some(MidiMessage::PitchBend {
                channel,
                value: ((d2 as u16) << 7) | d1 as u16,
            }),
            _ => None,
        }
    }

    /// Encode the message to MIDI bytes
    pub fn encode(&self) -> Vec<u8> {
        match *self {
            MidiMessage::NoteOff { channel, note, velocity } => {
                vec![0x80 | (channel & 0x0F), note & 0x7F, velocity & 0x7F]
            }
            MidiMessage::NoteOn { channel, note, velocity } => {
                vec![0x90 | (channel & 0x0F), note & 0x7F, velocity & 0x7F]
            }
            MidiMessage::ControlChange { channel, cc, value } => {
                vec![0xB0 | (channel & 0x0F), cc & 0x7F, value & 0x7F]
            }
            MidiMessage::PitchBend { channel, value } => {
                let lsb = (value & 0x7F) as u8;
                let msb = ((value >> 7) & 0x7F) as u8;
                vec![0xE0 | (channel & 0x0F), lsb, msb]
            }
        }
    }

    /// Decode into a control event
    pub fn to_control_event(self) -> ControlEvent {
        match self {
            MidiMessage::NoteOn { channel, note, .. } => {
                ControlEvent::discrete(channel, ControlNumber::Number(note), Edge::On)
            }
            MidiMessage::NoteOff { channel, note, .. } => {
                ControlEvent::discrete(channel, ControlNumber::Number(note), Edge::Off)
            }
            MidiMessage::ControlChange { channel, cc, value } => {
                ControlEvent::continuous(channel, ControlNumber::Number(cc), value as u16)
            }
            MidiMessage::PitchBend { channel, value } => {
                ControlEvent::continuous(channel, ControlNumber::PitchBend, value)
            }
        }
    }
}

impl fmt::Display for MidiMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            MidiMessage::NoteOff { channel, note, velocity } => {
                write!(f, "NoteOff ch:{} n:{} v:{}", channel + 1, note, velocity)
            }
            MidiMessage::NoteOn { channel, note, velocity } => {
                write!(f, "NoteOn ch:{} n:{} v:{}", channel + 1, note, velocity)
            }
            MidiMessage::ControlChange { channel, cc, value } => {
                write!(f, "CC ch:{} cc:{} v:{}", channel + 1, cc, value)
            }
            MidiMessage::PitchBend { channel, value } => {
                write!(f, "PitchBend ch:{} v:{}", channel + 1, value)
            }
        }
    }
}

/// Decode raw input bytes into a control event
pub fn decode_control_event(data: &[u8]) -> Option<ControlEvent> {
    MidiMessage::parse(data).map(MidiMessage::to_control_event)
}

/// LED message for a button: Note On 127 (lit) or 0 (dark).
///
/// None for the pitch-bend sentinel, which has no LED.
pub fn encode_indicator(source: u8, control: ControlNumber, on: bool) -> Option<MidiMessage> {
    debug_assert!(source <= MAX_SOURCE_CHANNEL, "source channel {} out of range", source);
    match control {
        ControlNumber::Number(note) => Some(MidiMessage::NoteOn {
            channel: source,
            note,
            velocity: if on { SEVEN_BIT_MAX as u8 } else { 0 },
        }),
        ControlNumber::PitchBend => None,
    }
}

/// Position message for a continuous control, `normalized` in 0.0..=1.0.
///
/// Pitch bend gets the full 14-bit resolution, control changes 7 bits.
pub fn encode_feedback(source: u8, control: ControlNumber, normalized: f32) -> MidiMessage {
    debug_assert!(source <= MAX_SOURCE_CHANNEL, "source channel {} out of range", source);
    let n = if normalized.is_finite() {
        normalized.clamp(0.0, 1.0)
    } else {
        0.0
    };
    match control {
        ControlNumber::PitchBend => MidiMessage::PitchBend {
            channel: source,
            value: (n * PITCH_BEND_MAX as f32).round() as u16,
        },
        ControlNumber::Number(cc) => MidiMessage::ControlChange {
            channel: source,
            cc,
            value: (n * SEVEN_BIT_MAX as f32).round() as u8,
        },
    }
}

/// Format MIDI bytes as hex string for debugging
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
