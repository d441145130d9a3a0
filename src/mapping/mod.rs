//! Control events, logical actions and the bindings between them
//!
//! A [`ControlEvent`] is a decoded hardware input. A [`MappingEntry`] binds one
//! event shape, identified by its [`MappingKey`], to one [`Action`] on a channel.
//! Entries live in the [`MappingTable`].

mod table;

pub use table::MappingTable;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Highest valid control-surface channel (MIDI channels 0-15)
pub const MAX_SOURCE_CHANNEL: u8 = 15;

/// Full scale of a 14-bit pitch-bend value
pub const PITCH_BEND_MAX: u16 = 16383;

/// Full scale of a 7-bit controller or note value
pub const SEVEN_BIT_MAX: u16 = 127;

/// Control identifier within a source channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ControlNumber {
    /// CC number or note number
    Number(u8),
    /// Pitch-bend, used by motorized faders
    PitchBend,
}

impl fmt::Display for ControlNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlNumber::Number(n) => write!(f, "{}", n),
            ControlNumber::PitchBend => f.write_str("pb"),
        }
    }
}

/// Shape of a control event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventShape {
    /// Faders and knobs
    Continuous,
    /// Buttons
    Discrete,
}

impl EventShape {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventShape::Continuous => "continuous",
            EventShape::Discrete => "discrete",
        }
    }

    /// Parse from a user-supplied string (case-insensitive, short forms allowed)
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "continuous" | "cont" | "c" => Some(EventShape::Continuous),
            "discrete" | "disc" | "d" => Some(EventShape::Discrete),
            _ => None,
        }
    }
}

impl fmt::Display for EventShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Button edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Edge {
    On,
    Off,
}

/// A decoded hardware input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlEvent {
    /// Control-surface channel, 0-15
    pub source_channel: u8,
    pub control: ControlNumber,
    pub shape: EventShape,
    pub raw_value: u16,
    /// Set for discrete events only
    pub edge: Option<Edge>,
}

impl ControlEvent {
    /// Fader or knob movement
    pub fn continuous(source_channel: u8, control: ControlNumber, raw_value: u16) -> Self {
        Self {
            source_channel,
            control,
            shape: EventShape::Continuous,
            raw_value,
            edge: None,
        }
    }

    /// Button press or release
    pub fn discrete(source_channel: u8, control: ControlNumber, edge: Edge) -> Self {
        let raw_value = match edge {
            Edge::On => SEVEN_BIT_MAX,
            Edge::Off => 0,
        };
        Self {
            source_channel,
            control,
            shape: EventShape::Discrete,
            raw_value,
            edge: Some(edge),
        }
    }

    /// Key used for mapping lookups
    pub fn key(&self) -> MappingKey {
        MappingKey {
            source_channel: self.source_channel,
            control: self.control,
            shape: self.shape,
        }
    }

    /// Edge as seen by toggle actions: continuous values above zero count as On
    pub fn effective_edge(&self) -> Edge {
        match (self.edge, self.shape) {
            (Some(edge), _) => edge,
            (None, EventShape::Continuous) if self.raw_value > 0 => Edge::On,
            (None, _) => Edge::Off,
        }
    }
}

/// Logical action a control can be bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    Volume,
    Mute,
    Solo,
    Record,
    Select,
    TransportPlay,
    TransportPause,
    TransportNext,
    TransportPrevious,
}

const CONTINUOUS_ONLY: &[EventShape] = &[EventShape::Continuous];
const DISCRETE_ONLY: &[EventShape] = &[EventShape::Discrete];
const ANY_SHAPE: &[EventShape] = &[EventShape::Continuous, EventShape::Discrete];

impl Action {
    /// All actions, in display order
    pub fn all() -> &'static [Action] {
        &[
            Action::Volume,
            Action::Mute,
            Action::Solo,
            Action::Record,
            Action::Select,
            Action::TransportPlay,
            Action::TransportPause,
            Action::TransportNext,
            Action::TransportPrevious,
        ]
    }

    /// Event shapes learn mode accepts for this action
    pub fn accepted_shapes(&self) -> &'static [EventShape] {
        match self {
            Action::Volume => CONTINUOUS_ONLY,
            Action::Mute | Action::Solo | Action::Record | Action::Select => DISCRETE_ONLY,
            Action::TransportPlay
            | Action::TransportPause
            | Action::TransportNext
            | Action::TransportPrevious => ANY_SHAPE,
        }
    }

    pub fn accepts(&self, shape: EventShape) -> bool {
        self.accepted_shapes().contains(&shape)
    }

    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Action::TransportPlay
                | Action::TransportPause
                | Action::TransportNext
                | Action::TransportPrevious
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Volume => "volume",
            Action::Mute => "mute",
            Action::Solo => "solo",
            Action::Record => "record",
            Action::Select => "select",
            Action::TransportPlay => "play",
            Action::TransportPause => "pause",
            Action::TransportNext => "next",
            Action::TransportPrevious => "previous",
        }
    }

    /// Parse from a user-supplied name (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        let lowered = s.to_ascii_lowercase();
        let name = lowered.strip_prefix("transport-").unwrap_or(&lowered);
        match name {
            "volume" | "vol" => Some(Action::Volume),
            "mute" => Some(Action::Mute),
            "solo" => Some(Action::Solo),
            "record" | "rec" => Some(Action::Record),
            "select" | "sel" => Some(Action::Select),
            "play" => Some(Action::TransportPlay),
            "pause" => Some(Action::TransportPause),
            "next" => Some(Action::TransportNext),
            "previous" | "prev" => Some(Action::TransportPrevious),
            _ => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Destination of a mapping: one channel, or every channel for transport actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChannelTarget {
    Channel(usize),
    Global,
}

impl fmt::Display for ChannelTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelTarget::Channel(index) => write!(f, "ch{}", index),
            ChannelTarget::Global => f.write_str("global"),
        }
    }
}

/// Raw input range of a continuous control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: u16,
    pub max: u16,
}

impl ValueRange {
    pub const fn new(min: u16, max: u16) -> Self {
        Self { min, max }
    }

    /// Full-scale range of a control: 14 bits for pitch-bend, 7 bits otherwise
    pub fn for_control(control: ControlNumber) -> Self {
        match control {
            ControlNumber::PitchBend => Self::new(0, PITCH_BEND_MAX),
            ControlNumber::Number(_) => Self::new(0, SEVEN_BIT_MAX),
        }
    }

    /// Scale a raw value into 0.0..=1.0, clamped.
    ///
    /// A reversed range (min > max) scales downwards. A degenerate range acts
    /// as a threshold at its single value.
    pub fn normalize(&self, raw: u16) -> f32 {
        if self.min == self.max {
            return if raw >= self.max { 1.0 } else { 0.0 };
        }
        let span = self.max as f32 - self.min as f32;
        ((raw as f32 - self.min as f32) / span).clamp(0.0, 1.0)
    }
}

impl Default for ValueRange {
    fn default() -> Self {
        Self::new(0, SEVEN_BIT_MAX)
    }
}

/// Unique key of a mapping entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MappingKey {
    pub source_channel: u8,
    pub control: ControlNumber,
    pub shape: EventShape,
}

impl MappingKey {
    pub fn new(source_channel: u8, control: ControlNumber, shape: EventShape) -> Self {
        Self {
            source_channel,
            control,
            shape,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.source_channel <= MAX_SOURCE_CHANNEL
    }
}

impl fmt::Display for MappingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.source_channel, self.control, self.shape)
    }
}

/// A binding from one control-event shape to one action
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MappingEntry {
    pub source_channel: u8,
    pub control: ControlNumber,
    pub shape: EventShape,
    pub action: Action,
    pub target: ChannelTarget,
    #[serde(default)]
    pub value_range: ValueRange,
    #[serde(default)]
    pub inverted: bool,
}

impl MappingEntry {
    /// Build an entry for an event, with the control's full-scale range
    pub fn for_event(event: &ControlEvent, action: Action, target: ChannelTarget) -> Self {
        Self {
            source_channel: event.source_channel,
            control: event.control,
            shape: event.shape,
            action,
            target,
            value_range: ValueRange::for_control(event.control),
            inverted: false,
        }
    }

    pub fn key(&self) -> MappingKey {
        MappingKey::new(self.source_channel, self.control, self.shape)
    }

    /// Position of the control as 0.0..=1.0, before inversion
    pub fn position(&self, raw: u16) -> f32 {
        self.value_range.normalize(raw)
    }

    /// Value to apply, after inversion
    pub fn scaled_value(&self, raw: u16) -> f32 {
        let n = self.position(raw);
        if self.inverted {
            1.0 - n
        } else {
            n
        }
    }
}
