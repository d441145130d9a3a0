//! Capabilities the mixer core drives: audio actuation and surface indicators
//!
//! Both traits are called from inside the engine's serialized dispatch, so
//! implementations must return quickly and report failures instead of
//! blocking. A failure is always scoped to one handle or one indicator write.

pub mod console;
#[cfg(test)]
pub(crate) mod testing;

pub use console::{ConsoleBackend, SimulatedTarget};

use crate::mapping::ControlNumber;
use crate::target::{LiveHandle, LiveTarget, TargetKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Failure reported by a capability
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackendError {
    /// The live object behind the handle disappeared
    #[error("live handle {0:?} is no longer valid")]
    InvalidHandle(LiveHandle),

    #[error("{0} cannot become a default device")]
    NotADevice(TargetKind),

    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("write failed: {0}")]
    Write(String),
}

impl BackendError {
    /// Whether the failing handle should be taken offline
    pub fn is_invalid_handle(&self) -> bool {
        matches!(self, BackendError::InvalidHandle(_))
    }
}

/// Global media transport command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportAction {
    Play,
    Pause,
    Next,
    Previous,
}

/// Audio layer: enumeration, actuation and metering
pub trait AudioBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Current live sessions and devices, in enumeration order
    fn enumerate(&self) -> Result<Vec<LiveTarget>, BackendError>;

    /// Set a normalized 0.0..=1.0 volume
    fn apply_volume(&self, handle: LiveHandle, volume: f32) -> Result<(), BackendError>;

    fn apply_mute(&self, handle: LiveHandle, muted: bool) -> Result<(), BackendError>;

    /// Make a device the system default of its kind
    fn set_default_device(&self, handle: LiveHandle, kind: TargetKind) -> Result<(), BackendError>;

    /// Peak level 0.0..=1.0
    fn read_peak_level(&self, handle: LiveHandle) -> Result<f32, BackendError>;

    /// Normalized process key of the focused application, if known
    fn focused_process(&self) -> Option<String> {
        None
    }

    /// Send a media transport command.
    ///
    /// Default implementation: no-op (backend has no media keys)
    fn transport(&self, _action: TransportAction) -> Result<(), BackendError> {
        Ok(())
    }
}

/// Control-surface indicators: button LEDs and motorized faders/rings
pub trait IndicatorSink: Send + Sync {
    fn set_indicator(&self, source: u8, control: ControlNumber, on: bool) -> Result<(), BackendError>;

    /// Move a fader or ring to a normalized position
    fn send_continuous_feedback(
        &self,
        source: u8,
        control: ControlNumber,
        normalized: f32,
    ) -> Result<(), BackendError>;
}

/// Discards indicator writes when no surface is connected
#[derive(Debug, Default, Clone, Copy)]
pub struct NullIndicators;

impl IndicatorSink for NullIndicators {
    fn set_indicator(&self, _source: u8, _control: ControlNumber, _on: bool) -> Result<(), BackendError> {
        Ok(())
    }

    fn send_continuous_feedback(
        &self,
        _source: u8,
        _control: ControlNumber,
        _normalized: f32,
    ) -> Result<(), BackendError> {
        Ok(())
    }
}

/// Run a best-effort operation, retrying once on failure.
///
/// The second failure is logged and dropped; `None` is returned.
pub fn retry_once<T>(what: &str, mut op: impl FnMut() -> Result<T, BackendError>) -> Option<T> {
    match op() {
        Ok(value) => Some(value),
        Err(first) => {
            debug!(what, error = %first, "Best-effort operation failed, retrying once");
            match op() {
                Ok(value) => Some(value),
                Err(second) => {
                    warn!(what, error = %second, "Best-effort operation dropped after retry");
                    None
                }
            }
        }
    }
}
