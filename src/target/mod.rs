//! Controllable targets - application sessions, audio devices and pseudo-targets
//!
//! A [`Target`] keeps a stable [`LogicalId`] while the live session behind it
//! comes and goes. The [`TargetDirectory`] owns every known target and the
//! resolver reconciles each enumeration batch against it.

mod directory;
mod resolver;

pub use directory::TargetDirectory;
pub use resolver::{ReconcileReport, ResolverSettings};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

/// Stable identity of a target, unchanged across session churn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogicalId(pub u64);

impl fmt::Display for LogicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// Opaque reference to a live session or device, minted by the audio backend.
///
/// The core never inspects it; it only hands it back to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LiveHandle(pub u64);

/// Kind of controllable target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetKind {
    /// Per-application audio session
    Application,
    /// Output device (speakers, headset)
    SystemOutput,
    /// Input device (microphone, line in)
    SystemInput,
    /// Whatever application currently has focus
    SpecialFocusedApp,
    /// Every application not assigned to any channel
    SpecialUnmapped,
    /// Application named by the user, present or not
    SpecialManual,
}

impl TargetKind {
    /// Pseudo-targets are never evicted by staleness or capacity pressure
    pub fn is_special(&self) -> bool {
        matches!(
            self,
            TargetKind::SpecialFocusedApp | TargetKind::SpecialUnmapped | TargetKind::SpecialManual
        )
    }

    /// Input or output device
    pub fn is_device(&self) -> bool {
        matches!(self, TargetKind::SystemOutput | TargetKind::SystemInput)
    }

    /// Convert to string
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::Application => "application",
            TargetKind::SystemOutput => "system-output",
            TargetKind::SystemInput => "system-input",
            TargetKind::SpecialFocusedApp => "special-focused-app",
            TargetKind::SpecialUnmapped => "special-unmapped",
            TargetKind::SpecialManual => "special-manual",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalize a process name into a matching key: trimmed, lowercase, no `.exe`
pub fn normalize_process_key(raw: &str) -> Option<String> {
    let lowered = raw.trim().to_lowercase();
    let key = lowered.strip_suffix(".exe").unwrap_or(&lowered).trim();
    if key.is_empty() {
        None
    } else {
        Some(key.to_string())
    }
}

/// One item of a live enumeration batch
#[derive(Debug, Clone, PartialEq)]
pub struct LiveTarget {
    /// Volatile identifier from the audio layer (session instance id, device id)
    pub external_id: String,
    /// Normalized process key, only for application sessions
    pub process_key: Option<String>,
    pub display_name: String,
    pub kind: TargetKind,
    pub handle: LiveHandle,
}

impl LiveTarget {
    /// Build a live item, normalizing the process key.
    ///
    /// Devices never carry a process key.
    pub fn new(
        external_id: impl Into<String>,
        process_name: Option<&str>,
        display_name: impl Into<String>,
        kind: TargetKind,
        handle: LiveHandle,
    ) -> Self {
        let process_key = if kind.is_device() {
            None
        } else {
            process_name.and_then(normalize_process_key)
        };

        Self {
            external_id: external_id.into(),
            process_key,
            display_name: display_name.into(),
            kind,
            handle,
        }
    }
}

/// A known target in the directory
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub logical_id: LogicalId,
    pub display_name: String,
    pub kind: TargetKind,
    pub process_key: Option<String>,
    /// External id of the primary live item, kept while offline for strong matching
    pub external_id: Option<String>,
    /// Primary live handle, `None` while offline
    pub live_handle: Option<LiveHandle>,
    /// Further sessions of the same process folded into this target
    pub aliases: Vec<(String, LiveHandle)>,
    pub last_seen: Instant,
    /// At most one channel claims a target
    pub assigned_channel: Option<usize>,
}

impl Target {
    /// Whether a live session currently backs this target
    pub fn is_online(&self) -> bool {
        self.live_handle.is_some()
    }

    /// All live handles actuation should reach (primary first)
    pub fn handles(&self) -> impl Iterator<Item = LiveHandle> + '_ {
        self.live_handle
            .into_iter()
            .chain(self.aliases.iter().map(|(_, handle)| *handle))
    }

    /// Every external id that resolves to this target
    pub fn external_ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.external_id
            .as_deref()
            .into_iter()
            .chain(self.aliases.iter().map(|(id, _)| id.as_str()))
    }
}
