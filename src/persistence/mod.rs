//! Mixer snapshots: the persisted view of mappings, channels and targets
//!
//! The router produces a [`MixerSnapshot`] on demand and accepts one to
//! replace its state at startup. Snapshots go to sled through the
//! [`PersistenceActor`] or to JSON files for export.

mod persistence_actor;

pub use persistence_actor::{
    PersistenceActor, PersistenceActorHandle, PersistenceCommand, SnapshotStore,
    DEFAULT_DEBOUNCE_MS,
};

use crate::mapping::MappingEntry;
use crate::target::{LogicalId, TargetKind};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::fs;
use tracing::debug;

/// Persisted channel strip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSnapshot {
    pub index: usize,
    pub volume: f32,
    /// User mute, without the effect of an active solo
    pub muted: bool,
    #[serde(default)]
    pub targets: Vec<LogicalId>,
}

/// Persisted target identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetSnapshot {
    pub logical_id: LogicalId,
    pub kind: TargetKind,
    pub display_name: String,
    #[serde(default)]
    pub process_key: Option<String>,
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub assigned_channel: Option<usize>,
}

/// Full persisted state of the mixer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixerSnapshot {
    /// Version of the snapshot format
    pub version: String,
    /// Milliseconds since epoch
    pub timestamp: u64,
    pub channels: Vec<ChannelSnapshot>,
    pub mappings: Vec<MappingEntry>,
    pub targets: Vec<TargetSnapshot>,
}

impl MixerSnapshot {
    /// Current snapshot format version
    pub const VERSION: &'static str = "1.0.0";

    pub fn new(
        channels: Vec<ChannelSnapshot>,
        mappings: Vec<MappingEntry>,
        targets: Vec<TargetSnapshot>,
    ) -> Self {
        Self {
            version: Self::VERSION.to_string(),
            timestamp: now_ms(),
            channels,
            mappings,
            targets,
        }
    }

    /// Save snapshot to a JSON file
    pub async fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self).context("Failed to serialize mixer snapshot")?;

        fs::write(path, json)
            .await
            .with_context(|| format!("Failed to write mixer snapshot to {}", path.display()))?;

        debug!("Mixer snapshot exported to {}", path.display());
        Ok(())
    }

    /// Load snapshot from a JSON file
    pub async fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read mixer snapshot from {}", path.display()))?;

        let snapshot: MixerSnapshot =
            serde_json::from_str(&json).context("Failed to parse mixer snapshot JSON")?;

        debug!(
            "Mixer snapshot loaded (version: {}, {} mappings, {} targets)",
            snapshot.version,
            snapshot.mappings.len(),
            snapshot.targets.len()
        );
        Ok(snapshot)
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
