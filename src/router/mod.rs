//! Router - owns the mixer state and turns control events into actuation
//!
//! The Router is the single owner of:
//! - the target directory and its reconciliation against live enumeration
//! - the mapping table and the learn-mode controller
//! - the channel bank (volume, mute, solo, record, select)
//!
//! It is not thread-safe on purpose: the engine actor owns it and feeds it
//! one command at a time, so learn arming, mapping upserts and solo
//! recomputation never interleave.

mod assign;
mod dispatch;
mod feedback;
mod refresh;
mod snapshot;

#[cfg(test)]
mod tests;

pub use dispatch::{DispatchOutcome, EventOutcome};
pub use snapshot::RestoreSummary;

use crate::backend::{AudioBackend, IndicatorSink, TransportAction};
use crate::learn::{LearnController, LearnError, LearnSession, LearnState};
use crate::mapping::{Action, ChannelTarget, Edge, MappingEntry, MappingKey, MappingTable};
use crate::mixer::{
    ActivityMonitor, Channel, ChannelBank, DEFAULT_ACTIVITY_THRESHOLD, DEFAULT_CHANNEL_COUNT,
    DEFAULT_QUIET_PERIOD,
};
use crate::target::{LogicalId, ResolverSettings, Target, TargetDirectory, TargetKind};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Tunables the router runs with, derived from the engine config
#[derive(Debug, Clone, PartialEq)]
pub struct RouterSettings {
    pub channel_count: usize,
    pub resolver: ResolverSettings,
    pub activity_threshold: f32,
    pub activity_quiet: Duration,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            channel_count: DEFAULT_CHANNEL_COUNT,
            resolver: ResolverSettings::default(),
            activity_threshold: DEFAULT_ACTIVITY_THRESHOLD,
            activity_quiet: DEFAULT_QUIET_PERIOD,
        }
    }
}

/// A user-facing refusal; no state was changed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("channel {0} holds the master output and cannot be soloed")]
    SoloMasterOutput(usize),

    #[error("channel {0} is soloed and cannot take the master output")]
    MasterOnSoloedChannel(usize),

    #[error("channel {index} does not exist ({count} channels)")]
    ChannelOutOfRange { index: usize, count: usize },

    #[error("{0} needs a channel, not the global target")]
    GlobalTarget(Action),

    #[error("no target with id {0}")]
    UnknownTarget(LogicalId),

    #[error("'{0}' is not a usable process name")]
    InvalidProcessName(String),

    #[error("{0} is not a special target kind")]
    NotSpecial(TargetKind),
}

/// Mixer core state
pub struct Router {
    pub(crate) directory: TargetDirectory,
    pub(crate) mappings: MappingTable,
    pub(crate) learn: LearnController,
    pub(crate) channels: ChannelBank,
    pub(crate) activity: ActivityMonitor,
    pub(crate) settings: RouterSettings,
    pub(crate) backend: Arc<dyn AudioBackend>,
    pub(crate) indicators: Arc<dyn IndicatorSink>,
    /// Channel holding the current default device, per device kind
    pub(crate) default_holders: HashMap<TargetKind, usize>,
    /// Active member of the play/pause pair
    pub(crate) transport: Option<TransportAction>,
    /// Last edge seen on continuous controls bound to transport actions
    pub(crate) held: HashMap<MappingKey, Edge>,
    /// Persisted state changed since the last snapshot
    dirty: bool,
}

impl Router {
    pub fn new(
        settings: RouterSettings,
        backend: Arc<dyn AudioBackend>,
        indicators: Arc<dyn IndicatorSink>,
    ) -> Self {
        info!(
            channels = settings.channel_count,
            backend = backend.name(),
            "Router created"
        );
        Self {
            directory: TargetDirectory::new(),
            mappings: MappingTable::new(),
            learn: LearnController::new(),
            channels: ChannelBank::new(settings.channel_count),
            activity: ActivityMonitor::new(settings.activity_threshold, settings.activity_quiet),
            settings,
            backend,
            indicators,
            default_holders: HashMap::new(),
            transport: None,
            held: HashMap::new(),
            dirty: false,
        }
    }

    /// Swap the indicator sink (surface connected or lost) and replay state to it
    pub fn set_indicators(&mut self, indicators: Arc<dyn IndicatorSink>) {
        self.indicators = indicators;
        self.sync_surface();
    }

    pub fn settings(&self) -> &RouterSettings {
        &self.settings
    }

    pub fn directory(&self) -> &TargetDirectory {
        &self.directory
    }

    pub fn mappings(&self) -> &MappingTable {
        &self.mappings
    }

    pub fn channels(&self) -> &ChannelBank {
        &self.channels
    }

    pub fn channel(&self, index: usize) -> Option<&Channel> {
        self.channels.get(index)
    }

    // =========================================================================
    // Learn mode
    // =========================================================================

    /// Arm learn mode; the next qualifying control event is bound to `action`
    pub fn request_learn(
        &mut self,
        action: Action,
        target: ChannelTarget,
    ) -> Result<Option<LearnSession>, LearnError> {
        self.learn.request(action, target, self.channels.len())
    }

    pub fn cancel_learn(&mut self) -> Option<LearnSession> {
        self.learn.cancel()
    }

    pub fn learn_state(&self) -> LearnState {
        self.learn.state()
    }

    // =========================================================================
    // Queries and mapping maintenance
    // =========================================================================

    pub fn list_targets(&self) -> Vec<Target> {
        self.directory.list()
    }

    pub fn list_channels(&self) -> Vec<Channel> {
        self.channels.iter().cloned().collect()
    }

    pub fn list_mappings(&self) -> Vec<MappingEntry> {
        self.mappings.list_all()
    }

    pub fn remove_mapping(&mut self, key: &MappingKey) -> Option<MappingEntry> {
        let removed = self.mappings.remove_by_key(key);
        if removed.is_some() {
            self.held.remove(key);
            self.mark_dirty();
        }
        removed
    }

    /// Drop every mapping; returns how many were removed
    pub fn clear_mappings(&mut self) -> usize {
        let count = self.mappings.remove_all();
        self.held.clear();
        if count > 0 {
            self.mark_dirty();
        }
        count
    }

    /// Apply new tunables: the channel bank is resized, eviction and activity bounds updated
    pub fn update_settings(&mut self, settings: RouterSettings) {
        let previous = self.channels.len();
        if settings.channel_count != previous {
            let count = settings.channel_count;
            for id in self.channels.resize(count) {
                self.directory.set_assigned_channel(id, None);
            }
            self.default_holders.retain(|_, channel| *channel < count);
            for index in count..previous {
                self.activity.forget(index);
            }
            info!(from = previous, to = count, "Channel bank resized");
            self.mark_dirty();
        }

        self.activity
            .set_bounds(settings.activity_threshold, settings.activity_quiet);
        debug!(?settings, "Router settings updated");
        self.settings = settings;
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Whether persisted state changed since the last call
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub(crate) fn check_channel(&self, index: usize) -> Result<(), Rejection> {
        if index < self.channels.len() {
            Ok(())
        } else {
            Err(Rejection::ChannelOutOfRange {
                index,
                count: self.channels.len(),
            })
        }
    }
}
