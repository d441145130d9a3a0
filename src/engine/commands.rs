//! Command and notification types for the engine actor
//!
//! Control events and refresh ticks are fire-and-forget; everything the
//! operator surface asks for goes through a oneshot response channel.

use crate::backend::IndicatorSink;
use crate::learn::{LearnError, LearnOutcome, LearnSession, LearnState};
use crate::mapping::{Action, ChannelTarget, ControlEvent, MappingEntry, MappingKey};
use crate::mixer::Channel;
use crate::persistence::MixerSnapshot;
use crate::router::{Rejection, RestoreSummary, RouterSettings};
use crate::target::{LogicalId, ReconcileReport, Target, TargetKind};
use std::sync::Arc;
use tokio::sync::oneshot;

/// Subscriber callback, invoked on the engine task for every notification
pub type SubscriberFn = Arc<dyn Fn(&Notification) + Send + Sync>;

/// Something subscribers may want to show the operator
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    LearnArmed(LearnSession),
    LearnCancelled(LearnSession),
    /// Learn mode consumed an event (commit, mismatch or ignored release)
    Learn(LearnOutcome),
    /// A mapped event was refused; nothing changed
    Rejected(Rejection),
    /// Directory membership changed during a refresh
    Directory(ReconcileReport),
    Restored(RestoreSummary),
}

/// Commands for the engine actor
pub enum EngineCommand {
    // -------------------------------------------------------------------------
    // Hot path (no response)
    // -------------------------------------------------------------------------
    /// Decoded control event from the surface
    Control(ControlEvent),
    /// Periodic refresh: enumeration, reconciliation, activity
    Tick,

    // -------------------------------------------------------------------------
    // Learn mode
    // -------------------------------------------------------------------------
    RequestLearn {
        action: Action,
        target: ChannelTarget,
        response: oneshot::Sender<Result<Option<LearnSession>, LearnError>>,
    },
    CancelLearn {
        response: oneshot::Sender<Option<LearnSession>>,
    },
    GetLearnState {
        response: oneshot::Sender<LearnState>,
    },

    // -------------------------------------------------------------------------
    // Targets and channels
    // -------------------------------------------------------------------------
    AssignTarget {
        id: LogicalId,
        channel: usize,
        response: oneshot::Sender<Result<Option<usize>, Rejection>>,
    },
    UnassignTarget {
        id: LogicalId,
        response: oneshot::Sender<Result<Option<usize>, Rejection>>,
    },
    AddManualTarget {
        process: String,
        display_name: Option<String>,
        response: oneshot::Sender<Result<LogicalId, Rejection>>,
    },
    AddSpecialTarget {
        kind: TargetKind,
        response: oneshot::Sender<Result<LogicalId, Rejection>>,
    },
    RemoveTarget {
        id: LogicalId,
        response: oneshot::Sender<Result<Target, Rejection>>,
    },
    ListTargets {
        response: oneshot::Sender<Vec<Target>>,
    },
    ListChannels {
        response: oneshot::Sender<Vec<Channel>>,
    },

    // -------------------------------------------------------------------------
    // Mappings
    // -------------------------------------------------------------------------
    ListMappings {
        response: oneshot::Sender<Vec<MappingEntry>>,
    },
    RemoveMapping {
        key: MappingKey,
        response: oneshot::Sender<Option<MappingEntry>>,
    },
    ClearMappings {
        response: oneshot::Sender<usize>,
    },

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------
    Snapshot {
        response: oneshot::Sender<MixerSnapshot>,
    },
    RestoreSnapshot {
        snapshot: MixerSnapshot,
        response: oneshot::Sender<RestoreSummary>,
    },
    /// New tunables from a config reload
    UpdateSettings(RouterSettings),
    /// Surface connected or lost
    SetIndicators(Arc<dyn IndicatorSink>),
    Subscribe {
        listener: SubscriberFn,
        response: oneshot::Sender<usize>,
    },
    /// Persist, flush and stop
    Shutdown {
        response: Option<oneshot::Sender<()>>,
    },
}

// Manual Debug implementation because SubscriberFn and IndicatorSink don't implement Debug
impl std::fmt::Debug for EngineCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineCommand::Control(event) => f.debug_tuple("Control").field(event).finish(),
            EngineCommand::Tick => write!(f, "Tick"),
            EngineCommand::RequestLearn { action, target, .. } => f
                .debug_struct("RequestLearn")
                .field("action", action)
                .field("target", target)
                .finish_non_exhaustive(),
            EngineCommand::CancelLearn { .. } => f.debug_struct("CancelLearn").finish_non_exhaustive(),
            EngineCommand::GetLearnState { .. } => f.debug_struct("GetLearnState").finish_non_exhaustive(),
            EngineCommand::AssignTarget { id, channel, .. } => f
                .debug_struct("AssignTarget")
                .field("id", id)
                .field("channel", channel)
                .finish_non_exhaustive(),
            EngineCommand::UnassignTarget { id, .. } => f
                .debug_struct("UnassignTarget")
                .field("id", id)
                .finish_non_exhaustive(),
            EngineCommand::AddManualTarget { process, display_name, .. } => f
                .debug_struct("AddManualTarget")
                .field("process", process)
                .field("display_name", display_name)
                .finish_non_exhaustive(),
            EngineCommand::AddSpecialTarget { kind, .. } => f
                .debug_struct("AddSpecialTarget")
                .field("kind", kind)
                .finish_non_exhaustive(),
            EngineCommand::RemoveTarget { id, .. } => f
                .debug_struct("RemoveTarget")
                .field("id", id)
                .finish_non_exhaustive(),
            EngineCommand::ListTargets { .. } => f.debug_struct("ListTargets").finish_non_exhaustive(),
            EngineCommand::ListChannels { .. } => f.debug_struct("ListChannels").finish_non_exhaustive(),
            EngineCommand::ListMappings { .. } => f.debug_struct("ListMappings").finish_non_exhaustive(),
            EngineCommand::RemoveMapping { key, .. } => f
                .debug_struct("RemoveMapping")
                .field("key", key)
                .finish_non_exhaustive(),
            EngineCommand::ClearMappings { .. } => f.debug_struct("ClearMappings").finish_non_exhaustive(),
            EngineCommand::Snapshot { .. } => f.debug_struct("Snapshot").finish_non_exhaustive(),
            EngineCommand::RestoreSnapshot { snapshot, .. } => f
                .debug_struct("RestoreSnapshot")
                .field("mappings_count", &snapshot.mappings.len())
                .field("targets_count", &snapshot.targets.len())
                .finish_non_exhaustive(),
            EngineCommand::UpdateSettings(settings) => {
                f.debug_tuple("UpdateSettings").field(settings).finish()
            }
            EngineCommand::SetIndicators(_) => write!(f, "SetIndicators"),
            EngineCommand::Subscribe { .. } => f.debug_struct("Subscribe").finish_non_exhaustive(),
            EngineCommand::Shutdown { .. } => write!(f, "Shutdown"),
        }
    }
}
