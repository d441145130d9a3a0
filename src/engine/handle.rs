//! EngineHandle - public API for the engine actor
//!
//! Hot-path methods send and return immediately; queries wait for the engine
//! over a oneshot channel. A handle whose engine is gone answers queries with
//! empty results and operations with [`EngineError::Closed`].

use super::commands::{EngineCommand, SubscriberFn};
use super::EngineError;
use crate::backend::IndicatorSink;
use crate::learn::{LearnSession, LearnState};
use crate::mapping::{Action, ChannelTarget, ControlEvent, MappingEntry, MappingKey};
use crate::mixer::Channel;
use crate::persistence::MixerSnapshot;
use crate::router::{RestoreSummary, RouterSettings};
use crate::target::{LogicalId, Target, TargetKind};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

/// Handle for talking to the engine; cheap to clone
#[derive(Clone)]
pub struct EngineHandle {
    cmd_tx: mpsc::UnboundedSender<EngineCommand>,
}

impl EngineHandle {
    pub fn new(cmd_tx: mpsc::UnboundedSender<EngineCommand>) -> Self {
        Self { cmd_tx }
    }

    /// Send a command and wait for its reply
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> EngineCommand,
    ) -> Result<T, EngineError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.cmd_tx
            .send(build(response_tx))
            .map_err(|_| EngineError::Closed)?;
        response_rx.await.map_err(|_| EngineError::Closed)
    }

    // =========================================================================
    // Hot path (fire-and-forget)
    // =========================================================================

    /// Queue a decoded control event; never blocks (safe from MIDI callbacks)
    pub fn control_event(&self, event: ControlEvent) {
        let _ = self.cmd_tx.send(EngineCommand::Control(event));
    }

    /// Queue a refresh tick
    pub fn tick(&self) {
        let _ = self.cmd_tx.send(EngineCommand::Tick);
    }

    /// Tick the engine every `period` until it stops
    pub fn spawn_ticker(&self, period: Duration) -> JoinHandle<()> {
        let handle = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if !handle.is_alive() {
                    debug!("Engine gone, refresh ticker stopping");
                    break;
                }
                handle.tick();
            }
        })
    }

    // =========================================================================
    // Learn mode
    // =========================================================================

    /// Arm learn mode; returns the request it superseded, if any
    pub async fn request_learn(
        &self,
        action: Action,
        target: ChannelTarget,
    ) -> Result<Option<LearnSession>, EngineError> {
        let result = self
            .request(|response| EngineCommand::RequestLearn {
                action,
                target,
                response,
            })
            .await?;
        Ok(result?)
    }

    pub async fn cancel_learn(&self) -> Result<Option<LearnSession>, EngineError> {
        self.request(|response| EngineCommand::CancelLearn { response })
            .await
    }

    pub async fn learn_state(&self) -> LearnState {
        self.request(|response| EngineCommand::GetLearnState { response })
            .await
            .unwrap_or_default()
    }

    // =========================================================================
    // Targets and channels
    // =========================================================================

    /// Assign a target to a channel; returns the channel it moved from
    pub async fn assign_target(&self, id: LogicalId, channel: usize) -> Result<Option<usize>, EngineError> {
        let result = self
            .request(|response| EngineCommand::AssignTarget { id, channel, response })
            .await?;
        Ok(result?)
    }

    pub async fn unassign_target(&self, id: LogicalId) -> Result<Option<usize>, EngineError> {
        let result = self
            .request(|response| EngineCommand::UnassignTarget { id, response })
            .await?;
        Ok(result?)
    }

    pub async fn add_manual_target(
        &self,
        process: impl Into<String>,
        display_name: Option<String>,
    ) -> Result<LogicalId, EngineError> {
        let process = process.into();
        let result = self
            .request(|response| EngineCommand::AddManualTarget {
                process,
                display_name,
                response,
            })
            .await?;
        Ok(result?)
    }

    pub async fn add_special_target(&self, kind: TargetKind) -> Result<LogicalId, EngineError> {
        let result = self
            .request(|response| EngineCommand::AddSpecialTarget { kind, response })
            .await?;
        Ok(result?)
    }

    pub async fn remove_target(&self, id: LogicalId) -> Result<Target, EngineError> {
        let result = self
            .request(|response| EngineCommand::RemoveTarget { id, response })
            .await?;
        Ok(result?)
    }

    pub async fn list_targets(&self) -> Vec<Target> {
        self.request(|response| EngineCommand::ListTargets { response })
            .await
            .unwrap_or_default()
    }

    pub async fn list_channels(&self) -> Vec<Channel> {
        self.request(|response| EngineCommand::ListChannels { response })
            .await
            .unwrap_or_default()
    }

    // =========================================================================
    // Mappings
    // =========================================================================

    pub async fn list_mappings(&self) -> Vec<MappingEntry> {
        self.request(|response| EngineCommand::ListMappings { response })
            .await
            .unwrap_or_default()
    }

    pub async fn remove_mapping(&self, key: MappingKey) -> Option<MappingEntry> {
        self.request(|response| EngineCommand::RemoveMapping { key, response })
            .await
            .ok()
            .flatten()
    }

    /// Drop every mapping; returns how many were removed
    pub async fn clear_mappings(&self) -> usize {
        self.request(|response| EngineCommand::ClearMappings { response })
            .await
            .unwrap_or(0)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    pub async fn snapshot(&self) -> Option<MixerSnapshot> {
        self.request(|response| EngineCommand::Snapshot { response })
            .await
            .ok()
    }

    pub async fn restore_snapshot(&self, snapshot: MixerSnapshot) -> Result<RestoreSummary, EngineError> {
        self.request(|response| EngineCommand::RestoreSnapshot { snapshot, response })
            .await
    }

    /// Push new tunables (config reload)
    pub fn update_settings(&self, settings: RouterSettings) {
        let _ = self.cmd_tx.send(EngineCommand::UpdateSettings(settings));
    }

    /// Swap the indicator sink (surface connected or lost)
    pub fn set_indicators(&self, indicators: Arc<dyn IndicatorSink>) {
        let _ = self.cmd_tx.send(EngineCommand::SetIndicators(indicators));
    }

    /// Register a notification listener; returns its id
    pub async fn subscribe(&self, listener: SubscriberFn) -> Option<usize> {
        self.request(|response| EngineCommand::Subscribe { listener, response })
            .await
            .ok()
    }

    /// Check if the engine is still running
    pub fn is_alive(&self) -> bool {
        !self.cmd_tx.is_closed()
    }

    /// Persist, flush and stop the engine; resolves once it has stopped
    pub async fn shutdown(&self) {
        let _ = self
            .request(|response| EngineCommand::Shutdown {
                response: Some(response),
            })
            .await;
    }
}
