//! Engine - the single consumer of control events, ticks and operator commands
//!
//! The MIDI callback, the refresh ticker, the REPL and the config watcher all
//! push into one unbounded queue; this task drains it in order and is the only
//! code that touches the [`Router`]. Learn arming, mapping upserts and solo
//! recomputation therefore never interleave.

use super::commands::{EngineCommand, Notification, SubscriberFn};
use super::handle::EngineHandle;
use crate::learn::{LearnOutcome, LearnState};
use crate::persistence::SnapshotStore;
use crate::router::{DispatchOutcome, EventOutcome, Router};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

/// Actor owning the mixer state
pub struct Engine {
    router: Router,
    /// Where snapshots go after persisted state changes
    store: Option<Arc<dyn SnapshotStore>>,
    subscribers: Vec<SubscriberFn>,
    command_rx: mpsc::UnboundedReceiver<EngineCommand>,
    /// Control events processed
    event_count: u64,
}

impl Engine {
    /// Spawn the engine task and return a handle to it.
    ///
    /// With a store, the stored snapshot is restored before the first
    /// command is processed.
    pub fn spawn(router: Router, store: Option<Arc<dyn SnapshotStore>>) -> EngineHandle {
        let (cmd_tx, command_rx) = mpsc::unbounded_channel();

        let engine = Engine {
            router,
            store,
            subscribers: Vec::new(),
            command_rx,
            event_count: 0,
        };
        tokio::spawn(engine.run());

        info!("Engine spawned");
        EngineHandle::new(cmd_tx)
    }

    async fn run(mut self) {
        debug!("Engine run loop started");
        self.hydrate().await;

        while let Some(cmd) = self.command_rx.recv().await {
            trace!(?cmd, "Processing command");
            // Control events save with the next tick or request, not per event
            let deferred = matches!(cmd, EngineCommand::Control(_));

            match cmd {
                EngineCommand::Control(event) => {
                    self.event_count += 1;
                    let outcome = self.router.handle_event(&event);
                    self.publish_outcome(outcome);
                }
                EngineCommand::Tick => {
                    let report = self.router.refresh(Instant::now());
                    if report.has_changes() {
                        self.notify(&Notification::Directory(report));
                    }
                }

                EngineCommand::RequestLearn {
                    action,
                    target,
                    response,
                } => {
                    let result = self.router.request_learn(action, target);
                    if let (Ok(_), LearnState::Armed(session)) = (&result, self.router.learn_state()) {
                        self.notify(&Notification::LearnArmed(session));
                    }
                    let _ = response.send(result);
                }
                EngineCommand::CancelLearn { response } => {
                    let cancelled = self.router.cancel_learn();
                    if let Some(session) = cancelled {
                        self.notify(&Notification::LearnCancelled(session));
                    }
                    let _ = response.send(cancelled);
                }
                EngineCommand::GetLearnState { response } => {
                    let _ = response.send(self.router.learn_state());
                }

                EngineCommand::AssignTarget { id, channel, response } => {
                    let _ = response.send(self.router.assign_target(id, channel));
                }
                EngineCommand::UnassignTarget { id, response } => {
                    let _ = response.send(self.router.unassign_target(id));
                }
                EngineCommand::AddManualTarget {
                    process,
                    display_name,
                    response,
                } => {
                    let result = self
                        .router
                        .add_manual_target(&process, display_name, Instant::now());
                    let _ = response.send(result);
                }
                EngineCommand::AddSpecialTarget { kind, response } => {
                    let _ = response.send(self.router.add_special_target(kind, Instant::now()));
                }
                EngineCommand::RemoveTarget { id, response } => {
                    let _ = response.send(self.router.remove_target(id));
                }
                EngineCommand::ListTargets { response } => {
                    let _ = response.send(self.router.list_targets());
                }
                EngineCommand::ListChannels { response } => {
                    let _ = response.send(self.router.list_channels());
                }

                EngineCommand::ListMappings { response } => {
                    let _ = response.send(self.router.list_mappings());
                }
                EngineCommand::RemoveMapping { key, response } => {
                    let _ = response.send(self.router.remove_mapping(&key));
                }
                EngineCommand::ClearMappings { response } => {
                    let _ = response.send(self.router.clear_mappings());
                }

                EngineCommand::Snapshot { response } => {
                    let _ = response.send(self.router.snapshot());
                }
                EngineCommand::RestoreSnapshot { snapshot, response } => {
                    let summary = self.router.restore(snapshot, Instant::now());
                    // A restore replaces the persisted state wholesale
                    self.router.mark_dirty();
                    self.notify(&Notification::Restored(summary));
                    let _ = response.send(summary);
                }
                EngineCommand::UpdateSettings(settings) => {
                    self.router.update_settings(settings);
                }
                EngineCommand::SetIndicators(indicators) => {
                    self.router.set_indicators(indicators);
                }
                EngineCommand::Subscribe { listener, response } => {
                    self.subscribers.push(listener);
                    let id = self.subscribers.len() - 1;
                    let _ = response.send(id);
                    debug!(subscriber_id = id, "Added subscriber");
                }
                EngineCommand::Shutdown { response } => {
                    info!("Engine received shutdown command");
                    self.persist_if_dirty().await;
                    self.flush_store().await;
                    if let Some(response) = response {
                        let _ = response.send(());
                    }
                    break;
                }
            }

            if !deferred {
                self.persist_if_dirty().await;
            }
        }

        info!(events = self.event_count, "Engine run loop terminated");
    }

    /// Restore the stored snapshot, if any
    async fn hydrate(&mut self) {
        let Some(store) = self.store.clone() else {
            return;
        };

        match store.load().await {
            Ok(Some(snapshot)) => {
                let summary = self.router.restore(snapshot, Instant::now());
                self.notify(&Notification::Restored(summary));
            }
            Ok(None) => debug!("No stored snapshot, starting empty"),
            Err(e) => error!("Failed to load stored snapshot: {:#}", e),
        }
    }

    fn publish_outcome(&self, outcome: EventOutcome) {
        match outcome {
            EventOutcome::Learn(outcome) => {
                if !matches!(outcome, LearnOutcome::Ignored) {
                    self.notify(&Notification::Learn(outcome));
                }
            }
            EventOutcome::Dispatch(DispatchOutcome::Rejected(rejection)) => {
                self.notify(&Notification::Rejected(rejection));
            }
            EventOutcome::Dispatch(outcome) => trace!(?outcome, "Event dispatched"),
        }
    }

    async fn persist_if_dirty(&mut self) {
        if !self.router.take_dirty() {
            return;
        }
        let Some(store) = &self.store else {
            return;
        };
        if let Err(e) = store.save(self.router.snapshot()).await {
            error!("Failed to queue snapshot: {:#}", e);
        }
    }

    async fn flush_store(&self) {
        if let Some(store) = &self.store {
            if let Err(e) = store.flush().await {
                warn!("Failed to flush snapshot store: {:#}", e);
            }
        }
    }

    fn notify(&self, notification: &Notification) {
        for subscriber in &self.subscribers {
            subscriber(notification);
        }
    }
}
