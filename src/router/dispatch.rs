//! Control event dispatch: learn interception, then mapped action semantics

use super::Rejection;
use crate::backend::{retry_once, TransportAction};
use crate::learn::LearnOutcome;
use crate::mapping::{Action, ChannelTarget, ControlEvent, Edge, EventShape, MappingEntry};
use crate::target::TargetKind;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// What dispatching one mapped event did
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// No mapping for this event
    Unmapped,
    /// Mapped, but the edge is not one the action reacts to
    Ignored,
    /// Mapped to an action that takes no input (select)
    Inert,
    Volume { channel: usize, volume: f32 },
    Mute { channel: usize, muted: bool },
    Solo { channel: usize, soloed: bool },
    /// `switched` is false when the device switch failed or the device is offline
    Record { channel: usize, kind: TargetKind, switched: bool },
    /// Record on a channel without a device
    RecordNotApplicable { channel: usize },
    Transport { action: TransportAction, active: bool },
    Rejected(Rejection),
}

/// Result of handling one incoming control event
#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    /// Consumed by learn mode
    Learn(LearnOutcome),
    Dispatch(DispatchOutcome),
}

fn transport_action(action: Action) -> Option<TransportAction> {
    match action {
        Action::TransportPlay => Some(TransportAction::Play),
        Action::TransportPause => Some(TransportAction::Pause),
        Action::TransportNext => Some(TransportAction::Next),
        Action::TransportPrevious => Some(TransportAction::Previous),
        _ => None,
    }
}

impl super::Router {
    /// Entry point for every decoded control event.
    ///
    /// While learn mode is armed it sees the event first and consumes it.
    pub fn handle_event(&mut self, event: &ControlEvent) -> EventOutcome {
        if let Some(outcome) = self.learn.intercept(event, &mut self.mappings) {
            if let LearnOutcome::Committed { entry, .. } = &outcome {
                let entry = *entry;
                self.held.remove(&entry.key());
                self.sync_entry(&entry);
                self.mark_dirty();
            }
            return EventOutcome::Learn(outcome);
        }
        EventOutcome::Dispatch(self.dispatch(event))
    }

    /// Apply the action mapped to an event, bypassing learn mode
    pub fn dispatch(&mut self, event: &ControlEvent) -> DispatchOutcome {
        let Some(entry) = self.mappings.lookup_by_event(event).copied() else {
            trace!(key = %event.key(), "Unmapped control event");
            return DispatchOutcome::Unmapped;
        };

        let outcome = match entry.action {
            Action::Volume => self.dispatch_volume(&entry, event),
            Action::Mute => self.dispatch_mute(&entry, event),
            Action::Solo => self.dispatch_solo(&entry, event),
            Action::Record => self.dispatch_record(&entry, event),
            Action::Select => DispatchOutcome::Inert,
            Action::TransportPlay
            | Action::TransportPause
            | Action::TransportNext
            | Action::TransportPrevious => self.dispatch_transport(&entry, event),
        };

        if let DispatchOutcome::Rejected(rejection) = &outcome {
            warn!(key = %entry.key(), action = %entry.action, "Control event rejected: {}", rejection);
        }
        outcome
    }

    fn channel_index(&self, entry: &MappingEntry) -> Result<usize, Rejection> {
        match entry.target {
            ChannelTarget::Channel(index) => self.check_channel(index).map(|_| index),
            ChannelTarget::Global => Err(Rejection::GlobalTarget(entry.action)),
        }
    }

    fn dispatch_volume(&mut self, entry: &MappingEntry, event: &ControlEvent) -> DispatchOutcome {
        let index = match self.channel_index(entry) {
            Ok(index) => index,
            Err(rejection) => return DispatchOutcome::Rejected(rejection),
        };

        let volume = entry.scaled_value(event.raw_value);
        if let Some(channel) = self.channels.get_mut(index) {
            channel.volume = volume;
        }
        let applied = self.actuate(index, "volume", |b, h| b.apply_volume(h, volume));
        trace!(channel = index, volume, applied, "Volume applied");

        self.write_position(entry.source_channel, entry.control, entry.position(event.raw_value));
        self.sync_volume(index, Some(entry.key()));
        self.mark_dirty();
        DispatchOutcome::Volume {
            channel: index,
            volume,
        }
    }

    fn dispatch_mute(&mut self, entry: &MappingEntry, event: &ControlEvent) -> DispatchOutcome {
        if event.effective_edge() != Edge::On {
            return DispatchOutcome::Ignored;
        }
        let index = match self.channel_index(entry) {
            Ok(index) => index,
            Err(rejection) => return DispatchOutcome::Rejected(rejection),
        };

        let was_muted = self.channels.get(index).is_some_and(|c| c.is_muted);
        let Some(muted) = self.channels.toggle_mute(index) else {
            return DispatchOutcome::Ignored;
        };
        if muted != was_muted {
            self.actuate(index, "mute", |b, h| b.apply_mute(h, muted));
        }
        self.sync_channel_indicators(index);
        self.mark_dirty();
        debug!(channel = index, muted, "Mute toggled");
        DispatchOutcome::Mute {
            channel: index,
            muted,
        }
    }

    fn dispatch_solo(&mut self, entry: &MappingEntry, event: &ControlEvent) -> DispatchOutcome {
        if event.effective_edge() != Edge::On {
            return DispatchOutcome::Ignored;
        }
        let index = match self.channel_index(entry) {
            Ok(index) => index,
            Err(rejection) => return DispatchOutcome::Rejected(rejection),
        };

        let entering = self.channels.get(index).is_some_and(|c| !c.is_soloed);
        if entering && self.channel_has_master(index) {
            return DispatchOutcome::Rejected(Rejection::SoloMasterOutput(index));
        }

        let before: Vec<bool> = self.channels.iter().map(|c| c.is_muted).collect();
        let Some(soloed) = self.channels.toggle_solo(index) else {
            return DispatchOutcome::Ignored;
        };

        for (i, was_muted) in before.into_iter().enumerate() {
            let muted = self.channels.get(i).is_some_and(|c| c.is_muted);
            if muted != was_muted {
                self.actuate(i, "mute", |b, h| b.apply_mute(h, muted));
            }
            self.sync_channel_indicators(i);
        }
        debug!(channel = index, soloed, "Solo toggled");
        DispatchOutcome::Solo {
            channel: index,
            soloed,
        }
    }

    fn dispatch_record(&mut self, entry: &MappingEntry, event: &ControlEvent) -> DispatchOutcome {
        if event.effective_edge() != Edge::On {
            return DispatchOutcome::Ignored;
        }
        let index = match self.channel_index(entry) {
            Ok(index) => index,
            Err(rejection) => return DispatchOutcome::Rejected(rejection),
        };

        let Some((kind, handle)) = self.channel_device(index).map(|t| (t.kind, t.live_handle)) else {
            debug!(channel = index, "Record ignored: no device on channel");
            return DispatchOutcome::RecordNotApplicable { channel: index };
        };

        let Some(handle) = handle else {
            warn!(channel = index, %kind, "Record ignored: device is offline");
            return DispatchOutcome::Record {
                channel: index,
                kind,
                switched: false,
            };
        };

        let backend = Arc::clone(&self.backend);
        let switched = retry_once("set default device", || backend.set_default_device(handle, kind)).is_some();
        if switched {
            self.set_default_holder(kind, index);
            debug!(channel = index, %kind, "Default device switched");
        }
        DispatchOutcome::Record {
            channel: index,
            kind,
            switched,
        }
    }

    fn dispatch_transport(&mut self, entry: &MappingEntry, event: &ControlEvent) -> DispatchOutcome {
        let Some(action) = transport_action(entry.action) else {
            return DispatchOutcome::Ignored;
        };

        let edge = event.effective_edge();
        if event.shape == EventShape::Continuous {
            let previous = self.held.insert(entry.key(), edge);
            if previous == Some(edge) || (previous.is_none() && edge == Edge::Off) {
                return DispatchOutcome::Ignored;
            }
        }

        match (action, edge) {
            (TransportAction::Play | TransportAction::Pause, Edge::On) => {
                self.send_transport(action);
                self.transport = Some(action);
                self.sync_transport_indicators();
                DispatchOutcome::Transport { action, active: true }
            }
            (TransportAction::Next | TransportAction::Previous, Edge::On) => {
                self.send_transport(action);
                self.write_indicator(entry.source_channel, entry.control, true);
                DispatchOutcome::Transport { action, active: true }
            }
            (TransportAction::Next | TransportAction::Previous, Edge::Off) => {
                self.write_indicator(entry.source_channel, entry.control, false);
                DispatchOutcome::Transport { action, active: false }
            }
            (TransportAction::Play | TransportAction::Pause, Edge::Off) => DispatchOutcome::Ignored,
        }
    }

    fn send_transport(&self, action: TransportAction) {
        if let Err(e) = self.backend.transport(action) {
            warn!(?action, error = %e, "Transport command failed");
        }
    }
}
