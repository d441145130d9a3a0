//! Learn mode - bind the next control event to a requested action
//!
//! While armed, every incoming event is intercepted before dispatch. The
//! first qualifying event either commits a mapping or reports a shape
//! mismatch; both return the controller to idle.

use crate::mapping::{
    Action, ChannelTarget, ControlEvent, Edge, EventShape, MappingEntry, MappingTable,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

/// A pending learn request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LearnSession {
    pub action: Action,
    pub target: ChannelTarget,
}

impl LearnSession {
    pub fn accepted_shapes(&self) -> &'static [EventShape] {
        self.action.accepted_shapes()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum LearnState {
    #[default]
    Idle,
    Armed(LearnSession),
}

/// Result of intercepting an event while armed
#[derive(Debug, Clone, PartialEq)]
pub enum LearnOutcome {
    /// Mapping committed; `replaced` is the entry previously bound to the same key
    Committed {
        entry: MappingEntry,
        replaced: Option<MappingEntry>,
    },
    /// The event's shape is not accepted by the requested action
    Mismatch { action: Action, received: EventShape },
    /// Button release swallowed, the session stays armed
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LearnError {
    #[error("{0} needs a channel, not the global target")]
    ChannelRequired(Action),
    #[error("channel {index} does not exist ({count} channels)")]
    ChannelOutOfRange { index: usize, count: usize },
}

/// Learn-mode state machine
#[derive(Debug, Default)]
pub struct LearnController {
    state: LearnState,
}

impl LearnController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> LearnState {
        self.state
    }

    pub fn is_armed(&self) -> bool {
        matches!(self.state, LearnState::Armed(_))
    }

    pub fn session(&self) -> Option<LearnSession> {
        match self.state {
            LearnState::Armed(session) => Some(session),
            LearnState::Idle => None,
        }
    }

    /// Arm for an action, replacing any pending request.
    ///
    /// Returns the superseded session, if any.
    pub fn request(
        &mut self,
        action: Action,
        target: ChannelTarget,
        channel_count: usize,
    ) -> Result<Option<LearnSession>, LearnError> {
        match target {
            ChannelTarget::Global if !action.is_transport() => {
                return Err(LearnError::ChannelRequired(action));
            }
            ChannelTarget::Channel(index) if index >= channel_count => {
                return Err(LearnError::ChannelOutOfRange {
                    index,
                    count: channel_count,
                });
            }
            _ => {}
        }

        let superseded = self.session();
        self.state = LearnState::Armed(LearnSession { action, target });
        info!(%action, %target, superseded = superseded.is_some(), "Learn mode armed");
        Ok(superseded)
    }

    /// Disarm; returns the cancelled session, if any
    pub fn cancel(&mut self) -> Option<LearnSession> {
        let cancelled = self.session();
        self.state = LearnState::Idle;
        if cancelled.is_some() {
            info!("Learn mode cancelled");
        }
        cancelled
    }

    /// Offer an event to learn mode.
    ///
    /// `None` means learn mode is idle and the event goes on to dispatch.
    /// Any `Some` means the event was consumed.
    pub fn intercept(
        &mut self,
        event: &ControlEvent,
        table: &mut MappingTable,
    ) -> Option<LearnOutcome> {
        let session = self.session()?;

        if event.edge == Some(Edge::Off) {
            debug!(control = %event.control, "Learn mode ignoring button release");
            return Some(LearnOutcome::Ignored);
        }

        self.state = LearnState::Idle;

        if !session.action.accepts(event.shape) {
            warn!(
                action = %session.action,
                received = %event.shape,
                "Learn mode rejected event: shape not accepted"
            );
            return Some(LearnOutcome::Mismatch {
                action: session.action,
                received: event.shape,
            });
        }

        let entry = MappingEntry::for_event(event, session.action, session.target);
        let replaced = table.upsert(entry);
        info!(
            key = %entry.key(),
            action = %entry.action,
            target = %entry.target,
            "Learn mode committed mapping"
        );
        Some(LearnOutcome::Committed { entry, replaced })
    }
}
