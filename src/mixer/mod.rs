//! Channel strips and the solo/mute recomputation over the whole bank

mod activity;

pub use activity::{ActivityMonitor, DEFAULT_ACTIVITY_THRESHOLD, DEFAULT_QUIET_PERIOD};

use crate::target::LogicalId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

/// Default number of channel strips
pub const DEFAULT_CHANNEL_COUNT: usize = 9;

/// A logical mixing strip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub index: usize,
    pub assigned_targets: BTreeSet<LogicalId>,
    /// 0.0..=1.0
    pub volume: f32,
    pub is_muted: bool,
    pub is_soloed: bool,
    /// Mute value captured when the first solo started, cleared when the last one ends
    pub pre_solo_mute_state: Option<bool>,
    /// Mute toggles made while a solo is active; dropped when the last solo ends
    #[serde(default)]
    pub solo_mute_override: bool,
    /// Holds the current default device of its assigned target's kind
    pub is_recording: bool,
    /// Activity indicator
    pub is_selected: bool,
}

impl Channel {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            assigned_targets: BTreeSet::new(),
            volume: 1.0,
            is_muted: false,
            is_soloed: false,
            pre_solo_mute_state: None,
            solo_mute_override: false,
            is_recording: false,
            is_selected: false,
        }
    }

    /// Mute state chosen by the user, ignoring the effect of an active solo
    pub fn user_mute(&self) -> bool {
        self.pre_solo_mute_state.unwrap_or(self.is_muted)
    }
}

/// The fixed-size set of channel strips
#[derive(Debug, Clone, Default)]
pub struct ChannelBank {
    channels: Vec<Channel>,
}

impl ChannelBank {
    pub fn new(count: usize) -> Self {
        Self {
            channels: (0..count).map(Channel::new).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Channel> {
        self.channels.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Channel> {
        self.channels.get_mut(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Channel> {
        self.channels.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Channel> {
        self.channels.iter_mut()
    }

    /// Whether a solo is in effect (a mute capture exists)
    pub fn solo_active(&self) -> bool {
        self.channels.iter().any(|c| c.pre_solo_mute_state.is_some())
    }

    pub fn any_soloed(&self) -> bool {
        self.channels.iter().any(|c| c.is_soloed)
    }

    /// Grow or shrink the bank.
    ///
    /// Returns the targets that were assigned to dropped channels.
    pub fn resize(&mut self, count: usize) -> Vec<LogicalId> {
        let mut released = Vec::new();
        if count < self.channels.len() {
            for channel in self.channels.drain(count..) {
                released.extend(channel.assigned_targets);
            }
        } else {
            let capturing = self.solo_active();
            for index in self.channels.len()..count {
                let mut channel = Channel::new(index);
                if capturing {
                    channel.pre_solo_mute_state = Some(false);
                }
                self.channels.push(channel);
            }
        }
        self.recompute_solo();
        debug!(count, released = released.len(), "Channel bank resized");
        released
    }

    /// Toggle a channel's mute; returns the new effective state.
    ///
    /// During a solo the toggle is a temporary override on top of the
    /// captured mute, and a channel outside the solo set stays muted.
    pub fn toggle_mute(&mut self, index: usize) -> Option<bool> {
        if self.solo_active() {
            let channel = self.channels.get_mut(index)?;
            channel.solo_mute_override = !channel.solo_mute_override;
            channel.is_muted = effective_solo_mute(channel);
            return Some(channel.is_muted);
        }
        let channel = self.channels.get_mut(index)?;
        channel.is_muted = !channel.is_muted;
        Some(channel.is_muted)
    }

    /// Toggle a channel's solo and recompute mutes over the whole bank.
    ///
    /// Returns the new solo state.
    pub fn toggle_solo(&mut self, index: usize) -> Option<bool> {
        let channel = self.channels.get_mut(index)?;
        channel.is_soloed = !channel.is_soloed;
        let soloed = channel.is_soloed;
        self.recompute_solo();
        Some(soloed)
    }

    /// Recompute every channel's effective mute from the solo set.
    ///
    /// The first solo captures each channel's mute. While any channel is
    /// soloed a channel is muted if it was muted before or is not soloed.
    /// When the last solo clears the captured mutes are restored.
    pub fn recompute_solo(&mut self) {
        if self.any_soloed() {
            let capture = !self.solo_active();
            for channel in &mut self.channels {
                if capture {
                    channel.pre_solo_mute_state = Some(channel.is_muted);
                    channel.solo_mute_override = false;
                }
                channel.is_muted = effective_solo_mute(channel);
            }
            if capture {
                debug!("Solo started, mute states captured");
            }
        } else if self.solo_active() {
            for channel in &mut self.channels {
                if let Some(before) = channel.pre_solo_mute_state.take() {
                    channel.is_muted = before;
                }
                channel.solo_mute_override = false;
            }
            debug!("Last solo cleared, mute states restored");
        }
    }

    /// Drop a target from whichever channel lists it
    pub fn unassign(&mut self, id: LogicalId) -> Option<usize> {
        for channel in &mut self.channels {
            if channel.assigned_targets.remove(&id) {
                return Some(channel.index);
            }
        }
        None
    }

    /// Channel listing a target
    pub fn channel_of(&self, id: LogicalId) -> Option<usize> {
        self.channels
            .iter()
            .find(|c| c.assigned_targets.contains(&id))
            .map(|c| c.index)
    }
}

/// Mute while a solo is active: the user's mute (captured, flipped by any
/// override) or not being part of the solo set
fn effective_solo_mute(channel: &Channel) -> bool {
    let user = channel.pre_solo_mute_state.unwrap_or(channel.is_muted) ^ channel.solo_mute_override;
    user || !channel.is_soloed
}
