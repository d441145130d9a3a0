//! Indicator and fader feedback to the control surface
//!
//! Every write is best-effort: retried once, then logged and dropped.

use crate::backend::{retry_once, TransportAction};
use crate::mapping::{Action, ChannelTarget, ControlNumber, EventShape, MappingEntry, MappingKey};
use tracing::trace;

impl super::Router {
    pub(crate) fn write_indicator(&self, source: u8, control: ControlNumber, on: bool) {
        let sink = &self.indicators;
        if retry_once("indicator", || sink.set_indicator(source, control, on)).is_some() {
            trace!(source, %control, on, "Indicator written");
        }
    }

    pub(crate) fn write_position(&self, source: u8, control: ControlNumber, position: f32) {
        let sink = &self.indicators;
        retry_once("continuous feedback", || {
            sink.send_continuous_feedback(source, control, position)
        });
    }

    /// Refresh mute/solo/record/select LEDs bound to a channel
    pub(crate) fn sync_channel_indicators(&self, index: usize) {
        let Some(channel) = self.channels.get(index) else {
            return;
        };

        for entry in self.mappings.iter() {
            if entry.target != ChannelTarget::Channel(index) || entry.shape != EventShape::Discrete {
                continue;
            }
            let on = match entry.action {
                Action::Mute => channel.is_muted,
                Action::Solo => channel.is_soloed,
                Action::Record => channel.is_recording,
                Action::Select => channel.is_selected,
                _ => continue,
            };
            self.write_indicator(entry.source_channel, entry.control, on);
        }
    }

    /// Move every control bound to a channel's volume, except the one that moved it
    pub(crate) fn sync_volume(&self, index: usize, except: Option<MappingKey>) {
        let Some(channel) = self.channels.get(index) else {
            return;
        };

        for entry in self.mappings.lookup_by_action(Action::Volume, ChannelTarget::Channel(index)) {
            if Some(entry.key()) == except {
                continue;
            }
            let position = if entry.inverted {
                1.0 - channel.volume
            } else {
                channel.volume
            };
            self.write_position(entry.source_channel, entry.control, position);
        }
    }

    /// Play and pause LEDs follow the active member of the pair
    pub(crate) fn sync_transport_indicators(&self) {
        for entry in self.mappings.iter() {
            if entry.shape != EventShape::Discrete {
                continue;
            }
            let member = match entry.action {
                Action::TransportPlay => TransportAction::Play,
                Action::TransportPause => TransportAction::Pause,
                _ => continue,
            };
            self.write_indicator(entry.source_channel, entry.control, self.transport == Some(member));
        }
    }

    /// Bring the surface in line with one mapping (after learn commits it)
    pub(crate) fn sync_entry(&self, entry: &MappingEntry) {
        match (entry.action, entry.target) {
            (Action::Volume, ChannelTarget::Channel(index)) => self.sync_volume(index, None),
            (Action::TransportPlay | Action::TransportPause, _) => self.sync_transport_indicators(),
            (Action::TransportNext | Action::TransportPrevious, _) => {
                if entry.shape == EventShape::Discrete {
                    self.write_indicator(entry.source_channel, entry.control, false);
                }
            }
            (_, ChannelTarget::Channel(index)) => self.sync_channel_indicators(index),
            (_, ChannelTarget::Global) => {}
        }
    }

    /// Replay the whole mixer state to the surface
    pub fn sync_surface(&self) {
        for index in 0..self.channels.len() {
            self.sync_channel_indicators(index);
            self.sync_volume(index, None);
        }
        self.sync_transport_indicators();
        for entry in self.mappings.iter() {
            if matches!(entry.action, Action::TransportNext | Action::TransportPrevious)
                && entry.shape == EventShape::Discrete
            {
                self.write_indicator(entry.source_channel, entry.control, false);
            }
        }
        trace!("Surface synced");
    }
}
