//! Snapshot export and restore of the router state

use crate::learn::LearnController;
use crate::mapping::ChannelTarget;
use crate::mixer::ChannelBank;
use crate::persistence::{ChannelSnapshot, MixerSnapshot, TargetSnapshot};
use std::time::Instant;
use tracing::{info, warn};

/// Counts of what a restore brought back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RestoreSummary {
    pub mappings: usize,
    pub targets: usize,
    pub assignments: usize,
}

impl super::Router {
    /// Serializable view of mappings, channels and the targets worth remembering.
    ///
    /// Special targets and assigned targets are kept; plain unassigned
    /// sessions are rediscovered by enumeration.
    pub fn snapshot(&self) -> MixerSnapshot {
        let channels = self
            .channels
            .iter()
            .map(|c| ChannelSnapshot {
                index: c.index,
                volume: c.volume,
                muted: c.user_mute(),
                targets: c.assigned_targets.iter().copied().collect(),
            })
            .collect();

        let targets = self
            .directory
            .list()
            .into_iter()
            .filter(|t| t.kind.is_special() || t.assigned_channel.is_some())
            .map(|t| TargetSnapshot {
                logical_id: t.logical_id,
                kind: t.kind,
                display_name: t.display_name,
                process_key: t.process_key,
                external_id: t.external_id,
                assigned_channel: t.assigned_channel,
            })
            .collect();

        MixerSnapshot::new(channels, self.mappings.list_all(), targets)
    }

    /// Replace the whole state with a snapshot.
    ///
    /// Targets come back offline as placeholders, waiting to be reclaimed by
    /// the next reconciliation. Solo, record and transport state start cleared.
    pub fn restore(&mut self, snapshot: MixerSnapshot, now: Instant) -> RestoreSummary {
        let count = self.settings.channel_count;
        self.directory.clear();
        self.channels = ChannelBank::new(count);
        self.learn = LearnController::new();
        self.default_holders.clear();
        self.transport = None;
        self.held.clear();

        let mut summary = RestoreSummary::default();

        let mappings: Vec<_> = snapshot
            .mappings
            .into_iter()
            .filter(|entry| {
                let valid = entry.key().is_valid()
                    && match entry.target {
                        ChannelTarget::Channel(index) => index < count,
                        ChannelTarget::Global => entry.action.is_transport(),
                    };
                if !valid {
                    warn!(key = %entry.key(), target = %entry.target, "Dropping invalid mapping from snapshot");
                }
                valid
            })
            .collect();
        summary.mappings = mappings.len();
        self.mappings.replace_all(mappings);

        let mut assignments = Vec::new();
        for target in snapshot.targets {
            let inserted = self.directory.insert_with_id(
                target.logical_id,
                target.kind,
                target.display_name,
                target.process_key,
                target.external_id,
                now,
            );
            if !inserted {
                warn!(id = %target.logical_id, "Duplicate target in snapshot, skipped");
                continue;
            }
            summary.targets += 1;
            if let Some(index) = target.assigned_channel {
                assignments.push((target.logical_id, index));
            }
        }

        for saved in snapshot.channels {
            let Some(channel) = self.channels.get_mut(saved.index) else {
                warn!(channel = saved.index, "Snapshot channel beyond bank size, skipped");
                continue;
            };
            channel.volume = saved.volume.clamp(0.0, 1.0);
            channel.is_muted = saved.muted;
            assignments.extend(saved.targets.into_iter().map(|id| (id, saved.index)));
        }

        for (id, index) in assignments {
            if index >= count || !self.directory.contains(id) || self.channels.channel_of(id).is_some() {
                continue;
            }
            self.directory.set_assigned_channel(id, Some(index));
            if let Some(channel) = self.channels.get_mut(index) {
                channel.assigned_targets.insert(id);
                summary.assignments += 1;
            }
        }

        self.take_dirty();
        self.sync_surface();
        info!(
            mappings = summary.mappings,
            targets = summary.targets,
            assignments = summary.assignments,
            "Mixer state restored from snapshot"
        );
        summary
    }
}
