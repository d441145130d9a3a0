//! Periodic refresh: live enumeration, reconciliation and activity metering

use crate::target::{LogicalId, ReconcileReport, TargetKind};
use std::collections::BTreeSet;
use std::time::Instant;
use tracing::{debug, trace, warn};

impl super::Router {
    /// One refresh tick.
    ///
    /// Enumeration failure keeps the directory as it is; metering still runs.
    pub fn refresh(&mut self, now: Instant) -> ReconcileReport {
        let report = match self.backend.enumerate() {
            Ok(live) => self.directory.reconcile(&live, &self.settings.resolver, now),
            Err(e) => {
                warn!(error = %e, "Live enumeration failed, directory unchanged this tick");
                ReconcileReport::default()
            }
        };

        for (id, index) in &report.released {
            if let Some(channel) = self.channels.get_mut(*index) {
                channel.assigned_targets.remove(id);
            }
        }
        if !report.released.is_empty() {
            debug!(released = report.released.len(), "Evicted targets released their channels");
            self.prune_default_holders();
            self.mark_dirty();
        }

        self.reapply_rebound(&report.rebound);
        self.update_activity(now);
        report
    }

    /// Newly live sessions take on the state of the channel that controls them
    fn reapply_rebound(&mut self, rebound: &[LogicalId]) {
        if rebound.is_empty() {
            return;
        }

        let unmapped_channels: Vec<usize> = self
            .channels
            .iter()
            .filter(|c| {
                c.assigned_targets.iter().any(|id| {
                    self.directory
                        .get(*id)
                        .is_some_and(|t| t.kind == TargetKind::SpecialUnmapped)
                })
            })
            .map(|c| c.index)
            .collect();

        let mut affected = BTreeSet::new();
        for id in rebound {
            let Some(target) = self.directory.get(*id) else {
                continue;
            };
            match target.assigned_channel {
                Some(index) => {
                    affected.insert(index);
                }
                None if target.kind == TargetKind::Application => {
                    affected.extend(unmapped_channels.iter().copied());
                }
                None => {}
            }
        }

        for index in affected {
            trace!(channel = index, "Reapplying channel state to rebound sessions");
            self.apply_channel_state(index);
        }
    }

    /// Meter every channel and drive its select indicator
    fn update_activity(&mut self, now: Instant) {
        for index in 0..self.channels.len() {
            let mut peak = 0.0f32;
            for (id, handle) in self.resolve_handles(index) {
                match self.backend.read_peak_level(handle) {
                    Ok(level) => {
                        debug_assert!(level.is_finite(), "non-finite peak level {}", level);
                        if level.is_finite() {
                            peak = peak.max(level);
                        }
                    }
                    Err(e) if e.is_invalid_handle() => self.directory.mark_handle_failed(id, handle),
                    Err(e) => trace!(%id, error = %e, "Peak read failed"),
                }
            }

            let active = self.activity.observe(index, peak, now);
            let changed = match self.channels.get_mut(index) {
                Some(channel) if channel.is_selected != active => {
                    channel.is_selected = active;
                    true
                }
                _ => false,
            };
            if changed {
                self.sync_channel_indicators(index);
            }
        }
    }
}
