//! Reconciliation of live enumeration batches against the directory
//!
//! Each refresh tick feeds the freshly enumerated live items through
//! [`TargetDirectory::reconcile`]:
//!
//! 1. Application sessions sharing a process key are folded into one group;
//!    the first by display name is the primary, the others become aliases.
//! 2. A group matches an existing entry by any of its external ids (strong).
//! 3. Otherwise it migrates an unmatched entry with the same process key,
//!    keeping that entry's logical id and channel assignment.
//! 4. Otherwise a new entry is created.
//! 5. Unmatched entries go offline, and non-special ones unseen for longer
//!    than the grace window are evicted.
//! 6. If the directory is above capacity, least-recently-seen non-special
//!    entries are evicted.

use super::{LiveTarget, LogicalId, TargetDirectory, TargetKind};
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

/// Default grace window before an unseen entry is evicted
pub const DEFAULT_STALE_GRACE: Duration = Duration::from_secs(5);

/// Default directory capacity
pub const DEFAULT_CAPACITY: usize = 64;

/// Eviction bounds for reconciliation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolverSettings {
    /// How long an entry may stay unseen before it is evicted
    pub stale_grace: Duration,
    /// Maximum number of entries retained
    pub capacity: usize,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            stale_grace: DEFAULT_STALE_GRACE,
            capacity: DEFAULT_CAPACITY,
        }
    }
}

/// Changeset produced by one reconciliation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileReport {
    /// Entries created for never-seen live items
    pub added: Vec<LogicalId>,
    /// Entries strongly matched by external id
    pub updated: Vec<LogicalId>,
    /// Entries re-bound to a new external id through their process key
    pub migrated: Vec<LogicalId>,
    /// Entries evicted (staleness or capacity)
    pub removed: Vec<LogicalId>,
    /// Entries that lost their live session this cycle
    pub went_offline: Vec<LogicalId>,
    /// Channel claims released by evictions, as (target, channel)
    pub released: Vec<(LogicalId, usize)>,
    /// Entries whose primary live handle changed (new, migrated or back online)
    pub rebound: Vec<LogicalId>,
}

impl ReconcileReport {
    /// Whether the visible membership changed (anything besides plain refreshes)
    pub fn has_changes(&self) -> bool {
        !(self.added.is_empty()
            && self.migrated.is_empty()
            && self.removed.is_empty()
            && self.went_offline.is_empty())
    }
}

/// Live items folded under one visible entry
struct LiveGroup<'a> {
    primary: &'a LiveTarget,
    aliases: Vec<&'a LiveTarget>,
}

impl<'a> LiveGroup<'a> {
    fn members(&self) -> impl Iterator<Item = &'a LiveTarget> + '_ {
        std::iter::once(self.primary).chain(self.aliases.iter().copied())
    }
}

/// Fold application sessions by process key.
///
/// Groups keep the order of their first appearance in the batch; within a
/// group members are ordered by display name (stable, so ties keep batch order).
fn group_live(live: &[LiveTarget]) -> Vec<LiveGroup<'_>> {
    let mut order: Vec<Vec<&LiveTarget>> = Vec::new();
    let mut slot_by_key: HashMap<&str, usize> = HashMap::new();

    for item in live {
        match (&item.process_key, item.kind) {
            (Some(key), TargetKind::Application) => match slot_by_key.get(key.as_str()) {
                Some(&slot) => order[slot].push(item),
                None => {
                    slot_by_key.insert(key.as_str(), order.len());
                    order.push(vec![item]);
                }
            },
            _ => order.push(vec![item]),
        }
    }

    order
        .into_iter()
        .map(|mut members| {
            members.sort_by_cached_key(|m| m.display_name.to_lowercase());
            let primary = members.remove(0);
            LiveGroup {
                primary,
                aliases: members,
            }
        })
        .collect()
}

impl TargetDirectory {
    /// Reconcile a live enumeration batch against the directory
    pub fn reconcile(
        &mut self,
        live: &[LiveTarget],
        settings: &ResolverSettings,
        now: Instant,
    ) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let mut matched: HashSet<LogicalId> = HashSet::new();

        for group in group_live(live) {
            let primary = group.primary;

            let strong = group
                .members()
                .filter_map(|m| self.find_by_external_id(&m.external_id))
                .find(|id| !matched.contains(id) && self.same_process(*id, primary));

            let id = if let Some(id) = strong {
                report.updated.push(id);
                id
            } else if let Some(id) = primary
                .process_key
                .as_deref()
                .and_then(|key| self.find_by_process_key(key))
                .filter(|id| !matched.contains(id))
            {
                debug!(
                    %id,
                    external_id = %primary.external_id,
                    "Target migrated to new live session"
                );
                report.migrated.push(id);
                id
            } else {
                let id = self.insert(
                    primary.kind,
                    primary.display_name.clone(),
                    primary.process_key.clone(),
                    Some(primary.external_id.clone()),
                    Some(primary.handle),
                    now,
                );
                report.added.push(id);
                report.rebound.push(id);
                id
            };

            if self.get(id).and_then(|t| t.live_handle) != Some(primary.handle) {
                report.rebound.push(id);
            }

            let aliases = group
                .aliases
                .iter()
                .map(|a| (a.external_id.clone(), a.handle))
                .collect();
            self.rebind(
                id,
                &primary.external_id,
                primary.handle,
                &primary.display_name,
                primary.process_key.as_deref(),
                aliases,
                now,
            );
            matched.insert(id);
        }

        let unmatched: Vec<LogicalId> = self
            .iter()
            .map(|t| t.logical_id)
            .filter(|id| !matched.contains(id))
            .collect();

        for id in unmatched {
            if self.mark_offline(id) {
                report.went_offline.push(id);
            }

            let Some(target) = self.get(id) else { continue };
            let stale = now.saturating_duration_since(target.last_seen) > settings.stale_grace;
            if stale && !target.kind.is_special() {
                trace!(%id, "Target unseen beyond grace window");
                self.evict(id, &mut report);
            }
        }

        while self.len() > settings.capacity {
            let oldest = self
                .iter()
                .filter(|t| !t.kind.is_special())
                .min_by_key(|t| (t.last_seen, t.logical_id))
                .map(|t| t.logical_id);

            match oldest {
                Some(id) => self.evict(id, &mut report),
                None => break,
            }
        }

        if !report.added.is_empty() || !report.removed.is_empty() {
            info!(
                added = report.added.len(),
                migrated = report.migrated.len(),
                removed = report.removed.len(),
                total = self.len(),
                "Target directory reconciled"
            );
        }

        report
    }

    /// An external id only identifies the same target if the process agrees
    fn same_process(&self, id: LogicalId, live: &LiveTarget) -> bool {
        match (self.get(id).and_then(|t| t.process_key.as_deref()), live.process_key.as_deref()) {
            (Some(known), Some(seen)) => known == seen,
            _ => true,
        }
    }

    fn evict(&mut self, id: LogicalId, report: &mut ReconcileReport) {
        if let Some(target) = self.remove(id) {
            debug!(%id, name = %target.display_name, "Target evicted");
            if let Some(channel) = target.assigned_channel {
                report.released.push((id, channel));
            }
            report.removed.push(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::LiveHandle;
    use proptest::prelude::*;

    fn app(ext: &str, process: &str, name: &str, handle: u64) -> LiveTarget {
        LiveTarget::new(ext, Some(process), name, TargetKind::Application, LiveHandle(handle))
    }

    fn device(ext: &str, name: &str, handle: u64) -> LiveTarget {
        LiveTarget::new(ext, None, name, TargetKind::SystemOutput, LiveHandle(handle))
    }

    #[test]
    fn test_first_sighting_adds_entries() {
        let mut dir = TargetDirectory::new();
        let now = Instant::now();
        let report = dir.reconcile(
            &[app("s-1", "spotify.exe", "Spotify", 1), device("dev-1", "Speakers", 2)],
            &ResolverSettings::default(),
            now,
        );

        assert_eq!(report.added.len(), 2);
        assert!(report.updated.is_empty());
        assert_eq!(dir.len(), 2);
    }

    #[test]
    fn test_strong_match_keeps_identity_and_assignment() {
        let mut dir = TargetDirectory::new();
        let settings = ResolverSettings::default();
        let now = Instant::now();

        let report = dir.reconcile(&[app("s-1", "spotify", "Spotify", 1)], &settings, now);
        let id = report.added[0];
        dir.set_assigned_channel(id, Some(3));

        let later = now + Duration::from_millis(50);
        let report = dir.reconcile(&[app("s-1", "spotify", "Spotify", 7)], &settings, later);

        assert_eq!(report.updated, vec![id]);
        let target = dir.get(id).unwrap();
        assert_eq!(target.assigned_channel, Some(3));
        assert_eq!(target.live_handle, Some(LiveHandle(7)));
        assert_eq!(target.last_seen, later);
    }

    #[test]
    fn test_migration_on_external_id_change() {
        let mut dir = TargetDirectory::new();
        let settings = ResolverSettings::default();
        let now = Instant::now();

        let id = dir.reconcile(&[app("s-1", "spotify", "Spotify", 1)], &settings, now).added[0];
        dir.set_assigned_channel(id, Some(2));

        let report = dir.reconcile(&[app("s-2", "spotify", "Spotify", 2)], &settings, now);

        assert_eq!(report.migrated, vec![id]);
        assert!(report.added.is_empty());
        assert_eq!(dir.len(), 1);
        let target = dir.get(id).unwrap();
        assert_eq!(target.external_id.as_deref(), Some("s-2"));
        assert_eq!(target.assigned_channel, Some(2));
        assert_eq!(dir.find_by_external_id("s-1"), None);
    }

    #[test]
    fn test_dedup_by_process_key_uses_first_display_name() {
        let mut dir = TargetDirectory::new();
        let report = dir.reconcile(
            &[
                app("s-2", "spotify", "Spotify Web Helper", 2),
                app("s-1", "spotify", "Spotify", 1),
            ],
            &ResolverSettings::default(),
            Instant::now(),
        );

        assert_eq!(report.added.len(), 1);
        assert_eq!(dir.len(), 1);
        let target = dir.get(report.added[0]).unwrap();
        assert_eq!(target.display_name, "Spotify");
        assert_eq!(target.live_handle, Some(LiveHandle(1)));
        assert_eq!(target.aliases, vec![("s-2".to_string(), LiveHandle(2))]);
    }

    #[test]
    fn test_unseen_entries_go_offline_then_evict() {
        let mut dir = TargetDirectory::new();
        let settings = ResolverSettings {
            stale_grace: Duration::from_secs(1),
            capacity: 16,
        };
        let now = Instant::now();

        let id = dir.reconcile(&[app("v-1", "vlc", "VLC", 1)], &settings, now).added[0];
        dir.set_assigned_channel(id, Some(4));

        let report = dir.reconcile(&[], &settings, now + Duration::from_millis(500));
        assert_eq!(report.went_offline, vec![id]);
        assert!(report.removed.is_empty());
        assert!(!dir.get(id).unwrap().is_online());

        let report = dir.reconcile(&[], &settings, now + Duration::from_secs(2));
        assert_eq!(report.removed, vec![id]);
        assert_eq!(report.released, vec![(id, 4)]);
        assert!(dir.is_empty());
    }

    #[test]
    fn test_special_entries_survive_staleness() {
        let mut dir = TargetDirectory::new();
        let settings = ResolverSettings {
            stale_grace: Duration::from_millis(10),
            capacity: 16,
        };
        let now = Instant::now();
        let id = dir.add_special(TargetKind::SpecialUnmapped, "Unmapped", None, now);

        let report = dir.reconcile(&[], &settings, now + Duration::from_secs(60));
        assert!(report.removed.is_empty());
        assert!(dir.contains(id));
    }

    #[test]
    fn test_manual_target_claims_live_session() {
        let mut dir = TargetDirectory::new();
        let settings = ResolverSettings::default();
        let now = Instant::now();
        let id = dir.add_special(
            TargetKind::SpecialManual,
            "Game",
            Some("game".to_string()),
            now,
        );

        let report = dir.reconcile(&[app("g-1", "Game.exe", "Some Game", 9)], &settings, now);

        assert_eq!(report.migrated, vec![id]);
        assert_eq!(dir.len(), 1);
        let target = dir.get(id).unwrap();
        assert_eq!(target.kind, TargetKind::SpecialManual);
        assert_eq!(target.display_name, "Game");
        assert_eq!(target.live_handle, Some(LiveHandle(9)));
    }

    #[test]
    fn test_capacity_evicts_least_recently_seen() {
        let mut dir = TargetDirectory::new();
        let settings = ResolverSettings {
            stale_grace: Duration::from_secs(3600),
            capacity: 2,
        };
        let t0 = Instant::now();

        let old = dir.reconcile(&[app("a-1", "alpha", "Alpha", 1)], &settings, t0).added[0];
        let t1 = t0 + Duration::from_secs(1);
        let report = dir.reconcile(
            &[app("b-1", "beta", "Beta", 2), app("c-1", "gamma", "Gamma", 3)],
            &settings,
            t1,
        );

        assert_eq!(report.removed, vec![old]);
        assert_eq!(dir.len(), 2);
    }

    fn arb_batch() -> impl Strategy<Value = Vec<LiveTarget>> {
        prop::collection::vec((0u8..6, 0u8..4, 0u8..3), 0..12).prop_map(|items| {
            let mut seen_ext = HashSet::new();
            items
                .into_iter()
                .filter(|(ext, _, _)| seen_ext.insert(*ext))
                .enumerate()
                .map(|(i, (ext, proc_idx, name_idx))| {
                    LiveTarget::new(
                        format!("ext-{}", ext),
                        Some(format!("proc{}", proc_idx).as_str()),
                        format!("Name {}", name_idx),
                        TargetKind::Application,
                        LiveHandle(i as u64),
                    )
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_no_duplicate_process_keys(batches in prop::collection::vec(arb_batch(), 1..6)) {
            let mut dir = TargetDirectory::new();
            let settings = ResolverSettings::default();
            let now = Instant::now();

            for batch in &batches {
                dir.reconcile(batch, &settings, now);
                let mut seen = HashSet::new();
                for target in dir.iter() {
                    if let Some(key) = &target.process_key {
                        prop_assert!(seen.insert(key.clone()), "duplicate key {}", key);
                    }
                }
            }
        }

        #[test]
        fn prop_seen_external_ids_keep_identity(batch in arb_batch()) {
            let mut dir = TargetDirectory::new();
            let settings = ResolverSettings::default();
            let now = Instant::now();

            dir.reconcile(&batch, &settings, now);
            let before: HashMap<String, LogicalId> = batch
                .iter()
                .filter_map(|item| dir.find_by_external_id(&item.external_id).map(|id| (item.external_id.clone(), id)))
                .collect();

            dir.reconcile(&batch, &settings, now + Duration::from_millis(50));
            for (external_id, id) in before {
                prop_assert_eq!(dir.find_by_external_id(&external_id), Some(id));
            }
        }
    }
}
