//! TargetDirectory - the set of known targets with O(1) identity lookups
//!
//! Two secondary indexes are kept in step with the entries:
//! - external id (primary and alias sessions) -> logical id, for strong matches
//! - process key -> logical id, which also enforces that no two visible
//!   entries share a process key

use super::{LiveHandle, LogicalId, Target, TargetKind};
use std::collections::HashMap;
use std::time::Instant;
use tracing::debug;

/// Known targets indexed by logical id, external id and process key
#[derive(Debug, Default)]
pub struct TargetDirectory {
    entries: HashMap<LogicalId, Target>,
    by_external_id: HashMap<String, LogicalId>,
    by_process_key: HashMap<String, LogicalId>,
    next_id: u64,
}

impl TargetDirectory {
    /// Create an empty directory
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: LogicalId) -> Option<&Target> {
        self.entries.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: LogicalId) -> Option<&mut Target> {
        self.entries.get_mut(&id)
    }

    pub fn contains(&self, id: LogicalId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Iterate over all targets (unordered)
    pub fn iter(&self) -> impl Iterator<Item = &Target> {
        self.entries.values()
    }

    /// All targets ordered by logical id
    pub fn list(&self) -> Vec<Target> {
        let mut targets: Vec<Target> = self.entries.values().cloned().collect();
        targets.sort_by_key(|t| t.logical_id);
        targets
    }

    /// Strong lookup by any external id (primary or alias)
    pub fn find_by_external_id(&self, external_id: &str) -> Option<LogicalId> {
        self.by_external_id.get(external_id).copied()
    }

    /// Lookup of the visible entry owning a process key
    pub fn find_by_process_key(&self, process_key: &str) -> Option<LogicalId> {
        self.by_process_key.get(process_key).copied()
    }

    /// First entry of the given kind
    pub fn find_by_kind(&self, kind: TargetKind) -> Option<LogicalId> {
        self.entries
            .values()
            .filter(|t| t.kind == kind)
            .map(|t| t.logical_id)
            .min()
    }

    /// Insert a new entry and index it
    pub(crate) fn insert(
        &mut self,
        kind: TargetKind,
        display_name: String,
        process_key: Option<String>,
        external_id: Option<String>,
        live_handle: Option<LiveHandle>,
        now: Instant,
    ) -> LogicalId {
        self.next_id += 1;
        let id = LogicalId(self.next_id);

        let target = Target {
            logical_id: id,
            display_name,
            kind,
            process_key,
            external_id,
            live_handle,
            aliases: Vec::new(),
            last_seen: now,
            assigned_channel: None,
        };
        self.index(&target);
        self.entries.insert(id, target);

        debug!(%id, ?kind, "Target added to directory");
        id
    }

    /// Re-create an entry under a known logical id (snapshot restore).
    ///
    /// The entry starts offline. Returns false if the id is taken.
    pub(crate) fn insert_with_id(
        &mut self,
        id: LogicalId,
        kind: TargetKind,
        display_name: String,
        process_key: Option<String>,
        external_id: Option<String>,
        now: Instant,
    ) -> bool {
        let key_taken = process_key
            .as_deref()
            .is_some_and(|k| self.by_process_key.contains_key(k));
        if self.entries.contains_key(&id) || key_taken {
            return false;
        }
        self.next_id = self.next_id.max(id.0);

        let target = Target {
            logical_id: id,
            display_name,
            kind,
            process_key,
            external_id,
            live_handle: None,
            aliases: Vec::new(),
            last_seen: now,
            assigned_channel: None,
        };
        self.index(&target);
        self.entries.insert(id, target);
        true
    }

    /// Add a pseudo-target.
    ///
    /// Focused-app and unmapped pseudo-targets are singletons: asking again
    /// returns the existing entry. A manual target claiming a process key that
    /// is already visible takes that entry over instead of duplicating it.
    pub fn add_special(
        &mut self,
        kind: TargetKind,
        display_name: impl Into<String>,
        process_key: Option<String>,
        now: Instant,
    ) -> LogicalId {
        debug_assert!(kind.is_special(), "add_special called with {:?}", kind);

        match kind {
            TargetKind::SpecialFocusedApp | TargetKind::SpecialUnmapped => {
                if let Some(existing) = self.find_by_kind(kind) {
                    return existing;
                }
            }
            _ => {
                if let Some(existing) = process_key.as_deref().and_then(|k| self.find_by_process_key(k)) {
                    if let Some(target) = self.entries.get_mut(&existing) {
                        target.kind = TargetKind::SpecialManual;
                        target.display_name = display_name.into();
                    }
                    return existing;
                }
            }
        }

        self.insert(kind, display_name.into(), process_key, None, None, now)
    }

    /// Remove an entry and drop it from all indexes
    pub(crate) fn remove(&mut self, id: LogicalId) -> Option<Target> {
        let target = self.entries.remove(&id)?;
        self.unindex(&target);
        debug!(%id, name = %target.display_name, "Target removed from directory");
        Some(target)
    }

    /// Re-point an entry at a new live item group, keeping its logical id.
    ///
    /// Display names of manual targets are user-given and left alone.
    pub(crate) fn rebind(
        &mut self,
        id: LogicalId,
        primary_external_id: &str,
        primary_handle: LiveHandle,
        display_name: &str,
        process_key: Option<&str>,
        aliases: Vec<(String, LiveHandle)>,
        now: Instant,
    ) {
        let Some(mut target) = self.entries.remove(&id) else {
            return;
        };
        self.unindex(&target);

        target.external_id = Some(primary_external_id.to_string());
        target.live_handle = Some(primary_handle);
        target.aliases = aliases;
        target.last_seen = now;
        if target.kind != TargetKind::SpecialManual {
            target.display_name = display_name.to_string();
        }
        if target.process_key.is_none() {
            if let Some(key) = process_key.filter(|k| !self.by_process_key.contains_key(*k)) {
                target.process_key = Some(key.to_string());
            }
        }

        self.index(&target);
        self.entries.insert(id, target);
    }

    /// Mark an entry offline: the primary handle is dropped, stale aliases are forgotten.
    ///
    /// Returns true if the entry was online before.
    pub(crate) fn mark_offline(&mut self, id: LogicalId) -> bool {
        let Some(mut target) = self.entries.remove(&id) else {
            return false;
        };
        self.unindex(&target);
        let was_online = target.live_handle.take().is_some();
        target.aliases.clear();
        self.index(&target);
        self.entries.insert(id, target);
        was_online
    }

    /// A handle failed during actuation: drop just that handle.
    ///
    /// A failed alias is removed from the alias list, a failed primary handle
    /// takes the whole entry offline.
    pub fn mark_handle_failed(&mut self, id: LogicalId, handle: LiveHandle) {
        let primary_failed = match self.entries.get_mut(&id) {
            Some(target) if target.live_handle == Some(handle) => true,
            Some(target) => {
                if let Some(pos) = target.aliases.iter().position(|(_, h)| *h == handle) {
                    let (external_id, _) = target.aliases.remove(pos);
                    self.by_external_id.remove(&external_id);
                }
                false
            }
            None => false,
        };

        if primary_failed {
            self.mark_offline(id);
            debug!(%id, ?handle, "Target marked offline after actuation failure");
        }
    }

    pub(crate) fn set_assigned_channel(&mut self, id: LogicalId, channel: Option<usize>) -> Option<usize> {
        self.entries
            .get_mut(&id)
            .and_then(|t| std::mem::replace(&mut t.assigned_channel, channel))
    }

    /// Drop every entry
    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.by_external_id.clear();
        self.by_process_key.clear();
    }

    fn index(&mut self, target: &Target) {
        for external_id in target.external_ids() {
            self.by_external_id.insert(external_id.to_string(), target.logical_id);
        }
        if let Some(key) = &target.process_key {
            self.by_process_key.insert(key.clone(), target.logical_id);
        }
    }

    fn unindex(&mut self, target: &Target) {
        for external_id in target.external_ids() {
            if self.by_external_id.get(external_id) == Some(&target.logical_id) {
                self.by_external_id.remove(external_id);
            }
        }
        if let Some(key) = &target.process_key {
            if self.by_process_key.get(key) == Some(&target.logical_id) {
                self.by_process_key.remove(key);
            }
        }
    }
}
