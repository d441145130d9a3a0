//! MappingTable - ordered bindings keyed by (source channel, control, shape)
//!
//! Lookup by event runs for every incoming control event; the table is a
//! `BTreeMap` so lookups are O(log n) and listings come out in key order.

use super::{Action, ChannelTarget, ControlEvent, MappingEntry, MappingKey};
use std::collections::BTreeMap;
use tracing::debug;

/// Collection of mapping entries, at most one per key
#[derive(Debug, Clone, Default)]
pub struct MappingTable {
    entries: BTreeMap<MappingKey, MappingEntry>,
}

impl MappingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from a list, later entries replacing earlier ones with the same key
    pub fn from_entries(entries: impl IntoIterator<Item = MappingEntry>) -> Self {
        let mut table = Self::new();
        table.replace_all(entries);
        table
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert an entry, replacing and returning any entry with the same key
    pub fn upsert(&mut self, entry: MappingEntry) -> Option<MappingEntry> {
        let key = entry.key();
        debug_assert!(key.is_valid(), "mapping key out of range: {}", key);
        if !key.is_valid() {
            return None;
        }

        let previous = self.entries.insert(key, entry);
        debug!(%key, action = %entry.action, target = %entry.target, replaced = previous.is_some(), "Mapping upserted");
        previous
    }

    /// Exact lookup by key
    pub fn lookup(&self, key: &MappingKey) -> Option<&MappingEntry> {
        debug_assert!(key.is_valid(), "mapping key out of range: {}", key);
        self.entries.get(key)
    }

    /// Lookup of the entry an incoming event resolves to
    pub fn lookup_by_event(&self, event: &ControlEvent) -> Option<&MappingEntry> {
        self.lookup(&event.key())
    }

    /// Entries bound to an action on a channel target
    pub fn lookup_by_action(
        &self,
        action: Action,
        target: ChannelTarget,
    ) -> impl Iterator<Item = &MappingEntry> + '_ {
        self.entries
            .values()
            .filter(move |e| e.action == action && e.target == target)
    }

    /// Entries of an action regardless of destination
    pub fn entries_for_action(&self, action: Action) -> impl Iterator<Item = &MappingEntry> + '_ {
        self.entries.values().filter(move |e| e.action == action)
    }

    pub fn remove_by_key(&mut self, key: &MappingKey) -> Option<MappingEntry> {
        let removed = self.entries.remove(key);
        if removed.is_some() {
            debug!(%key, "Mapping removed");
        }
        removed
    }

    /// Remove every entry, returning how many were dropped
    pub fn remove_all(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        debug!(count, "All mappings removed");
        count
    }

    /// Remove the entries bound to one channel
    pub fn remove_for_channel(&mut self, index: usize) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, e| e.target != ChannelTarget::Channel(index));
        before - self.entries.len()
    }

    /// All entries in key order
    pub fn list_all(&self) -> Vec<MappingEntry> {
        self.entries.values().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MappingEntry> + '_ {
        self.entries.values()
    }

    /// Replace the whole table
    pub fn replace_all(&mut self, entries: impl IntoIterator<Item = MappingEntry>) {
        self.entries.clear();
        for entry in entries {
            self.upsert(entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{ControlNumber, Edge, EventShape, ValueRange};

    fn volume_entry(source: u8, control: u8, channel: usize) -> MappingEntry {
        MappingEntry {
            source_channel: source,
            control: ControlNumber::Number(control),
            shape: EventShape::Continuous,
            action: Action::Volume,
            target: ChannelTarget::Channel(channel),
            value_range: ValueRange::default(),
            inverted: false,
        }
    }

    #[test]
    fn test_upsert_replaces_same_key() {
        let mut table = MappingTable::new();
        assert!(table.upsert(volume_entry(0, 16, 1)).is_none());

        let previous = table.upsert(volume_entry(0, 16, 4)).unwrap();
        assert_eq!(previous.target, ChannelTarget::Channel(1));
        assert_eq!(table.len(), 1);

        let event = ControlEvent::continuous(0, ControlNumber::Number(16), 10);
        assert_eq!(table.lookup_by_event(&event).unwrap().target, ChannelTarget::Channel(4));
    }

    #[test]
    fn test_shape_is_part_of_key() {
        let mut table = MappingTable::new();
        table.upsert(volume_entry(0, 16, 1));

        let mut mute = volume_entry(0, 16, 1);
        mute.shape = EventShape::Discrete;
        mute.action = Action::Mute;
        table.upsert(mute);
        assert_eq!(table.len(), 2);

        let press = ControlEvent::discrete(0, ControlNumber::Number(16), Edge::On);
        assert_eq!(table.lookup_by_event(&press).unwrap().action, Action::Mute);

        let other_source = ControlEvent::discrete(1, ControlNumber::Number(16), Edge::On);
        assert!(table.lookup_by_event(&other_source).is_none());
    }

    #[test]
    fn test_lookup_by_action() {
        let mut table = MappingTable::new();
        table.upsert(volume_entry(0, 16, 1));
        table.upsert(volume_entry(0, 17, 1));
        table.upsert(volume_entry(0, 18, 2));

        assert_eq!(table.lookup_by_action(Action::Volume, ChannelTarget::Channel(1)).count(), 2);
        assert_eq!(table.lookup_by_action(Action::Mute, ChannelTarget::Channel(1)).count(), 0);
        assert_eq!(table.entries_for_action(Action::Volume).count(), 3);
    }

    #[test]
    fn test_remove_and_list_order() {
        let mut table = MappingTable::from_entries([
            volume_entry(3, 1, 0),
            volume_entry(0, 9, 1),
            volume_entry(0, 2, 2),
        ]);

        let listed: Vec<_> = table.list_all().iter().map(|e| (e.source_channel, e.control)).collect();
        assert_eq!(
            listed,
            vec![
                (0, ControlNumber::Number(2)),
                (0, ControlNumber::Number(9)),
                (3, ControlNumber::Number(1)),
            ]
        );

        let key = MappingKey::new(0, ControlNumber::Number(9), EventShape::Continuous);
        assert!(table.remove_by_key(&key).is_some());
        assert!(table.remove_by_key(&key).is_none());
        assert_eq!(table.remove_for_channel(2), 1);
        assert_eq!(table.remove_all(), 1);
        assert!(table.is_empty());
    }
}
