//! Target assignment, pseudo-target resolution and per-handle actuation

use super::Rejection;
use crate::backend::{AudioBackend, BackendError};
use crate::target::{normalize_process_key, LiveHandle, LogicalId, Target, TargetKind};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

impl super::Router {
    /// Assign a target to a channel, removing it from any other channel.
    ///
    /// Returns the channel it was taken from, if any.
    pub fn assign_target(&mut self, id: LogicalId, index: usize) -> Result<Option<usize>, Rejection> {
        self.check_channel(index)?;
        let kind = match self.directory.get(id) {
            Some(target) => target.kind,
            None => return Err(Rejection::UnknownTarget(id)),
        };
        if kind == TargetKind::SystemOutput && self.channels.get(index).is_some_and(|c| c.is_soloed) {
            return Err(Rejection::MasterOnSoloedChannel(index));
        }

        let previous = self.directory.set_assigned_channel(id, Some(index));
        if let Some(prev) = previous.filter(|p| *p != index) {
            if let Some(channel) = self.channels.get_mut(prev) {
                channel.assigned_targets.remove(&id);
            }
        }
        if let Some(channel) = self.channels.get_mut(index) {
            channel.assigned_targets.insert(id);
        }

        info!(%id, channel = index, from = ?previous, "Target assigned");
        self.prune_default_holders();
        self.apply_channel_state(index);
        self.mark_dirty();
        Ok(previous)
    }

    /// Remove a target from its channel; returns the channel it left
    pub fn unassign_target(&mut self, id: LogicalId) -> Result<Option<usize>, Rejection> {
        if !self.directory.contains(id) {
            return Err(Rejection::UnknownTarget(id));
        }
        self.directory.set_assigned_channel(id, None);
        let previous = self.channels.unassign(id);
        if previous.is_some() {
            info!(%id, channel = ?previous, "Target unassigned");
            self.prune_default_holders();
            self.mark_dirty();
        }
        Ok(previous)
    }

    /// Add an application target by process name, present or not
    pub fn add_manual_target(
        &mut self,
        process: &str,
        display_name: Option<String>,
        now: Instant,
    ) -> Result<LogicalId, Rejection> {
        let key = normalize_process_key(process)
            .ok_or_else(|| Rejection::InvalidProcessName(process.to_string()))?;
        let name = display_name.unwrap_or_else(|| process.trim().to_string());

        let id = self
            .directory
            .add_special(TargetKind::SpecialManual, name, Some(key), now);
        info!(%id, process, "Manual target added");
        self.mark_dirty();
        Ok(id)
    }

    /// Add the focused-app or unmapped pseudo-target (singletons)
    pub fn add_special_target(&mut self, kind: TargetKind, now: Instant) -> Result<LogicalId, Rejection> {
        let name = match kind {
            TargetKind::SpecialFocusedApp => "Focused application",
            TargetKind::SpecialUnmapped => "Unmapped applications",
            other => return Err(Rejection::NotSpecial(other)),
        };
        let id = self.directory.add_special(kind, name, None, now);
        debug!(%id, %kind, "Special target added");
        self.mark_dirty();
        Ok(id)
    }

    /// Remove a target from the directory and from its channel
    pub fn remove_target(&mut self, id: LogicalId) -> Result<Target, Rejection> {
        let target = self.directory.remove(id).ok_or(Rejection::UnknownTarget(id))?;
        self.channels.unassign(id);
        self.prune_default_holders();
        info!(%id, name = %target.display_name, "Target removed");
        self.mark_dirty();
        Ok(target)
    }

    /// Live handles a channel's actuation reaches.
    ///
    /// Pseudo-targets are resolved here: the focused-app target to the entry
    /// owning the focused process, the unmapped target to every unassigned
    /// application. Each handle appears once.
    pub(crate) fn resolve_handles(&self, index: usize) -> Vec<(LogicalId, LiveHandle)> {
        let Some(channel) = self.channels.get(index) else {
            return Vec::new();
        };

        let mut seen = HashSet::new();
        let mut handles = Vec::new();
        let mut push = |target: &Target| {
            for handle in target.handles() {
                if seen.insert(handle) {
                    handles.push((target.logical_id, handle));
                }
            }
        };

        for id in &channel.assigned_targets {
            let Some(target) = self.directory.get(*id) else {
                continue;
            };
            match target.kind {
                TargetKind::SpecialFocusedApp => {
                    let focused = self
                        .backend
                        .focused_process()
                        .and_then(|key| self.directory.find_by_process_key(&key))
                        .and_then(|id| self.directory.get(id));
                    if let Some(focused) = focused {
                        push(focused);
                    }
                }
                TargetKind::SpecialUnmapped => {
                    self.directory
                        .iter()
                        .filter(|t| t.kind == TargetKind::Application && t.assigned_channel.is_none())
                        .for_each(&mut push);
                }
                _ => push(target),
            }
        }
        handles
    }

    /// Run an operation on every handle of a channel.
    ///
    /// A handle that turned invalid is dropped from its target and the
    /// batch continues. Returns how many handles succeeded.
    pub(crate) fn actuate(
        &mut self,
        index: usize,
        what: &str,
        op: impl Fn(&dyn AudioBackend, LiveHandle) -> Result<(), BackendError>,
    ) -> usize {
        let backend = Arc::clone(&self.backend);
        let mut applied = 0;
        for (id, handle) in self.resolve_handles(index) {
            match op(backend.as_ref(), handle) {
                Ok(()) => applied += 1,
                Err(e) if e.is_invalid_handle() => {
                    debug!(%id, ?handle, what, "Handle invalid during actuation");
                    self.directory.mark_handle_failed(id, handle);
                }
                Err(e) => warn!(%id, what, error = %e, "Actuation failed"),
            }
        }
        applied
    }

    /// Push a channel's volume and mute to all its handles
    pub(crate) fn apply_channel_state(&mut self, index: usize) {
        let Some(channel) = self.channels.get(index) else {
            return;
        };
        let (volume, muted) = (channel.volume, channel.is_muted);
        self.actuate(index, "volume", |b, h| b.apply_volume(h, volume));
        self.actuate(index, "mute", |b, h| b.apply_mute(h, muted));
    }

    /// Whether a channel holds a master output (any system output device)
    pub(crate) fn channel_has_master(&self, index: usize) -> bool {
        self.channels.get(index).is_some_and(|channel| {
            channel
                .assigned_targets
                .iter()
                .filter_map(|id| self.directory.get(*id))
                .any(|t| t.kind == TargetKind::SystemOutput)
        })
    }

    /// First device assigned to a channel
    pub(crate) fn channel_device(&self, index: usize) -> Option<&Target> {
        self.channels.get(index).and_then(|channel| {
            channel
                .assigned_targets
                .iter()
                .filter_map(|id| self.directory.get(*id))
                .find(|t| t.kind.is_device())
        })
    }

    /// Record that a channel now holds the default device of a kind
    pub(crate) fn set_default_holder(&mut self, kind: TargetKind, index: usize) {
        let previous = self.default_holders.insert(kind, index);
        if let Some(prev) = previous.filter(|p| *p != index) {
            self.refresh_recording_flag(prev);
        }
        self.refresh_recording_flag(index);
    }

    /// Drop default-holder claims whose channel no longer holds a device of that kind
    pub(crate) fn prune_default_holders(&mut self) {
        let stale: Vec<(TargetKind, usize)> = self
            .default_holders
            .iter()
            .filter(|(kind, index)| {
                !self.channels.get(**index).is_some_and(|channel| {
                    channel
                        .assigned_targets
                        .iter()
                        .filter_map(|id| self.directory.get(*id))
                        .any(|t| t.kind == **kind)
                })
            })
            .map(|(kind, index)| (*kind, *index))
            .collect();

        for (kind, index) in stale {
            self.default_holders.remove(&kind);
            self.refresh_recording_flag(index);
        }
    }

    fn refresh_recording_flag(&mut self, index: usize) {
        let holds = self.default_holders.values().any(|c| *c == index);
        let changed = match self.channels.get_mut(index) {
            Some(channel) if channel.is_recording != holds => {
                channel.is_recording = holds;
                true
            }
            _ => false,
        };
        if changed {
            self.sync_channel_indicators(index);
        }
    }
}
