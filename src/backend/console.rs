//! Console backend - a simulated audio layer that logs every actuation
//!
//! Enumerates the `simulated_targets` list from the config. Useful for
//! trying mappings and learn mode without the platform audio layer.

use super::{AudioBackend, BackendError, TransportAction};
use crate::target::{LiveHandle, LiveTarget, TargetKind};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

/// A simulated session or device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedTarget {
    /// Display name
    pub name: String,
    #[serde(default = "default_kind")]
    pub kind: TargetKind,
    /// Process name for application sessions (e.g. "spotify.exe")
    #[serde(default)]
    pub process: Option<String>,
    /// Constant peak level reported for metering
    #[serde(default)]
    pub level: f32,
    /// Reported as the focused application
    #[serde(default)]
    pub focused: bool,
}

fn default_kind() -> TargetKind {
    TargetKind::Application
}

#[derive(Debug)]
struct SimSession {
    target: SimulatedTarget,
    external_id: String,
    handle: LiveHandle,
}

#[derive(Debug, Default)]
struct ConsoleState {
    sessions: Vec<SimSession>,
    next_handle: u64,
    /// Bumped on every session restart so external ids change
    generation: u64,
    volumes: HashMap<LiveHandle, f32>,
    mutes: HashMap<LiveHandle, bool>,
    defaults: HashMap<TargetKind, LiveHandle>,
    action_count: u64,
}

impl ConsoleState {
    fn spawn_session(&mut self, target: SimulatedTarget) {
        self.next_handle += 1;
        let external_id = format!("sim-{}-{}", self.generation, self.next_handle);
        self.sessions.push(SimSession {
            target,
            external_id,
            handle: LiveHandle(self.next_handle),
        });
    }

    fn session(&self, handle: LiveHandle) -> Result<&SimSession, BackendError> {
        self.sessions
            .iter()
            .find(|s| s.handle == handle)
            .ok_or(BackendError::InvalidHandle(handle))
    }
}

/// ConsoleBackend logs actuation and serves simulated targets
#[derive(Debug, Default)]
pub struct ConsoleBackend {
    state: Mutex<ConsoleState>,
}

impl ConsoleBackend {
    pub fn new(targets: Vec<SimulatedTarget>) -> Self {
        let backend = Self::default();
        backend.set_targets(targets);
        backend
    }

    /// Replace the simulated set; targets whose name survives keep their session
    pub fn set_targets(&self, targets: Vec<SimulatedTarget>) {
        let mut state = self.state.lock();
        let mut previous: Vec<SimSession> = std::mem::take(&mut state.sessions);

        for target in targets {
            match previous.iter().position(|s| s.target.name == target.name) {
                Some(pos) => {
                    let mut session = previous.remove(pos);
                    session.target = target;
                    state.sessions.push(session);
                }
                None => state.spawn_session(target),
            }
        }
        info!("🔌 ConsoleBackend serving {} simulated targets", state.sessions.len());
    }

    /// Recreate a session under a new external id, as audio layers do on stream restarts
    pub fn restart_session(&self, name: &str) -> bool {
        let mut state = self.state.lock();
        let Some(pos) = state.sessions.iter().position(|s| s.target.name == name) else {
            return false;
        };
        let session = state.sessions.remove(pos);
        state.generation += 1;
        state.spawn_session(session.target);
        debug!(name, "Simulated session restarted");
        true
    }

    /// Last volume applied to a handle
    pub fn volume_of(&self, handle: LiveHandle) -> Option<f32> {
        self.state.lock().volumes.get(&handle).copied()
    }

    pub fn default_device(&self, kind: TargetKind) -> Option<LiveHandle> {
        self.state.lock().defaults.get(&kind).copied()
    }

    fn log_action(&self, action: &str, detail: String) {
        let count = {
            let mut state = self.state.lock();
            state.action_count += 1;
            state.action_count
        };
        info!(
            "🎚️ [{}] {} → {} [#{}]",
            chrono::Local::now().format("%H:%M:%S%.3f"),
            action,
            detail,
            count
        );
    }
}

impl AudioBackend for ConsoleBackend {
    fn name(&self) -> &str {
        "console"
    }

    fn enumerate(&self) -> Result<Vec<LiveTarget>, BackendError> {
        let state = self.state.lock();
        Ok(state
            .sessions
            .iter()
            .map(|s| {
                LiveTarget::new(
                    s.external_id.clone(),
                    s.target.process.as_deref(),
                    s.target.name.clone(),
                    s.target.kind,
                    s.handle,
                )
            })
            .collect())
    }

    fn apply_volume(&self, handle: LiveHandle, volume: f32) -> Result<(), BackendError> {
        let name = {
            let mut state = self.state.lock();
            let name = state.session(handle)?.target.name.clone();
            state.volumes.insert(handle, volume);
            name
        };
        self.log_action("volume", format!("{} = {:.3}", name, volume));
        Ok(())
    }

    fn apply_mute(&self, handle: LiveHandle, muted: bool) -> Result<(), BackendError> {
        let name = {
            let mut state = self.state.lock();
            let name = state.session(handle)?.target.name.clone();
            state.mutes.insert(handle, muted);
            name
        };
        self.log_action("mute", format!("{} = {}", name, muted));
        Ok(())
    }

    fn set_default_device(&self, handle: LiveHandle, kind: TargetKind) -> Result<(), BackendError> {
        if !kind.is_device() {
            return Err(BackendError::NotADevice(kind));
        }
        let name = {
            let mut state = self.state.lock();
            let name = state.session(handle)?.target.name.clone();
            state.defaults.insert(kind, handle);
            name
        };
        self.log_action("default-device", format!("{} ({})", name, kind));
        Ok(())
    }

    fn read_peak_level(&self, handle: LiveHandle) -> Result<f32, BackendError> {
        let state = self.state.lock();
        let session = state.session(handle)?;
        let muted = state.mutes.get(&handle).copied().unwrap_or(false);
        let volume = state.volumes.get(&handle).copied().unwrap_or(1.0);
        Ok(if muted { 0.0 } else { session.target.level * volume })
    }

    fn focused_process(&self) -> Option<String> {
        let state = self.state.lock();
        state
            .sessions
            .iter()
            .find(|s| s.target.focused)
            .and_then(|s| s.target.process.as_deref())
            .and_then(crate::target::normalize_process_key)
    }

    fn transport(&self, action: TransportAction) -> Result<(), BackendError> {
        self.log_action("transport", format!("{:?}", action));
        Ok(())
    }
}
