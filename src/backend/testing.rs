//! Recording capabilities for tests

use super::{AudioBackend, BackendError, IndicatorSink, TransportAction};
use crate::mapping::ControlNumber;
use crate::target::{LiveHandle, LiveTarget, TargetKind};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    Volume(LiveHandle, f32),
    Mute(LiveHandle, bool),
    DefaultDevice(LiveHandle, TargetKind),
    Transport(TransportAction),
}

#[derive(Debug, Default)]
pub struct RecordingBackend {
    pub live: Mutex<Vec<LiveTarget>>,
    pub calls: Mutex<Vec<BackendCall>>,
    pub failing: Mutex<HashSet<LiveHandle>>,
    pub peaks: Mutex<HashMap<LiveHandle, f32>>,
    pub focused: Mutex<Option<String>>,
    /// Number of upcoming default-device switches that fail
    pub failing_switches: Mutex<u32>,
}

impl RecordingBackend {
    pub fn new(live: Vec<LiveTarget>) -> Self {
        Self {
            live: Mutex::new(live),
            ..Self::default()
        }
    }

    pub fn set_live(&self, live: Vec<LiveTarget>) {
        *self.live.lock() = live;
    }

    pub fn take_calls(&self) -> Vec<BackendCall> {
        std::mem::take(&mut *self.calls.lock())
    }

    pub fn fail(&self, handle: LiveHandle) {
        self.failing.lock().insert(handle);
    }

    fn check(&self, handle: LiveHandle) -> Result<(), BackendError> {
        if self.failing.lock().contains(&handle) {
            Err(BackendError::InvalidHandle(handle))
        } else {
            Ok(())
        }
    }
}

impl AudioBackend for RecordingBackend {
    fn name(&self) -> &str {
        "recording"
    }

    fn enumerate(&self) -> Result<Vec<LiveTarget>, BackendError> {
        Ok(self.live.lock().clone())
    }

    fn apply_volume(&self, handle: LiveHandle, volume: f32) -> Result<(), BackendError> {
        self.check(handle)?;
        self.calls.lock().push(BackendCall::Volume(handle, volume));
        Ok(())
    }

    fn apply_mute(&self, handle: LiveHandle, muted: bool) -> Result<(), BackendError> {
        self.check(handle)?;
        self.calls.lock().push(BackendCall::Mute(handle, muted));
        Ok(())
    }

    fn set_default_device(&self, handle: LiveHandle, kind: TargetKind) -> Result<(), BackendError> {
        {
            let mut failing = self.failing_switches.lock();
            if *failing > 0 {
                *failing -= 1;
                return Err(BackendError::Unavailable("switch refused".into()));
            }
        }
        self.check(handle)?;
        self.calls.lock().push(BackendCall::DefaultDevice(handle, kind));
        Ok(())
    }

    fn read_peak_level(&self, handle: LiveHandle) -> Result<f32, BackendError> {
        self.check(handle)?;
        Ok(self.peaks.lock().get(&handle).copied().unwrap_or(0.0))
    }

    fn focused_process(&self) -> Option<String> {
        self.focused.lock().clone()
    }

    fn transport(&self, action: TransportAction) -> Result<(), BackendError> {
        self.calls.lock().push(BackendCall::Transport(action));
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IndicatorCall {
    Indicator(u8, ControlNumber, bool),
    Continuous(u8, ControlNumber, f32),
}

#[derive(Debug, Default)]
pub struct RecordingIndicators {
    pub calls: Mutex<Vec<IndicatorCall>>,
    /// Number of upcoming writes that fail
    pub failing_writes: Mutex<u32>,
}

impl RecordingIndicators {
    pub fn take_calls(&self) -> Vec<IndicatorCall> {
        std::mem::take(&mut *self.calls.lock())
    }

    fn write(&self, call: IndicatorCall) -> Result<(), BackendError> {
        let mut failing = self.failing_writes.lock();
        if *failing > 0 {
            *failing -= 1;
            return Err(BackendError::Write("port busy".into()));
        }
        self.calls.lock().push(call);
        Ok(())
    }
}

impl IndicatorSink for RecordingIndicators {
    fn set_indicator(&self, source: u8, control: ControlNumber, on: bool) -> Result<(), BackendError> {
        self.write(IndicatorCall::Indicator(source, control, on))
    }

    fn send_continuous_feedback(
        &self,
        source: u8,
        control: ControlNumber,
        normalized: f32,
    ) -> Result<(), BackendError> {
        self.write(IndicatorCall::Continuous(source, control, normalized))
    }
}
