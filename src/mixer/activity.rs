//! Per-channel activity detection driving the select indicators
//!
//! A channel turns active as soon as any of its targets peaks above the
//! threshold, and inactive once it has stayed below it for the quiet period.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::trace;

/// Default peak level above which a channel counts as active
pub const DEFAULT_ACTIVITY_THRESHOLD: f32 = 0.01;

/// Default silence needed before the indicator turns off
pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(500);

/// Activity tracker keyed by channel index
#[derive(Debug)]
pub struct ActivityMonitor {
    threshold: f32,
    quiet_period: Duration,
    /// Last instant each channel was heard above the threshold
    last_heard: HashMap<usize, Instant>,
}

impl ActivityMonitor {
    pub fn new(threshold: f32, quiet_period: Duration) -> Self {
        Self {
            threshold,
            quiet_period,
            last_heard: HashMap::new(),
        }
    }

    pub fn set_bounds(&mut self, threshold: f32, quiet_period: Duration) {
        self.threshold = threshold;
        self.quiet_period = quiet_period;
    }

    /// Feed the loudest peak of a channel's targets; returns whether it is active
    pub fn observe(&mut self, channel: usize, peak: f32, now: Instant) -> bool {
        debug_assert!(peak.is_finite(), "non-finite peak level {}", peak);
        if peak.is_finite() && peak > self.threshold {
            self.last_heard.insert(channel, now);
            trace!(channel, peak, "Channel activity");
            return true;
        }
        self.is_active(channel, now)
    }

    /// Whether a channel was heard within the quiet period
    pub fn is_active(&self, channel: usize, now: Instant) -> bool {
        self.last_heard
            .get(&channel)
            .map(|heard| now.saturating_duration_since(*heard) < self.quiet_period)
            .unwrap_or(false)
    }

    /// Forget a channel (removed or emptied)
    pub fn forget(&mut self, channel: usize) {
        self.last_heard.remove(&channel);
    }
}

impl Default for ActivityMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_ACTIVITY_THRESHOLD, DEFAULT_QUIET_PERIOD)
    }
}
