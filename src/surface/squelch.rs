//! Pitch bend squelch
//!
//! Motor faders echo the positions we send them back as pitch bend. After a
//! position is written to a source channel, incoming pitch bend on that
//! channel that lands on the written position is dropped for a short window.
//! Anything else is a user move and passes through, so a touch right after
//! feedback is never lost.

use crate::mapping::MAX_SOURCE_CHANNEL;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

const CHANNELS: usize = MAX_SOURCE_CHANNEL as usize + 1;

/// How far (in 14-bit steps) an echo may sit from the written position
pub const ECHO_TOLERANCE: u16 = 16;

/// Per source channel echo windows; clones share the windows
#[derive(Clone)]
pub struct PitchBendSquelch {
    /// Monotonic origin for the millisecond timestamps
    start_instant: Instant,
    /// Window end (ms since start_instant), per source channel
    suppress_until_ms: Arc<[AtomicU64; CHANNELS]>,
    /// Last position written, per source channel
    written: Arc<[AtomicU32; CHANNELS]>,
}

impl PitchBendSquelch {
    pub fn new() -> Self {
        Self {
            start_instant: Instant::now(),
            suppress_until_ms: Arc::new(std::array::from_fn(|_| AtomicU64::new(0))),
            written: Arc::new(std::array::from_fn(|_| AtomicU32::new(0))),
        }
    }

    fn current_time_ms(&self) -> u64 {
        self.start_instant.elapsed().as_millis() as u64
    }

    /// Record a position written to a channel and extend its window to at
    /// least `duration_ms` from now (never shortens it)
    pub fn arm(&self, source: u8, value: u16, duration_ms: u64) {
        let index = source as usize;
        let (Some(written), Some(until)) = (self.written.get(index), self.suppress_until_ms.get(index))
        else {
            return;
        };
        written.store(u32::from(value), Ordering::Relaxed);
        until.fetch_max(self.current_time_ms() + duration_ms, Ordering::Relaxed);
    }

    /// Whether incoming pitch bend is the fader echoing the last written position
    pub fn is_echo(&self, source: u8, value: u16) -> bool {
        let index = source as usize;
        let (Some(written), Some(until)) = (self.written.get(index), self.suppress_until_ms.get(index))
        else {
            return false;
        };
        if self.current_time_ms() >= until.load(Ordering::Relaxed) {
            return false;
        }
        let expected = written.load(Ordering::Relaxed);
        u32::from(value).abs_diff(expected) <= u32::from(ECHO_TOLERANCE)
    }
}

impl Default for PitchBendSquelch {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_echo_is_per_channel_and_expires() {
        let squelch = PitchBendSquelch::new();
        assert!(!squelch.is_echo(0, 0));

        squelch.arm(0, 8000, 100);
        assert!(squelch.is_echo(0, 8000));
        assert!(squelch.is_echo(0, 8000 - ECHO_TOLERANCE));
        assert!(!squelch.is_echo(1, 8000));

        thread::sleep(Duration::from_millis(150));
        assert!(!squelch.is_echo(0, 8000));
    }

    #[test]
    fn test_user_move_inside_window_passes() {
        let squelch = PitchBendSquelch::new();
        squelch.arm(4, 12_000, 10_000);

        assert!(!squelch.is_echo(4, 3000));
        assert!(!squelch.is_echo(4, 12_000 + ECHO_TOLERANCE + 1));
        assert!(squelch.is_echo(4, 12_000));
    }

    #[test]
    fn test_rearm_tracks_latest_position() {
        let squelch = PitchBendSquelch::new();
        squelch.arm(3, 1000, 50);

        thread::sleep(Duration::from_millis(30));
        squelch.arm(3, 5000, 100);
        thread::sleep(Duration::from_millis(50));
        assert!(squelch.is_echo(3, 5000));
        assert!(!squelch.is_echo(3, 1000));

        thread::sleep(Duration::from_millis(80));
        assert!(!squelch.is_echo(3, 5000));
    }

    #[test]
    fn test_clones_share_windows() {
        let squelch = PitchBendSquelch::new();
        let input_side = squelch.clone();

        squelch.arm(2, 700, 200);
        assert!(input_side.is_echo(2, 700));
        squelch.arm(0, 700, 0);
        assert!(!input_side.is_echo(0, 700));
        assert!(!input_side.is_echo(40, 700));
    }
}
