//! Time adapter.
//!
//! Monotonic uptime for event stamps, and wall-clock formatting for the
//! history files.  The panel has no time synchronisation; the wall clock is
//! whatever the board's RTC says.

use std::time::Instant;

/// Monotonic clock anchored at construction.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    start: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Milliseconds since the clock was created.
    pub fn uptime_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    /// Seconds since the clock was created.
    pub fn uptime_secs(&self) -> u64 {
        self.start.elapsed().as_secs()
    }
}

/// Local wall-clock time in the history file format, `YYYY-MM-DD HH:MM:SS`.
pub fn wall_clock_stamp() -> String {
    chrono::Local::now().format(crate::history::TIMESTAMP_FORMAT).to_string()
}
