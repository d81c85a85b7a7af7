//! Fixed-period cycle scheduling.
//!
//! A cycle that overruns its slot never overlaps the next one: the slots it
//! ran into are skipped and counted.

use serde::{Deserialize, Serialize};

/// Tracks when the next control cycle may start, in seconds since start-up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleClock {
    /// Cycle period in seconds.
    pub period_s: f64,
    /// Start time of the next scheduled cycle.
    pub next_start: f64,
    /// Slots skipped because a cycle overran.
    pub skipped: u64,
}

impl CycleClock {
    /// Create a clock whose first cycle starts at `initial_time`.
    pub fn new(period_s: f64, initial_time: f64) -> Self {
        Self {
            period_s,
            next_start: initial_time,
            skipped: 0,
        }
    }

    /// Check if a cycle may start at the given time.
    pub fn is_due(&self, now: f64) -> bool {
        now >= self.next_start
    }

    /// Book the cycle that started at `started_at` and finished at
    /// `finished_at`. Returns how many slots were skipped.
    pub fn complete(&mut self, started_at: f64, finished_at: f64) -> u64 {
        let mut next = started_at.max(self.next_start) + self.period_s;
        let mut skipped = 0;
        while next < finished_at {
            next += self.period_s;
            skipped += 1;
        }
        self.next_start = next;
        self.skipped += skipped;
        skipped
    }

    /// Get the time until the next cycle.
    pub fn time_until_due(&self, now: f64) -> f64 {
        (self.next_start - now).max(0.0)
    }

    /// Restart the schedule from `now`.
    pub fn reset(&mut self, now: f64) {
        self.next_start = now;
        self.skipped = 0;
    }
}
