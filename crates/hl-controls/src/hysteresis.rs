//! Two-threshold latch.

use serde::{Deserialize, Serialize};

/// Latches on at or above `on_at` and releases at or below `off_at`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HysteresisLatch {
    pub on_at: f64,
    pub off_at: f64,
}

impl HysteresisLatch {
    pub fn new(on_at: f64, off_at: f64) -> Self {
        Self { on_at, off_at }
    }

    pub fn is_valid(&self) -> bool {
        self.on_at.is_finite() && self.off_at.is_finite() && self.off_at < self.on_at
    }

    pub fn next(&self, latched: bool, value: f64) -> bool {
        if latched {
            value > self.off_at
        } else {
            value >= self.on_at
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn holds_between_thresholds() {
        let latch = HysteresisLatch::new(15.0, 5.0);
        assert!(!latch.next(false, 10.0));
        assert!(latch.next(false, 15.0));
        assert!(latch.next(true, 10.0));
        assert!(!latch.next(true, 5.0));
    }

    #[test]
    fn inverted_thresholds_are_invalid() {
        assert!(!HysteresisLatch::new(5.0, 15.0).is_valid());
        assert!(HysteresisLatch::new(15.0, 5.0).is_valid());
    }
}
