//! Operator emergency stop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::warn;

/// Cloneable handle to the plant-wide emergency stop.
///
/// Triggering takes effect before the next command dispatch, including the
/// dispatch of a cycle already in progress. The stop holds until released.
#[derive(Debug, Clone, Default)]
pub struct EmergencyStop {
    flag: Arc<AtomicBool>,
}

impl EmergencyStop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        if !self.flag.swap(true, Ordering::SeqCst) {
            warn!("emergency stop triggered");
        }
    }

    pub fn release(&self) {
        if self.flag.swap(false, Ordering::SeqCst) {
            warn!("emergency stop released");
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
