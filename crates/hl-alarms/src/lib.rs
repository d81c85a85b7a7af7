//! Alarm detection, classification and prioritization.
//!
//! Detection predicates are reported as [`Observation`]s by whoever owns the
//! measurement (controllers, the equipment coordinator, the orchestrator).
//! The [`AlarmEngine`] turns the per-cycle observation batch into alarm
//! lifecycle transitions:
//!
//! - raised on a false -> true edge
//! - kept open while the predicate holds
//! - cleared after the predicate has been false for the debounce window
//! - Critical alarms latch and only clear through acknowledgement
//!
//! Severity comes from a table ([`ThresholdTable`]) and emergency actions are
//! declarative ([`EmergencyActions`]), applied by the orchestrator after the
//! normal command merge.

pub mod emergency;
pub mod engine;
pub mod error;
pub mod table;
pub mod types;

pub use emergency::{EmergencyAction, EmergencyActions, ForcedCommand, ForcedSet};
pub use engine::{AckOutcome, AlarmConfig, AlarmEngine, AlarmTransition};
pub use error::{AlarmError, AlarmResult};
pub use table::{Direction, ThresholdRule, ThresholdTable};
pub use types::{
    AlarmCategory, AlarmEvent, AlarmSource, Observation, ObservationBatch, Severity,
    sort_by_priority,
};
