//! Alarm value types.

use core::fmt;
use std::cmp::Reverse;
use std::collections::BTreeSet;

use hl_core::ControllerId;
use serde::{Deserialize, Serialize};

use crate::error::AlarmError;

/// Alarm severity. Ordering is priority: `Critical` is greatest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        [Self::Info, Self::Warning, Self::High, Self::Critical]
            .into_iter()
            .find(|sev| sev.as_str() == s)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an alarm is about. Emergency actions are keyed on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmCategory {
    HighLevel,
    LowLevel,
    LowDissolvedOxygen,
    HighDissolvedOxygen,
    HighTurbidity,
    HighPressure,
    ProcessDeviation,
    ScreenCleaning,
    OverflowRate,
    DoseOutOfRange,
    ChemicalTankLow,
    EquipmentFailure,
    CapacityExceeded,
    SensorStale,
    SensorLoss,
    ActuatorRejected,
    CommandConflict,
    OverrideRejected,
    ControllerFault,
    EmergencyStop,
}

impl AlarmCategory {
    pub const ALL: [AlarmCategory; 20] = [
        Self::HighLevel,
        Self::LowLevel,
        Self::LowDissolvedOxygen,
        Self::HighDissolvedOxygen,
        Self::HighTurbidity,
        Self::HighPressure,
        Self::ProcessDeviation,
        Self::ScreenCleaning,
        Self::OverflowRate,
        Self::DoseOutOfRange,
        Self::ChemicalTankLow,
        Self::EquipmentFailure,
        Self::CapacityExceeded,
        Self::SensorStale,
        Self::SensorLoss,
        Self::ActuatorRejected,
        Self::CommandConflict,
        Self::OverrideRejected,
        Self::ControllerFault,
        Self::EmergencyStop,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::HighLevel => "high_level",
            Self::LowLevel => "low_level",
            Self::LowDissolvedOxygen => "low_dissolved_oxygen",
            Self::HighDissolvedOxygen => "high_dissolved_oxygen",
            Self::HighTurbidity => "high_turbidity",
            Self::HighPressure => "high_pressure",
            Self::ProcessDeviation => "process_deviation",
            Self::ScreenCleaning => "screen_cleaning",
            Self::OverflowRate => "overflow_rate",
            Self::DoseOutOfRange => "dose_out_of_range",
            Self::ChemicalTankLow => "chemical_tank_low",
            Self::EquipmentFailure => "equipment_failure",
            Self::CapacityExceeded => "capacity_exceeded",
            Self::SensorStale => "sensor_stale",
            Self::SensorLoss => "sensor_loss",
            Self::ActuatorRejected => "actuator_rejected",
            Self::CommandConflict => "command_conflict",
            Self::OverrideRejected => "override_rejected",
            Self::ControllerFault => "controller_fault",
            Self::EmergencyStop => "emergency_stop",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == s)
    }
}

impl fmt::Display for AlarmCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who reported the predicate behind an alarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmSource {
    Controller(ControllerId),
    Equipment,
    Orchestrator,
}

impl AlarmSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Controller(id) => id.as_str(),
            Self::Equipment => "equipment",
            Self::Orchestrator => "orchestrator",
        }
    }

    pub fn parse(s: &str) -> Result<Self, AlarmError> {
        match s {
            "equipment" => Ok(Self::Equipment),
            "orchestrator" => Ok(Self::Orchestrator),
            other => ControllerId::parse(other)
                .map(Self::Controller)
                .ok_or_else(|| AlarmError::Unrecognised {
                    field: "source",
                    value: other.to_string(),
                }),
        }
    }
}

impl fmt::Display for AlarmSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One evaluation of a detection predicate in one cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub source: AlarmSource,
    pub category: AlarmCategory,
    /// What the predicate is about: a sensor, unit, group, chemical or section.
    pub subject: String,
    pub severity: Severity,
    pub message: String,
    pub active: bool,
}

impl Observation {
    pub fn active(
        source: AlarmSource,
        category: AlarmCategory,
        subject: impl Into<String>,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            category,
            subject: subject.into(),
            severity,
            message: message.into(),
            active: true,
        }
    }

    /// The predicate was evaluated and is false.
    pub fn inactive(source: AlarmSource, category: AlarmCategory, subject: impl Into<String>) -> Self {
        Self {
            source,
            category,
            subject: subject.into(),
            severity: Severity::Info,
            message: String::new(),
            active: false,
        }
    }

    /// Identity of the predicate across cycles.
    pub fn key(&self) -> String {
        predicate_key(self.source, self.category, &self.subject)
    }
}

pub(crate) fn predicate_key(source: AlarmSource, category: AlarmCategory, subject: &str) -> String {
    format!("{source}/{category}/{subject}")
}

/// Everything reported in one cycle, plus which sources reported at all.
///
/// Open alarms whose source did not report keep their state: a faulted
/// controller tells us nothing about its predicates.
#[derive(Debug, Clone, Default)]
pub struct ObservationBatch {
    pub observations: Vec<Observation>,
    pub reporting: BTreeSet<AlarmSource>,
}

impl ObservationBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `source` evaluated its predicates this cycle.
    pub fn report(&mut self, source: AlarmSource, observations: impl IntoIterator<Item = Observation>) {
        self.reporting.insert(source);
        self.observations.extend(observations);
    }

    pub fn push(&mut self, observation: Observation) {
        self.reporting.insert(observation.source);
        self.observations.push(observation);
    }
}

/// An alarm instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmEvent {
    pub id: u64,
    pub source: AlarmSource,
    pub category: AlarmCategory,
    pub subject: String,
    pub severity: Severity,
    pub message: String,
    pub raised_at: u64,
    pub cleared_at: Option<u64>,
    /// Critical alarms latch: they stay open until acknowledged after their
    /// predicate has cleared.
    pub latched: bool,
    pub acknowledged: bool,
    pub predicate_active: bool,
}

impl AlarmEvent {
    pub fn key(&self) -> String {
        predicate_key(self.source, self.category, &self.subject)
    }

    pub fn is_open(&self) -> bool {
        self.cleared_at.is_none()
    }
}

/// Priority order: Critical > High > Warning > Info, then earliest raised,
/// then lowest id.
pub fn sort_by_priority(events: &mut [AlarmEvent]) {
    events.sort_by_key(|e| (Reverse(e.severity), e.raised_at, e.id));
}
