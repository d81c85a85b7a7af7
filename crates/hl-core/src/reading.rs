//! Typed sensor readings and the per-cycle snapshot.
//!
//! A `SensorSnapshot` is produced once per control cycle by the plant and is
//! read-only to every controller in that cycle.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{HlError, HlResult};
use crate::ids::SensorId;

/// A single typed sensor value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Reading {
    /// Volumetric flow (m³/h).
    Flow(f64),
    /// Tank or basin level (% of span).
    Level(f64),
    /// Depth or blanket height (m).
    Depth(f64),
    /// Pressure or differential pressure (kPa).
    Pressure(f64),
    /// Concentration (mg/L).
    Concentration(f64),
    /// Dissolved oxygen (mg/L).
    DissolvedOxygen(f64),
    /// Turbidity (NTU).
    Turbidity(f64),
    /// Electrical power (kW).
    Power(f64),
    /// Discrete status (running, fault, scum detected, ...).
    Status(bool),
}

impl Reading {
    /// Numeric view; `Status` maps to 0.0 / 1.0.
    pub fn value(&self) -> f64 {
        match *self {
            Self::Flow(v)
            | Self::Level(v)
            | Self::Depth(v)
            | Self::Pressure(v)
            | Self::Concentration(v)
            | Self::DissolvedOxygen(v)
            | Self::Turbidity(v)
            | Self::Power(v) => v,
            Self::Status(on) => {
                if on {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            Self::Flow(_) => "m3/h",
            Self::Level(_) => "%",
            Self::Depth(_) => "m",
            Self::Pressure(_) => "kPa",
            Self::Concentration(_) | Self::DissolvedOxygen(_) => "mg/L",
            Self::Turbidity(_) => "NTU",
            Self::Power(_) => "kW",
            Self::Status(_) => "",
        }
    }

    pub fn as_status(&self) -> Option<bool> {
        match self {
            Self::Status(on) => Some(*on),
            _ => None,
        }
    }
}

/// Immutable, timestamped sensor readings for one control cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSnapshot {
    pub cycle: u64,
    pub taken_at: DateTime<Utc>,
    pub readings: BTreeMap<SensorId, Reading>,
    /// Sensors whose value was substituted from the last known good reading.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub stale: BTreeSet<SensorId>,
    /// Sections whose read timed out in the plant.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub lost_sections: BTreeSet<String>,
}

impl SensorSnapshot {
    pub fn new(cycle: u64, taken_at: DateTime<Utc>) -> Self {
        Self {
            cycle,
            taken_at,
            readings: BTreeMap::new(),
            stale: BTreeSet::new(),
            lost_sections: BTreeSet::new(),
        }
    }

    /// Builder-style insert, mostly for plants and tests.
    pub fn with(mut self, sensor: impl Into<SensorId>, reading: Reading) -> Self {
        self.readings.insert(sensor.into(), reading);
        self
    }

    pub fn get(&self, sensor: &SensorId) -> Option<Reading> {
        self.readings.get(sensor).copied()
    }

    /// Numeric value of a sensor, or `SensorUnavailable` if the snapshot lacks it.
    pub fn value(&self, sensor: &SensorId) -> HlResult<f64> {
        self.get(sensor)
            .map(|r| r.value())
            .ok_or_else(|| HlError::SensorUnavailable {
                sensor: sensor.to_string(),
            })
    }

    pub fn value_opt(&self, sensor: &SensorId) -> Option<f64> {
        self.get(sensor).map(|r| r.value())
    }

    pub fn status(&self, sensor: &SensorId) -> Option<bool> {
        self.get(sensor).and_then(|r| r.as_status())
    }

    /// Distinct sections present in this snapshot.
    pub fn sections(&self) -> BTreeSet<&str> {
        self.readings.keys().map(|id| id.section()).collect()
    }

    pub fn is_stale(&self, sensor: &SensorId) -> bool {
        self.stale.contains(sensor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> SensorSnapshot {
        SensorSnapshot::new(7, Utc::now())
            .with("intake.flow", Reading::Flow(300.0))
            .with("aeration.do", Reading::DissolvedOxygen(1.5))
            .with("intake.screen_cleaner.running", Reading::Status(true))
    }

    #[test]
    fn value_lookup_and_missing_sensor() {
        let snap = snapshot();
        assert_eq!(snap.value(&"intake.flow".into()).unwrap(), 300.0);
        let err = snap.value(&"primary.flow".into()).unwrap_err();
        assert!(matches!(err, HlError::SensorUnavailable { .. }));
        assert_eq!(snap.status(&"intake.screen_cleaner.running".into()), Some(true));
    }

    #[test]
    fn sections_are_collected_from_ids() {
        let snap = snapshot();
        let sections: Vec<_> = snap.sections().into_iter().collect();
        assert_eq!(sections, vec!["aeration", "intake"]);
    }

    #[test]
    fn reading_serializes_with_kind_tag() {
        let json = serde_json::to_string(&Reading::Flow(12.5)).unwrap();
        assert_eq!(json, r#"{"kind":"flow","value":12.5}"#);
        let back: Reading = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Reading::Flow(12.5));
    }
}
