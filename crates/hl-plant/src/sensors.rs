//! Last-known-good substitution for sensors that stop reporting.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use hl_alarms::{AlarmCategory, AlarmSource, Observation, Severity};
use hl_core::{Reading, SensorId, SensorSnapshot};
use tracing::warn;

use crate::error::PlantResult;

/// Subject used for a total read failure before any sensor has reported.
pub const WHOLE_PLANT: &str = "plant";

#[derive(Debug, Clone, Default)]
pub struct SensorCache {
    last_good: BTreeMap<SensorId, Reading>,
    stale_for: BTreeMap<SensorId, u32>,
}

impl SensorCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_good(&self, sensor: &SensorId) -> Option<Reading> {
        self.last_good.get(sensor).copied()
    }

    /// Consecutive cycles `sensor` has been substituted.
    pub fn stale_cycles(&self, sensor: &SensorId) -> u32 {
        self.stale_for.get(sensor).copied().unwrap_or(0)
    }

    fn known_sections(&self) -> BTreeSet<String> {
        self.last_good.keys().map(|s| s.section().to_string()).collect()
    }

    /// Complete a plant read with cached values and report what was substituted.
    ///
    /// Non-finite readings are treated as missing. A failed read marks every
    /// known section lost.
    pub fn reconcile(
        &mut self,
        cycle: u64,
        read: PlantResult<SensorSnapshot>,
        stale_high_after: u32,
    ) -> (SensorSnapshot, Vec<Observation>) {
        let mut snapshot = match read {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(cycle, error = %e, "snapshot read failed; holding every sensor");
                let mut empty = SensorSnapshot::new(cycle, Utc::now());
                empty.lost_sections = self.known_sections();
                if empty.lost_sections.is_empty() {
                    empty.lost_sections.insert(WHOLE_PLANT.to_string());
                }
                empty
            }
        };
        snapshot.cycle = cycle;
        snapshot.readings.retain(|_, r| r.value().is_finite());

        for (sensor, reading) in &snapshot.readings {
            self.last_good.insert(sensor.clone(), *reading);
            self.stale_for.remove(sensor);
        }

        let mut observations = Vec::new();
        for (sensor, reading) in &self.last_good {
            if snapshot.readings.contains_key(sensor) {
                continue;
            }
            let streak = self.stale_for.entry(sensor.clone()).or_insert(0);
            *streak += 1;
            snapshot.readings.insert(sensor.clone(), *reading);
            snapshot.stale.insert(sensor.clone());

            let severity = if *streak >= stale_high_after {
                Severity::High
            } else {
                Severity::Warning
            };
            observations.push(Observation::active(
                AlarmSource::Orchestrator,
                AlarmCategory::SensorStale,
                sensor.as_str(),
                severity,
                format!(
                    "Sensor {sensor} not reporting for {streak} cycles; holding last value {:.2} {}",
                    reading.value(),
                    reading.unit()
                ),
            ));
        }

        for section in &snapshot.lost_sections {
            let held = snapshot.stale.iter().filter(|s| s.section() == section).count();
            observations.push(Observation::active(
                AlarmSource::Orchestrator,
                AlarmCategory::SensorLoss,
                section.as_str(),
                Severity::Critical,
                format!("Sensor loss in section {section}: no data within the snapshot timeout, {held} sensors held"),
            ));
        }

        (snapshot, observations)
    }
}
