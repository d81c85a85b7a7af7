//! The published per-cycle view of the plant and its flat record form.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use hl_alarms::AlarmEvent;
use hl_controls::{Mode, SectionRecord};
use hl_core::{ActuatorCommand, CommandSet, ControllerId, EquipmentId, Reading, SensorId};
use hl_equipment::UnitStatus;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::error::{PlantError, PlantResult};
use crate::kpi::KpiRecord;

/// Flat field → value mapping handed across the system boundary.
pub type Record = BTreeMap<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub struct PlantState {
    pub cycle: u64,
    pub taken_at: DateTime<Utc>,
    /// Fingerprint of the configuration that produced this state.
    pub config_fingerprint: String,
    pub readings: BTreeMap<SensorId, Reading>,
    pub stale: BTreeSet<SensorId>,
    pub lost_sections: BTreeSet<String>,
    /// Open alarms, highest priority first.
    pub alarms: Vec<AlarmEvent>,
    /// Commands as dispatched (rejected ones replaced by the held command).
    pub commands: CommandSet,
    pub kpis: Vec<KpiRecord>,
    pub modes: BTreeMap<ControllerId, Mode>,
    pub units: Vec<UnitStatus>,
    pub sections: SectionRecord,
    pub emergency_stop: bool,
    pub skipped_cycles: u64,
}

fn field<T: DeserializeOwned>(name: &str, value: &Value) -> PlantResult<T> {
    serde_json::from_value(value.clone()).map_err(|e| PlantError::Record {
        field: name.to_string(),
        what: e.to_string(),
    })
}

fn malformed(name: &str, what: &str) -> PlantError {
    PlantError::Record {
        field: name.to_string(),
        what: what.to_string(),
    }
}

impl PlantState {
    pub fn alarm_ids(&self) -> Vec<u64> {
        self.alarms.iter().map(|a| a.id).collect()
    }

    pub fn kpi(&self, name: &str) -> Option<f64> {
        self.kpis.iter().find(|k| k.name == name).and_then(|k| k.value)
    }

    pub fn mode(&self, controller: ControllerId) -> Option<Mode> {
        self.modes.get(&controller).copied()
    }

    /// Flatten into field → value.
    pub fn to_record(&self) -> Record {
        let mut record = Record::new();
        record.insert("cycle".into(), json!(self.cycle));
        record.insert("taken_at".into(), json!(self.taken_at.to_rfc3339()));
        record.insert("config".into(), json!(self.config_fingerprint));
        record.insert("emergency_stop".into(), json!(self.emergency_stop));
        record.insert("skipped_cycles".into(), json!(self.skipped_cycles));
        record.insert("stale".into(), json!(self.stale));
        record.insert("lost_sections".into(), json!(self.lost_sections));
        for (sensor, reading) in &self.readings {
            record.insert(format!("sensor.{sensor}"), json!(reading));
        }
        for (i, alarm) in self.alarms.iter().enumerate() {
            record.insert(format!("alarm.{i:06}"), json!(alarm));
        }
        for (id, command) in self.commands.iter() {
            record.insert(format!("command.{id}"), json!(command));
        }
        for kpi in &self.kpis {
            record.insert(
                format!("metric.{}", kpi.name),
                json!({ "value": kpi.value, "unit": kpi.unit }),
            );
        }
        for (controller, mode) in &self.modes {
            record.insert(format!("mode.{controller}"), json!(mode));
        }
        for unit in &self.units {
            record.insert(format!("unit.{}", unit.id), json!(unit));
        }
        for (section, values) in &self.sections {
            record.insert(format!("section.{section}"), json!(values));
        }
        record
    }

    /// Re-ingest a record produced by [`PlantState::to_record`].
    pub fn from_record(record: &Record) -> PlantResult<Self> {
        let get = |name: &str| record.get(name).ok_or_else(|| malformed(name, "missing"));

        let cycle: u64 = field("cycle", get("cycle")?)?;
        let taken_at_raw: String = field("taken_at", get("taken_at")?)?;
        let taken_at = DateTime::parse_from_rfc3339(&taken_at_raw)
            .map_err(|e| malformed("taken_at", &e.to_string()))?
            .with_timezone(&Utc);

        let mut state = PlantState {
            cycle,
            taken_at,
            config_fingerprint: field("config", get("config")?)?,
            readings: BTreeMap::new(),
            stale: field("stale", get("stale")?)?,
            lost_sections: field("lost_sections", get("lost_sections")?)?,
            alarms: Vec::new(),
            commands: CommandSet::new(),
            kpis: Vec::new(),
            modes: BTreeMap::new(),
            units: Vec::new(),
            sections: SectionRecord::new(),
            emergency_stop: field("emergency_stop", get("emergency_stop")?)?,
            skipped_cycles: field("skipped_cycles", get("skipped_cycles")?)?,
        };

        let mut alarms: Vec<(u64, AlarmEvent)> = Vec::new();
        for (name, value) in record {
            let Some((kind, rest)) = name.split_once('.') else {
                continue;
            };
            match kind {
                "sensor" => {
                    state.readings.insert(SensorId::new(rest), field(name, value)?);
                }
                "alarm" => {
                    let index: u64 = rest.parse().map_err(|_| malformed(name, "alarm index"))?;
                    alarms.push((index, field(name, value)?));
                }
                "command" => {
                    let command: ActuatorCommand = field(name, value)?;
                    state.commands.force(EquipmentId::new(rest), command);
                }
                "metric" => {
                    state.kpis.push(KpiRecord {
                        name: rest.to_string(),
                        value: field(name, value.get("value").unwrap_or(&Value::Null))?,
                        unit: field(name, value.get("unit").ok_or_else(|| malformed(name, "unit"))?)?,
                        cycle,
                    });
                }
                "mode" => {
                    let controller = ControllerId::parse(rest).ok_or_else(|| PlantError::UnknownController {
                        name: rest.to_string(),
                    })?;
                    state.modes.insert(controller, field(name, value)?);
                }
                "unit" => state.units.push(field(name, value)?),
                "section" => {
                    state.sections.insert(rest.to_string(), field(name, value)?);
                }
                _ => {}
            }
        }
        alarms.sort_by_key(|(i, _)| *i);
        state.alarms = alarms.into_iter().map(|(_, a)| a).collect();
        Ok(state)
    }
}
