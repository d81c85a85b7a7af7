//! What a controller sees and what it hands back.

use std::collections::BTreeMap;

use hl_alarms::{AlarmEvent, Observation};
use hl_core::{ActuatorCommand, CommandSet, ControllerId, EquipmentId, SensorSnapshot};
use hl_equipment::{Allocation, CapacityBroker};
use serde::{Deserialize, Serialize};

use crate::error::ControlResult;
use crate::intake::IntakeMemory;
use crate::mode::{Mode, ModeState};
use crate::pi::PiState;

/// Metrics published earlier in the same cycle, keyed `controller.metric`.
pub type Upstream = BTreeMap<String, f64>;

/// Monitoring's normalized view: section → sensor name → value.
pub type SectionRecord = BTreeMap<String, BTreeMap<String, f64>>;

/// Inputs to one controller evaluation.
pub struct CycleContext<'a> {
    pub cycle: u64,
    /// Cycle period in seconds.
    pub dt_s: f64,
    pub snapshot: &'a SensorSnapshot,
    /// Alarms open at the start of the cycle.
    pub alarms: &'a [AlarmEvent],
    pub upstream: &'a Upstream,
    pub equipment: &'a dyn CapacityBroker,
}

/// A derived metric. `value` is `None` when the quantity is undefined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,
    pub value: Option<f64>,
    pub unit: String,
}

/// Controller memory carried from one cycle to the next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "controller", rename_all = "snake_case")]
pub enum ControllerMemory {
    Intake(IntakeMemory),
    Treatment(ModeState),
    Aeration(PiState),
    Dosing,
    Monitoring,
}

/// Result of one evaluation. Nothing in here has been applied yet.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerOutput {
    pub controller: ControllerId,
    pub mode: Mode,
    pub commands: CommandSet,
    pub metrics: Vec<Metric>,
    pub observations: Vec<Observation>,
    pub sections: SectionRecord,
    pub memory: ControllerMemory,
}

impl ControllerOutput {
    pub fn new(controller: ControllerId, mode: Mode, memory: ControllerMemory) -> Self {
        Self {
            controller,
            mode,
            commands: CommandSet::new(),
            metrics: Vec::new(),
            observations: Vec::new(),
            sections: SectionRecord::new(),
            memory,
        }
    }

    pub fn metric(&mut self, name: impl Into<String>, value: Option<f64>, unit: &str) {
        self.metrics.push(Metric {
            name: name.into(),
            value: value.filter(|v| v.is_finite()),
            unit: unit.to_string(),
        });
    }

    pub fn metric_value(&self, name: &str) -> Option<f64> {
        self.metrics.iter().find(|m| m.name == name).and_then(|m| m.value)
    }

    pub fn command(&mut self, id: &EquipmentId, command: ActuatorCommand) -> ControlResult<()> {
        self.commands.insert(id.clone(), command)?;
        Ok(())
    }

    /// Take over a group allocation: its unit commands and its alarm observations.
    pub fn absorb(&mut self, allocation: Allocation) -> ControlResult<()> {
        for (id, command) in allocation.commands.iter() {
            self.commands.insert(id.clone(), *command)?;
        }
        self.observations.extend(allocation.observations);
        Ok(())
    }

    /// Publish defined metrics for controllers evaluated later in the cycle.
    pub fn publish(&self, upstream: &mut Upstream) {
        for m in &self.metrics {
            if let Some(v) = m.value {
                upstream.insert(m.name.clone(), v);
            }
        }
    }
}
