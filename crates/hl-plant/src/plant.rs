//! The physical plant as seen from the control core.

use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use hl_core::{CommandSet, EquipmentId, SensorSnapshot};
use serde::{Deserialize, Serialize};

use crate::error::{PlantError, PlantResult};

/// A command the plant refused to realize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub equipment: EquipmentId,
    pub reason: String,
}

/// Sensor source and actuator sink.
pub trait Plant {
    /// One snapshot for `cycle`, returned within `timeout`.
    ///
    /// Sections that did not answer in time are listed in the snapshot's
    /// `lost_sections`; an `Err` means nothing was read at all.
    fn read_snapshot(&mut self, cycle: u64, timeout: Duration) -> PlantResult<SensorSnapshot>;

    /// Hand over the cycle's commands. Anything not rejected is taken as applied.
    fn apply_commands(&mut self, commands: &CommandSet) -> Vec<Rejection>;
}

/// Replays a fixed script of snapshots and records every dispatch.
#[derive(Debug, Default)]
pub struct ScriptedPlant {
    script: VecDeque<Option<SensorSnapshot>>,
    rejecting: BTreeMap<EquipmentId, String>,
    dispatched: Vec<CommandSet>,
}

impl ScriptedPlant {
    pub fn new(snapshots: impl IntoIterator<Item = SensorSnapshot>) -> Self {
        Self {
            script: snapshots.into_iter().map(Some).collect(),
            ..Self::default()
        }
    }

    pub fn push_snapshot(&mut self, snapshot: SensorSnapshot) {
        self.script.push_back(Some(snapshot));
    }

    /// Next read times out entirely.
    pub fn push_timeout(&mut self) {
        self.script.push_back(None);
    }

    /// Reject every command to `equipment` until [`ScriptedPlant::accept`].
    pub fn reject(&mut self, equipment: impl Into<EquipmentId>, reason: impl Into<String>) {
        self.rejecting.insert(equipment.into(), reason.into());
    }

    pub fn accept(&mut self, equipment: &EquipmentId) {
        self.rejecting.remove(equipment);
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }

    pub fn is_exhausted(&self) -> bool {
        self.script.is_empty()
    }

    pub fn dispatched(&self) -> &[CommandSet] {
        &self.dispatched
    }

    pub fn last_dispatch(&self) -> Option<&CommandSet> {
        self.dispatched.last()
    }
}

impl Plant for ScriptedPlant {
    fn read_snapshot(&mut self, cycle: u64, timeout: Duration) -> PlantResult<SensorSnapshot> {
        match self.script.pop_front() {
            Some(Some(mut snapshot)) => {
                snapshot.cycle = cycle;
                Ok(snapshot)
            }
            _ => Err(PlantError::SnapshotTimeout {
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }

    fn apply_commands(&mut self, commands: &CommandSet) -> Vec<Rejection> {
        self.dispatched.push(commands.clone());
        commands
            .ids()
            .filter_map(|id| {
                self.rejecting.get(id).map(|reason| Rejection {
                    equipment: id.clone(),
                    reason: reason.clone(),
                })
            })
            .collect()
    }
}
