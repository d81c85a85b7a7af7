//! Actuator commands.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{HlError, HlResult};
use crate::ids::EquipmentId;

/// Command for one actuator: on/off plus a unit-specific setpoint
/// (speed %, stroke %, valve opening %).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActuatorCommand {
    pub enabled: bool,
    pub setpoint: f64,
}

impl ActuatorCommand {
    pub fn on(setpoint: f64) -> Self {
        Self {
            enabled: true,
            setpoint,
        }
    }

    /// De-energized.
    pub fn off() -> Self {
        Self {
            enabled: false,
            setpoint: 0.0,
        }
    }
}

/// At most one command per equipment id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandSet(BTreeMap<EquipmentId, ActuatorCommand>);

impl CommandSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a command, refusing a second command for the same id.
    pub fn insert(&mut self, id: EquipmentId, command: ActuatorCommand) -> HlResult<()> {
        if self.0.contains_key(&id) {
            return Err(HlError::DuplicateCommand {
                equipment: id.to_string(),
            });
        }
        self.0.insert(id, command);
        Ok(())
    }

    /// Replace (or add) a command. Used only by the merge step for overrides.
    pub fn force(&mut self, id: EquipmentId, command: ActuatorCommand) -> Option<ActuatorCommand> {
        self.0.insert(id, command)
    }

    pub fn get(&self, id: &EquipmentId) -> Option<&ActuatorCommand> {
        self.0.get(id)
    }

    pub fn contains(&self, id: &EquipmentId) -> bool {
        self.0.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EquipmentId, &ActuatorCommand)> {
        self.0.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = &EquipmentId> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Same ids, every actuator de-energized.
    pub fn de_energized(&self) -> Self {
        Self(self.0.keys().map(|id| (id.clone(), ActuatorCommand::off())).collect())
    }
}

impl FromIterator<(EquipmentId, ActuatorCommand)> for CommandSet {
    fn from_iter<T: IntoIterator<Item = (EquipmentId, ActuatorCommand)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
