//! Equipment units.

use core::fmt;

use hl_core::{ActuatorCommand, EquipmentId, GroupId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Health {
    #[default]
    Healthy,
    Degraded,
    Failed,
}

impl Health {
    pub fn is_available(self) -> bool {
        self != Self::Failed
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for Health {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pump or blower, owned by the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub struct EquipmentUnit {
    pub id: EquipmentId,
    pub group: GroupId,
    pub capacity: f64,
    pub health: Health,
    pub command: ActuatorCommand,
    /// Cumulative runtime (hours).
    pub runtime_h: f64,
    /// Consecutive cycles commanded on without running feedback.
    pub unconfirmed_cycles: u32,
}

impl EquipmentUnit {
    pub fn is_running(&self) -> bool {
        self.command.enabled && self.health.is_available()
    }

    /// Share of demand this unit currently carries.
    pub fn delivered(&self) -> f64 {
        if self.is_running() {
            self.capacity * self.command.setpoint / 100.0
        } else {
            0.0
        }
    }

    pub fn status(&self) -> UnitStatus {
        UnitStatus {
            id: self.id.clone(),
            group: self.group.clone(),
            health: self.health,
            enabled: self.command.enabled,
            setpoint: self.command.setpoint,
            runtime_h: self.runtime_h,
        }
    }
}

/// Read-only view published with the plant state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitStatus {
    pub id: EquipmentId,
    pub group: GroupId,
    pub health: Health,
    pub enabled: bool,
    pub setpoint: f64,
    pub runtime_h: f64,
}
