//! Equipment configuration.

use hl_core::{EquipmentId, GroupId};
use serde::{Deserialize, Serialize};

use crate::unit::Health;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitConfig {
    pub id: EquipmentId,
    /// Full-speed capacity in the group's unit (m³/h for pumps and blowers).
    pub capacity: f64,
    #[serde(default)]
    pub initial_health: Health,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupConfig {
    pub id: GroupId,
    /// Process section; feedback sensors are `<section>.<unit>.running`,
    /// `<section>.<unit>.fault` and `<section>.<unit>.degraded`.
    pub section: String,
    /// Lowest speed (%) a running unit may be commanded to.
    #[serde(default)]
    pub min_turndown_pct: f64,
    pub units: Vec<UnitConfig>,
}

impl GroupConfig {
    pub fn installed_capacity(&self) -> f64 {
        self.units.iter().map(|u| u.capacity).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquipmentConfig {
    /// Cycles a commanded unit may go without running feedback before it is
    /// declared failed.
    #[serde(default = "default_feedback_timeout")]
    pub feedback_timeout_cycles: u32,
    /// Runtime advantage (hours) a running unit keeps over idle units before
    /// duty rotates to them.
    #[serde(default = "default_rotation_hysteresis")]
    pub rotation_hysteresis_h: f64,
    #[serde(default)]
    pub groups: Vec<GroupConfig>,
}

fn default_feedback_timeout() -> u32 {
    5
}

fn default_rotation_hysteresis() -> f64 {
    8.0
}

impl Default for EquipmentConfig {
    fn default() -> Self {
        Self {
            feedback_timeout_cycles: default_feedback_timeout(),
            rotation_hysteresis_h: default_rotation_hysteresis(),
            groups: Vec::new(),
        }
    }
}
