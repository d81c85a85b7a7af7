//! Plant configuration schema.

use hl_alarms::AlarmConfig;
use hl_controls::ControllersConfig;
use hl_core::SensorId;
use hl_equipment::EquipmentConfig;
use serde::{Deserialize, Serialize};

pub const LATEST_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlantConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    pub name: String,
    #[serde(default)]
    pub cycle: CycleConfig,
    #[serde(default)]
    pub alarms: AlarmConfig,
    pub equipment: EquipmentConfig,
    pub controllers: ControllersConfig,
    #[serde(default)]
    pub kpi: KpiConfig,
}

fn default_version() -> u32 {
    LATEST_VERSION
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleConfig {
    /// Control cycle period (ms).
    #[serde(default = "default_period_ms")]
    pub period_ms: u64,
    /// Longest the Plant may take to return a snapshot (ms).
    #[serde(default = "default_snapshot_timeout_ms")]
    pub snapshot_timeout_ms: u64,
}

fn default_period_ms() -> u64 {
    1000
}

fn default_snapshot_timeout_ms() -> u64 {
    500
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            period_ms: default_period_ms(),
            snapshot_timeout_ms: default_snapshot_timeout_ms(),
        }
    }
}

impl CycleConfig {
    pub fn period_s(&self) -> f64 {
        self.period_ms as f64 / 1000.0
    }
}

/// Percent removal of one parameter between two sampling points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemovalMetric {
    pub name: String,
    pub influent: SensorId,
    pub effluent: SensorId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiConfig {
    /// Samples kept per trend buffer.
    #[serde(default = "default_trend_capacity")]
    pub trend_capacity: usize,
    #[serde(default)]
    pub removals: Vec<RemovalMetric>,
    /// Power meters (kW) summed into plant energy.
    #[serde(default)]
    pub power_sensors: Vec<SensorId>,
    /// Flow (m³/h) integrated into treated volume.
    #[serde(default)]
    pub treated_flow_sensor: Option<SensorId>,
}

fn default_trend_capacity() -> usize {
    360
}

impl Default for KpiConfig {
    fn default() -> Self {
        Self {
            trend_capacity: default_trend_capacity(),
            removals: Vec::new(),
            power_sensors: Vec::new(),
            treated_flow_sensor: None,
        }
    }
}
