#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use hl_core::{CommandSet, EquipmentId, Reading, SensorId, SensorSnapshot};
use hl_plant::{Orchestrator, Plant, PlantResult, Rejection};
use hl_project::{PlantConfig, load_yaml};

pub fn demo_config() -> PlantConfig {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../demos/wastewater.yaml");
    load_yaml(&path).unwrap_or_else(|e| panic!("Failed to load demo: {e}"))
}

pub fn orchestrator() -> Orchestrator {
    Orchestrator::new(demo_config()).unwrap()
}

/// Every sensor the demo plant reads, at steady dry-weather values.
pub fn healthy() -> SensorSnapshot {
    SensorSnapshot::new(0, Utc::now())
        .with("intake.flow", Reading::Flow(300.0))
        .with("intake.wet_well_level", Reading::Level(60.0))
        .with("intake.screen_dp", Reading::Pressure(8.0))
        .with("intake.turbidity", Reading::Turbidity(40.0))
        .with("intake.tss", Reading::Concentration(220.0))
        .with("intake.pump_power", Reading::Power(45.0))
        .with("primary.level", Reading::Level(50.0))
        .with("primary.flow", Reading::Flow(300.0))
        .with("primary.sludge_blanket", Reading::Depth(0.8))
        .with("primary.scum", Reading::Status(false))
        .with("aeration.do", Reading::DissolvedOxygen(2.0))
        .with("blowers.header_pressure", Reading::Pressure(45.0))
        .with("blowers.power", Reading::Power(120.0))
        .with("tertiary.flow", Reading::Flow(300.0))
        .with("tertiary.turbidity", Reading::Turbidity(2.0))
        .with("tertiary.tss", Reading::Concentration(10.0))
        .with("tertiary.chlorine_residual", Reading::Concentration(0.5))
        .with("dosing.coagulant_tank", Reading::Level(80.0))
        .with("dosing.chlorine_tank", Reading::Level(80.0))
}

pub fn with(snapshot: SensorSnapshot, sensor: &str, reading: Reading) -> SensorSnapshot {
    snapshot.with(SensorId::new(sensor), reading)
}

/// Plant whose pumps and blowers really run: every group unit reports
/// `<section>.<unit>.running` equal to the last command it accepted.
pub struct EchoPlant {
    pub snapshot: SensorSnapshot,
    sections: BTreeMap<EquipmentId, String>,
    running: BTreeMap<EquipmentId, bool>,
    rejecting: BTreeMap<EquipmentId, String>,
}

impl EchoPlant {
    pub fn new(config: &PlantConfig, snapshot: SensorSnapshot) -> Self {
        let sections = config
            .equipment
            .groups
            .iter()
            .flat_map(|g| g.units.iter().map(|u| (u.id.clone(), g.section.clone())))
            .collect();
        Self {
            snapshot,
            sections,
            running: BTreeMap::new(),
            rejecting: BTreeMap::new(),
        }
    }

    pub fn reject(&mut self, equipment: &str, reason: &str) {
        self.rejecting.insert(EquipmentId::new(equipment), reason.to_string());
    }

    pub fn is_running(&self, equipment: &str) -> bool {
        self.running.get(&EquipmentId::new(equipment)).copied().unwrap_or(false)
    }
}

impl Plant for EchoPlant {
    fn read_snapshot(&mut self, cycle: u64, _timeout: Duration) -> PlantResult<SensorSnapshot> {
        let mut snapshot = self.snapshot.clone();
        snapshot.cycle = cycle;
        for (unit, section) in &self.sections {
            let running = self.running.get(unit).copied().unwrap_or(false);
            snapshot = snapshot.with(SensorId::new(format!("{section}.{unit}.running")), Reading::Status(running));
        }
        Ok(snapshot)
    }

    fn apply_commands(&mut self, commands: &CommandSet) -> Vec<Rejection> {
        let mut rejections = Vec::new();
        for (id, command) in commands.iter() {
            match self.rejecting.get(id) {
                Some(reason) => rejections.push(Rejection {
                    equipment: id.clone(),
                    reason: reason.clone(),
                }),
                None => {
                    self.running.insert(id.clone(), command.enabled);
                }
            }
        }
        rejections
    }
}
