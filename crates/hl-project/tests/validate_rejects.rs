//! Configurations the core must refuse to start with.

use std::path::Path;

use hl_alarms::{EmergencyAction, ForcedCommand, AlarmCategory};
use hl_controls::DoseLaw;
use hl_core::{EquipmentId, SensorId};
use hl_equipment::{Health, UnitConfig};
use hl_project::{PlantConfig, ValidationError, load_yaml, validate_plant};

fn demo() -> PlantConfig {
    load_yaml(&Path::new(env!("CARGO_MANIFEST_DIR")).join("../../demos/wastewater.yaml")).unwrap()
}

#[test]
fn zero_cycle_period() {
    let mut config = demo();
    config.cycle.period_ms = 0;
    assert!(matches!(validate_plant(&config), Err(ValidationError::InvalidValue { .. })));
}

#[test]
fn snapshot_timeout_not_shorter_than_period() {
    let mut config = demo();
    config.cycle.snapshot_timeout_ms = config.cycle.period_ms;
    assert!(validate_plant(&config).is_err());
}

#[test]
fn unit_in_two_groups() {
    let mut config = demo();
    let shared = config.equipment.groups[0].units[0].clone();
    config.equipment.groups[1].units.push(shared);
    assert!(matches!(validate_plant(&config), Err(ValidationError::DuplicateId { .. })));
}

#[test]
fn group_without_healthy_units() {
    let mut config = demo();
    for unit in &mut config.equipment.groups[1].units {
        unit.initial_health = Health::Failed;
    }
    assert!(matches!(validate_plant(&config), Err(ValidationError::Component { .. })));
}

#[test]
fn non_positive_capacity() {
    let mut config = demo();
    config.equipment.groups[0].units.push(UnitConfig {
        id: EquipmentId::new("influent_pump_4"),
        capacity: 0.0,
        initial_health: Health::Healthy,
    });
    assert!(validate_plant(&config).is_err());
}

#[test]
fn unknown_group_reference() {
    let mut config = demo();
    config.controllers.aeration.blower_group = "air".into();
    assert!(matches!(validate_plant(&config), Err(ValidationError::MissingReference { .. })));
}

#[test]
fn direct_command_to_redundant_unit() {
    let mut config = demo();
    config.controllers.treatment.skimmer = EquipmentId::new("blower_1");
    assert!(matches!(validate_plant(&config), Err(ValidationError::InvalidValue { .. })));
}

#[test]
fn emergency_action_on_unknown_equipment() {
    let mut config = demo();
    config.alarms.emergency_actions.actions.push(EmergencyAction {
        category: AlarmCategory::HighTurbidity,
        force: vec![ForcedCommand {
            equipment: EquipmentId::new("outfall_gate"),
            enabled: false,
            setpoint: 0.0,
        }],
    });
    assert!(matches!(validate_plant(&config), Err(ValidationError::MissingReference { .. })));
}

#[test]
fn pi_with_non_positive_integral_time() {
    let mut config = demo();
    config.controllers.intake.flow_loop.ti_s = 0.0;
    assert!(matches!(validate_plant(&config), Err(ValidationError::Component { .. })));
}

#[test]
fn inverted_screen_hysteresis() {
    let mut config = demo();
    config.controllers.intake.screen.dp_low = 20.0;
    assert!(validate_plant(&config).is_err());
}

#[test]
fn single_point_dose_curve() {
    let mut config = demo();
    config.controllers.dosing.chemicals[0].law = DoseLaw::Curve {
        driver: SensorId::new("intake.turbidity"),
        points: vec![(0.0, 5.0)],
    };
    assert!(validate_plant(&config).is_err());
}

#[test]
fn zero_trend_capacity() {
    let mut config = demo();
    config.kpi.trend_capacity = 0;
    assert!(validate_plant(&config).is_err());
}

#[test]
fn inverted_threshold_band() {
    let mut config = demo();
    config.alarms.thresholds.rules[0].critical = Some(70.0);
    assert!(validate_plant(&config).is_err());
}

#[test]
fn newer_version() {
    let mut config = demo();
    config.version = 99;
    assert!(matches!(validate_plant(&config), Err(ValidationError::UnsupportedVersion { version: 99 })));
}
