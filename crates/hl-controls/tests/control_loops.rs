//! Closed-loop behaviour of the controllers against toy plants.

use chrono::{DateTime, Utc};
use hl_alarms::{AlarmCategory, AlarmEvent, AlarmSource, Severity};
use hl_controls::{
    AerationConfig, AerationController, ChemicalConfig, ControllerMemory, CycleContext, DoseLaw, DosingConfig,
    DosingController, IntakeConfig, IntakeController, Mode, ModePolicy, PiLoop, ScreenConfig, TankConfig,
    TreatmentConfig, TreatmentController, Upstream,
};
use hl_core::{ControllerId, EquipmentId, GroupId, Reading, SensorId, SensorSnapshot};
use hl_equipment::{EquipmentConfig, EquipmentCoordinator, GroupConfig, Health, SharedCoordinator, UnitConfig};
use proptest::prelude::*;

const DT_S: f64 = 5.0;

fn group(id: &str, section: &str, capacities: &[f64], turndown: f64) -> GroupConfig {
    GroupConfig {
        id: id.into(),
        section: section.to_string(),
        min_turndown_pct: turndown,
        units: capacities
            .iter()
            .enumerate()
            .map(|(i, &capacity)| UnitConfig {
                id: format!("{id}_{}", i + 1).into(),
                capacity,
                initial_health: Health::Healthy,
            })
            .collect(),
    }
}

fn equipment() -> SharedCoordinator {
    let config = EquipmentConfig {
        groups: vec![
            group("influent_pumps", "intake", &[250.0, 250.0, 250.0], 0.0),
            group("blowers", "aeration", &[1000.0, 1000.0, 1000.0], 30.0),
        ],
        ..EquipmentConfig::default()
    };
    SharedCoordinator::new(EquipmentCoordinator::new(&config).unwrap())
}

fn intake_config() -> IntakeConfig {
    IntakeConfig {
        flow_sensor: SensorId::new("intake.flow"),
        level_sensor: SensorId::new("primary.level"),
        pump_group: GroupId::new("influent_pumps"),
        target_flow: 300.0,
        level_setpoint: 50.0,
        level_gain: 5.0,
        min_flow: 50.0,
        max_flow: 600.0,
        flow_loop: PiLoop::new(0.5, 60.0, -200.0, 200.0).unwrap(),
        screen: ScreenConfig {
            dp_sensor: SensorId::new("intake.screen_dp"),
            cleaner: EquipmentId::new("screen_cleaner"),
            dp_high: 15.0,
            dp_low: 5.0,
            max_interval_cycles: 1000,
            min_clean_cycles: 2,
            cleaner_speed_pct: 100.0,
        },
        sections: vec!["intake".to_string()],
        mode: ModePolicy::default(),
    }
}

fn aeration_config() -> AerationConfig {
    AerationConfig {
        do_sensor: SensorId::new("aeration.do"),
        do_setpoint: 2.0,
        blower_group: GroupId::new("blowers"),
        base_output_pct: 30.0,
        do_loop: PiLoop::new(40.0, 600.0, -60.0, 60.0).unwrap(),
        min_turndown_pct: 10.0,
    }
}

fn treatment_config() -> TreatmentConfig {
    TreatmentConfig {
        flow_sensor: SensorId::new("primary.flow"),
        surface_area_m2: 150.0,
        design_overflow_m_per_h: 2.5,
        scraper: EquipmentId::new("scraper"),
        scraper_min_pct: 20.0,
        sludge_pump: EquipmentId::new("sludge_pump"),
        sludge_pump_capacity: 30.0,
        sludge_ratio: 0.02,
        blanket_sensor: None,
        blanket_setpoint_m: 0.0,
        blanket_gain_pct_per_m: 0.0,
        skimmer: EquipmentId::new("skimmer"),
        skimmer_overflow_fraction: 0.8,
        scum_sensor: None,
        sections: vec!["primary".to_string()],
        mode: ModePolicy::default(),
    }
}

fn chlorine() -> ChemicalConfig {
    ChemicalConfig {
        name: "chlorine".to_string(),
        pump: EquipmentId::new("chlorine_pump"),
        flow_sensor: SensorId::new("tertiary.flow"),
        law: DoseLaw::Residual {
            residual_sensor: SensorId::new("tertiary.chlorine_residual"),
            target_mg_l: 0.5,
            demand_mg_l: 2.0,
        },
        solution_g_per_l: 120.0,
        pump_capacity_l_per_h: 20.0,
        min_dose_mg_l: 0.0,
        max_dose_mg_l: 8.0,
        tank: Some(TankConfig {
            level_sensor: SensorId::new("dosing.chlorine_tank"),
            capacity_l: 1000.0,
            low_pct: 20.0,
            critical_pct: 10.0,
        }),
    }
}

fn snapshot(cycle: u64) -> SensorSnapshot {
    SensorSnapshot::new(cycle, DateTime::<Utc>::UNIX_EPOCH)
}

fn ctx<'a>(
    cycle: u64,
    snapshot: &'a SensorSnapshot,
    alarms: &'a [AlarmEvent],
    upstream: &'a Upstream,
    equipment: &'a SharedCoordinator,
) -> CycleContext<'a> {
    CycleContext {
        cycle,
        dt_s: DT_S,
        snapshot,
        alarms,
        upstream,
        equipment,
    }
}

fn alarm(subject: &str, severity: Severity) -> AlarmEvent {
    AlarmEvent {
        id: 1,
        source: AlarmSource::Controller(ControllerId::Monitoring),
        category: AlarmCategory::HighLevel,
        subject: subject.to_string(),
        severity,
        message: String::new(),
        raised_at: 0,
        cleared_at: None,
        latched: severity == Severity::Critical,
        acknowledged: false,
        predicate_active: true,
    }
}

#[test]
fn intake_flow_error_settles_to_zero() {
    let equipment = equipment();
    let upstream = Upstream::new();
    let mut intake = IntakeController::new(intake_config()).unwrap();

    // Pumps deliver 90% of their commanded capacity; level sits at setpoint.
    let mut flow = 0.0;
    for cycle in 0..600 {
        let snap = snapshot(cycle)
            .with("intake.flow", Reading::Flow(flow))
            .with("primary.level", Reading::Level(50.0));
        let out = intake.evaluate(&ctx(cycle, &snap, &[], &upstream, &equipment)).unwrap();
        let delivered: f64 = out
            .commands
            .iter()
            .filter(|(id, c)| id.as_str().starts_with("influent_pumps") && c.enabled)
            .map(|(_, c)| 250.0 * c.setpoint / 100.0)
            .sum();
        flow = 0.9 * delivered;
        if let ControllerMemory::Intake(m) = out.memory {
            intake.memory = m;
        }
    }
    assert!((flow - 300.0).abs() < 0.5, "flow settled at {flow}");
}

#[test]
fn low_dissolved_oxygen_brings_on_another_blower() {
    let equipment = equipment();
    let upstream = Upstream::new();
    let aeration = AerationController::new(aeration_config()).unwrap();

    let at_setpoint = snapshot(0).with("aeration.do", Reading::DissolvedOxygen(2.0));
    let out = aeration.evaluate(&ctx(0, &at_setpoint, &[], &upstream, &equipment)).unwrap();
    let running = out.commands.iter().filter(|(_, c)| c.enabled).count();
    assert_eq!(running, 1);

    let low = snapshot(1).with("aeration.do", Reading::DissolvedOxygen(1.5));
    let out = aeration.evaluate(&ctx(1, &low, &[], &upstream, &equipment)).unwrap();
    let running: Vec<_> = out.commands.iter().filter(|(_, c)| c.enabled).collect();
    assert_eq!(running.len(), 2);

    let delivered: f64 = running.iter().map(|(_, c)| 1000.0 * c.setpoint / 100.0).sum();
    let demand = out.metric_value("aeration.air_demand").unwrap();
    assert!((delivered - demand).abs() < 1e-6, "{delivered} vs {demand}");
    assert!(out.metric_value("aeration.output_pct").unwrap() > 30.0);
}

#[test]
fn chlorine_tank_at_five_percent_is_critical() {
    let equipment = equipment();
    let upstream = Upstream::new();
    let dosing = DosingController::new(DosingConfig {
        chemicals: vec![chlorine()],
    })
    .unwrap();
    let snap = snapshot(0)
        .with("tertiary.flow", Reading::Flow(480.0))
        .with("tertiary.chlorine_residual", Reading::Concentration(0.0))
        .with("dosing.chlorine_tank", Reading::Level(5.0));
    let out = dosing.evaluate(&ctx(0, &snap, &[], &upstream, &equipment)).unwrap();

    let tank = out
        .observations
        .iter()
        .find(|o| o.category == AlarmCategory::ChemicalTankLow)
        .unwrap();
    assert!(tank.active);
    assert_eq!(tank.severity, Severity::Critical);
    assert!(tank.message.contains("chlorine"));
    assert!(tank.message.contains("5.0%"));
    assert!(tank.message.contains("50 L"));

    // 2.5 mg/L at 480 m3/h through 120 g/L product on a 20 L/h pump
    let stroke = out.commands.get(&EquipmentId::new("chlorine_pump")).unwrap();
    assert!((stroke.setpoint - 50.0).abs() < 1e-9);
    assert_eq!(out.metric_value("dosing.chlorine.tank_l"), Some(50.0));
}

#[test]
fn dose_beyond_limit_is_clipped_and_reported() {
    let equipment = equipment();
    let upstream = Upstream::new();
    let mut chemical = chlorine();
    chemical.max_dose_mg_l = 1.0;
    let dosing = DosingController::new(DosingConfig {
        chemicals: vec![chemical],
    })
    .unwrap();
    let snap = snapshot(0)
        .with("tertiary.flow", Reading::Flow(480.0))
        .with("tertiary.chlorine_residual", Reading::Concentration(0.0))
        .with("dosing.chlorine_tank", Reading::Level(80.0));
    let out = dosing.evaluate(&ctx(0, &snap, &[], &upstream, &equipment)).unwrap();
    assert_eq!(out.metric_value("dosing.chlorine.dose_mg_l"), Some(1.0));
    let clip = out
        .observations
        .iter()
        .find(|o| o.category == AlarmCategory::DoseOutOfRange && o.subject == "chlorine")
        .unwrap();
    assert!(clip.active);
    assert_eq!(clip.severity, Severity::Warning);
}

#[test]
fn overflow_above_design_clips_scraper_with_warning() {
    let equipment = equipment();
    let upstream = Upstream::new();
    let treatment = TreatmentController::new(treatment_config()).unwrap();
    let snap = snapshot(0).with("primary.flow", Reading::Flow(450.0));
    let out = treatment.evaluate(&ctx(0, &snap, &[], &upstream, &equipment)).unwrap();

    assert!((out.metric_value("treatment.overflow_rate").unwrap() - 3.0).abs() < 1e-9);
    assert_eq!(out.commands.get(&EquipmentId::new("scraper")).unwrap().setpoint, 100.0);
    let warning = out
        .observations
        .iter()
        .find(|o| o.category == AlarmCategory::OverflowRate)
        .unwrap();
    assert!(warning.active);
    assert_eq!(warning.severity, Severity::Warning);
}

#[test]
fn treatment_falls_back_to_intake_setpoint() {
    let equipment = equipment();
    let mut upstream = Upstream::new();
    upstream.insert("intake.flow_setpoint".to_string(), 300.0);
    let treatment = TreatmentController::new(treatment_config()).unwrap();
    let snap = snapshot(0);
    let out = treatment.evaluate(&ctx(0, &snap, &[], &upstream, &equipment)).unwrap();
    assert!((out.metric_value("treatment.overflow_rate").unwrap() - 2.0).abs() < 1e-9);

    let empty = Upstream::new();
    assert!(treatment.evaluate(&ctx(0, &snap, &[], &empty, &equipment)).is_err());
}

#[test]
fn critical_in_own_section_shuts_treatment_down_until_reset() {
    let equipment = equipment();
    let upstream = Upstream::new();
    let mut treatment = TreatmentController::new(treatment_config()).unwrap();
    let snap = snapshot(0).with("primary.flow", Reading::Flow(300.0));

    let critical = [alarm("primary.level", Severity::Critical)];
    let out = treatment.evaluate(&ctx(0, &snap, &critical, &upstream, &equipment)).unwrap();
    assert_eq!(out.mode, Mode::Shutdown);
    assert!(out.commands.iter().all(|(_, c)| !c.enabled));
    assert_eq!(out.commands.len(), 3);
    if let ControllerMemory::Treatment(m) = out.memory {
        treatment.memory = m;
    }

    let out = treatment.evaluate(&ctx(1, &snap, &[], &upstream, &equipment)).unwrap();
    assert_eq!(out.mode, Mode::Shutdown, "no automatic recovery from shutdown");
}

#[test]
fn degraded_intake_freezes_integral() {
    let equipment = equipment();
    let upstream = Upstream::new();
    let mut intake = IntakeController::new(intake_config()).unwrap();
    intake.memory.flow.integral = 120.0;
    let snap = snapshot(0)
        .with("intake.flow", Reading::Flow(200.0))
        .with("primary.level", Reading::Level(50.0));
    let warning = [alarm("intake.wet_well_level", Severity::Warning)];
    let out = intake.evaluate(&ctx(0, &snap, &warning, &upstream, &equipment)).unwrap();
    assert_eq!(out.mode, Mode::Degraded);
    match out.memory {
        ControllerMemory::Intake(m) => assert_eq!(m.flow.integral, 120.0),
        other => panic!("unexpected memory {other:?}"),
    }
}

proptest! {
    #[test]
    fn evaluation_is_idempotent(
        flow in 0.0f64..700.0,
        level in 0.0f64..100.0,
        dissolved_oxygen in 0.0f64..5.0,
        integral in -500.0f64..500.0,
    ) {
        let upstream = Upstream::new();
        let snap = snapshot(3)
            .with("intake.flow", Reading::Flow(flow))
            .with("primary.level", Reading::Level(level))
            .with("aeration.do", Reading::DissolvedOxygen(dissolved_oxygen));

        let mut intake = IntakeController::new(intake_config()).unwrap();
        intake.memory.flow.integral = integral;
        let aeration = AerationController::new(aeration_config()).unwrap();

        let (eq_a, eq_b) = (equipment(), equipment());
        let a = intake.evaluate(&ctx(3, &snap, &[], &upstream, &eq_a)).unwrap();
        let b = intake.evaluate(&ctx(3, &snap, &[], &upstream, &eq_b)).unwrap();
        prop_assert_eq!(a, b);

        let a = aeration.evaluate(&ctx(3, &snap, &[], &upstream, &eq_a)).unwrap();
        let b = aeration.evaluate(&ctx(3, &snap, &[], &upstream, &eq_b)).unwrap();
        prop_assert_eq!(a, b);
    }
}
