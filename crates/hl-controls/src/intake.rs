//! Influent pumping and coarse screening.
//!
//! Cascade: the downstream level sets the influent flow setpoint, the flow
//! loop trims the pump group demand around that setpoint. The bar screen is
//! cleaned on differential pressure with hysteresis, or on a maximum interval.

use hl_alarms::{AlarmCategory, AlarmSource, Observation, Severity};
use hl_core::{ActuatorCommand, ControllerId, EquipmentId, GroupId, SensorId, ensure_finite};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::context::{ControllerMemory, ControllerOutput, CycleContext};
use crate::error::{ControlError, ControlResult};
use crate::hysteresis::HysteresisLatch;
use crate::mode::{AlarmPressure, Mode, ModePolicy, ModeState};
use crate::pi::{PiLoop, PiState};

const ID: ControllerId = ControllerId::Intake;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenConfig {
    /// Differential pressure across the screen (kPa).
    pub dp_sensor: SensorId,
    pub cleaner: EquipmentId,
    /// Start cleaning at this differential pressure.
    pub dp_high: f64,
    /// Stop cleaning at or below this differential pressure.
    pub dp_low: f64,
    /// Clean at least this often, in cycles, regardless of pressure.
    pub max_interval_cycles: u64,
    /// Shortest cleaning run, in cycles.
    #[serde(default = "default_min_clean_cycles")]
    pub min_clean_cycles: u32,
    #[serde(default = "default_cleaner_speed")]
    pub cleaner_speed_pct: f64,
}

fn default_min_clean_cycles() -> u32 {
    2
}

fn default_cleaner_speed() -> f64 {
    100.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntakeConfig {
    /// Measured influent flow (m³/h).
    pub flow_sensor: SensorId,
    /// Downstream level (%) the cascade holds.
    pub level_sensor: SensorId,
    pub pump_group: GroupId,
    /// Flow setpoint at the level setpoint (m³/h).
    pub target_flow: f64,
    pub level_setpoint: f64,
    /// Flow setpoint reduction per % of level above setpoint.
    pub level_gain: f64,
    pub min_flow: f64,
    pub max_flow: f64,
    /// Trim on top of the flow setpoint, in m³/h.
    pub flow_loop: PiLoop,
    pub screen: ScreenConfig,
    /// Sections whose alarms drive this controller's mode.
    pub sections: Vec<String>,
    #[serde(default)]
    pub mode: ModePolicy,
}

impl IntakeConfig {
    pub fn validate(&self) -> ControlResult<()> {
        let invalid = |what: &str| ControlError::InvalidConfig {
            controller: ID,
            what: what.to_string(),
        };
        self.flow_loop.validate()?;
        if !(self.min_flow >= 0.0 && self.min_flow <= self.max_flow) {
            return Err(invalid("flow limits must satisfy 0 <= min_flow <= max_flow"));
        }
        if !(self.min_flow..=self.max_flow).contains(&self.target_flow) {
            return Err(invalid("target_flow must lie within the flow limits"));
        }
        if !self.level_gain.is_finite() || self.level_gain < 0.0 {
            return Err(invalid("level_gain must be non-negative"));
        }
        if !HysteresisLatch::new(self.screen.dp_high, self.screen.dp_low).is_valid() {
            return Err(invalid("screen dp_low must be below dp_high"));
        }
        if self.screen.max_interval_cycles == 0 {
            return Err(invalid("screen max_interval_cycles must be positive"));
        }
        if !(0.0..=100.0).contains(&self.screen.cleaner_speed_pct) {
            return Err(invalid("screen cleaner_speed_pct must be within 0..=100"));
        }
        Ok(())
    }

    /// Outer loop: level above setpoint lowers the influent flow setpoint.
    pub fn flow_setpoint(&self, level: f64) -> f64 {
        (self.target_flow - self.level_gain * (level - self.level_setpoint)).clamp(self.min_flow, self.max_flow)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScreenMemory {
    pub cleaning: bool,
    pub cleaning_for: u32,
    pub since_clean: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntakeMemory {
    pub flow: PiState,
    pub mode: ModeState,
    pub screen: ScreenMemory,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IntakeController {
    pub config: IntakeConfig,
    pub memory: IntakeMemory,
}

impl IntakeController {
    pub fn new(config: IntakeConfig) -> ControlResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            memory: IntakeMemory::default(),
        })
    }

    pub fn evaluate(&self, ctx: &CycleContext<'_>) -> ControlResult<ControllerOutput> {
        let cfg = &self.config;
        let pressure = AlarmPressure::from_alarms(ctx.alarms, ID, &cfg.sections);
        let mode = self.memory.mode.next(pressure, &cfg.mode);
        if mode.mode == Mode::Shutdown {
            return self.shutdown(ctx, mode);
        }

        let flow = ensure_finite(ctx.snapshot.value(&cfg.flow_sensor)?, "influent flow")?;
        let level = ensure_finite(ctx.snapshot.value(&cfg.level_sensor)?, "downstream level")?;
        let flow_sp = cfg.flow_setpoint(level);

        let step = if mode.mode == Mode::Degraded {
            cfg.flow_loop.hold(&self.memory.flow, flow, flow_sp)
        } else {
            cfg.flow_loop.update(&self.memory.flow, flow, flow_sp, ctx.dt_s)
        };
        let trim = step.output;
        let demand = (flow_sp + trim).max(0.0);
        debug!(cycle = ctx.cycle, flow, flow_sp, trim, demand, saturation = ?step.saturation, "intake cascade");

        let mut memory = IntakeMemory {
            flow: step.state,
            mode: mode.clone(),
            screen: self.memory.screen.clone(),
        };
        let allocation = ctx.equipment.request(&cfg.pump_group, demand)?;
        let mut out = ControllerOutput::new(ID, mode.mode, ControllerMemory::Intake(IntakeMemory::default()));
        out.absorb(allocation)?;

        let dp = ctx.snapshot.value_opt(&cfg.screen.dp_sensor);
        memory.screen = self.screen_step(dp);
        out.command(
            &cfg.screen.cleaner,
            if memory.screen.cleaning {
                ActuatorCommand::on(cfg.screen.cleaner_speed_pct)
            } else {
                ActuatorCommand::off()
            },
        )?;
        out.observations.push(self.screen_observation(&memory.screen, dp));

        out.metric("intake.flow", Some(flow), "m3/h");
        out.metric("intake.flow_setpoint", Some(flow_sp), "m3/h");
        out.metric("intake.flow_error", Some(flow_sp - flow), "m3/h");
        out.metric("intake.pump_demand", Some(demand), "m3/h");
        out.metric("intake.screen_dp", dp, "kPa");
        out.metric("intake.screen_cleaning", Some(f64::from(u8::from(memory.screen.cleaning))), "bool");
        out.memory = ControllerMemory::Intake(memory);
        Ok(out)
    }

    fn shutdown(&self, ctx: &CycleContext<'_>, mode: ModeState) -> ControlResult<ControllerOutput> {
        let allocation = ctx.equipment.request(&self.config.pump_group, 0.0)?;
        let memory = IntakeMemory {
            mode,
            ..self.memory.clone()
        };
        let mut out = ControllerOutput::new(ID, Mode::Shutdown, ControllerMemory::Intake(memory));
        out.absorb(allocation)?;
        out.command(&self.config.screen.cleaner, ActuatorCommand::off())?;
        out.metric("intake.flow_setpoint", None, "m3/h");
        out.metric("intake.pump_demand", Some(0.0), "m3/h");
        Ok(out)
    }

    fn screen_step(&self, dp: Option<f64>) -> ScreenMemory {
        let screen = &self.config.screen;
        let prev = &self.memory.screen;
        let latch = HysteresisLatch::new(screen.dp_high, screen.dp_low);
        let due = prev.since_clean + 1 >= screen.max_interval_cycles;

        let cleaning = if prev.cleaning {
            // A missing dp reading keeps the cleaner running until the minimum run is done.
            prev.cleaning_for < screen.min_clean_cycles || dp.is_none_or(|v| latch.next(true, v))
        } else {
            due || dp.is_some_and(|v| latch.next(false, v))
        };

        match (prev.cleaning, cleaning) {
            (_, true) => ScreenMemory {
                cleaning: true,
                cleaning_for: if prev.cleaning { prev.cleaning_for + 1 } else { 1 },
                since_clean: 0,
            },
            (true, false) => ScreenMemory::default(),
            (false, false) => ScreenMemory {
                since_clean: prev.since_clean + 1,
                ..ScreenMemory::default()
            },
        }
    }

    fn screen_observation(&self, screen: &ScreenMemory, dp: Option<f64>) -> Observation {
        let subject = self.config.screen.dp_sensor.as_str();
        if !screen.cleaning {
            return Observation::inactive(AlarmSource::Controller(ID), AlarmCategory::ScreenCleaning, subject);
        }
        let message = match dp {
            Some(dp) => format!("Screen cleaning in progress: differential pressure {dp:.1} kPa"),
            None => "Screen cleaning in progress: differential pressure unavailable".to_string(),
        };
        Observation::active(
            AlarmSource::Controller(ID),
            AlarmCategory::ScreenCleaning,
            subject,
            Severity::Info,
            message,
        )
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn config() -> IntakeConfig {
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
                max_interval_cycles: 100,
                min_clean_cycles: 2,
                cleaner_speed_pct: 100.0,
            },
            sections: vec!["intake".to_string()],
            mode: ModePolicy::default(),
        }
    }

    #[test]
    fn level_above_setpoint_lowers_flow_setpoint() {
        let cfg = config();
        assert_eq!(cfg.flow_setpoint(50.0), 300.0);
        assert_eq!(cfg.flow_setpoint(60.0), 250.0);
        assert_eq!(cfg.flow_setpoint(200.0), 50.0);
        assert_eq!(cfg.flow_setpoint(-100.0), 600.0);
    }

    #[test]
    fn invalid_screen_thresholds_rejected() {
        let mut cfg = config();
        cfg.screen.dp_low = 20.0;
        assert!(IntakeController::new(cfg).is_err());
    }

    #[test]
    fn screen_cleans_on_pressure_with_hysteresis() {
        let mut ctl = IntakeController::new(config()).unwrap();
        let s = ctl.screen_step(Some(16.0));
        assert!(s.cleaning);
        ctl.memory.screen = s;
        // minimum run holds the cleaner on even though dp dropped
        let s = ctl.screen_step(Some(4.0));
        assert!(s.cleaning);
        ctl.memory.screen = s;
        let s = ctl.screen_step(Some(10.0));
        assert!(s.cleaning, "inside the band the latch holds");
        ctl.memory.screen = s;
        let s = ctl.screen_step(Some(4.0));
        assert!(!s.cleaning);
    }

    #[test]
    fn screen_cleans_on_interval() {
        let mut ctl = IntakeController::new(config()).unwrap();
        ctl.memory.screen.since_clean = 98;
        assert!(!ctl.screen_step(Some(1.0)).cleaning);
        ctl.memory.screen.since_clean = 99;
        assert!(ctl.screen_step(Some(1.0)).cleaning);
    }
}
