//! Primary clarification: scraper drive, sludge withdrawal and skimmer.

use hl_alarms::{AlarmCategory, AlarmSource, Observation, Severity};
use hl_core::units::{m2, m3ph, overflow_rate_m_per_h};
use hl_core::{ActuatorCommand, ControllerId, EquipmentId, SensorId, ensure_finite};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::context::{ControllerMemory, ControllerOutput, CycleContext};
use crate::error::{ControlError, ControlResult};
use crate::mode::{AlarmPressure, Mode, ModePolicy, ModeState};

const ID: ControllerId = ControllerId::Treatment;

/// Metric Intake publishes; used when the clarifier flow meter has never reported.
pub const FLOW_FALLBACK_METRIC: &str = "intake.flow_setpoint";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreatmentConfig {
    /// Flow into the clarifier (m³/h).
    pub flow_sensor: SensorId,
    pub surface_area_m2: f64,
    /// Design surface overflow rate (m/h). Above it the scraper is at full speed.
    pub design_overflow_m_per_h: f64,
    pub scraper: EquipmentId,
    #[serde(default = "default_scraper_min")]
    pub scraper_min_pct: f64,
    pub sludge_pump: EquipmentId,
    /// Full-stroke capacity of the sludge pump (m³/h).
    pub sludge_pump_capacity: f64,
    /// Fraction of the influent withdrawn as primary sludge.
    pub sludge_ratio: f64,
    /// Sludge blanket depth (m), when instrumented.
    #[serde(default)]
    pub blanket_sensor: Option<SensorId>,
    #[serde(default)]
    pub blanket_setpoint_m: f64,
    /// Extra sludge pump % per metre of blanket above setpoint.
    #[serde(default)]
    pub blanket_gain_pct_per_m: f64,
    pub skimmer: EquipmentId,
    /// Skimmer runs above this fraction of the design overflow rate.
    #[serde(default = "default_skimmer_fraction")]
    pub skimmer_overflow_fraction: f64,
    /// Scum detected on the surface.
    #[serde(default)]
    pub scum_sensor: Option<SensorId>,
    pub sections: Vec<String>,
    #[serde(default)]
    pub mode: ModePolicy,
}

fn default_scraper_min() -> f64 {
    20.0
}

fn default_skimmer_fraction() -> f64 {
    0.8
}

impl TreatmentConfig {
    pub fn validate(&self) -> ControlResult<()> {
        let invalid = |what: &str| ControlError::InvalidConfig {
            controller: ID,
            what: what.to_string(),
        };
        if !(self.surface_area_m2 > 0.0) {
            return Err(invalid("surface_area_m2 must be positive"));
        }
        if !(self.design_overflow_m_per_h > 0.0) {
            return Err(invalid("design_overflow_m_per_h must be positive"));
        }
        if !(0.0..=100.0).contains(&self.scraper_min_pct) {
            return Err(invalid("scraper_min_pct must be within 0..=100"));
        }
        if !(self.sludge_pump_capacity > 0.0) {
            return Err(invalid("sludge_pump_capacity must be positive"));
        }
        if !(0.0..=1.0).contains(&self.sludge_ratio) {
            return Err(invalid("sludge_ratio must be within 0..=1"));
        }
        if !(self.skimmer_overflow_fraction > 0.0) {
            return Err(invalid("skimmer_overflow_fraction must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TreatmentController {
    pub config: TreatmentConfig,
    pub memory: ModeState,
}

impl TreatmentController {
    pub fn new(config: TreatmentConfig) -> ControlResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            memory: ModeState::default(),
        })
    }

    fn actuators(&self) -> [&EquipmentId; 3] {
        [&self.config.scraper, &self.config.sludge_pump, &self.config.skimmer]
    }

    pub fn evaluate(&self, ctx: &CycleContext<'_>) -> ControlResult<ControllerOutput> {
        let cfg = &self.config;
        let pressure = AlarmPressure::from_alarms(ctx.alarms, ID, &cfg.sections);
        let mode = self.memory.next(pressure, &cfg.mode);
        let mut out = ControllerOutput::new(ID, mode.mode, ControllerMemory::Treatment(mode.clone()));

        if mode.mode == Mode::Shutdown {
            for id in self.actuators() {
                out.command(id, ActuatorCommand::off())?;
            }
            out.metric("treatment.overflow_rate", None, "m/h");
            return Ok(out);
        }

        let flow = match ctx.snapshot.value_opt(&cfg.flow_sensor) {
            Some(v) => v,
            None => *ctx.upstream.get(FLOW_FALLBACK_METRIC).ok_or_else(|| ControlError::Sensor {
                sensor: cfg.flow_sensor.to_string(),
            })?,
        };
        let flow = ensure_finite(flow, "clarifier flow")?.max(0.0);
        let overflow = overflow_rate_m_per_h(m3ph(flow), m2(cfg.surface_area_m2));
        let design = cfg.design_overflow_m_per_h;

        // Scraper tracks hydraulic load between its minimum and full speed.
        let scraper_raw = cfg.scraper_min_pct + (100.0 - cfg.scraper_min_pct) * overflow / design;
        let scraper = scraper_raw.min(100.0);
        out.command(&cfg.scraper, ActuatorCommand::on(scraper))?;
        out.observations.push(if overflow > design {
            warn!(overflow, design, "primary overflow rate above design; scraper clipped");
            Observation::active(
                AlarmSource::Controller(ID),
                AlarmCategory::OverflowRate,
                cfg.flow_sensor.as_str(),
                Severity::Warning,
                format!(
                    "Overflow rate {overflow:.2} m/h exceeds design {design:.2} m/h; scraper clipped at 100% (wanted {scraper_raw:.0}%)"
                ),
            )
        } else {
            Observation::inactive(AlarmSource::Controller(ID), AlarmCategory::OverflowRate, cfg.flow_sensor.as_str())
        });

        let blanket = cfg.blanket_sensor.as_ref().and_then(|s| ctx.snapshot.value_opt(s));
        let blanket_term = blanket.map_or(0.0, |b| cfg.blanket_gain_pct_per_m * (b - cfg.blanket_setpoint_m));
        let sludge_raw = cfg.sludge_ratio * flow / cfg.sludge_pump_capacity * 100.0 + blanket_term;
        let sludge = sludge_raw.clamp(0.0, 100.0);
        out.command(
            &cfg.sludge_pump,
            if sludge > 0.0 {
                ActuatorCommand::on(sludge)
            } else {
                ActuatorCommand::off()
            },
        )?;
        out.observations.push(if sludge_raw > 100.0 {
            Observation::active(
                AlarmSource::Controller(ID),
                AlarmCategory::ProcessDeviation,
                cfg.sludge_pump.as_str(),
                Severity::Warning,
                format!("Sludge withdrawal demand {sludge_raw:.0}% exceeds pump capacity; clipped at 100%"),
            )
        } else {
            Observation::inactive(AlarmSource::Controller(ID), AlarmCategory::ProcessDeviation, cfg.sludge_pump.as_str())
        });

        let scum = cfg
            .scum_sensor
            .as_ref()
            .and_then(|s| ctx.snapshot.status(s))
            .unwrap_or(false);
        let skim = scum || overflow >= cfg.skimmer_overflow_fraction * design;
        out.command(
            &cfg.skimmer,
            if skim {
                ActuatorCommand::on(100.0)
            } else {
                ActuatorCommand::off()
            },
        )?;

        out.metric("treatment.flow", Some(flow), "m3/h");
        out.metric("treatment.overflow_rate", Some(overflow), "m/h");
        out.metric("treatment.scraper_pct", Some(scraper), "%");
        out.metric("treatment.sludge_pump_pct", Some(sludge), "%");
        out.metric("treatment.sludge_blanket", blanket, "m");
        out.metric("treatment.skimmer", Some(f64::from(u8::from(skim))), "bool");
        Ok(out)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn config() -> TreatmentConfig {
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

    #[test]
    fn rejects_non_positive_area() {
        let mut cfg = config();
        cfg.surface_area_m2 = 0.0;
        assert!(TreatmentController::new(cfg).is_err());
    }

    #[test]
    fn rejects_sludge_ratio_above_one() {
        let mut cfg = config();
        cfg.sludge_ratio = 1.5;
        assert!(cfg.validate().is_err());
    }
}
