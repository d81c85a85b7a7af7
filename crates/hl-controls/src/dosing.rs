//! Chemical dosing: flow-paced metering pumps with tank supervision.
//!
//! Dose (mg/L, i.e. g/m³) × flow (m³/h) gives g/h of active chemical; divided
//! by the solution strength (g/L) that is L/h of product, and the pump stroke
//! is that fraction of the pump's full-stroke capacity.

use std::collections::BTreeSet;

use hl_alarms::{AlarmCategory, AlarmSource, Observation, Severity};
use hl_core::{ActuatorCommand, ControllerId, EquipmentId, SensorId, ensure_finite, interpolate};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::context::{ControllerMemory, ControllerOutput, CycleContext};
use crate::error::{ControlError, ControlResult};
use crate::mode::Mode;

const ID: ControllerId = ControllerId::Dosing;

/// How the target dose is derived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DoseLaw {
    /// Piecewise-linear dose (mg/L) against a driver measurement, e.g. turbidity.
    Curve {
        driver: SensorId,
        points: Vec<(f64, f64)>,
    },
    /// Dose to reach a residual: demand plus target, trimmed by the measured residual.
    Residual {
        residual_sensor: SensorId,
        target_mg_l: f64,
        demand_mg_l: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TankConfig {
    /// Tank level (%).
    pub level_sensor: SensorId,
    pub capacity_l: f64,
    #[serde(default = "default_low_pct")]
    pub low_pct: f64,
    #[serde(default = "default_critical_pct")]
    pub critical_pct: f64,
}

fn default_low_pct() -> f64 {
    20.0
}

fn default_critical_pct() -> f64 {
    10.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChemicalConfig {
    pub name: String,
    pub pump: EquipmentId,
    /// Flow being dosed (m³/h).
    pub flow_sensor: SensorId,
    pub law: DoseLaw,
    /// Active chemical per litre of product (g/L).
    pub solution_g_per_l: f64,
    /// Product delivered at 100% stroke (L/h).
    pub pump_capacity_l_per_h: f64,
    #[serde(default)]
    pub min_dose_mg_l: f64,
    pub max_dose_mg_l: f64,
    #[serde(default)]
    pub tank: Option<TankConfig>,
}

impl ChemicalConfig {
    fn validate(&self) -> ControlResult<()> {
        let invalid = |what: String| ControlError::InvalidConfig {
            controller: ID,
            what: format!("chemical {}: {what}", self.name),
        };
        if self.name.trim().is_empty() {
            return Err(ControlError::InvalidConfig {
                controller: ID,
                what: "chemical name must not be empty".to_string(),
            });
        }
        if !(self.solution_g_per_l > 0.0) {
            return Err(invalid("solution_g_per_l must be positive".into()));
        }
        if !(self.pump_capacity_l_per_h > 0.0) {
            return Err(invalid("pump_capacity_l_per_h must be positive".into()));
        }
        if !(self.min_dose_mg_l >= 0.0 && self.min_dose_mg_l <= self.max_dose_mg_l) {
            return Err(invalid("dose limits must satisfy 0 <= min <= max".into()));
        }
        match &self.law {
            DoseLaw::Curve { points, .. } => {
                if points.len() < 2 {
                    return Err(invalid("dose curve needs at least two points".into()));
                }
                if points.windows(2).any(|w| !(w[0].0 < w[1].0)) {
                    return Err(invalid("dose curve must be strictly increasing in x".into()));
                }
            }
            DoseLaw::Residual {
                target_mg_l,
                demand_mg_l,
                ..
            } => {
                if *target_mg_l < 0.0 || *demand_mg_l < 0.0 {
                    return Err(invalid("residual target and demand must be non-negative".into()));
                }
            }
        }
        if let Some(tank) = &self.tank
            && !(tank.capacity_l > 0.0 && tank.critical_pct < tank.low_pct)
        {
            return Err(invalid(format!(
                "tank needs positive capacity and critical_pct ({}) below low_pct ({})",
                tank.critical_pct, tank.low_pct
            )));
        }
        Ok(())
    }

    /// Unclipped dose from the configured law.
    fn raw_dose(&self, ctx: &CycleContext<'_>) -> ControlResult<f64> {
        let dose = match &self.law {
            DoseLaw::Curve { driver, points } => {
                let x = ctx.snapshot.value(driver)?;
                interpolate(points, x).ok_or(ControlError::InvalidArg {
                    what: "dose curve has no points",
                })?
            }
            DoseLaw::Residual {
                residual_sensor,
                target_mg_l,
                demand_mg_l,
            } => {
                let residual = ctx.snapshot.value(residual_sensor)?;
                demand_mg_l + target_mg_l - residual
            }
        };
        Ok(ensure_finite(dose, "chemical dose")?)
    }

    /// Pump stroke (%) for a dose at a flow. Unclipped.
    pub fn stroke_pct(&self, dose_mg_l: f64, flow_m3_h: f64) -> f64 {
        let grams_per_h = dose_mg_l * flow_m3_h;
        let litres_per_h = grams_per_h / self.solution_g_per_l;
        litres_per_h / self.pump_capacity_l_per_h * 100.0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DosingConfig {
    pub chemicals: Vec<ChemicalConfig>,
}

impl DosingConfig {
    pub fn validate(&self) -> ControlResult<()> {
        let mut names = BTreeSet::new();
        let mut pumps = BTreeSet::new();
        for chemical in &self.chemicals {
            chemical.validate()?;
            if !names.insert(chemical.name.as_str()) {
                return Err(ControlError::InvalidConfig {
                    controller: ID,
                    what: format!("duplicate chemical {}", chemical.name),
                });
            }
            if !pumps.insert(&chemical.pump) {
                return Err(ControlError::InvalidConfig {
                    controller: ID,
                    what: format!("pump {} doses more than one chemical", chemical.pump),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DosingController {
    pub config: DosingConfig,
}

impl DosingController {
    pub fn new(config: DosingConfig) -> ControlResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn evaluate(&self, ctx: &CycleContext<'_>) -> ControlResult<ControllerOutput> {
        let mut out = ControllerOutput::new(ID, Mode::Normal, ControllerMemory::Dosing);
        for chemical in &self.config.chemicals {
            self.dose(ctx, chemical, &mut out)?;
        }
        Ok(out)
    }

    fn dose(&self, ctx: &CycleContext<'_>, chemical: &ChemicalConfig, out: &mut ControllerOutput) -> ControlResult<()> {
        let name = chemical.name.as_str();
        let source = AlarmSource::Controller(ID);
        let flow = ensure_finite(ctx.snapshot.value(&chemical.flow_sensor)?, "dosed flow")?.max(0.0);

        let raw = chemical.raw_dose(ctx)?;
        let dose = raw.clamp(chemical.min_dose_mg_l, chemical.max_dose_mg_l);
        out.observations.push(if dose != raw {
            Observation::active(
                source,
                AlarmCategory::DoseOutOfRange,
                name,
                Severity::Warning,
                format!(
                    "{name} dose {raw:.2} mg/L outside {:.2}..{:.2} mg/L; clipped to {dose:.2} mg/L",
                    chemical.min_dose_mg_l, chemical.max_dose_mg_l
                ),
            )
        } else {
            Observation::inactive(source, AlarmCategory::DoseOutOfRange, name)
        });

        let stroke_raw = chemical.stroke_pct(dose, flow);
        let stroke = stroke_raw.min(100.0);
        let pump_subject = format!("{name}.pump");
        out.observations.push(if stroke_raw > 100.0 {
            warn!(chemical = name, stroke_raw, "dosing pump saturated");
            Observation::active(
                source,
                AlarmCategory::DoseOutOfRange,
                pump_subject.as_str(),
                Severity::Warning,
                format!("{name} pump needs {stroke_raw:.0}% stroke; clipped at 100%, dose not met"),
            )
        } else {
            Observation::inactive(source, AlarmCategory::DoseOutOfRange, pump_subject.as_str())
        });
        out.command(
            &chemical.pump,
            if stroke > 0.0 {
                ActuatorCommand::on(stroke)
            } else {
                ActuatorCommand::off()
            },
        )?;

        let mut tank_l = None;
        if let Some(tank) = &chemical.tank {
            let tank_subject = format!("{name}.tank");
            match ctx.snapshot.value_opt(&tank.level_sensor) {
                Some(pct) => {
                    let litres = pct / 100.0 * tank.capacity_l;
                    tank_l = Some(litres);
                    let severity = if pct <= tank.critical_pct {
                        Some(Severity::Critical)
                    } else if pct <= tank.low_pct {
                        Some(Severity::Warning)
                    } else {
                        None
                    };
                    out.observations.push(match severity {
                        Some(severity) => Observation::active(
                            source,
                            AlarmCategory::ChemicalTankLow,
                            tank_subject.as_str(),
                            severity,
                            format!("{name} tank low: {pct:.1}% ({litres:.0} L remaining)"),
                        ),
                        None => Observation::inactive(source, AlarmCategory::ChemicalTankLow, tank_subject.as_str()),
                    });
                }
                None => {
                    warn!(chemical = name, sensor = %tank.level_sensor, "tank level never reported");
                }
            }
        }

        out.metric(format!("dosing.{name}.dose_mg_l"), Some(dose), "mg/L");
        out.metric(format!("dosing.{name}.stroke_pct"), Some(stroke), "%");
        out.metric(
            format!("dosing.{name}.feed_kg_h"),
            Some(dose * flow / 1000.0),
            "kg/h",
        );
        out.metric(format!("dosing.{name}.tank_l"), tank_l, "L");
        Ok(())
    }
}
