//! Dissolved-oxygen control of the blower group.

use hl_core::{ControllerId, GroupId, SensorId, ensure_finite};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::context::{ControllerMemory, ControllerOutput, CycleContext};
use crate::error::{ControlError, ControlResult};
use crate::mode::Mode;
use crate::pi::{PiLoop, PiState};

const ID: ControllerId = ControllerId::Aeration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AerationConfig {
    pub do_sensor: SensorId,
    /// Dissolved-oxygen setpoint (mg/L).
    pub do_setpoint: f64,
    pub blower_group: GroupId,
    /// Feed-forward air output (% of installed capacity).
    pub base_output_pct: f64,
    /// Correction on top of the base output, in % of installed capacity.
    pub do_loop: PiLoop,
    /// Floor of the total air output (%).
    #[serde(default)]
    pub min_turndown_pct: f64,
}

impl AerationConfig {
    pub fn validate(&self) -> ControlResult<()> {
        let invalid = |what: &str| ControlError::InvalidConfig {
            controller: ID,
            what: what.to_string(),
        };
        self.do_loop.validate()?;
        if !(self.do_setpoint > 0.0) {
            return Err(invalid("do_setpoint must be positive"));
        }
        if !(0.0..=100.0).contains(&self.min_turndown_pct) {
            return Err(invalid("min_turndown_pct must be within 0..=100"));
        }
        if !(0.0..=100.0).contains(&self.base_output_pct) {
            return Err(invalid("base_output_pct must be within 0..=100"));
        }
        self.correction_loop()
            .validate()
            .map_err(|_| invalid("do_loop output range cannot reach the turndown..100 air output"))?;
        Ok(())
    }

    /// The DO loop narrowed to corrections the air output can realize.
    ///
    /// The integral freezes as soon as the output sits on the turndown floor
    /// or at full air, not only at the loop's own configured limits.
    pub fn correction_loop(&self) -> PiLoop {
        self.do_loop
            .narrowed(self.min_turndown_pct - self.base_output_pct, 100.0 - self.base_output_pct)
    }

    pub fn output_pct(&self, correction: f64) -> f64 {
        (self.base_output_pct + correction).clamp(self.min_turndown_pct, 100.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AerationController {
    pub config: AerationConfig,
    pub memory: PiState,
}

impl AerationController {
    pub fn new(config: AerationConfig) -> ControlResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            memory: PiState::default(),
        })
    }

    pub fn evaluate(&self, ctx: &CycleContext<'_>) -> ControlResult<ControllerOutput> {
        let cfg = &self.config;
        let dissolved_oxygen = ensure_finite(ctx.snapshot.value(&cfg.do_sensor)?, "dissolved oxygen")?;
        let step = cfg
            .correction_loop()
            .update(&self.memory, dissolved_oxygen, cfg.do_setpoint, ctx.dt_s);
        let output_pct = cfg.output_pct(step.output);

        let installed = ctx.equipment.installed_capacity(&cfg.blower_group)?;
        let air_demand = output_pct / 100.0 * installed;
        debug!(
            cycle = ctx.cycle,
            dissolved_oxygen,
            output_pct,
            air_demand,
            saturation = ?step.saturation,
            "aeration demand"
        );
        let allocation = ctx.equipment.request(&cfg.blower_group, air_demand)?;
        let running = allocation.running();

        let mut out = ControllerOutput::new(ID, Mode::Normal, ControllerMemory::Aeration(step.state));
        out.absorb(allocation)?;
        out.metric("aeration.dissolved_oxygen", Some(dissolved_oxygen), "mg/L");
        out.metric("aeration.do_error", Some(cfg.do_setpoint - dissolved_oxygen), "mg/L");
        out.metric("aeration.output_pct", Some(output_pct), "%");
        out.metric("aeration.air_demand", Some(air_demand), "Nm3/h");
        out.metric("aeration.blowers_running", Some(running as f64), "count");
        Ok(out)
    }
}
