//! Sampled PI loops: the influent flow trim and the dissolved-oxygen
//! correction.
//!
//! [`PiLoop`] is configuration only. The integral lives in [`PiState`], which
//! the owning controller carries in its memory and commits after dispatch.
//! Every evaluation returns a [`PiStep`]: the next state, the limited output
//! and which limit, if any, the output sits on.

use serde::{Deserialize, Serialize};

use crate::error::{ControlError, ControlResult};

/// PI loop configuration. Output is in the unit of whatever it trims.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PiLoop {
    pub kp: f64,
    /// Integral time (s).
    pub ti_s: f64,
    pub out_min: f64,
    pub out_max: f64,
    /// Bound on the accumulated error (error × s), applied before the output limits.
    #[serde(default)]
    pub integral_limit: Option<f64>,
}

/// Where the output ended up relative to its range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Saturation {
    #[default]
    Within,
    AtMin,
    AtMax,
}

/// Integral accumulator (error × s).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PiState {
    pub integral: f64,
}

/// Result of one evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct PiStep {
    pub state: PiState,
    pub output: f64,
    pub saturation: Saturation,
}

impl PiLoop {
    pub fn new(kp: f64, ti_s: f64, out_min: f64, out_max: f64) -> ControlResult<Self> {
        let pi = Self {
            kp,
            ti_s,
            out_min,
            out_max,
            integral_limit: None,
        };
        pi.validate()?;
        Ok(pi)
    }

    pub fn with_integral_limit(mut self, limit: f64) -> Self {
        self.integral_limit = Some(limit);
        self
    }

    pub fn validate(&self) -> ControlResult<()> {
        let invalid = |what: &'static str| -> ControlResult<()> { Err(ControlError::InvalidArg { what }) };
        if !self.kp.is_finite() {
            return invalid("kp must be finite");
        }
        if !(self.ti_s.is_finite() && self.ti_s > 0.0) {
            return invalid("ti_s must be positive");
        }
        if !(self.out_min.is_finite() && self.out_max.is_finite()) {
            return invalid("output limits must be finite");
        }
        if !(self.out_min < self.out_max) {
            return invalid("out_min must be less than out_max");
        }
        if self.integral_limit.is_some_and(|limit| !(limit > 0.0)) {
            return invalid("integral_limit must be positive");
        }
        Ok(())
    }

    /// Same gains with the output range intersected with `[min, max]`.
    ///
    /// The result may be empty; check it with [`PiLoop::validate`].
    pub fn narrowed(&self, min: f64, max: f64) -> Self {
        Self {
            out_min: self.out_min.max(min),
            out_max: self.out_max.min(max),
            ..self.clone()
        }
    }

    fn output(&self, error: f64, integral: f64) -> (f64, Saturation) {
        let raw = self.kp * error + self.kp / self.ti_s * integral;
        if raw > self.out_max {
            (self.out_max, Saturation::AtMax)
        } else if raw < self.out_min {
            (self.out_min, Saturation::AtMin)
        } else {
            (raw, Saturation::Within)
        }
    }

    /// Advance one sample of `dt_s` seconds.
    ///
    /// Clamping anti-windup: the integral is not moved further into a limit
    /// the output already sits on, but it does move back out of it as soon
    /// as the error changes sign.
    pub fn update(&self, state: &PiState, measured: f64, target: f64, dt_s: f64) -> PiStep {
        let error = target - measured;
        let mut integral = state.integral + error * dt_s;
        if let Some(limit) = self.integral_limit {
            integral = integral.clamp(-limit, limit);
        }
        let (output, saturation) = self.output(error, integral);
        let winding = match saturation {
            Saturation::AtMax => error > 0.0,
            Saturation::AtMin => error < 0.0,
            Saturation::Within => false,
        };
        PiStep {
            state: if winding { state.clone() } else { PiState { integral } },
            output,
            saturation,
        }
    }

    /// Evaluate with the integral frozen (Degraded operation).
    pub fn hold(&self, state: &PiState, measured: f64, target: f64) -> PiStep {
        let (output, saturation) = self.output(target - measured, state.integral);
        PiStep {
            state: state.clone(),
            output,
            saturation,
        }
    }
}
