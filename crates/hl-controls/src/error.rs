//! Error types for controller evaluation.

use hl_core::{ControllerId, HlError};
use hl_equipment::EquipmentError;
use thiserror::Error;

/// Result type for controller operations.
pub type ControlResult<T> = Result<T, ControlError>;

/// Errors that can occur while configuring or evaluating a controller.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ControlError {
    /// Invalid argument provided to a control function.
    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    /// A controller configuration is unusable.
    #[error("Invalid {controller} configuration: {what}")]
    InvalidConfig {
        controller: ControllerId,
        what: String,
    },

    /// A sensor needed by the control law has never reported.
    #[error("Sensor unavailable: {sensor}")]
    Sensor { sensor: String },

    /// A computed or measured value is NaN or infinite.
    #[error("Non-finite value for {what}: {value}")]
    NonFinite { what: &'static str, value: f64 },

    /// The equipment layer refused a request.
    #[error("Equipment error: {0}")]
    Equipment(#[from] EquipmentError),

    /// Controller state error.
    #[error("Controller state error: {what}")]
    StateError { what: String },
}

impl From<HlError> for ControlError {
    fn from(e: HlError) -> Self {
        match e {
            HlError::SensorUnavailable { sensor } => Self::Sensor { sensor },
            HlError::NonFinite { what, value } => Self::NonFinite { what, value },
            other => Self::StateError {
                what: other.to_string(),
            },
        }
    }
}

impl ControlError {
    /// Express as the plant-wide taxonomy, attributed to `controller`.
    pub fn into_fault(self, controller: ControllerId) -> HlError {
        match self {
            Self::InvalidConfig { what, .. } => HlError::ConfigInvalid { what },
            other => HlError::fault(controller, other.to_string()),
        }
    }
}
