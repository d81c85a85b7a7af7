use thiserror::Error;

use crate::ids::ControllerId;

pub type HlResult<T> = Result<T, HlError>;

/// Plant-wide fault taxonomy.
///
/// `SensorUnavailable` and `ActuatorRejected` are recovered where they occur
/// (last-known-good value, held command). `CapacityExceeded` always surfaces
/// as a Critical alarm. `ConfigInvalid` is fatal at start-up.
/// `ControllerFault` is contained to the controller that produced it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HlError {
    #[error("Sensor unavailable: {sensor}")]
    SensorUnavailable { sensor: String },

    #[error("Actuator rejected command for {equipment}: {reason}")]
    ActuatorRejected { equipment: String, reason: String },

    #[error("Capacity exceeded in group {group}: demanded {demanded:.1}, available {available:.1}")]
    CapacityExceeded {
        group: String,
        demanded: f64,
        available: f64,
    },

    #[error("Invalid configuration: {what}")]
    ConfigInvalid { what: String },

    #[error("Controller fault in {controller}: {what}")]
    ControllerFault {
        controller: ControllerId,
        what: String,
    },

    #[error("Non-finite numeric value for {what}: {value}")]
    NonFinite { what: &'static str, value: f64 },

    #[error("Duplicate command for {equipment}")]
    DuplicateCommand { equipment: String },
}

impl HlError {
    pub fn config(what: impl Into<String>) -> Self {
        Self::ConfigInvalid { what: what.into() }
    }

    pub fn fault(controller: ControllerId, what: impl Into<String>) -> Self {
        Self::ControllerFault {
            controller,
            what: what.into(),
        }
    }
}
