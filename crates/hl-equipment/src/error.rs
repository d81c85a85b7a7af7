//! Error types for equipment coordination.

use hl_core::HlError;
use thiserror::Error;

pub type EquipmentResult<T> = Result<T, EquipmentError>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EquipmentError {
    #[error("Unknown redundancy group: {group}")]
    UnknownGroup { group: String },

    #[error("Unknown equipment unit: {unit}")]
    UnknownUnit { unit: String },

    #[error("Invalid equipment configuration: {what}")]
    InvalidConfig { what: String },

    #[error("Non-finite demand for group {group}: {value}")]
    NonFiniteDemand { group: String, value: f64 },

    #[error("Equipment coordinator lock poisoned")]
    Poisoned,
}

impl From<EquipmentError> for HlError {
    fn from(e: EquipmentError) -> Self {
        match e {
            EquipmentError::InvalidConfig { what } => HlError::ConfigInvalid { what },
            other => HlError::ConfigInvalid {
                what: other.to_string(),
            },
        }
    }
}
