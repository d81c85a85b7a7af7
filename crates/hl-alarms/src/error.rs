//! Error types for alarm handling.

use thiserror::Error;

pub type AlarmResult<T> = Result<T, AlarmError>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AlarmError {
    /// No open alarm carries this id.
    #[error("Unknown alarm id: {id}")]
    UnknownAlarm { id: u64 },

    /// A threshold rule is malformed.
    #[error("Invalid threshold rule for {sensor}: {what}")]
    InvalidRule { sensor: String, what: &'static str },

    /// Unrecognised source or category text in a published record.
    #[error("Unrecognised alarm field {field}: {value}")]
    Unrecognised { field: &'static str, value: String },
}

impl From<AlarmError> for hl_core::HlError {
    fn from(e: AlarmError) -> Self {
        hl_core::HlError::config(e.to_string())
    }
}
