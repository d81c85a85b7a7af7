//! Error types for the orchestration layer.

use hl_alarms::AlarmError;
use hl_controls::ControlError;
use hl_core::HlError;
use hl_equipment::EquipmentError;
use hl_project::ProjectError;

/// Errors that can stop a cycle or an operator request.
#[derive(Debug, thiserror::Error)]
pub enum PlantError {
    #[error("Configuration error: {0}")]
    Project(#[from] ProjectError),

    #[error("Equipment error: {0}")]
    Equipment(#[from] EquipmentError),

    #[error("Control error: {0}")]
    Control(#[from] ControlError),

    #[error("Alarm error: {0}")]
    Alarm(#[from] AlarmError),

    #[error(transparent)]
    Core(#[from] HlError),

    #[error("Snapshot not available within {timeout_ms} ms")]
    SnapshotTimeout { timeout_ms: u64 },

    #[error("Unknown controller: {name}")]
    UnknownController { name: String },

    #[error("Malformed record field {field}: {what}")]
    Record { field: String, what: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for hl-plant operations.
pub type PlantResult<T> = Result<T, PlantError>;

impl From<PlantError> for HlError {
    fn from(e: PlantError) -> Self {
        match e {
            PlantError::Core(inner) => inner,
            PlantError::Project(p) => p.into(),
            other => HlError::config(other.to_string()),
        }
    }
}
