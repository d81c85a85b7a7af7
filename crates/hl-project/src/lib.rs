//! hl-project: plant configuration file format and validation.

pub mod fingerprint;
pub mod schema;
pub mod validate;

pub use fingerprint::fingerprint;
pub use schema::*;
pub use validate::{ValidationError, validate_plant};

use hl_core::HlError;

pub type ProjectResult<T> = Result<T, ProjectError>;

#[derive(thiserror::Error, Debug)]
pub enum ProjectError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<ProjectError> for HlError {
    fn from(e: ProjectError) -> Self {
        HlError::config(e.to_string())
    }
}

pub fn from_yaml_str(content: &str) -> ProjectResult<PlantConfig> {
    let config: PlantConfig = serde_yaml::from_str(content)?;
    validate_plant(&config)?;
    Ok(config)
}

pub fn load_yaml(path: &std::path::Path) -> ProjectResult<PlantConfig> {
    let content = std::fs::read_to_string(path)?;
    from_yaml_str(&content)
}

pub fn save_yaml(path: &std::path::Path, config: &PlantConfig) -> ProjectResult<()> {
    validate_plant(config)?;
    let content = serde_yaml::to_string(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

pub fn load_json(path: &std::path::Path) -> ProjectResult<PlantConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: PlantConfig = serde_json::from_str(&content)?;
    validate_plant(&config)?;
    Ok(config)
}

pub fn save_json(path: &std::path::Path, config: &PlantConfig) -> ProjectResult<()> {
    validate_plant(config)?;
    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Load by extension: `.json` as JSON, anything else as YAML.
pub fn load(path: &std::path::Path) -> ProjectResult<PlantConfig> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => load_json(path),
        _ => load_yaml(path),
    }
}
