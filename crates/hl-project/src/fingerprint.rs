//! Content-based configuration identity.

use sha2::{Digest, Sha256};

use crate::ProjectResult;
use crate::schema::PlantConfig;

/// SHA-256 of the canonical JSON form, as lowercase hex.
pub fn fingerprint(config: &PlantConfig) -> ProjectResult<String> {
    let json = serde_json::to_vec(config)?;
    let mut hasher = Sha256::new();
    hasher.update(&json);
    Ok(format!("{:x}", hasher.finalize()))
}
