//! Plant configuration validation.
//!
//! Everything here is fatal at start-up: the orchestrator refuses to run a
//! configuration that fails any check.

use std::collections::{BTreeSet, HashSet};

use hl_controls::{ProcessController, build_controllers};
use hl_core::EquipmentId;
use hl_equipment::EquipmentCoordinator;

use crate::schema::{LATEST_VERSION, PlantConfig};

#[derive(thiserror::Error, Debug)]
pub enum ValidationError {
    #[error("Duplicate ID: {id} in {context}")]
    DuplicateId { id: String, context: String },

    #[error("Missing reference: {id} in {context}")]
    MissingReference { id: String, context: String },

    #[error("Invalid value: {field} = {value} ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Invalid {context}: {what}")]
    Component { context: String, what: String },

    #[error("Unsupported version: {version}")]
    UnsupportedVersion { version: u32 },
}

fn component(context: &str, e: impl std::fmt::Display) -> ValidationError {
    ValidationError::Component {
        context: context.to_string(),
        what: e.to_string(),
    }
}

pub fn validate_plant(config: &PlantConfig) -> Result<(), ValidationError> {
    if config.version > LATEST_VERSION {
        return Err(ValidationError::UnsupportedVersion {
            version: config.version,
        });
    }

    if config.cycle.period_ms == 0 {
        return Err(ValidationError::InvalidValue {
            field: "cycle.period_ms".to_string(),
            value: "0".to_string(),
            reason: "cycle period must be positive".to_string(),
        });
    }
    if config.cycle.snapshot_timeout_ms >= config.cycle.period_ms {
        return Err(ValidationError::InvalidValue {
            field: "cycle.snapshot_timeout_ms".to_string(),
            value: config.cycle.snapshot_timeout_ms.to_string(),
            reason: "snapshot timeout must be shorter than the cycle period".to_string(),
        });
    }

    let mut unit_ids = HashSet::new();
    for group in &config.equipment.groups {
        for unit in &group.units {
            if !unit_ids.insert(&unit.id) {
                return Err(ValidationError::DuplicateId {
                    id: unit.id.to_string(),
                    context: "equipment units".to_string(),
                });
            }
        }
    }
    let coordinator = EquipmentCoordinator::new(&config.equipment).map_err(|e| component("equipment", e))?;

    let controllers =
        build_controllers(&config.controllers, &config.alarms.thresholds).map_err(|e| component("controllers", e))?;

    for (group, context) in [
        (&config.controllers.intake.pump_group, "controllers.intake.pump_group"),
        (&config.controllers.aeration.blower_group, "controllers.aeration.blower_group"),
    ] {
        if !coordinator.has_group(group) {
            return Err(ValidationError::MissingReference {
                id: group.to_string(),
                context: context.to_string(),
            });
        }
    }

    let direct: BTreeSet<EquipmentId> = controllers.iter().flat_map(ProcessController::direct_actuators).collect();
    for id in &direct {
        if coordinator.is_group_member(id) {
            return Err(ValidationError::InvalidValue {
                field: "controllers".to_string(),
                value: id.to_string(),
                reason: "redundant units are commanded through their group, not directly".to_string(),
            });
        }
    }

    if config.alarms.history_capacity == 0 {
        return Err(ValidationError::InvalidValue {
            field: "alarms.history_capacity".to_string(),
            value: "0".to_string(),
            reason: "must keep at least one cleared alarm".to_string(),
        });
    }
    if config.alarms.clear_debounce_cycles == 0 {
        return Err(ValidationError::InvalidValue {
            field: "alarms.clear_debounce_cycles".to_string(),
            value: "0".to_string(),
            reason: "debounce must be at least one cycle".to_string(),
        });
    }
    for target in config.alarms.emergency_actions.targets() {
        if !direct.contains(target) && !coordinator.is_group_member(target) {
            return Err(ValidationError::MissingReference {
                id: target.to_string(),
                context: "alarms.emergency_actions".to_string(),
            });
        }
    }

    if config.kpi.trend_capacity == 0 {
        return Err(ValidationError::InvalidValue {
            field: "kpi.trend_capacity".to_string(),
            value: "0".to_string(),
            reason: "trend buffers need room for one sample".to_string(),
        });
    }
    let mut removal_names = HashSet::new();
    for removal in &config.kpi.removals {
        if !removal_names.insert(removal.name.as_str()) {
            return Err(ValidationError::DuplicateId {
                id: removal.name.clone(),
                context: "kpi.removals".to_string(),
            });
        }
    }

    Ok(())
}
