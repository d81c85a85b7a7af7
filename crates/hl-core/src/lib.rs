//! hl-core: shared vocabulary for the hydroloop control core.
//!
//! Contains:
//! - ids (sensor, equipment, group and controller identifiers)
//! - reading (typed sensor values and the per-cycle `SensorSnapshot`)
//! - command (actuator commands and the one-command-per-id `CommandSet`)
//! - units (uom SI helpers for flows and areas)
//! - numeric (finite checks, clamping, interpolation)
//! - error (the plant-wide fault taxonomy)

pub mod command;
pub mod error;
pub mod ids;
pub mod numeric;
pub mod reading;
pub mod units;

pub use command::{ActuatorCommand, CommandSet};
pub use error::{HlError, HlResult};
pub use ids::{ControllerId, EquipmentId, GroupId, SensorId};
pub use numeric::*;
pub use reading::{Reading, SensorSnapshot};
