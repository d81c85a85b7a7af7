//! Redundant equipment coordination.
//!
//! Pumps and blowers are organised in redundancy groups. Controllers ask a
//! group for capacity; the coordinator decides which units run and at what
//! speed, detects failed units and moves their share onto the survivors.

pub mod allocation;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod shared;
pub mod unit;

pub use allocation::Allocation;
pub use config::{EquipmentConfig, GroupConfig, UnitConfig};
pub use coordinator::EquipmentCoordinator;
pub use error::{EquipmentError, EquipmentResult};
pub use shared::{CapacityBroker, SharedCoordinator};
pub use unit::{EquipmentUnit, Health, UnitStatus};
