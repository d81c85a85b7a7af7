//! Exclusive-access path to the coordinator for controllers that may be
//! evaluated in parallel.

use std::sync::{Mutex, MutexGuard};

use hl_core::GroupId;

use crate::allocation::Allocation;
use crate::coordinator::EquipmentCoordinator;
use crate::error::{EquipmentError, EquipmentResult};

/// What a controller may ask of the equipment layer.
pub trait CapacityBroker: Sync {
    /// Allocate `demand` across a redundancy group.
    fn request(&self, group: &GroupId, demand: f64) -> EquipmentResult<Allocation>;

    /// Installed capacity of a group.
    fn installed_capacity(&self, group: &GroupId) -> EquipmentResult<f64>;
}

/// Mutex-guarded coordinator. Every request is serialized, so two controllers
/// can never book the same unit.
#[derive(Debug)]
pub struct SharedCoordinator {
    inner: Mutex<EquipmentCoordinator>,
}

impl SharedCoordinator {
    pub fn new(coordinator: EquipmentCoordinator) -> Self {
        Self {
            inner: Mutex::new(coordinator),
        }
    }

    pub fn lock(&self) -> EquipmentResult<MutexGuard<'_, EquipmentCoordinator>> {
        self.inner.lock().map_err(|_| EquipmentError::Poisoned)
    }

    /// Exclusive access without locking, for the orchestrator between
    /// parallel sections.
    pub fn get_mut(&mut self) -> EquipmentResult<&mut EquipmentCoordinator> {
        self.inner.get_mut().map_err(|_| EquipmentError::Poisoned)
    }
}

impl CapacityBroker for SharedCoordinator {
    fn request(&self, group: &GroupId, demand: f64) -> EquipmentResult<Allocation> {
        self.lock()?.request(group, demand)
    }

    fn installed_capacity(&self, group: &GroupId) -> EquipmentResult<f64> {
        self.lock()?.installed_capacity(group)
    }
}
