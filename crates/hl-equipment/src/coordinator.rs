//! The equipment coordinator: sole owner of every `EquipmentUnit`.

use std::collections::{BTreeMap, BTreeSet};

use hl_alarms::{AlarmCategory, AlarmSource, Observation, Severity};
use hl_core::{
    ActuatorCommand, CAPACITY_EPS, CommandSet, EquipmentId, GroupId, SensorId, SensorSnapshot,
};
use tracing::{error, info, warn};

use crate::allocation::{Allocation, Candidate, preference, select};
use crate::config::EquipmentConfig;
use crate::error::{EquipmentError, EquipmentResult};
use crate::unit::{EquipmentUnit, Health, UnitStatus};

#[derive(Debug, Clone)]
struct RedundancyGroup {
    section: String,
    min_turndown_pct: f64,
    units: Vec<EquipmentId>,
    last_demand: f64,
}

#[derive(Debug, Clone)]
pub struct EquipmentCoordinator {
    units: BTreeMap<EquipmentId, EquipmentUnit>,
    groups: BTreeMap<GroupId, RedundancyGroup>,
    feedback_timeout_cycles: u32,
    rotation_hysteresis_h: f64,
}

impl EquipmentCoordinator {
    /// Build from configuration.
    ///
    /// Refuses to start if a unit is listed twice, a group is empty, a
    /// capacity is not positive, or a group has no healthy unit.
    pub fn new(config: &EquipmentConfig) -> EquipmentResult<Self> {
        let invalid = |what: String| EquipmentError::InvalidConfig { what };
        let mut units = BTreeMap::new();
        let mut groups = BTreeMap::new();

        for group in &config.groups {
            if groups.contains_key(&group.id) {
                return Err(invalid(format!("duplicate group '{}'", group.id)));
            }
            if group.units.is_empty() {
                return Err(invalid(format!("group '{}' has no units", group.id)));
            }
            if !(0.0..=100.0).contains(&group.min_turndown_pct) {
                return Err(invalid(format!(
                    "group '{}' turndown {} outside [0, 100]",
                    group.id, group.min_turndown_pct
                )));
            }
            if !group.units.iter().any(|u| u.initial_health == Health::Healthy) {
                return Err(invalid(format!("group '{}' has no healthy unit", group.id)));
            }
            for unit in &group.units {
                if !(unit.capacity.is_finite() && unit.capacity > 0.0) {
                    return Err(invalid(format!(
                        "unit '{}' capacity must be positive",
                        unit.id
                    )));
                }
                let existing = units.insert(
                    unit.id.clone(),
                    EquipmentUnit {
                        id: unit.id.clone(),
                        group: group.id.clone(),
                        capacity: unit.capacity,
                        health: unit.initial_health,
                        command: ActuatorCommand::off(),
                        runtime_h: 0.0,
                        unconfirmed_cycles: 0,
                    },
                );
                if let Some(prev) = existing {
                    return Err(invalid(format!(
                        "unit '{}' belongs to both '{}' and '{}'",
                        unit.id, prev.group, group.id
                    )));
                }
            }
            groups.insert(
                group.id.clone(),
                RedundancyGroup {
                    section: group.section.clone(),
                    min_turndown_pct: group.min_turndown_pct,
                    units: group.units.iter().map(|u| u.id.clone()).collect(),
                    last_demand: 0.0,
                },
            );
        }

        Ok(Self {
            units,
            groups,
            feedback_timeout_cycles: config.feedback_timeout_cycles,
            rotation_hysteresis_h: config.rotation_hysteresis_h,
        })
    }

    /// Rebuild for a new configuration, keeping runtime, health and the
    /// current command of units that still exist.
    pub fn reconfigured(&self, config: &EquipmentConfig) -> EquipmentResult<Self> {
        let mut next = Self::new(config)?;
        for (id, unit) in next.units.iter_mut() {
            if let Some(old) = self.units.get(id) {
                unit.runtime_h = old.runtime_h;
                unit.health = old.health;
                unit.command = old.command;
            }
        }
        for (id, group) in next.groups.iter_mut() {
            if let Some(old) = self.groups.get(id) {
                group.last_demand = old.last_demand;
            }
        }
        Ok(next)
    }

    fn group(&self, id: &GroupId) -> EquipmentResult<&RedundancyGroup> {
        self.groups.get(id).ok_or_else(|| EquipmentError::UnknownGroup {
            group: id.to_string(),
        })
    }

    /// Installed capacity of a group, failed units included.
    pub fn installed_capacity(&self, group: &GroupId) -> EquipmentResult<f64> {
        Ok(self
            .group(group)?
            .units
            .iter()
            .filter_map(|id| self.units.get(id))
            .map(|u| u.capacity)
            .sum())
    }

    /// Capacity of the units in a group that are not failed.
    pub fn available_capacity(&self, group: &GroupId) -> EquipmentResult<f64> {
        Ok(self
            .group(group)?
            .units
            .iter()
            .filter_map(|id| self.units.get(id))
            .filter(|u| u.health.is_available())
            .map(|u| u.capacity)
            .sum())
    }

    pub fn has_group(&self, group: &GroupId) -> bool {
        self.groups.contains_key(group)
    }

    pub fn is_group_member(&self, unit: &EquipmentId) -> bool {
        self.units.contains_key(unit)
    }

    pub fn members(&self, group: &GroupId) -> EquipmentResult<&[EquipmentId]> {
        Ok(&self.group(group)?.units)
    }

    pub fn last_demand(&self, group: &GroupId) -> EquipmentResult<f64> {
        Ok(self.group(group)?.last_demand)
    }

    /// Allocate `demand` across the group and record the resulting unit commands.
    pub fn request(&mut self, group_id: &GroupId, demand: f64) -> EquipmentResult<Allocation> {
        if !demand.is_finite() {
            return Err(EquipmentError::NonFiniteDemand {
                group: group_id.to_string(),
                value: demand,
            });
        }
        let demand = demand.max(0.0);
        let group = self.group(group_id)?.clone();

        let mut available: Vec<&EquipmentUnit> = group
            .units
            .iter()
            .filter_map(|id| self.units.get(id))
            .filter(|u| u.health.is_available())
            .collect();
        available.sort_by(|a, b| a.id.cmp(&b.id));
        let mut candidates: Vec<(Candidate, EquipmentId)> = available
            .iter()
            .map(|u| {
                let bonus = if u.command.enabled {
                    self.rotation_hysteresis_h
                } else {
                    0.0
                };
                (
                    Candidate {
                        capacity: u.capacity,
                        degraded: u.health == Health::Degraded,
                        effective_runtime_h: u.runtime_h - bonus,
                    },
                    u.id.clone(),
                )
            })
            .collect();
        candidates.sort_by(|a, b| preference(&a.0, &b.0));
        let available_capacity: f64 = candidates.iter().map(|(c, _)| c.capacity).sum();

        let plain: Vec<Candidate> = candidates.iter().map(|(c, _)| *c).collect();
        let picked: BTreeSet<EquipmentId> = select(&plain, demand)
            .into_iter()
            .map(|i| candidates[i].1.clone())
            .collect();
        let running_capacity: f64 = candidates
            .iter()
            .filter(|(_, id)| picked.contains(id))
            .map(|(c, _)| c.capacity)
            .sum();

        let speed_pct = if running_capacity > 0.0 {
            (demand / running_capacity * 100.0).clamp(group.min_turndown_pct, 100.0)
        } else {
            0.0
        };

        let mut commands = CommandSet::new();
        for id in &group.units {
            let command = if picked.contains(id) {
                ActuatorCommand::on(speed_pct)
            } else {
                ActuatorCommand::off()
            };
            if let Some(unit) = self.units.get_mut(id) {
                if !command.enabled || !unit.command.enabled {
                    unit.unconfirmed_cycles = 0;
                }
                unit.command = command;
            }
            commands.force(id.clone(), command);
        }
        if let Some(g) = self.groups.get_mut(group_id) {
            g.last_demand = demand;
        }

        let allocated = running_capacity * speed_pct / 100.0;
        let mut allocation = Allocation {
            group: group_id.clone(),
            demand,
            available: available_capacity,
            allocated,
            speed_pct,
            commands,
            observations: Vec::new(),
        };
        allocation.observations.push(if allocation.is_met() {
            Observation::inactive(AlarmSource::Equipment, AlarmCategory::CapacityExceeded, group_id.as_str())
        } else {
            error!(
                group = %group_id,
                demand,
                available = available_capacity,
                "redundancy group cannot meet demand"
            );
            Observation::active(
                AlarmSource::Equipment,
                AlarmCategory::CapacityExceeded,
                group_id.as_str(),
                Severity::Critical,
                format!(
                    "Group {group_id} cannot meet demand: {demand:.1} requested, {available_capacity:.1} available"
                ),
            )
        });
        Ok(allocation)
    }

    fn feedback_sensor(section: &str, unit: &EquipmentId, signal: &str) -> SensorId {
        SensorId::new(format!("{section}.{unit}.{signal}"))
    }

    /// Check unit feedback in this cycle's snapshot.
    ///
    /// A unit fails on an explicit fault signal, or when it is commanded on
    /// and its running feedback stays false for longer than the timeout.
    /// Units without a running sensor are not supervised. Groups that lose a
    /// unit are re-allocated at their last demand immediately.
    ///
    /// Returns one failure observation per unit and the re-allocations.
    pub fn observe_feedback(
        &mut self,
        snapshot: &SensorSnapshot,
    ) -> EquipmentResult<(Vec<Observation>, Vec<Allocation>)> {
        let mut newly_failed: BTreeMap<GroupId, Vec<(EquipmentId, String)>> = BTreeMap::new();

        for (group_id, group) in &self.groups {
            for unit_id in &group.units {
                let Some(unit) = self.units.get_mut(unit_id) else {
                    continue;
                };
                if unit.health == Health::Failed {
                    continue;
                }
                let fault = snapshot.status(&Self::feedback_sensor(&group.section, unit_id, "fault"));
                let running =
                    snapshot.status(&Self::feedback_sensor(&group.section, unit_id, "running"));
                let degraded =
                    snapshot.status(&Self::feedback_sensor(&group.section, unit_id, "degraded"));

                let reason = if fault == Some(true) {
                    Some("fault signal".to_string())
                } else if unit.command.enabled && running == Some(false) {
                    unit.unconfirmed_cycles += 1;
                    (unit.unconfirmed_cycles > self.feedback_timeout_cycles).then(|| {
                        format!(
                            "no running feedback for {} cycles",
                            unit.unconfirmed_cycles
                        )
                    })
                } else {
                    unit.unconfirmed_cycles = 0;
                    None
                };

                if let Some(reason) = reason {
                    warn!(unit = %unit_id, group = %group_id, %reason, "unit failed");
                    unit.health = Health::Failed;
                    unit.command = ActuatorCommand::off();
                    unit.unconfirmed_cycles = 0;
                    newly_failed
                        .entry(group_id.clone())
                        .or_default()
                        .push((unit_id.clone(), reason));
                } else if let Some(d) = degraded {
                    unit.health = if d { Health::Degraded } else { Health::Healthy };
                }
            }
        }

        let mut reallocations = Vec::new();
        let mut reasons: BTreeMap<EquipmentId, String> = BTreeMap::new();
        for (group_id, failed) in newly_failed {
            let demand = self.group(&group_id)?.last_demand;
            let allocation = self.request(&group_id, demand)?;
            info!(
                group = %group_id,
                running = allocation.running(),
                speed_pct = allocation.speed_pct,
                "load reassigned after unit failure"
            );
            reallocations.push(allocation);
            reasons.extend(failed);
        }

        Ok((self.failure_observations(&reasons)?, reallocations))
    }

    fn failure_observations(
        &self,
        reasons: &BTreeMap<EquipmentId, String>,
    ) -> EquipmentResult<Vec<Observation>> {
        let mut observations = Vec::with_capacity(self.units.len());
        for unit in self.units.values() {
            if unit.health != Health::Failed {
                observations.push(Observation::inactive(
                    AlarmSource::Equipment,
                    AlarmCategory::EquipmentFailure,
                    unit.id.as_str(),
                ));
                continue;
            }
            let remaining = self.available_capacity(&unit.group)?;
            let demand = self.group(&unit.group)?.last_demand;
            let severity = if remaining + CAPACITY_EPS < demand {
                Severity::Critical
            } else {
                Severity::High
            };
            let why = reasons
                .get(&unit.id)
                .map(|r| format!(" ({r})"))
                .unwrap_or_default();
            observations.push(Observation::active(
                AlarmSource::Equipment,
                AlarmCategory::EquipmentFailure,
                unit.id.as_str(),
                severity,
                format!(
                    "Unit {} failed{why}; group {} remaining capacity {remaining:.1} for demand {demand:.1}",
                    unit.id, unit.group
                ),
            ));
        }
        Ok(observations)
    }

    /// Operator action: bring a failed unit back.
    pub fn return_to_service(&mut self, unit: &EquipmentId) -> EquipmentResult<()> {
        self.set_health(unit, Health::Healthy)
    }

    pub fn set_health(&mut self, unit: &EquipmentId, health: Health) -> EquipmentResult<()> {
        let u = self
            .units
            .get_mut(unit)
            .ok_or_else(|| EquipmentError::UnknownUnit {
                unit: unit.to_string(),
            })?;
        info!(unit = %unit, from = %u.health, to = %health, "unit health set");
        u.health = health;
        u.unconfirmed_cycles = 0;
        if health == Health::Failed {
            u.command = ActuatorCommand::off();
        }
        Ok(())
    }

    /// Record what the plant was actually told this cycle.
    ///
    /// Emergency actions, the emergency stop, overrides and rejection holds
    /// are applied after allocation, so unit commands must follow the
    /// dispatched set. Feedback supervision and runtime only apply to units
    /// dispatched on; anything else restarts its feedback count.
    pub fn apply_dispatched(&mut self, dispatched: &CommandSet) {
        for unit in self.units.values_mut() {
            let Some(command) = dispatched.get(&unit.id) else {
                continue;
            };
            if !command.enabled || !unit.health.is_available() {
                unit.unconfirmed_cycles = 0;
            }
            unit.command = if unit.health.is_available() {
                *command
            } else {
                ActuatorCommand::off()
            };
        }
    }

    /// Put a group's unit commands and demand back to what `before` held.
    ///
    /// Undoes requests made by a controller whose cycle output is discarded.
    /// Health and runtime are left alone.
    pub fn restore_group(&mut self, group_id: &GroupId, before: &Self) -> EquipmentResult<()> {
        let members = self.group(group_id)?.units.clone();
        let last_demand = before.last_demand(group_id)?;
        for id in &members {
            let (Some(unit), Some(old)) = (self.units.get_mut(id), before.units.get(id)) else {
                continue;
            };
            unit.command = if unit.health.is_available() {
                old.command
            } else {
                ActuatorCommand::off()
            };
            unit.unconfirmed_cycles = old.unconfirmed_cycles;
        }
        if let Some(group) = self.groups.get_mut(group_id) {
            group.last_demand = last_demand;
        }
        Ok(())
    }

    /// Accumulate runtime for every running unit after a dispatched cycle.
    pub fn end_cycle(&mut self, dt_h: f64) {
        for unit in self.units.values_mut().filter(|u| u.is_running()) {
            unit.runtime_h += dt_h;
        }
    }

    /// Current commands of every unit in every group.
    pub fn commands(&self) -> CommandSet {
        self.units
            .values()
            .map(|u| {
                let cmd = if u.health.is_available() {
                    u.command
                } else {
                    ActuatorCommand::off()
                };
                (u.id.clone(), cmd)
            })
            .collect()
    }

    pub fn unit(&self, id: &EquipmentId) -> Option<&EquipmentUnit> {
        self.units.get(id)
    }

    pub fn statuses(&self) -> Vec<UnitStatus> {
        self.units.values().map(EquipmentUnit::status).collect()
    }

    /// (available units, total units) right now.
    pub fn availability(&self) -> (usize, usize) {
        let available = self.units.values().filter(|u| u.health.is_available()).count();
        (available, self.units.len())
    }
}
