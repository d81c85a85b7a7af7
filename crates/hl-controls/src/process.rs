//! The closed set of process controllers.

use hl_alarms::ThresholdTable;
use hl_core::{ControllerId, EquipmentId, GroupId};
use serde::{Deserialize, Serialize};

use crate::aeration::{AerationConfig, AerationController};
use crate::context::{ControllerMemory, ControllerOutput, CycleContext};
use crate::dosing::{DosingConfig, DosingController};
use crate::error::{ControlError, ControlResult};
use crate::intake::{IntakeConfig, IntakeController, IntakeMemory};
use crate::mode::{Mode, ModeState};
use crate::monitoring::{MonitoringConfig, MonitoringController};
use crate::pi::PiState;
use crate::treatment::{TreatmentConfig, TreatmentController};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllersConfig {
    pub intake: IntakeConfig,
    pub treatment: TreatmentConfig,
    pub aeration: AerationConfig,
    #[serde(default)]
    pub dosing: DosingConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProcessController {
    Intake(IntakeController),
    Treatment(TreatmentController),
    Aeration(AerationController),
    Dosing(DosingController),
    Monitoring(MonitoringController),
}

impl ProcessController {
    pub fn id(&self) -> ControllerId {
        match self {
            Self::Intake(_) => ControllerId::Intake,
            Self::Treatment(_) => ControllerId::Treatment,
            Self::Aeration(_) => ControllerId::Aeration,
            Self::Dosing(_) => ControllerId::Dosing,
            Self::Monitoring(_) => ControllerId::Monitoring,
        }
    }

    pub fn mode(&self) -> Mode {
        match self {
            Self::Intake(c) => c.memory.mode.mode,
            Self::Treatment(c) => c.memory.mode,
            _ => Mode::Normal,
        }
    }

    /// Pure with respect to the controller: the next memory travels in the output.
    pub fn evaluate(&self, ctx: &CycleContext<'_>) -> ControlResult<ControllerOutput> {
        match self {
            Self::Intake(c) => c.evaluate(ctx),
            Self::Treatment(c) => c.evaluate(ctx),
            Self::Aeration(c) => c.evaluate(ctx),
            Self::Dosing(c) => c.evaluate(ctx),
            Self::Monitoring(c) => c.evaluate(ctx),
        }
    }

    pub fn memory(&self) -> ControllerMemory {
        match self {
            Self::Intake(c) => ControllerMemory::Intake(c.memory.clone()),
            Self::Treatment(c) => ControllerMemory::Treatment(c.memory.clone()),
            Self::Aeration(c) => ControllerMemory::Aeration(c.memory.clone()),
            Self::Dosing(_) => ControllerMemory::Dosing,
            Self::Monitoring(_) => ControllerMemory::Monitoring,
        }
    }

    pub fn commit(&mut self, memory: ControllerMemory) -> ControlResult<()> {
        match (self, memory) {
            (Self::Intake(c), ControllerMemory::Intake(m)) => c.memory = m,
            (Self::Treatment(c), ControllerMemory::Treatment(m)) => c.memory = m,
            (Self::Aeration(c), ControllerMemory::Aeration(m)) => c.memory = m,
            (Self::Dosing(_), ControllerMemory::Dosing) => {}
            (Self::Monitoring(_), ControllerMemory::Monitoring) => {}
            (this, memory) => {
                return Err(ControlError::StateError {
                    what: format!("memory {memory:?} does not belong to {}", this.id()),
                });
            }
        }
        Ok(())
    }

    /// Back to Normal with fresh loop state.
    pub fn reset(&mut self) {
        match self {
            Self::Intake(c) => c.memory = IntakeMemory::default(),
            Self::Treatment(c) => c.memory = ModeState::default(),
            Self::Aeration(c) => c.memory = PiState::default(),
            Self::Dosing(_) | Self::Monitoring(_) => {}
        }
    }

    /// Whether `other` runs the same configuration, so memory may carry over.
    pub fn same_config(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Intake(a), Self::Intake(b)) => a.config == b.config,
            (Self::Treatment(a), Self::Treatment(b)) => a.config == b.config,
            (Self::Aeration(a), Self::Aeration(b)) => a.config == b.config,
            (Self::Dosing(a), Self::Dosing(b)) => a.config == b.config,
            (Self::Monitoring(a), Self::Monitoring(b)) => a.config == b.config && a.thresholds == b.thresholds,
            _ => false,
        }
    }

    /// Actuators addressed directly, outside any redundancy group.
    pub fn direct_actuators(&self) -> Vec<EquipmentId> {
        match self {
            Self::Intake(c) => vec![c.config.screen.cleaner.clone()],
            Self::Treatment(c) => vec![
                c.config.scraper.clone(),
                c.config.sludge_pump.clone(),
                c.config.skimmer.clone(),
            ],
            Self::Aeration(_) | Self::Monitoring(_) => Vec::new(),
            Self::Dosing(c) => c.config.chemicals.iter().map(|ch| ch.pump.clone()).collect(),
        }
    }

    /// Redundancy groups this controller requests capacity from.
    pub fn groups(&self) -> Vec<GroupId> {
        match self {
            Self::Intake(c) => vec![c.config.pump_group.clone()],
            Self::Aeration(c) => vec![c.config.blower_group.clone()],
            Self::Treatment(_) | Self::Dosing(_) | Self::Monitoring(_) => Vec::new(),
        }
    }
}

/// Build every controller, in evaluation order.
pub fn build_controllers(
    config: &ControllersConfig,
    thresholds: &ThresholdTable,
) -> ControlResult<Vec<ProcessController>> {
    Ok(vec![
        ProcessController::Intake(IntakeController::new(config.intake.clone())?),
        ProcessController::Treatment(TreatmentController::new(config.treatment.clone())?),
        ProcessController::Aeration(AerationController::new(config.aeration.clone())?),
        ProcessController::Dosing(DosingController::new(config.dosing.clone())?),
        ProcessController::Monitoring(MonitoringController::new(
            config.monitoring.clone(),
            thresholds.clone(),
        )?),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ControllersConfig {
        ControllersConfig {
            intake: crate::intake::tests::config(),
            treatment: crate::treatment::tests::config(),
            aeration: crate::aeration::tests::config(),
            dosing: DosingConfig {
                chemicals: vec![crate::dosing::tests::chlorine()],
            },
            monitoring: MonitoringConfig::default(),
        }
    }

    #[test]
    fn built_in_evaluation_order() {
        let controllers = build_controllers(&config(), &ThresholdTable::default()).unwrap();
        let ids: Vec<_> = controllers.iter().map(|c| c.id()).collect();
        assert_eq!(ids, ControllerId::ALL.to_vec());
    }

    #[test]
    fn commit_rejects_foreign_memory() {
        let mut controllers = build_controllers(&config(), &ThresholdTable::default()).unwrap();
        assert!(controllers[0].commit(ControllerMemory::Dosing).is_err());
        assert!(controllers[3].commit(ControllerMemory::Dosing).is_ok());
    }

    #[test]
    fn reset_returns_to_normal() {
        let mut controllers = build_controllers(&config(), &ThresholdTable::default()).unwrap();
        let shutdown = ControllerMemory::Treatment(ModeState {
            mode: Mode::Shutdown,
            quiet_cycles: 0,
        });
        controllers[1].commit(shutdown).unwrap();
        assert_eq!(controllers[1].mode(), Mode::Shutdown);
        controllers[1].reset();
        assert_eq!(controllers[1].mode(), Mode::Normal);
    }

    #[test]
    fn same_config_detects_changes() {
        let a = build_controllers(&config(), &ThresholdTable::default()).unwrap();
        let mut changed = config();
        changed.aeration.do_setpoint = 2.5;
        let b = build_controllers(&changed, &ThresholdTable::default()).unwrap();
        assert!(a[0].same_config(&b[0]));
        assert!(!a[2].same_config(&b[2]));
    }
}
