//! Declarative emergency actions: category -> forced commands.

use std::collections::BTreeMap;

use hl_core::{ActuatorCommand, CommandSet, EquipmentId};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::types::{AlarmCategory, AlarmEvent, Severity};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForcedCommand {
    pub equipment: EquipmentId,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub setpoint: f64,
}

impl ForcedCommand {
    pub fn command(&self) -> ActuatorCommand {
        ActuatorCommand {
            enabled: self.enabled,
            setpoint: self.setpoint,
        }
    }
}

/// Commands forced while a Critical alarm of `category` is open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyAction {
    pub category: AlarmCategory,
    pub force: Vec<ForcedCommand>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmergencyActions {
    pub actions: Vec<EmergencyAction>,
}

/// Forced commands for one cycle and the alarm that owns each one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForcedSet {
    pub commands: CommandSet,
    pub owners: BTreeMap<EquipmentId, u64>,
}

impl ForcedSet {
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl EmergencyActions {
    pub fn new(actions: Vec<EmergencyAction>) -> Self {
        Self { actions }
    }

    /// Every equipment id any action can force.
    pub fn targets(&self) -> impl Iterator<Item = &EquipmentId> {
        self.actions
            .iter()
            .flat_map(|a| a.force.iter().map(|f| &f.equipment))
    }

    /// Resolve forced commands from alarms already in priority order.
    ///
    /// Only Critical alarms force. When two actions target the same actuator
    /// the higher-priority alarm (earliest raised) keeps it.
    pub fn resolve(&self, open_by_priority: &[AlarmEvent]) -> ForcedSet {
        let mut forced = ForcedSet::default();
        for alarm in open_by_priority
            .iter()
            .filter(|a| a.severity == Severity::Critical)
        {
            for action in self.actions.iter().filter(|a| a.category == alarm.category) {
                for target in &action.force {
                    if forced.owners.contains_key(&target.equipment) {
                        continue;
                    }
                    warn!(
                        alarm = alarm.id,
                        equipment = %target.equipment,
                        "emergency action forces {} on {}",
                        if target.enabled { "command" } else { "de-energize" },
                        target.equipment
                    );
                    forced.owners.insert(target.equipment.clone(), alarm.id);
                    forced.commands.force(target.equipment.clone(), target.command());
                }
            }
        }
        forced
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AlarmSource, sort_by_priority};

    fn critical(id: u64, category: AlarmCategory, raised_at: u64) -> AlarmEvent {
        AlarmEvent {
            id,
            source: AlarmSource::Orchestrator,
            category,
            subject: format!("s{id}"),
            severity: Severity::Critical,
            message: String::new(),
            raised_at,
            cleared_at: None,
            latched: true,
            acknowledged: false,
            predicate_active: true,
        }
    }

    fn actions() -> EmergencyActions {
        EmergencyActions::new(vec![
            EmergencyAction {
                category: AlarmCategory::HighLevel,
                force: vec![
                    ForcedCommand {
                        equipment: "P-101".into(),
                        enabled: false,
                        setpoint: 0.0,
                    },
                    ForcedCommand {
                        equipment: "P-102".into(),
                        enabled: false,
                        setpoint: 0.0,
                    },
                ],
            },
            EmergencyAction {
                category: AlarmCategory::SensorLoss,
                force: vec![ForcedCommand {
                    equipment: "P-101".into(),
                    enabled: true,
                    setpoint: 30.0,
                }],
            },
        ])
    }

    #[test]
    fn earliest_raised_critical_wins_conflict() {
        let mut open = vec![
            critical(2, AlarmCategory::SensorLoss, 3),
            critical(1, AlarmCategory::HighLevel, 5),
        ];
        sort_by_priority(&mut open);
        let forced = actions().resolve(&open);
        let p101 = forced.commands.get(&"P-101".into()).unwrap();
        assert!(p101.enabled);
        assert_eq!(p101.setpoint, 30.0);
        assert_eq!(forced.owners[&EquipmentId::new("P-101")], 2);
        assert_eq!(forced.owners[&EquipmentId::new("P-102")], 1);
    }

    #[test]
    fn non_critical_alarms_force_nothing() {
        let mut alarm = critical(1, AlarmCategory::HighLevel, 1);
        alarm.severity = Severity::High;
        assert!(actions().resolve(&[alarm]).is_empty());
    }
}
