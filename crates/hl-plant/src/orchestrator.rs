//! The control cycle.
//!
//! Fixed sequence per cycle:
//!
//! 1. swap in a staged configuration, if any
//! 2. read the snapshot; substitute stale sensors, flag lost sections
//! 3. equipment feedback: failure detection and failover
//! 4. Intake, Treatment, then Aeration and Dosing side by side, then Monitoring
//! 5. merge commands by controller priority; overlay group allocations
//! 6. one-cycle manual overrides
//! 7. alarm evaluation
//! 8. emergency forced commands, then the emergency stop
//! 9. dispatch, record the dispatched set in the coordinator, commit
//!    controller memories, publish
//!
//! Controller memories are committed only after dispatch; a cycle that fails
//! before dispatch leaves them and the last dispatched command set untouched.
//! Group requests made by a controller that then faults are rolled back, so
//! its pumps or blowers hold their previous commands too.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use hl_alarms::{
    AckOutcome, AlarmCategory, AlarmEngine, AlarmEvent, AlarmSource, Observation, ObservationBatch,
    Severity,
};
use hl_controls::{
    ControllerOutput, CycleContext, Metric, Mode, ProcessController, SectionRecord, Upstream,
    build_controllers,
};
use hl_core::{ActuatorCommand, CommandSet, ControllerId, EquipmentId, HlError, SensorSnapshot};
use hl_equipment::{EquipmentCoordinator, Health, SharedCoordinator, UnitStatus};
use hl_project::{PlantConfig, ProjectError, fingerprint, validate_plant};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{PlantError, PlantResult};
use crate::estop::EmergencyStop;
use crate::kpi::{KpiEngine, KpiInputs};
use crate::plant::Plant;
use crate::sensors::SensorCache;
use crate::sink::DataSink;
use crate::state::PlantState;

/// Subject of the plant-wide emergency stop alarm.
pub const EMERGENCY_STOP_SUBJECT: &str = "plant";

/// Operator command honoured for exactly one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualOverride {
    pub controller: ControllerId,
    pub equipment: EquipmentId,
    pub command: ActuatorCommand,
}

type Evaluation = (ControllerId, Result<ControllerOutput, HlError>);

fn evaluate_one(controller: &ProcessController, ctx: &CycleContext<'_>) -> Evaluation {
    let id = controller.id();
    (id, controller.evaluate(ctx).map_err(|e| e.into_fault(id)))
}

pub struct Orchestrator {
    config: PlantConfig,
    fingerprint: String,
    controllers: Vec<ProcessController>,
    equipment: SharedCoordinator,
    alarms: AlarmEngine,
    sensors: SensorCache,
    kpi: KpiEngine,
    estop: EmergencyStop,
    cycle: u64,
    skipped_cycles: u64,
    /// Commands as actually dispatched last cycle.
    dispatched: CommandSet,
    /// Each controller's last successful commands, held through a fault.
    held: BTreeMap<ControllerId, CommandSet>,
    rejection_streaks: BTreeMap<EquipmentId, u32>,
    /// Rejection observations from the last dispatch, reported next cycle.
    carried: Vec<Observation>,
    overrides: Vec<ManualOverride>,
    pending_reload: Option<PlantConfig>,
    last_state: Option<PlantState>,
}

impl Orchestrator {
    /// Validate `config` and build every component. Refuses to start on any
    /// configuration error.
    pub fn new(config: PlantConfig) -> PlantResult<Self> {
        validate_plant(&config).map_err(ProjectError::from)?;
        let controllers = build_controllers(&config.controllers, &config.alarms.thresholds)?;
        let equipment = SharedCoordinator::new(EquipmentCoordinator::new(&config.equipment)?);
        let fingerprint = fingerprint(&config)?;
        info!(plant = %config.name, %fingerprint, "orchestrator started");
        Ok(Self {
            alarms: AlarmEngine::new(&config.alarms),
            kpi: KpiEngine::new(config.kpi.clone()),
            config,
            fingerprint,
            controllers,
            equipment,
            sensors: SensorCache::new(),
            estop: EmergencyStop::new(),
            cycle: 0,
            skipped_cycles: 0,
            dispatched: CommandSet::new(),
            held: BTreeMap::new(),
            rejection_streaks: BTreeMap::new(),
            carried: Vec::new(),
            overrides: Vec::new(),
            pending_reload: None,
            last_state: None,
        })
    }

    pub fn config(&self) -> &PlantConfig {
        &self.config
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn skipped_cycles(&self) -> u64 {
        self.skipped_cycles
    }

    /// Handle for the Operator Console; clones share one flag.
    pub fn emergency_stop(&self) -> EmergencyStop {
        self.estop.clone()
    }

    pub fn alarms(&self) -> &AlarmEngine {
        &self.alarms
    }

    pub fn kpi(&self) -> &KpiEngine {
        &self.kpi
    }

    pub fn last_state(&self) -> Option<&PlantState> {
        self.last_state.as_ref()
    }

    pub fn controller(&self, id: ControllerId) -> Option<&ProcessController> {
        self.controllers.iter().find(|c| c.id() == id)
    }

    fn controller_mut(&mut self, id: ControllerId) -> PlantResult<&mut ProcessController> {
        self.controllers
            .iter_mut()
            .find(|c| c.id() == id)
            .ok_or_else(|| PlantError::UnknownController {
                name: id.to_string(),
            })
    }

    pub fn unit_statuses(&self) -> PlantResult<Vec<UnitStatus>> {
        Ok(self.equipment.lock()?.statuses())
    }

    /// Direct access to the coordinator between cycles.
    pub fn equipment_mut(&mut self) -> PlantResult<&mut EquipmentCoordinator> {
        Ok(self.equipment.get_mut()?)
    }

    /// Queue an override for the next cycle only.
    pub fn submit_override(&mut self, request: ManualOverride) {
        self.overrides.push(request);
    }

    /// Validate and stage a configuration; it takes effect at the start of
    /// the next cycle.
    pub fn request_reload(&mut self, config: PlantConfig) -> PlantResult<()> {
        validate_plant(&config).map_err(ProjectError::from)?;
        build_controllers(&config.controllers, &config.alarms.thresholds)?;
        let staged = fingerprint(&config)?;
        info!(plant = %config.name, fingerprint = %staged, "configuration staged");
        self.pending_reload = Some(config);
        Ok(())
    }

    pub fn acknowledge(&mut self, alarm_id: u64) -> PlantResult<AckOutcome> {
        Ok(self.alarms.acknowledge(alarm_id, self.cycle)?)
    }

    /// Operator reset of a controller, the only way out of Shutdown.
    pub fn reset_controller(&mut self, id: ControllerId) -> PlantResult<()> {
        let controller = self.controller_mut(id)?;
        let from = controller.mode();
        controller.reset();
        info!(controller = %id, %from, "controller reset");
        Ok(())
    }

    pub fn return_to_service(&mut self, unit: &EquipmentId) -> PlantResult<()> {
        self.equipment.get_mut()?.return_to_service(unit)?;
        info!(%unit, "unit returned to service");
        Ok(())
    }

    pub fn clear_trends(&mut self) {
        self.kpi.clear_trends();
    }

    /// Account slots the runner skipped because a cycle overran.
    pub fn record_skipped(&mut self, skipped: u64) {
        self.skipped_cycles += skipped;
    }

    /// Re-open alarms from a published state, e.g. after a restart. Alarms
    /// already open here are kept; returns how many were restored.
    pub fn restore_alarms(&mut self, state: &PlantState) -> usize {
        self.alarms.restore(state.alarms.iter().cloned())
    }

    fn apply_pending_reload(&mut self) -> PlantResult<()> {
        let Some(config) = self.pending_reload.take() else {
            return Ok(());
        };
        let next_fingerprint = fingerprint(&config)?;
        let mut controllers = build_controllers(&config.controllers, &config.alarms.thresholds)?;
        for controller in &mut controllers {
            if let Some(old) = self.controllers.iter().find(|o| o.id() == controller.id())
                && old.same_config(controller)
            {
                controller.commit(old.memory())?;
            }
        }
        let coordinator = self.equipment.get_mut()?.reconfigured(&config.equipment)?;
        self.equipment = SharedCoordinator::new(coordinator);
        self.alarms.reconfigure(&config.alarms);
        if config.kpi != *self.kpi.config() {
            self.kpi = KpiEngine::new(config.kpi.clone());
        }
        self.fingerprint = next_fingerprint;
        info!(plant = %config.name, fingerprint = %self.fingerprint, "configuration reloaded");
        self.controllers = controllers;
        self.config = config;
        Ok(())
    }

    /// Undo this cycle's group requests from controller `id`.
    fn roll_back_requests(&mut self, id: ControllerId, before: &EquipmentCoordinator) -> PlantResult<()> {
        let groups = self.controller(id).map(ProcessController::groups).unwrap_or_default();
        let coordinator = self.equipment.get_mut()?;
        for group in &groups {
            coordinator.restore_group(group, before)?;
        }
        Ok(())
    }

    fn evaluate_controllers(
        &self,
        cycle: u64,
        dt_s: f64,
        snapshot: &SensorSnapshot,
        open: &[AlarmEvent],
    ) -> Vec<Evaluation> {
        let mut upstream = Upstream::new();
        let mut results = Vec::with_capacity(self.controllers.len());
        let publish = |result: &Evaluation, upstream: &mut Upstream| {
            if let (_, Ok(out)) = result {
                out.publish(upstream);
            }
        };

        for id in [ControllerId::Intake, ControllerId::Treatment] {
            if let Some(controller) = self.controller(id) {
                let ctx = CycleContext {
                    cycle,
                    dt_s,
                    snapshot,
                    alarms: open,
                    upstream: &upstream,
                    equipment: &self.equipment,
                };
                let result = evaluate_one(controller, &ctx);
                publish(&result, &mut upstream);
                results.push(result);
            }
        }

        let parallel_from = results.len();
        {
            let ctx = CycleContext {
                cycle,
                dt_s,
                snapshot,
                alarms: open,
                upstream: &upstream,
                equipment: &self.equipment,
            };
            let aeration = self.controller(ControllerId::Aeration);
            let dosing = self.controller(ControllerId::Dosing);
            // No data dependency between these two; group requests are
            // serialized by the shared coordinator.
            let (aeration, dosing) = rayon::join(
                || aeration.map(|c| evaluate_one(c, &ctx)),
                || dosing.map(|c| evaluate_one(c, &ctx)),
            );
            results.extend(aeration);
            results.extend(dosing);
        }
        for result in &results[parallel_from..] {
            publish(result, &mut upstream);
        }

        if let Some(controller) = self.controller(ControllerId::Monitoring) {
            let ctx = CycleContext {
                cycle,
                dt_s,
                snapshot,
                alarms: open,
                upstream: &upstream,
                equipment: &self.equipment,
            };
            results.push(evaluate_one(controller, &ctx));
        }
        results
    }

    /// Run one complete cycle against `plant`.
    pub fn run_cycle(&mut self, plant: &mut dyn Plant) -> PlantResult<PlantState> {
        self.apply_pending_reload()?;
        let cycle = self.cycle + 1;
        let dt_s = self.config.cycle.period_s();
        let timeout = Duration::from_millis(self.config.cycle.snapshot_timeout_ms);

        let read = plant.read_snapshot(cycle, timeout);
        let (snapshot, sensor_observations) =
            self.sensors
                .reconcile(cycle, read, self.config.alarms.sensor_stale_high_after);

        let mut batch = ObservationBatch::new();
        let mut orchestrator_observations = sensor_observations;
        orchestrator_observations.append(&mut self.carried);

        let (feedback, reallocations) = self.equipment.get_mut()?.observe_feedback(&snapshot)?;
        batch.report(AlarmSource::Equipment, feedback);
        for allocation in reallocations {
            batch.report(AlarmSource::Equipment, allocation.observations);
        }

        let before = self.equipment.get_mut()?.clone();
        let open = self.alarms.open_by_priority();
        let mut evaluations = self.evaluate_controllers(cycle, dt_s, &snapshot, &open);
        evaluations.sort_by_key(|(id, _)| id.priority());

        // Merge by controller priority; the first claim on an id wins.
        let mut merged = CommandSet::new();
        let mut owners: BTreeMap<EquipmentId, ControllerId> = BTreeMap::new();
        let mut modes = BTreeMap::new();
        for (id, result) in &evaluations {
            let commands = match result {
                Ok(out) => {
                    modes.insert(*id, out.mode);
                    out.commands.clone()
                }
                Err(e) => {
                    warn!(controller = %id, error = %e, "controller fault; holding previous commands");
                    self.roll_back_requests(*id, &before)?;
                    modes.insert(*id, Mode::Shutdown);
                    orchestrator_observations.push(Observation::active(
                        AlarmSource::Orchestrator,
                        AlarmCategory::ControllerFault,
                        id.as_str(),
                        Severity::High,
                        format!("{e}; holding previous commands"),
                    ));
                    self.held.get(id).cloned().unwrap_or_default()
                }
            };
            for (equipment, command) in commands.iter() {
                match owners.get(equipment) {
                    Some(owner) => {
                        warn!(%equipment, winner = %owner, loser = %id, "command conflict");
                        orchestrator_observations.push(Observation::active(
                            AlarmSource::Orchestrator,
                            AlarmCategory::CommandConflict,
                            equipment.as_str(),
                            Severity::Warning,
                            format!("{owner} and {id} both command {equipment}; {owner} takes precedence"),
                        ));
                    }
                    None => {
                        owners.insert(equipment.clone(), *id);
                        merged.force(equipment.clone(), *command);
                    }
                }
            }
        }

        // Group members always follow the coordinator: failed units stay off.
        let coordinator = self.equipment.get_mut()?;
        for (unit, command) in coordinator.commands().iter() {
            merged.force(unit.clone(), *command);
        }
        let failed: BTreeSet<EquipmentId> = coordinator
            .statuses()
            .into_iter()
            .filter(|u| u.health == Health::Failed)
            .map(|u| u.id)
            .collect();

        for request in std::mem::take(&mut self.overrides) {
            let refusal = if owners.get(&request.equipment) != Some(&request.controller) {
                Some(format!("{} does not command {}", request.controller, request.equipment))
            } else if request.command.enabled && failed.contains(&request.equipment) {
                Some(format!("{} is failed and out of service", request.equipment))
            } else {
                None
            };
            match refusal {
                None => {
                    info!(
                        controller = %request.controller,
                        equipment = %request.equipment,
                        "manual override applied for one cycle"
                    );
                    merged.force(request.equipment, request.command);
                }
                Some(why) => {
                    warn!(
                        controller = %request.controller,
                        equipment = %request.equipment,
                        %why,
                        "manual override refused"
                    );
                    orchestrator_observations.push(Observation::active(
                        AlarmSource::Orchestrator,
                        AlarmCategory::OverrideRejected,
                        request.equipment.as_str(),
                        Severity::Warning,
                        format!("Manual override refused: {why}"),
                    ));
                }
            }
        }

        if self.estop.is_triggered() {
            orchestrator_observations.push(Observation::active(
                AlarmSource::Orchestrator,
                AlarmCategory::EmergencyStop,
                EMERGENCY_STOP_SUBJECT,
                Severity::Critical,
                "Emergency stop active: all actuators de-energized",
            ));
        }

        batch.report(AlarmSource::Orchestrator, orchestrator_observations);
        for (id, result) in &evaluations {
            if let Ok(out) = result {
                batch.report(AlarmSource::Controller(*id), std::iter::empty());
                for observation in &out.observations {
                    batch.push(observation.clone());
                }
            }
        }
        let transitions = self.alarms.evaluate(cycle, &batch);

        let open = self.alarms.open_by_priority();
        let forced = self.config.alarms.emergency_actions.resolve(&open);
        for (equipment, command) in forced.commands.iter() {
            merged.force(equipment.clone(), *command);
        }

        // Checked as late as possible so a stop raised mid-cycle still lands.
        let stopped = self.estop.is_triggered();
        if stopped {
            for controller in &self.controllers {
                for actuator in controller.direct_actuators() {
                    merged.force(actuator, ActuatorCommand::off());
                }
            }
            merged = merged.de_energized();
        }

        let rejections = plant.apply_commands(&merged);
        let mut effective = merged;
        let rejected: BTreeSet<EquipmentId> = rejections.iter().map(|r| r.equipment.clone()).collect();
        self.rejection_streaks.retain(|id, _| rejected.contains(id));
        for rejection in rejections {
            let held = self
                .dispatched
                .get(&rejection.equipment)
                .copied()
                .unwrap_or_else(ActuatorCommand::off);
            effective.force(rejection.equipment.clone(), held);
            let streak = self.rejection_streaks.entry(rejection.equipment.clone()).or_insert(0);
            *streak += 1;
            let severity = if *streak >= self.config.alarms.rejection_high_after {
                Severity::High
            } else {
                Severity::Warning
            };
            warn!(equipment = %rejection.equipment, reason = %rejection.reason, streak = *streak, "command rejected");
            self.carried.push(Observation::active(
                AlarmSource::Orchestrator,
                AlarmCategory::ActuatorRejected,
                rejection.equipment.as_str(),
                severity,
                format!(
                    "{} rejected its command for {} cycles ({}); holding previous command",
                    rejection.equipment, streak, rejection.reason
                ),
            ));
        }

        // Dispatched: commit.
        self.cycle = cycle;
        let mut metrics: Vec<Metric> = Vec::new();
        let mut sections = SectionRecord::new();
        for (id, result) in evaluations {
            if let Ok(out) = result {
                metrics.extend(out.metrics);
                if id == ControllerId::Monitoring {
                    sections = out.sections;
                }
                self.held.insert(id, out.commands);
                self.controller_mut(id)?.commit(out.memory)?;
            }
        }
        self.dispatched = effective.clone();

        let coordinator = self.equipment.get_mut()?;
        coordinator.apply_dispatched(&effective);
        coordinator.end_cycle(dt_s / 3600.0);
        let availability = coordinator.availability();
        let units = coordinator.statuses();

        let mut kpis = self.kpi.update(&KpiInputs {
            cycle,
            dt_h: dt_s / 3600.0,
            snapshot: &snapshot,
            metrics: &metrics,
            availability,
        });
        kpis.sort_by(|a, b| a.name.cmp(&b.name));

        debug!(
            cycle,
            commands = effective.len(),
            transitions = transitions.len(),
            open_alarms = open.len(),
            "cycle complete"
        );

        let state = PlantState {
            cycle,
            taken_at: snapshot.taken_at,
            config_fingerprint: self.fingerprint.clone(),
            readings: snapshot.readings,
            stale: snapshot.stale,
            lost_sections: snapshot.lost_sections,
            alarms: open,
            commands: effective,
            kpis,
            modes,
            units,
            sections,
            emergency_stop: stopped,
            skipped_cycles: self.skipped_cycles,
        };
        self.last_state = Some(state.clone());
        Ok(state)
    }

    /// Run a cycle and hand the published state to `sink`.
    pub fn run_cycle_and_publish(&mut self, plant: &mut dyn Plant, sink: &mut dyn DataSink) -> PlantResult<PlantState> {
        let state = self.run_cycle(plant)?;
        sink.publish(&state)?;
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn demo() -> PlantConfig {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../demos/wastewater.yaml");
        hl_project::load_yaml(&path).unwrap()
    }

    #[test]
    fn refuses_to_start_on_invalid_config() {
        let mut config = demo();
        config.cycle.period_ms = 0;
        assert!(matches!(Orchestrator::new(config), Err(PlantError::Project(_))));
    }

    #[test]
    fn invalid_reload_is_not_staged() {
        let mut orch = Orchestrator::new(demo()).unwrap();
        let before = orch.fingerprint().to_string();
        let mut config = demo();
        config.controllers.intake.min_flow = config.controllers.intake.max_flow + 1.0;
        assert!(orch.request_reload(config).is_err());
        assert!(orch.pending_reload.is_none());
        assert_eq!(orch.fingerprint(), before);
    }

    #[test]
    fn faulted_controller_requests_are_rolled_back() {
        let mut orch = Orchestrator::new(demo()).unwrap();
        let pumps = hl_core::GroupId::new("influent_pumps");
        let blowers = hl_core::GroupId::new("blowers");
        orch.equipment_mut().unwrap().request(&pumps, 300.0).unwrap();
        orch.equipment_mut().unwrap().request(&blowers, 1000.0).unwrap();
        let before = orch.equipment_mut().unwrap().clone();

        let coordinator = orch.equipment_mut().unwrap();
        coordinator.request(&pumps, 750.0).unwrap();
        coordinator.request(&blowers, 2400.0).unwrap();
        orch.roll_back_requests(ControllerId::Intake, &before).unwrap();

        let coordinator = orch.equipment_mut().unwrap();
        assert_eq!(coordinator.last_demand(&pumps).unwrap(), 300.0);
        for unit in coordinator.members(&pumps).unwrap().to_vec() {
            assert_eq!(coordinator.unit(&unit).unwrap().command, before.unit(&unit).unwrap().command);
        }
        // Aeration did not fault: its request stands.
        assert_eq!(coordinator.last_demand(&blowers).unwrap(), 2400.0);
    }

    #[test]
    fn held_commands_start_empty() {
        let orch = Orchestrator::new(demo()).unwrap();
        assert!(orch.held.is_empty());
        assert!(orch.dispatched.is_empty());
        assert_eq!(orch.cycle(), 0);
        assert!(!orch.emergency_stop().is_triggered());
    }
}
