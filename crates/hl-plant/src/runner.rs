//! Drive an orchestrator: paced in real time or as fast as a script allows.

use std::thread;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::clock::CycleClock;
use crate::error::PlantResult;
use crate::orchestrator::Orchestrator;
use crate::plant::{Plant, ScriptedPlant};
use crate::sink::DataSink;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub cycles: u64,
    pub skipped: u64,
}

/// Run `max_cycles` cycles at the configured period.
///
/// A cycle that overruns skips the slots it ran into rather than queueing
/// them; skipped slots are reported on the next published state.
pub fn run_paced(
    orchestrator: &mut Orchestrator,
    plant: &mut dyn Plant,
    sink: &mut dyn DataSink,
    max_cycles: u64,
) -> PlantResult<RunSummary> {
    let epoch = Instant::now();
    let mut clock = CycleClock::new(orchestrator.config().cycle.period_s(), 0.0);
    let mut summary = RunSummary::default();

    while summary.cycles < max_cycles {
        let wait = clock.time_until_due(epoch.elapsed().as_secs_f64());
        if wait > 0.0 {
            thread::sleep(Duration::from_secs_f64(wait));
        }
        let started = epoch.elapsed().as_secs_f64();
        orchestrator.run_cycle_and_publish(plant, sink)?;
        let skipped = clock.complete(started, epoch.elapsed().as_secs_f64());
        if skipped > 0 {
            warn!(cycle = orchestrator.cycle(), skipped, "cycle overran its period");
            orchestrator.record_skipped(skipped);
        }
        summary.cycles += 1;
        summary.skipped += skipped;
    }
    info!(cycles = summary.cycles, skipped = summary.skipped, "paced run finished");
    Ok(summary)
}

/// Run one cycle per scripted snapshot, without pacing.
pub fn run_replay(
    orchestrator: &mut Orchestrator,
    plant: &mut ScriptedPlant,
    sink: &mut dyn DataSink,
) -> PlantResult<RunSummary> {
    let mut summary = RunSummary::default();
    while !plant.is_exhausted() {
        orchestrator.run_cycle_and_publish(plant, sink)?;
        summary.cycles += 1;
    }
    info!(cycles = summary.cycles, "replay finished");
    Ok(summary)
}
