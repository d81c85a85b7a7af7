use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use hl_alarms::Severity;
use hl_controls::Mode;
use hl_core::{ControllerId, SensorSnapshot};
use hl_plant::{
    DataSink, EmergencyStop, JsonLinesSink, Orchestrator, PlantResult, PlantState, ScriptedPlant, run_paced,
    run_replay,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hl-cli")]
#[command(about = "HydroLoop CLI - Wastewater process control core", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a plant configuration
    Validate {
        /// Path to the plant YAML or JSON file
        config_path: PathBuf,
    },
    /// Summarize a plant configuration
    Describe {
        /// Path to the plant YAML or JSON file
        config_path: PathBuf,
    },
    /// Replay recorded snapshots through the control cycle
    Replay {
        /// Path to the plant YAML or JSON file
        config_path: PathBuf,
        /// JSON-lines file with one sensor snapshot per line
        snapshots: PathBuf,
        /// Write one published state record per line here
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Trigger the emergency stop before this cycle
        #[arg(long)]
        estop_at: Option<u64>,
        /// Pace cycles at the configured period instead of replaying flat out
        #[arg(long)]
        realtime: bool,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> PlantResult<()> {
    match command {
        Commands::Validate { config_path } => cmd_validate(&config_path),
        Commands::Describe { config_path } => cmd_describe(&config_path),
        Commands::Replay {
            config_path,
            snapshots,
            output,
            estop_at,
            realtime,
        } => cmd_replay(&config_path, &snapshots, output.as_deref(), estop_at, realtime),
    }
}

fn cmd_validate(config_path: &Path) -> PlantResult<()> {
    println!("Validating plant: {}", config_path.display());
    let config = hl_project::load(config_path)?;
    println!("✓ Configuration is valid ({})", hl_project::fingerprint(&config)?);
    Ok(())
}

fn cmd_describe(config_path: &Path) -> PlantResult<()> {
    let config = hl_project::load(config_path)?;
    println!("{} (schema v{})", config.name, config.version);
    println!("  Cycle: {} ms, snapshot timeout {} ms", config.cycle.period_ms, config.cycle.snapshot_timeout_ms);

    println!("Redundancy groups:");
    for group in &config.equipment.groups {
        println!(
            "  {} [{}] - {} units, {:.0} installed, turndown {:.0}%",
            group.id,
            group.section,
            group.units.len(),
            group.installed_capacity(),
            group.min_turndown_pct
        );
    }

    println!("Controllers (priority order):");
    for id in ControllerId::ALL {
        println!("  {} - priority {}", id, id.priority());
    }
    for chemical in &config.controllers.dosing.chemicals {
        println!("    dosing {} via {}", chemical.name, chemical.pump);
    }

    println!("Alarm thresholds:");
    for rule in &config.alarms.thresholds.rules {
        println!(
            "  {} on {}{}",
            rule.category.as_str(),
            rule.sensor,
            rule.label.as_deref().map(|l| format!(" ({l})")).unwrap_or_default()
        );
    }
    println!(
        "Emergency actions force {} actuators",
        config.alarms.emergency_actions.targets().count()
    );
    Ok(())
}

fn read_snapshots(path: &Path) -> PlantResult<Vec<SensorSnapshot>> {
    let reader = BufReader::new(File::open(path)?);
    let mut snapshots = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        snapshots.push(serde_json::from_str(&line)?);
    }
    Ok(snapshots)
}

/// Prints a one-line summary per cycle and forwards to an optional record file.
struct ConsoleSink {
    records: Option<JsonLinesSink<BufWriter<File>>>,
    estop: EmergencyStop,
    estop_at: Option<u64>,
}

impl ConsoleSink {
    fn print_cycle(state: &PlantState) {
        let worst = state.alarms.iter().map(|a| a.severity).max();
        let running = state.commands.iter().filter(|(_, c)| c.enabled).count();
        let off_normal: Vec<String> = state
            .modes
            .iter()
            .filter(|(_, m)| **m != Mode::Normal)
            .map(|(id, m)| format!("{id}={m}"))
            .collect();
        println!(
            "  cycle {:>5}: {} open alarms (worst {}), {} actuators on{}{}",
            state.cycle,
            state.alarms.len(),
            worst.map_or("-", Severity::as_str),
            running,
            if off_normal.is_empty() {
                String::new()
            } else {
                format!(", {}", off_normal.join(" "))
            },
            if state.emergency_stop { ", E-STOP" } else { "" }
        );
    }
}

impl DataSink for ConsoleSink {
    fn publish(&mut self, state: &PlantState) -> PlantResult<()> {
        Self::print_cycle(state);
        if let Some(records) = self.records.as_mut() {
            records.publish(state)?;
        }
        if self.estop_at == Some(state.cycle + 1) {
            self.estop.trigger();
        }
        Ok(())
    }
}

fn cmd_replay(
    config_path: &Path,
    snapshots: &Path,
    output: Option<&Path>,
    estop_at: Option<u64>,
    realtime: bool,
) -> PlantResult<()> {
    let config = hl_project::load(config_path)?;
    let mut orchestrator = Orchestrator::new(config)?;
    let mut plant = ScriptedPlant::new(read_snapshots(snapshots)?);
    println!(
        "Replaying {} snapshots through {}",
        plant.remaining(),
        orchestrator.config().name
    );

    let mut sink = ConsoleSink {
        records: match output {
            Some(path) => Some(JsonLinesSink::new(BufWriter::new(File::create(path)?))),
            None => None,
        },
        estop: orchestrator.emergency_stop(),
        estop_at,
    };
    if estop_at == Some(1) {
        sink.estop.trigger();
    }

    let summary = if realtime {
        let cycles = plant.remaining() as u64;
        run_paced(&mut orchestrator, &mut plant, &mut sink, cycles)?
    } else {
        run_replay(&mut orchestrator, &mut plant, &mut sink)?
    };
    println!("✓ {} cycles, {} skipped", summary.cycles, summary.skipped);

    if let Some(records) = sink.records {
        let written = records.written();
        records.into_inner().flush()?;
        println!("✓ Wrote {written} state records");
    }
    if let Some(state) = orchestrator.last_state() {
        for alarm in &state.alarms {
            println!("  [{}] #{} {}", alarm.severity.as_str(), alarm.id, alarm.message);
        }
    }
    Ok(())
}
