//! Plant orchestration: the fixed-period control cycle.
//!
//! [`Orchestrator`] owns every component and runs one cycle at a time
//! against a [`Plant`]: read, reconcile stale sensors, evaluate the
//! controllers, arbitrate commands, evaluate alarms, dispatch, publish a
//! [`PlantState`] to a [`DataSink`].

pub mod clock;
pub mod error;
pub mod estop;
pub mod kpi;
pub mod orchestrator;
pub mod plant;
pub mod runner;
pub mod sensors;
pub mod sink;
pub mod state;

pub use clock::CycleClock;
pub use error::{PlantError, PlantResult};
pub use estop::EmergencyStop;
pub use kpi::{KpiEngine, KpiInputs, KpiRecord, TrendBuffer, removal_pct};
pub use orchestrator::{EMERGENCY_STOP_SUBJECT, ManualOverride, Orchestrator};
pub use plant::{Plant, Rejection, ScriptedPlant};
pub use runner::{RunSummary, run_paced, run_replay};
pub use sensors::{SensorCache, WHOLE_PLANT};
pub use sink::{DataSink, JsonLinesSink, MemorySink};
pub use state::{PlantState, Record};
