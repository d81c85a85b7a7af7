//! Process controllers for the treatment train.
//!
//! Five controllers share one evaluation contract: given the cycle's sensor
//! snapshot and the open alarms, produce actuator commands, derived metrics
//! and alarm observations.
//!
//! # Architecture
//!
//! - Controllers are a closed set ([`ProcessController`]), dispatched by match
//! - Evaluation takes `&self`; the next controller memory is returned in the
//!   output and only committed once the whole cycle has been dispatched
//! - Redundant equipment is never addressed by unit: controllers ask a
//!   [`hl_equipment::CapacityBroker`] for group capacity
//! - Controllers with modal behaviour (Intake, Treatment) run the
//!   Normal/Degraded/Shutdown machine in [`mode`]

pub mod aeration;
pub mod context;
pub mod dosing;
pub mod error;
pub mod hysteresis;
pub mod intake;
pub mod mode;
pub mod monitoring;
pub mod pi;
pub mod process;
pub mod treatment;

pub use aeration::{AerationConfig, AerationController};
pub use context::{ControllerMemory, ControllerOutput, CycleContext, Metric, SectionRecord, Upstream};
pub use dosing::{ChemicalConfig, DoseLaw, DosingConfig, DosingController, TankConfig};
pub use error::{ControlError, ControlResult};
pub use hysteresis::HysteresisLatch;
pub use intake::{IntakeConfig, IntakeController, IntakeMemory, ScreenConfig};
pub use mode::{AlarmPressure, Mode, ModePolicy, ModeState};
pub use monitoring::{MonitoringConfig, MonitoringController};
pub use pi::{PiLoop, PiState, PiStep, Saturation};
pub use process::{ControllersConfig, ProcessController, build_controllers};
pub use treatment::{TreatmentConfig, TreatmentController};
