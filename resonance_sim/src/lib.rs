//! Resonance Deterministic Simulation Harness
//!
//! Runs the activity engine on a virtual clock so that a whole session,
//! including "fresh" re-seeds, is reproducible from one master seed.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                      ScenarioRunner                        │
//! │  ┌────────────────┐  advance_time  ┌────────────────────┐  │
//! │  │  SimContext    │ ─────────────► │     Simulator      │  │
//! │  │ (virtual clock)│   advance_to   │  (resonance_core)  │  │
//! │  └────────────────┘                └─────────┬──────────┘  │
//! │                                              │ every topic │
//! │  ┌────────────────┐                ┌─────────▼──────────┐  │
//! │  │   SimExport    │ ◄── frames ─── │      Monitor       │  │
//! │  │  (JSON file)   │                │ (invariant checks) │  │
//! │  └────────────────┘                └────────────────────┘  │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use resonance_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42).with_duration(60.0).run(ScenarioId::Soak);
//! assert!(result.passed);
//! ```

mod context;
mod exporter;
mod monitor;
mod runner;
pub mod scenarios;

pub use context::SimContext;
pub use exporter::{SimEvent, SimExport, SimFrame};
pub use monitor::{Monitor, MonitorReport};
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner};

use thiserror::Error;

/// Errors surfaced by the harness CLI.
#[derive(Debug, Error)]
pub enum SimError {
    /// Engine configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] resonance_core::ConfigError),

    /// The live engine went away mid-run
    #[error("Engine error: {0}")]
    Engine(#[from] resonance_core::EngineError),

    /// Writing the export (or starting the live runtime) failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Usage(String),
}
