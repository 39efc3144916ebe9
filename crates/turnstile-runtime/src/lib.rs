//! Runtimes for turnstile machines.
//!
//! Two ways to run the same machine types:
//!
//! - [`Controller`]: systematic testing. Exactly one machine runs between
//!   scheduling points; every decision comes from a
//!   [`SchedulingStrategy`] and is recorded in a trace log, so any run can
//!   be replayed. The run ends with an [`Outcome`] classification.
//! - [`ThreadedRuntime`]: production. One OS thread per machine, genuine
//!   randomness.
//!
//! # Determinism
//!
//! Under the controller, identical strategy answers give identical runs,
//! provided action code is itself deterministic given its inputs. The
//! liveness fingerprint uses `DefaultHasher::new()`, whose keys are fixed.

pub mod config;
pub mod controller;
pub mod coverage;
pub mod error;
pub mod liveness;
pub mod outcome;
pub mod strategy;
pub mod threaded;

pub use config::{LivenessConfig, RuntimeConfig};
pub use controller::Controller;
pub use coverage::{CoverageGraph, Edge, EdgeKind, MachineCoverage, StateCoverage};
pub use error::RuntimeError;
pub use liveness::{fingerprint, LivenessMonitor, Repeat};
pub use outcome::{MachineSummary, Outcome, RunReport};
pub use strategy::{FirstEnabled, SchedulingStrategy, StrategyError};
pub use threaded::{ThreadFault, ThreadedRuntime};
