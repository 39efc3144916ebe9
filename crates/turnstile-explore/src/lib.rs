//! Systematic exploration of turnstile programs.
//!
//! A [`TestingEngine`] runs a program many times under a
//! [`SchedulingStrategy`](turnstile_runtime::SchedulingStrategy), stopping
//! at the first run whose outcome is a bug. The bug's trace log replays
//! the run exactly through [`replay`].
//!
//! Strategies:
//! - [`RandomStrategy`]: uniform choices from a seeded ChaCha stream.
//! - [`PriorityStrategy`]: random priorities with a few change points.
//! - [`DfsStrategy`]: bounded depth-first enumeration of every decision.
//! - [`ReplayStrategy`]: answers from a recorded trace.

pub mod artifact;
pub mod dfs;
pub mod engine;
pub mod priority;
pub mod random;
pub mod replay;
pub mod report;
pub mod strategy;

pub use artifact::{load_bug, save_bug, ArtifactError, BugArtifact};
pub use dfs::{DfsConfig, DfsStrategy};
pub use engine::{
    replay, replay_artifact, BugReport, EngineConfig, EngineError, EngineReport, EngineStats,
    TestingEngine,
};
pub use priority::{PriorityConfig, PriorityStrategy};
pub use random::RandomStrategy;
pub use replay::ReplayStrategy;
pub use report::{format_bug, format_coverage, format_report};
pub use strategy::StrategyKind;
