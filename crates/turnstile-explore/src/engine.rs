//! The bug-finding loop.
//!
//! ```text
//!   for iteration in 0..iterations:
//!       strategy.prepare(iteration) ──false──▶ search exhausted
//!       fresh Controller ─▶ program(&mut controller) ─▶ run
//!       bug? ──yes──▶ persist artifact, stop
//! ```
//!
//! Each iteration builds the program from scratch, so nothing carries
//! over between runs except the shared registry of validated state tables
//! and the merged coverage.

use crate::artifact::{self, ArtifactError, BugArtifact};
use crate::replay::ReplayStrategy;
use crate::report;
use crate::strategy::StrategyKind;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;
use thiserror::Error;
use turnstile_model::Registry;
use turnstile_runtime::{
    Controller, CoverageGraph, MachineSummary, Outcome, RunReport, RuntimeConfig, RuntimeError,
    SchedulingStrategy,
};
use turnstile_trace::TraceLog;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub iterations: u64,
    pub seed: u64,
    pub strategy: StrategyKind,
    pub runtime: RuntimeConfig,
    /// Where to write the artifact of the first bug found.
    pub output_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            iterations: 100,
            seed: 42,
            strategy: StrategyKind::Random,
            runtime: RuntimeConfig::default(),
            output_dir: None,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.iterations == 0 {
            return Err(EngineError::Config("iterations must be at least 1".into()));
        }
        if self.runtime.max_steps == 0 {
            return Err(EngineError::Config("max_steps must be at least 1".into()));
        }
        let liveness = &self.runtime.liveness;
        if liveness.enabled {
            if liveness.sample_interval == 0 {
                return Err(EngineError::Config(
                    "liveness sample_interval must be at least 1".into(),
                ));
            }
            if liveness.repeats < 2 || liveness.repeats > liveness.window {
                return Err(EngineError::Config(format!(
                    "liveness repeats must be between 2 and window ({}), got {}",
                    liveness.window, liveness.repeats
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    /// The program failed while setting up a run.
    #[error("program setup failed: {0}")]
    Runtime(#[from] RuntimeError),

    /// The runtime or strategy broke one of its own invariants.
    #[error("internal error in iteration {iteration}: {detail}")]
    Internal { iteration: u64, detail: String },

    #[error("failed to persist bug: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("invalid configuration: {0}")]
    Config(String),
}

/// The first failing run found by an engine.
#[derive(Debug, Clone)]
pub struct BugReport {
    pub strategy: String,
    pub iteration: u64,
    pub outcome: Outcome,
    pub detail: Option<String>,
    pub steps: u64,
    pub machines: Vec<MachineSummary>,
    pub trace: TraceLog,
    /// `bug.json`, when the engine was given an output directory.
    pub artifact: Option<PathBuf>,
}

impl BugReport {
    fn from_run(strategy: &str, iteration: u64, run: RunReport) -> Self {
        Self {
            strategy: strategy.to_string(),
            iteration,
            outcome: run.outcome,
            detail: run.detail,
            steps: run.steps,
            machines: run.machines,
            trace: run.trace,
            artifact: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineStats {
    pub iterations: u64,
    pub total_steps: u64,
    pub max_steps: u64,
    /// Runs per outcome label.
    pub outcomes: BTreeMap<String, u64>,
    pub elapsed_ms: u128,
}

impl EngineStats {
    fn record(&mut self, run: &RunReport) {
        self.iterations += 1;
        self.total_steps += run.steps;
        self.max_steps = self.max_steps.max(run.steps);
        *self
            .outcomes
            .entry(run.outcome.label().to_string())
            .or_insert(0) += 1;
    }

    pub fn mean_steps(&self) -> f64 {
        if self.iterations == 0 {
            0.0
        } else {
            self.total_steps as f64 / self.iterations as f64
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineReport {
    pub strategy: String,
    pub iterations_run: u64,
    /// The strategy ran out of schedules before `iterations`.
    pub exhausted: bool,
    pub bug: Option<BugReport>,
    pub stats: EngineStats,
    pub coverage: CoverageGraph,
}

impl EngineReport {
    pub fn found_bug(&self) -> bool {
        self.bug.is_some()
    }
}

/// Runs a program repeatedly under a strategy until a bug shows up.
///
/// The program is a function that creates the initial machines (and
/// optionally sends harness events) on a fresh controller.
pub struct TestingEngine<F> {
    config: EngineConfig,
    program: F,
}

impl<F> TestingEngine<F>
where
    F: Fn(&mut Controller<'_>) -> Result<(), RuntimeError>,
{
    pub fn new(config: EngineConfig, program: F) -> Self {
        Self { config, program }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn run(&self) -> Result<EngineReport, EngineError> {
        self.config.validate()?;
        let mut strategy = self.config.strategy.build(self.config.seed);
        info!(
            "exploring with {} for up to {} iterations (seed {})",
            self.config.strategy, self.config.iterations, self.config.seed
        );

        let registry = Registry::new();
        let started = Instant::now();
        let mut stats = EngineStats::default();
        let mut coverage = CoverageGraph::new();
        let mut exhausted = false;
        let mut bug = None;

        for iteration in 0..self.config.iterations {
            if !strategy.prepare(iteration) {
                exhausted = true;
                break;
            }
            let run = self.run_once(strategy.as_mut(), &registry)?;
            stats.record(&run);
            coverage.merge(&run.coverage);

            if run.outcome == Outcome::Internal {
                return Err(EngineError::Internal {
                    iteration,
                    detail: run.detail.unwrap_or_default(),
                });
            }
            if run.is_bug() {
                warn!(
                    "iteration {}: {} after {} steps",
                    iteration, run.outcome, run.steps
                );
                bug = Some(BugReport::from_run(strategy.name(), iteration, run));
                break;
            }
            if (iteration + 1) % 1000 == 0 {
                info!("{} iterations, no bug yet", iteration + 1);
            }
        }
        stats.elapsed_ms = started.elapsed().as_millis();

        let mut report = EngineReport {
            strategy: strategy.name().to_string(),
            iterations_run: stats.iterations,
            exhausted,
            bug,
            stats,
            coverage,
        };

        if let (Some(dir), Some(found)) = (&self.config.output_dir, &report.bug) {
            let artifact = BugArtifact::new(&self.config, found);
            let path = artifact::save_bug(dir, &artifact, &report::format_report(&report))?;
            info!("bug written to {}", path.display());
            if let Some(found) = report.bug.as_mut() {
                found.artifact = Some(path);
            }
        }

        match &report.bug {
            Some(found) => info!(
                "bug found with reproducible trace in iteration {}: {}",
                found.iteration, found.outcome
            ),
            None => info!("no bug found in {} iterations", report.iterations_run),
        }
        Ok(report)
    }

    fn run_once(
        &self,
        strategy: &mut dyn SchedulingStrategy,
        registry: &Registry,
    ) -> Result<RunReport, EngineError> {
        let mut controller =
            Controller::with_registry(strategy, self.config.runtime.clone(), registry.clone());
        (self.program)(&mut controller)?;
        Ok(controller.run())
    }
}

/// Rerun `program` under a recorded trace.
///
/// A faithful replay reproduces the recorded outcome with every entry
/// consumed. If the program stops early, the run is reported as a
/// divergence too.
pub fn replay<F>(
    program: F,
    runtime: &RuntimeConfig,
    trace: TraceLog,
) -> Result<RunReport, EngineError>
where
    F: Fn(&mut Controller<'_>) -> Result<(), RuntimeError>,
{
    let recorded = trace.len();
    let mut strategy = ReplayStrategy::new(trace);
    strategy.prepare(0);
    let mut run = {
        let mut controller = Controller::new(&mut strategy, runtime.clone());
        program(&mut controller)?;
        controller.run()
    };
    if run.outcome != Outcome::ReplayDivergence && strategy.remaining() > 0 {
        run.detail = Some(format!(
            "program stopped with {} after {} of {} recorded entries",
            run.outcome,
            strategy.cursor(),
            recorded
        ));
        run.outcome = Outcome::ReplayDivergence;
    }
    Ok(run)
}

/// Replay the bug in a saved artifact with the configuration it was found
/// under.
pub fn replay_artifact<F>(program: F, artifact: &BugArtifact) -> Result<RunReport, EngineError>
where
    F: Fn(&mut Controller<'_>) -> Result<(), RuntimeError>,
{
    replay(program, &artifact.config.runtime, artifact.trace.clone())
}
