//! Bug artifacts on disk.
//!
//! A bug directory holds:
//! - `bug.json`: the engine configuration, the failing iteration and its
//!   outcome, final machine states and the trace
//! - `trace.json`: the trace alone, readable by `turnstile-trace`
//! - `report.txt`: the human-readable report

use crate::engine::{BugReport, EngineConfig};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};
use std::fs;
use std::path::{Path, PathBuf};
use turnstile_runtime::{MachineSummary, Outcome};
use turnstile_trace::TraceLog;

pub const BUG_FILE: &str = "bug.json";
pub const TRACE_FILE: &str = "trace.json";
pub const REPORT_FILE: &str = "report.txt";

#[derive(Debug, Snafu)]
pub enum ArtifactError {
    #[snafu(display("I/O error on {}", path.display()))]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display("JSON error in {}", path.display()))]
    Json {
        source: serde_json::Error,
        path: PathBuf,
    },
}

/// Everything needed to reproduce one failing run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BugArtifact {
    pub config: EngineConfig,
    pub strategy: String,
    pub iteration: u64,
    pub outcome: Outcome,
    pub detail: Option<String>,
    pub steps: u64,
    pub machines: Vec<MachineSummary>,
    pub trace: TraceLog,
}

impl BugArtifact {
    pub fn new(config: &EngineConfig, bug: &BugReport) -> Self {
        Self {
            config: config.clone(),
            strategy: bug.strategy.clone(),
            iteration: bug.iteration,
            outcome: bug.outcome,
            detail: bug.detail.clone(),
            steps: bug.steps,
            machines: bug.machines.clone(),
            trace: bug.trace.clone(),
        }
    }
}

/// Write `bug.json`, `trace.json` and `report.txt` into `dir`, creating it
/// if needed. Returns the path of `bug.json`.
pub fn save_bug(
    dir: &Path,
    artifact: &BugArtifact,
    report: &str,
) -> Result<PathBuf, ArtifactError> {
    fs::create_dir_all(dir).context(IoSnafu { path: dir })?;

    let bug_path = dir.join(BUG_FILE);
    let json = serde_json::to_string_pretty(artifact).context(JsonSnafu { path: &bug_path })?;
    fs::write(&bug_path, json).context(IoSnafu { path: &bug_path })?;

    let trace_path = dir.join(TRACE_FILE);
    let json =
        serde_json::to_string_pretty(&artifact.trace).context(JsonSnafu { path: &trace_path })?;
    fs::write(&trace_path, json).context(IoSnafu { path: &trace_path })?;

    let report_path = dir.join(REPORT_FILE);
    fs::write(&report_path, report).context(IoSnafu { path: &report_path })?;

    Ok(bug_path)
}

pub fn load_bug(path: &Path) -> Result<BugArtifact, ArtifactError> {
    let json = fs::read_to_string(path).context(IoSnafu { path })?;
    serde_json::from_str(&json).context(JsonSnafu { path })
}
