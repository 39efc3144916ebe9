//! Classification of a finished run.

use crate::coverage::CoverageGraph;
use serde::{Deserialize, Serialize};
use std::fmt;
use turnstile_model::{MachineFault, MachineId, Status};
use turnstile_trace::TraceLog;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Nothing left to run and nobody waiting.
    Completed,
    /// The step bound was reached before the program settled.
    BoundReached,
    AssertionFailure,
    UnhandledEvent,
    Deadlock,
    LivenessViolation,
    /// Any other fault in user code, including panics.
    Exception,
    /// A replayed trace no longer matches the program.
    ReplayDivergence,
    /// The runtime or strategy broke an invariant of its own.
    Internal,
}

impl Outcome {
    /// A failure of the program under test.
    pub fn is_bug(self) -> bool {
        !matches!(
            self,
            Outcome::Completed | Outcome::BoundReached | Outcome::Internal
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            Outcome::Completed => "completed",
            Outcome::BoundReached => "bound reached",
            Outcome::AssertionFailure => "assertion failure",
            Outcome::UnhandledEvent => "unhandled event",
            Outcome::Deadlock => "deadlock",
            Outcome::LivenessViolation => "liveness violation",
            Outcome::Exception => "exception",
            Outcome::ReplayDivergence => "replay divergence",
            Outcome::Internal => "internal error",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Final view of one machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineSummary {
    pub id: MachineId,
    pub machine_type: String,
    pub state: String,
    /// Bottom of the stack first.
    pub stack: Vec<String>,
    pub status: Status,
    pub pending: usize,
    pub receiving: bool,
}

/// Result of one controlled run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcome: Outcome,
    /// Human-readable description of the failure, if any.
    pub detail: Option<String>,
    /// The machine fault behind the outcome, when one machine is to blame.
    pub fault: Option<MachineFault>,
    pub trace: TraceLog,
    pub steps: u64,
    pub machines: Vec<MachineSummary>,
    pub coverage: CoverageGraph,
}

impl RunReport {
    pub fn is_bug(&self) -> bool {
        self.outcome.is_bug()
    }

    pub fn machine(&self, id: MachineId) -> Option<&MachineSummary> {
        self.machines.iter().find(|m| m.id == id)
    }
}
