//! The seam between the controller and exploration policies.

use thiserror::Error;
use turnstile_model::MachineId;
use turnstile_trace::{PointKind, TraceEntry};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StrategyError {
    /// A replayed decision no longer fits the live program.
    #[error("replay diverged at entry {index}: trace has {expected}, program offers {actual}")]
    Divergence {
        index: usize,
        expected: TraceEntry,
        actual: String,
    },

    /// The program reached more scheduling points than were recorded.
    #[error("replay trace exhausted at entry {index} while program reached {kind}")]
    TraceExhausted { index: usize, kind: PointKind },

    #[error("asked to choose among no enabled machines")]
    NoEnabledMachine,

    #[error("integer choice with empty domain")]
    EmptyDomain,
}

impl StrategyError {
    /// True for errors caused by a recorded trace disagreeing with the
    /// program, as opposed to misuse of the strategy.
    pub fn is_divergence(&self) -> bool {
        matches!(
            self,
            StrategyError::Divergence { .. } | StrategyError::TraceExhausted { .. }
        )
    }
}

/// Decision policy consulted at every scheduling point.
///
/// A strategy is reused across iterations; [`SchedulingStrategy::prepare`]
/// resets its per-iteration state.
pub trait SchedulingStrategy {
    fn name(&self) -> &str;

    /// Reset for `iteration`. Returns false when there is nothing left to
    /// explore.
    fn prepare(&mut self, iteration: u64) -> bool;

    /// Pick the next machine to run. `enabled` is sorted and non-empty;
    /// `current` is the machine that ran the previous step.
    fn next_machine(
        &mut self,
        enabled: &[MachineId],
        current: Option<MachineId>,
        step: u64,
    ) -> Result<MachineId, StrategyError>;

    fn next_bool(&mut self, caller: MachineId) -> Result<bool, StrategyError>;

    /// A value in `0..bound`; `bound` is at least 1.
    fn next_integer(&mut self, caller: MachineId, bound: u64) -> Result<u64, StrategyError>;

    /// A point the program forces (creation, completion). Only strategies
    /// that check a recorded trace care.
    fn observe(&mut self, _kind: PointKind, _value: u64) -> Result<(), StrategyError> {
        Ok(())
    }
}

/// Runs machines in id order and always answers `false`/`0`. Useful for
/// unit tests and as a baseline.
#[derive(Debug, Default, Clone)]
pub struct FirstEnabled;

impl SchedulingStrategy for FirstEnabled {
    fn name(&self) -> &str {
        "first-enabled"
    }

    fn prepare(&mut self, iteration: u64) -> bool {
        iteration == 0
    }

    fn next_machine(
        &mut self,
        enabled: &[MachineId],
        _current: Option<MachineId>,
        _step: u64,
    ) -> Result<MachineId, StrategyError> {
        enabled.first().copied().ok_or(StrategyError::NoEnabledMachine)
    }

    fn next_bool(&mut self, _caller: MachineId) -> Result<bool, StrategyError> {
        Ok(false)
    }

    fn next_integer(&mut self, _caller: MachineId, bound: u64) -> Result<u64, StrategyError> {
        if bound == 0 {
            return Err(StrategyError::EmptyDomain);
        }
        Ok(0)
    }
}
