//! Replay of a recorded trace.
//!
//! Every decision is answered from the trace and every forced point is
//! checked against it. The first mismatch is reported as a divergence,
//! with the entry index where the program and the recording part ways.

use turnstile_model::MachineId;
use turnstile_runtime::{SchedulingStrategy, StrategyError};
use turnstile_trace::{PointKind, TraceEntry, TraceLog};

pub struct ReplayStrategy {
    trace: TraceLog,
    cursor: usize,
}

impl ReplayStrategy {
    pub fn new(trace: TraceLog) -> Self {
        Self { trace, cursor: 0 }
    }

    /// Recorded entries not yet consumed.
    pub fn remaining(&self) -> usize {
        self.trace.len().saturating_sub(self.cursor)
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Consume the next entry, which must be of `kind`.
    fn consume(&mut self, kind: PointKind) -> Result<TraceEntry, StrategyError> {
        let index = self.cursor;
        let entry = *self
            .trace
            .get(index)
            .ok_or(StrategyError::TraceExhausted { index, kind })?;
        if entry.kind != kind {
            return Err(StrategyError::Divergence {
                index,
                expected: entry,
                actual: format!("a {} point", kind),
            });
        }
        self.cursor += 1;
        Ok(entry)
    }
}

impl SchedulingStrategy for ReplayStrategy {
    fn name(&self) -> &str {
        "replay"
    }

    fn prepare(&mut self, iteration: u64) -> bool {
        self.cursor = 0;
        iteration == 0
    }

    fn next_machine(
        &mut self,
        enabled: &[MachineId],
        _current: Option<MachineId>,
        _step: u64,
    ) -> Result<MachineId, StrategyError> {
        let index = self.cursor;
        let entry = self.consume(PointKind::Schedule)?;
        let chosen = MachineId(entry.value);
        if enabled.binary_search(&chosen).is_err() {
            return Err(StrategyError::Divergence {
                index,
                expected: entry,
                actual: format!(
                    "enabled machines [{}]",
                    enabled
                        .iter()
                        .map(|id| id.to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            });
        }
        Ok(chosen)
    }

    fn next_bool(&mut self, _caller: MachineId) -> Result<bool, StrategyError> {
        let index = self.cursor;
        let entry = self.consume(PointKind::Bool)?;
        match entry.value {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(StrategyError::Divergence {
                index,
                expected: entry,
                actual: "a boolean".to_string(),
            }),
        }
    }

    fn next_integer(&mut self, _caller: MachineId, bound: u64) -> Result<u64, StrategyError> {
        let index = self.cursor;
        let entry = self.consume(PointKind::Integer)?;
        if entry.value >= bound {
            return Err(StrategyError::Divergence {
                index,
                expected: entry,
                actual: format!("a value below {}", bound),
            });
        }
        Ok(entry.value)
    }

    fn observe(&mut self, kind: PointKind, value: u64) -> Result<(), StrategyError> {
        let index = self.cursor;
        let entry = self.consume(kind)?;
        if entry.value != value {
            return Err(StrategyError::Divergence {
                index,
                expected: entry,
                actual: TraceEntry::new(kind, value).to_string(),
            });
        }
        Ok(())
    }
}
