//! Bounded depth-first enumeration of schedules.
//!
//! Every decision with more than one option pushes a frame recording how
//! many options there were and which one was taken. The next iteration
//! replays the stack, bumping the deepest frame that still has untried
//! options and discarding everything below it. Once the stack empties
//! the search is exhausted.

use serde::{Deserialize, Serialize};
use turnstile_model::MachineId;
use turnstile_runtime::{SchedulingStrategy, StrategyError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DfsConfig {
    /// Decisions beyond this depth always take the first option and are
    /// not backtracked.
    pub max_depth: usize,
}

impl Default for DfsConfig {
    fn default() -> Self {
        Self { max_depth: 64 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Choice {
    options: u64,
    taken: u64,
}

pub struct DfsStrategy {
    config: DfsConfig,
    stack: Vec<Choice>,
    position: usize,
    /// Set once any run hit `max_depth`; the search is then incomplete.
    truncated: bool,
    exhausted: bool,
}

impl DfsStrategy {
    pub fn new(config: DfsConfig) -> Self {
        Self {
            config,
            stack: Vec::new(),
            position: 0,
            truncated: false,
            exhausted: false,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// True when some schedule was cut short by the depth bound.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    fn choose(&mut self, options: u64) -> u64 {
        if options <= 1 {
            return 0;
        }
        if self.position >= self.config.max_depth {
            self.truncated = true;
            return 0;
        }
        let taken = match self.stack.get_mut(self.position) {
            Some(frame) => {
                if frame.options != options {
                    log::warn!(
                        "dfs: decision {} offered {} options, previously {}; program is not deterministic",
                        self.position,
                        options,
                        frame.options
                    );
                    frame.options = options;
                    frame.taken = frame.taken.min(options - 1);
                }
                frame.taken
            }
            None => {
                self.stack.push(Choice { options, taken: 0 });
                0
            }
        };
        self.position += 1;
        taken
    }

    fn backtrack(&mut self) -> bool {
        // Frames the last run never reached are stale.
        self.stack.truncate(self.position);
        while let Some(frame) = self.stack.last_mut() {
            if frame.taken + 1 < frame.options {
                frame.taken += 1;
                return true;
            }
            self.stack.pop();
        }
        false
    }
}

impl SchedulingStrategy for DfsStrategy {
    fn name(&self) -> &str {
        "dfs"
    }

    fn prepare(&mut self, iteration: u64) -> bool {
        if self.exhausted {
            return false;
        }
        if iteration > 0 && !self.backtrack() {
            log::info!("dfs: search space exhausted after {} schedules", iteration);
            self.exhausted = true;
            return false;
        }
        self.position = 0;
        true
    }

    fn next_machine(
        &mut self,
        enabled: &[MachineId],
        _current: Option<MachineId>,
        _step: u64,
    ) -> Result<MachineId, StrategyError> {
        if enabled.is_empty() {
            return Err(StrategyError::NoEnabledMachine);
        }
        let index = self.choose(enabled.len() as u64) as usize;
        Ok(enabled[index])
    }

    fn next_bool(&mut self, _caller: MachineId) -> Result<bool, StrategyError> {
        Ok(self.choose(2) == 1)
    }

    fn next_integer(&mut self, _caller: MachineId, bound: u64) -> Result<u64, StrategyError> {
        if bound == 0 {
            return Err(StrategyError::EmptyDomain);
        }
        Ok(self.choose(bound))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Drive one iteration that makes `decisions` binary choices.
    fn run(strategy: &mut DfsStrategy, decisions: usize) -> Vec<bool> {
        (0..decisions)
            .map(|_| strategy.next_bool(MachineId(0)).unwrap())
            .collect()
    }

    #[test]
    fn enumerates_all_binary_sequences() {
        let mut strategy = DfsStrategy::new(DfsConfig::default());
        let mut seen = Vec::new();
        let mut iteration = 0;
        while strategy.prepare(iteration) {
            seen.push(run(&mut strategy, 3));
            iteration += 1;
        }
        assert_eq!(seen.len(), 8);
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 8);
        assert!(strategy.is_exhausted());
        assert!(!strategy.is_truncated());
    }

    #[test]
    fn single_option_decisions_add_no_frames() {
        let mut strategy = DfsStrategy::new(DfsConfig::default());
        assert!(strategy.prepare(0));
        for step in 0..10 {
            strategy.next_machine(&[MachineId(3)], None, step).unwrap();
        }
        assert_eq!(strategy.next_integer(MachineId(3), 1).unwrap(), 0);
        assert_eq!(strategy.depth(), 0);
        assert!(!strategy.prepare(1));
    }

    #[test]
    fn depth_bound_truncates() {
        let mut strategy = DfsStrategy::new(DfsConfig { max_depth: 2 });
        let mut iterations = 0;
        while strategy.prepare(iterations) {
            run(&mut strategy, 5);
            iterations += 1;
        }
        assert_eq!(iterations, 4);
        assert!(strategy.is_truncated());
    }

    #[test]
    fn varying_shapes_are_covered() {
        // First choice picks a machine; only machine 1 then makes a choice
        // among three values.
        let mut strategy = DfsStrategy::new(DfsConfig::default());
        let enabled = [MachineId(0), MachineId(1)];
        let mut runs = Vec::new();
        let mut iteration = 0;
        while strategy.prepare(iteration) {
            let who = strategy.next_machine(&enabled, None, 0).unwrap();
            let value = if who == MachineId(1) {
                Some(strategy.next_integer(who, 3).unwrap())
            } else {
                None
            };
            runs.push((who, value));
            iteration += 1;
        }
        assert_eq!(
            runs,
            vec![
                (MachineId(0), None),
                (MachineId(1), Some(0)),
                (MachineId(1), Some(1)),
                (MachineId(1), Some(2)),
            ]
        );
    }

    #[test]
    fn exhausted_stays_exhausted() {
        let mut strategy = DfsStrategy::new(DfsConfig::default());
        assert!(strategy.prepare(0));
        assert!(!strategy.prepare(1));
        assert!(!strategy.prepare(2));
    }
}
