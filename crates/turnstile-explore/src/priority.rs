//! Priority-based exploration with change points.
//!
//! Each machine gets a random priority when it first becomes visible. At
//! every step the highest-priority enabled machine runs. A few steps per
//! iteration are sampled as change points; at a change point the machine
//! that would have run is demoted to the lowest priority. Bugs that need
//! only a handful of ordering constraints are found with good probability
//! without enumerating interleavings.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use turnstile_model::MachineId;
use turnstile_runtime::{SchedulingStrategy, StrategyError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityConfig {
    /// Priority change points sampled per iteration.
    pub change_points: usize,
    /// Initial guess of the run length, used to place change points.
    /// Grows to the longest run observed.
    pub expected_steps: u64,
}

impl Default for PriorityConfig {
    fn default() -> Self {
        Self {
            change_points: 2,
            expected_steps: 100,
        }
    }
}

pub struct PriorityStrategy {
    seed: u64,
    config: PriorityConfig,
    rng: ChaCha8Rng,
    /// Highest priority first.
    priorities: Vec<MachineId>,
    change_points: BTreeSet<u64>,
    longest_run: u64,
}

impl PriorityStrategy {
    pub fn new(seed: u64, config: PriorityConfig) -> Self {
        Self {
            seed,
            rng: ChaCha8Rng::seed_from_u64(seed),
            longest_run: config.expected_steps.max(1),
            config,
            priorities: Vec::new(),
            change_points: BTreeSet::new(),
        }
    }

    pub fn change_points(&self) -> impl Iterator<Item = u64> + '_ {
        self.change_points.iter().copied()
    }

    fn rank_new_machines(&mut self, enabled: &[MachineId]) {
        for id in enabled {
            if !self.priorities.contains(id) {
                let slot = self.rng.gen_range(0..=self.priorities.len());
                self.priorities.insert(slot, *id);
            }
        }
    }

    fn highest(&self, enabled: &[MachineId]) -> Option<MachineId> {
        self.priorities
            .iter()
            .copied()
            .find(|id| enabled.binary_search(id).is_ok())
    }
}

impl SchedulingStrategy for PriorityStrategy {
    fn name(&self) -> &str {
        "priority"
    }

    fn prepare(&mut self, iteration: u64) -> bool {
        self.rng = ChaCha8Rng::seed_from_u64(self.seed.wrapping_add(iteration));
        self.priorities.clear();
        self.change_points.clear();
        let wanted = (self.config.change_points as u64).min(self.longest_run);
        while (self.change_points.len() as u64) < wanted {
            let point = self.rng.gen_range(0..self.longest_run);
            self.change_points.insert(point);
        }
        log::debug!(
            "priority iteration {}: change points {:?}",
            iteration,
            self.change_points
        );
        true
    }

    fn next_machine(
        &mut self,
        enabled: &[MachineId],
        _current: Option<MachineId>,
        step: u64,
    ) -> Result<MachineId, StrategyError> {
        self.longest_run = self.longest_run.max(step + 1);
        self.rank_new_machines(enabled);

        if self.change_points.contains(&step) {
            if let Some(top) = self.highest(enabled) {
                self.priorities.retain(|id| *id != top);
                self.priorities.push(top);
                log::trace!("step {}: demoted {}", step, top);
            }
        }

        self.highest(enabled).ok_or(StrategyError::NoEnabledMachine)
    }

    fn next_bool(&mut self, _caller: MachineId) -> Result<bool, StrategyError> {
        Ok(self.rng.gen())
    }

    fn next_integer(&mut self, _caller: MachineId, bound: u64) -> Result<u64, StrategyError> {
        if bound == 0 {
            return Err(StrategyError::EmptyDomain);
        }
        Ok(self.rng.gen_range(0..bound))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: u64) -> Vec<MachineId> {
        (0..n).map(MachineId).collect()
    }

    #[test]
    fn sticks_with_highest_priority_between_change_points() {
        let config = PriorityConfig {
            change_points: 0,
            expected_steps: 10,
        };
        let mut strategy = PriorityStrategy::new(11, config);
        strategy.prepare(0);
        let enabled = ids(4);
        let first = strategy.next_machine(&enabled, None, 0).unwrap();
        for step in 1..20 {
            assert_eq!(strategy.next_machine(&enabled, None, step).unwrap(), first);
        }
    }

    #[test]
    fn change_point_demotes_the_running_machine() {
        let config = PriorityConfig {
            change_points: 1,
            expected_steps: 1,
        };
        let mut strategy = PriorityStrategy::new(5, config);
        strategy.prepare(0);
        assert_eq!(strategy.change_points().collect::<Vec<_>>(), vec![0]);

        let enabled = ids(3);
        strategy.rank_new_machines(&enabled);
        let before = strategy.highest(&enabled).unwrap();
        let chosen = strategy.next_machine(&enabled, None, 0).unwrap();
        assert_ne!(chosen, before);
        assert_eq!(strategy.priorities.last(), Some(&before));
    }

    #[test]
    fn only_enabled_machines_are_chosen() {
        let mut strategy = PriorityStrategy::new(9, PriorityConfig::default());
        strategy.prepare(0);
        strategy.next_machine(&ids(5), None, 0).unwrap();
        for step in 1..50 {
            let chosen = strategy.next_machine(&[MachineId(1), MachineId(3)], None, step).unwrap();
            assert!(chosen == MachineId(1) || chosen == MachineId(3));
        }
    }

    #[test]
    fn same_seed_same_schedule() {
        let run = |seed| {
            let mut strategy = PriorityStrategy::new(seed, PriorityConfig::default());
            strategy.prepare(2);
            (0..30)
                .map(|step| strategy.next_machine(&ids(4), None, step).unwrap())
                .collect::<Vec<_>>()
        };
        assert_eq!(run(21), run(21));
    }

    #[test]
    fn change_points_track_longest_run() {
        let mut strategy = PriorityStrategy::new(1, PriorityConfig {
            change_points: 3,
            expected_steps: 2,
        });
        strategy.prepare(0);
        assert!(strategy.change_points().count() <= 2);
        for step in 0..500 {
            strategy.next_machine(&ids(2), None, step).unwrap();
        }
        strategy.prepare(1);
        assert_eq!(strategy.change_points().count(), 3);
        assert!(strategy.change_points().all(|p| p < 500));
    }
}
