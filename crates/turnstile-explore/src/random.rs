//! Uniform random exploration.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use turnstile_model::MachineId;
use turnstile_runtime::{SchedulingStrategy, StrategyError};

/// Picks uniformly among enabled machines and choice values.
///
/// Iteration `i` uses seed `seed + i`, so any single iteration can be
/// rerun on its own.
pub struct RandomStrategy {
    seed: u64,
    rng: ChaCha8Rng,
}

impl RandomStrategy {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }
}

impl SchedulingStrategy for RandomStrategy {
    fn name(&self) -> &str {
        "random"
    }

    fn prepare(&mut self, iteration: u64) -> bool {
        self.rng = ChaCha8Rng::seed_from_u64(self.seed.wrapping_add(iteration));
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
        Ok(enabled[self.rng.gen_range(0..enabled.len())])
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
