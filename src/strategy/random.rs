//! Uniform random strategy.

use crate::operation::OperationId;
use crate::rng::{mix_iteration_seed, Rng};
use crate::strategy::Strategy;

/// Sticky-random strategy: switches away from `current` with probability
/// `probability / 100`, otherwise draws uniformly from the enabled set.
#[derive(Debug, Clone)]
pub struct RandomStrategy {
    rng: Rng,
    seed: u64,
    probability: usize,
}

impl RandomStrategy {
    pub fn new(seed: u64, probability: usize) -> Self {
        RandomStrategy {
            rng: Rng::new(seed),
            seed,
            probability,
        }
    }
}

impl Strategy for RandomStrategy {
    fn prepare_for_iteration(&mut self, seed: u64, iteration_index: u64) {
        self.seed = seed;
        self.rng = Rng::new(mix_iteration_seed(seed, iteration_index));
    }

    fn next(&mut self, enabled: &[OperationId], current: Option<OperationId>) -> OperationId {
        debug_assert!(!enabled.is_empty(), "next() requires a non-empty enabled set");

        if let Some(cur) = current {
            if enabled.contains(&cur) {
                let draw = self.rng.next_bound(100);
                if draw >= self.probability {
                    return cur;
                }
            }
        }

        let index = self.rng.next_bound(enabled.len());
        enabled[index]
    }

    fn next_integer(&mut self, bound: usize) -> usize {
        self.rng.next_bound(bound)
    }

    fn next_boolean(&mut self) -> bool {
        self.rng.next_bool()
    }
}
