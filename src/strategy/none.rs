//! `Settings::disable_scheduling()` installs this: every call to `next`
//! sticks with the current operation when possible, otherwise picks the
//! lowest enabled id, so a program runs start-to-finish in creation order
//! without the strategy ever forcing a switch. The scheduler still gates
//! host threads one-at-a-time (that part of the core is unconditional),
//! only the *choice* of who runs next stops being randomised.

use crate::operation::OperationId;
use crate::rng::Rng;
use crate::strategy::Strategy;

#[derive(Debug, Clone)]
pub struct NoneStrategy {
    rng: Rng,
}

impl NoneStrategy {
    pub fn new() -> Self {
        NoneStrategy { rng: Rng::new(0) }
    }
}

impl Default for NoneStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for NoneStrategy {
    fn prepare_for_iteration(&mut self, seed: u64, iteration_index: u64) {
        self.rng = Rng::new(crate::rng::mix_iteration_seed(seed, iteration_index));
    }

    fn next(&mut self, enabled: &[OperationId], current: Option<OperationId>) -> OperationId {
        if let Some(cur) = current {
            if enabled.contains(&cur) {
                return cur;
            }
        }
        enabled[0]
    }

    fn next_integer(&mut self, bound: usize) -> usize {
        self.rng.next_bound(bound)
    }

    fn next_boolean(&mut self) -> bool {
        self.rng.next_bool()
    }
}
