//! Probabilistic Concurrency Testing strategy.
//!
//! Priorities are modelled as a rank order rather than literal integers:
//! `priority_order[0]` is the highest-priority operation currently known
//! to the strategy, `priority_order.last()` the lowest. A "priority
//! change" demotes an operation by moving it to the back of the order,
//! which is equivalent to, and simpler than, assigning it a fresh integer
//! below the current minimum.

use std::collections::BTreeSet;

use crate::operation::OperationId;
use crate::rng::{mix_iteration_seed, Rng};
use crate::strategy::Strategy;

/// Upper bound on scheduling steps considered per iteration when picking
/// priority-change points. Adaptive in spirit: it simply needs to be large
/// relative to how many scheduling points a typical iteration hits; the
/// exact value does not affect correctness, only how spread out the
/// priority-change points are.
const DEFAULT_MAX_SCHEDULING_STEPS: u64 = 10_000;

#[derive(Debug, Clone)]
pub struct PctStrategy {
    rng: Rng,
    max_priority_switches: usize,
    max_scheduling_steps: u64,
    priority_order: Vec<OperationId>,
    change_points: BTreeSet<u64>,
    step_counter: u64,
    switches_performed: usize,
}

impl PctStrategy {
    pub fn new(seed: u64, max_priority_switches: usize) -> Self {
        let mut strategy = PctStrategy {
            rng: Rng::new(seed),
            max_priority_switches,
            max_scheduling_steps: DEFAULT_MAX_SCHEDULING_STEPS,
            priority_order: Vec::new(),
            change_points: BTreeSet::new(),
            step_counter: 0,
            switches_performed: 0,
        };
        strategy.regenerate_change_points();
        strategy
    }

    fn regenerate_change_points(&mut self) {
        self.change_points.clear();
        let upper = self.max_scheduling_steps.max(2);
        let target = self.max_priority_switches.min((upper - 1) as usize);
        while self.change_points.len() < target {
            let candidate = 1 + self.rng.next_bound((upper - 1) as usize) as u64;
            self.change_points.insert(candidate);
        }
    }

    fn observe(&mut self, enabled: &[OperationId]) {
        for &id in enabled {
            if !self.priority_order.contains(&id) {
                let position = self.rng.next_bound(self.priority_order.len() + 1);
                self.priority_order.insert(position, id);
            }
        }
    }

    fn highest_priority_enabled(&self, enabled: &[OperationId]) -> OperationId {
        self.priority_order
            .iter()
            .find(|id| enabled.contains(id))
            .copied()
            .expect("priority_order observes every enabled operation before selection")
    }

    /// Number of priority changes performed so far this iteration.
    pub fn switches_performed(&self) -> usize {
        self.switches_performed
    }
}

impl Strategy for PctStrategy {
    fn prepare_for_iteration(&mut self, seed: u64, iteration_index: u64) {
        self.rng = Rng::new(mix_iteration_seed(seed, iteration_index));
        self.priority_order.clear();
        self.step_counter = 0;
        self.switches_performed = 0;
        self.regenerate_change_points();
    }

    fn next(&mut self, enabled: &[OperationId], _current: Option<OperationId>) -> OperationId {
        debug_assert!(!enabled.is_empty(), "next() requires a non-empty enabled set");

        self.step_counter += 1;
        self.observe(enabled);

        if self.change_points.contains(&self.step_counter)
            && self.switches_performed < self.max_priority_switches
        {
            let demoted = self.highest_priority_enabled(enabled);
            self.priority_order.retain(|id| *id != demoted);
            self.priority_order.push(demoted);
            self.switches_performed += 1;
        }

        self.highest_priority_enabled(enabled)
    }

    fn next_integer(&mut self, bound: usize) -> usize {
        self.rng.next_bound(bound)
    }

    fn next_boolean(&mut self) -> bool {
        self.rng.next_bool()
    }
}
