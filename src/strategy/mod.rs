//! Pluggable selector mapping `(enabled set, current operation, RNG state)`
//! to the next operation to run.
//!
//! A tagged variant behind a small capability trait, rather than a
//! subclass hierarchy behind a trait object.

mod none;
mod pct;
mod random;

pub use none::NoneStrategy;
pub use pct::PctStrategy;
pub use random::RandomStrategy;

use crate::operation::OperationId;
use crate::settings::{ExplorationStrategy, Settings};

/// Contract implemented by every exploration strategy.
pub trait Strategy {
    /// Resets any per-iteration state (RNG position, PCT priorities and
    /// change points) for a fresh `attach`/`detach` cycle.
    fn prepare_for_iteration(&mut self, seed: u64, iteration_index: u64);

    /// Chooses the next operation to run. `enabled` is sorted ascending
    /// by id; the choice is otherwise reproducible purely from RNG state.
    fn next(&mut self, enabled: &[OperationId], current: Option<OperationId>) -> OperationId;

    fn next_integer(&mut self, bound: usize) -> usize;

    fn next_boolean(&mut self) -> bool;
}

/// Tagged variant over the concrete strategies, avoiding a `dyn Strategy`
/// trait object and the allocation it would need in hot scheduling paths.
#[derive(Debug, Clone)]
pub enum StrategyKind {
    None(NoneStrategy),
    Random(RandomStrategy),
    Pct(PctStrategy),
}

impl StrategyKind {
    pub fn from_settings(settings: &Settings) -> Self {
        match settings.exploration_strategy() {
            ExplorationStrategy::None => StrategyKind::None(NoneStrategy::new()),
            ExplorationStrategy::Random => StrategyKind::Random(RandomStrategy::new(
                settings.random_seed(),
                settings.exploration_strategy_bound(),
            )),
            ExplorationStrategy::Pct => StrategyKind::Pct(PctStrategy::new(
                settings.random_seed(),
                settings.exploration_strategy_bound(),
            )),
        }
    }
}

impl Strategy for StrategyKind {
    fn prepare_for_iteration(&mut self, seed: u64, iteration_index: u64) {
        match self {
            StrategyKind::None(s) => s.prepare_for_iteration(seed, iteration_index),
            StrategyKind::Random(s) => s.prepare_for_iteration(seed, iteration_index),
            StrategyKind::Pct(s) => s.prepare_for_iteration(seed, iteration_index),
        }
    }

    fn next(&mut self, enabled: &[OperationId], current: Option<OperationId>) -> OperationId {
        match self {
            StrategyKind::None(s) => s.next(enabled, current),
            StrategyKind::Random(s) => s.next(enabled, current),
            StrategyKind::Pct(s) => s.next(enabled, current),
        }
    }

    fn next_integer(&mut self, bound: usize) -> usize {
        match self {
            StrategyKind::None(s) => s.next_integer(bound),
            StrategyKind::Random(s) => s.next_integer(bound),
            StrategyKind::Pct(s) => s.next_integer(bound),
        }
    }

    fn next_boolean(&mut self) -> bool {
        match self {
            StrategyKind::None(s) => s.next_boolean(),
            StrategyKind::Random(s) => s.next_boolean(),
            StrategyKind::Pct(s) => s.next_boolean(),
        }
    }
}
