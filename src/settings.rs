//! Configuration record consumed by [`crate::Scheduler::attach`].

use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::ErrorCode;

/// Which exploration strategy a [`Settings`] instance installs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExplorationStrategy {
    /// Controlled scheduling disabled: operations are never parked against
    /// their will.
    None,
    Random,
    Pct,
}

/// Plain options record: strategy selection, its bound, and the seed.
#[derive(Debug, Clone)]
pub struct Settings {
    strategy_type: ExplorationStrategy,
    strategy_bound: usize,
    seed: u64,
}

impl Settings {
    /// Random strategy, `seed` from the system clock, matching the C++
    /// default of seeding from `high_resolution_clock::now()`.
    pub fn new() -> Self {
        Settings {
            strategy_type: ExplorationStrategy::Random,
            strategy_bound: 100,
            seed: default_seed(),
        }
    }

    /// Installs the random strategy with `seed`, always switching away
    /// from the current operation (`probability = 100`).
    pub fn use_random_strategy(&mut self, seed: u64) {
        self.strategy_type = ExplorationStrategy::Random;
        self.seed = seed;
        self.strategy_bound = 100;
    }

    /// Installs the random strategy with `seed` and an explicit switch
    /// `probability` in `0..=100`. Returns `ErrorCode::Failure` and leaves
    /// `self` unmodified if `probability > 100`.
    pub fn use_random_strategy_with_probability(
        &mut self,
        seed: u64,
        probability: usize,
    ) -> ErrorCode {
        if probability > 100 {
            return ErrorCode::Failure;
        }
        self.strategy_type = ExplorationStrategy::Random;
        self.seed = seed;
        self.strategy_bound = probability;
        ErrorCode::Success
    }

    /// Installs the PCT strategy with `seed` and `max_priority_switches`.
    pub fn use_pct_strategy(&mut self, seed: u64, max_priority_switches: usize) {
        self.strategy_type = ExplorationStrategy::Pct;
        self.seed = seed;
        self.strategy_bound = max_priority_switches;
    }

    /// Disables controlled scheduling.
    pub fn disable_scheduling(&mut self) {
        self.strategy_type = ExplorationStrategy::None;
    }

    pub fn exploration_strategy(&self) -> ExplorationStrategy {
        self.strategy_type
    }

    pub fn exploration_strategy_bound(&self) -> usize {
        self.strategy_bound
    }

    pub fn random_seed(&self) -> u64 {
        self.seed
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings::new()
    }
}

fn default_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_strategy_rejects_large_probability() {
        let mut settings = Settings::new();
        let code = settings.use_random_strategy_with_probability(1, 101);
        assert_eq!(code, ErrorCode::Failure);
        // unmodified: still whatever it was before (default Random/100).
        assert_eq!(settings.exploration_strategy_bound(), 100);
    }

    #[test]
    fn use_random_strategy_defaults_to_always_switch() {
        let mut settings = Settings::new();
        settings.use_random_strategy(7);
        assert_eq!(settings.exploration_strategy(), ExplorationStrategy::Random);
        assert_eq!(settings.exploration_strategy_bound(), 100);
        assert_eq!(settings.random_seed(), 7);
    }

    #[test]
    fn disable_scheduling_sets_none() {
        let mut settings = Settings::new();
        settings.disable_scheduling();
        assert_eq!(settings.exploration_strategy(), ExplorationStrategy::None);
    }
}
