//! A small, explicitly-specified, portable pseudo-random generator.
//!
//! Xoroshiro128+ seeded with `SeedableRng::seed_from_u64` (SplitMix64 under
//! the hood, as documented by `rand_xoshiro`). Any two implementations
//! agreeing on the seed and on this recurrence produce the same draw
//! sequence.

use rand_core::{RngCore, SeedableRng};
use rand_xoshiro::Xoroshiro128Plus;

/// Reproducible draw source shared by every [`crate::strategy::Strategy`].
#[derive(Debug, Clone)]
pub struct Rng {
    inner: Xoroshiro128Plus,
}

impl Rng {
    pub fn new(seed: u64) -> Self {
        Rng {
            inner: Xoroshiro128Plus::seed_from_u64(seed),
        }
    }

    /// Draws a uniform value in `0..bound`. Returns `0` if `bound == 0`.
    pub fn next_bound(&mut self, bound: usize) -> usize {
        if bound == 0 {
            return 0;
        }
        (self.inner.next_u64() % bound as u64) as usize
    }

    pub fn next_bool(&mut self) -> bool {
        self.next_bound(2) == 1
    }

    pub fn next_u64(&mut self) -> u64 {
        self.inner.next_u64()
    }
}

/// Mixes an iteration index into a base seed so that successive
/// iterations under the same `Settings` explore distinct interleavings
/// while remaining fully reproducible from `(seed, iteration_index)`.
/// Golden-ratio constant multiplication, the same splitting trick
/// `SeedableRng::seed_from_u64`'s SplitMix64 step uses internally.
pub fn mix_iteration_seed(seed: u64, iteration_index: u64) -> u64 {
    seed ^ iteration_index.wrapping_mul(0x9E37_79B9_7F4A_7C15)
}
