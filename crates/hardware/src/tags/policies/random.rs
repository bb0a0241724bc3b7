//! Random Replacement Policy.
//!
//! Evicts a block chosen uniformly at random from the candidate list. The
//! generator is seeded from the configuration so runs are reproducible.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::ReplacementPolicy;

/// Random Policy state.
#[derive(Debug)]
pub struct RandomPolicy {
    rng: StdRng,
}

impl RandomPolicy {
    /// Creates a new Random policy instance.
    ///
    /// # Arguments
    ///
    /// * `seed` - Seed for the pseudo-random generator.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl ReplacementPolicy for RandomPolicy {
    /// Access patterns do not affect random replacement.
    fn touch(&mut self, _set: usize, _way: usize) {}

    fn reset(&mut self, _set: usize, _way: usize) {}

    fn invalidate(&mut self, _set: usize, _way: usize) {}

    fn get_victim(&mut self, _set: usize, candidates: &[usize]) -> usize {
        candidates[self.rng.gen_range(0..candidates.len())]
    }
}
