//! Most Recently Used (MRU) Replacement Policy.
//!
//! This policy evicts the block that was accessed most recently.
//! While counter-intuitive for standard workloads, MRU is optimal for
//! cyclic access patterns (loops) where the dataset is larger than the cache.

use super::ReplacementPolicy;

/// MRU Policy state.
#[derive(Debug)]
pub struct MruPolicy {
    /// A vector of usage stacks (one per set).
    /// Index 0 is the MRU position (victim), last index is LRU.
    usage: Vec<Vec<usize>>,
}

impl MruPolicy {
    /// Creates a new MRU policy instance.
    ///
    /// # Arguments
    ///
    /// * `sets` - The number of sets in the cache.
    /// * `ways` - The associativity (number of ways) of the cache.
    pub fn new(sets: usize, ways: usize) -> Self {
        let mut usage = Vec::with_capacity(sets);
        for _ in 0..sets {
            usage.push((0..ways).collect());
        }
        Self { usage }
    }

    fn unlink(&mut self, set: usize, way: usize) {
        let stack = &mut self.usage[set];
        if let Some(pos) = stack.iter().position(|&x| x == way) {
            let _ = stack.remove(pos);
        }
    }
}

impl ReplacementPolicy for MruPolicy {
    fn touch(&mut self, set: usize, way: usize) {
        self.unlink(set, way);
        self.usage[set].insert(0, way);
    }

    fn reset(&mut self, set: usize, way: usize) {
        self.touch(set, way);
    }

    fn invalidate(&mut self, set: usize, way: usize) {
        self.unlink(set, way);
        self.usage[set].push(way);
    }

    /// Returns the candidate highest in the usage stack.
    fn get_victim(&mut self, set: usize, candidates: &[usize]) -> usize {
        self.usage[set]
            .iter()
            .find(|way| candidates.contains(way))
            .copied()
            .unwrap_or(candidates[0])
    }
}
