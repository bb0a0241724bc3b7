//! Least Recently Used (LRU) Replacement Policy.
//!
//! This policy evicts the block that has not been accessed for the longest time.
//! It maintains a usage stack for each set. When a block is accessed or inserted,
//! it is moved to the top (Most Recently Used position); an invalidated block
//! drops to the bottom so it is reused first.
//!
//! # Performance
//!
//! - **Time Complexity:**
//!   - `touch()`: O(W) where W is the number of ways (associativity)
//!   - `get_victim()`: O(W)
//! - **Space Complexity:** O(S × W) where S is the number of sets
//! - **Worst Case:** Scanning patterns larger than cache capacity (thrashing)

use super::ReplacementPolicy;

/// LRU Policy state.
#[derive(Debug)]
pub struct LruPolicy {
    /// A vector of usage stacks (one per set).
    /// Index 0 is MRU, last index is LRU.
    usage: Vec<Vec<usize>>,
}

impl LruPolicy {
    /// Creates a new LRU policy instance.
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

    fn promote(&mut self, set: usize, way: usize) {
        let stack = &mut self.usage[set];
        if let Some(pos) = stack.iter().position(|&x| x == way) {
            let _ = stack.remove(pos);
        }
        stack.insert(0, way);
    }
}

impl ReplacementPolicy for LruPolicy {
    fn touch(&mut self, set: usize, way: usize) {
        self.promote(set, way);
    }

    fn reset(&mut self, set: usize, way: usize) {
        self.promote(set, way);
    }

    fn invalidate(&mut self, set: usize, way: usize) {
        let stack = &mut self.usage[set];
        if let Some(pos) = stack.iter().position(|&x| x == way) {
            let _ = stack.remove(pos);
        }
        stack.push(way);
    }

    /// Returns the candidate lowest in the usage stack.
    fn get_victim(&mut self, set: usize, candidates: &[usize]) -> usize {
        self.usage[set]
            .iter()
            .rev()
            .find(|way| candidates.contains(way))
            .copied()
            .unwrap_or(candidates[0])
    }
}
