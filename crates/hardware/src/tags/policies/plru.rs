//! Pseudo-LRU (PLRU) Replacement Policy.
//!
//! Bit-based PLRU keeps one "recently used" bit per way. Accessing a block sets its
//! bit; when every bit in a set would be set, all bits except the accessed one are
//! cleared. The victim is the first candidate whose bit is clear.
//!
//! # Performance
//!
//! - **Time Complexity:**
//!   - `touch()`: O(1)
//!   - `get_victim()`: O(W)
//! - **Space Complexity:** O(S) words, one bit per way
//! - **Hardware Cost:** Low - simple bit operations

use super::ReplacementPolicy;

/// PLRU Policy state.
#[derive(Debug)]
pub struct PlruPolicy {
    /// Bitmask of recently used ways for each set.
    usage: Vec<u64>,
    /// Mask with one bit per way.
    all_ones: u64,
}

impl PlruPolicy {
    /// Creates a new PLRU policy instance.
    ///
    /// # Arguments
    ///
    /// * `sets` - The number of sets in the cache.
    /// * `ways` - The associativity (number of ways) of the cache; at most 64.
    pub fn new(sets: usize, ways: usize) -> Self {
        let all_ones = if ways >= 64 { u64::MAX } else { (1 << ways) - 1 };
        Self {
            usage: vec![0; sets],
            all_ones,
        }
    }
}

impl ReplacementPolicy for PlruPolicy {
    fn touch(&mut self, set: usize, way: usize) {
        let mask = 1 << way;
        self.usage[set] |= mask;
        if (self.usage[set] & self.all_ones) == self.all_ones {
            self.usage[set] = mask;
        }
    }

    fn reset(&mut self, set: usize, way: usize) {
        self.touch(set, way);
    }

    fn invalidate(&mut self, set: usize, way: usize) {
        self.usage[set] &= !(1 << way);
    }

    fn get_victim(&mut self, set: usize, candidates: &[usize]) -> usize {
        candidates
            .iter()
            .copied()
            .find(|&way| (self.usage[set] >> way) & 1 == 0)
            .unwrap_or(candidates[0])
    }
}
