//! First-In, First-Out (FIFO) Replacement Policy.
//!
//! Evicts the block that was inserted earliest, regardless of how often it has
//! been hit since. Each block records a monotonically increasing insertion stamp.

use super::ReplacementPolicy;

/// FIFO Policy state.
#[derive(Debug)]
pub struct FifoPolicy {
    /// Insertion stamp per `(set, way)`; zero means never inserted or invalidated.
    inserted: Vec<Vec<u64>>,
    /// Next stamp handed out on insertion.
    next_stamp: u64,
}

impl FifoPolicy {
    /// Creates a new FIFO policy instance.
    ///
    /// # Arguments
    ///
    /// * `sets` - The number of sets in the cache.
    /// * `ways` - The associativity (number of ways) of the cache.
    pub fn new(sets: usize, ways: usize) -> Self {
        Self {
            inserted: vec![vec![0; ways]; sets],
            next_stamp: 1,
        }
    }
}

impl ReplacementPolicy for FifoPolicy {
    /// Hits do not change insertion order.
    fn touch(&mut self, _set: usize, _way: usize) {}

    fn reset(&mut self, set: usize, way: usize) {
        self.inserted[set][way] = self.next_stamp;
        self.next_stamp += 1;
    }

    fn invalidate(&mut self, set: usize, way: usize) {
        self.inserted[set][way] = 0;
    }

    /// Returns the candidate with the oldest insertion stamp.
    fn get_victim(&mut self, set: usize, candidates: &[usize]) -> usize {
        let stamps = &self.inserted[set];
        candidates
            .iter()
            .copied()
            .min_by_key(|&way| stamps[way])
            .unwrap_or(candidates[0])
    }
}
