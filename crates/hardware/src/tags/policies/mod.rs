//! Cache Replacement Policies.
//!
//! Implements the algorithms the tag store uses to choose a victim among the
//! occupied ways of a set. Invalid ways are always filled first by the tag store,
//! so a policy is only consulted when every candidate holds a valid block.
//!
//! # Policies
//!
//! - `Fifo`: First-In, First-Out.
//! - `Lru`: Least Recently Used.
//! - `Mru`: Most Recently Used.
//! - `Plru`: Bit-based pseudo-LRU.
//! - `Random`: Uniform random selection.

/// First-In, First-Out replacement policy.
pub mod fifo;

/// Least Recently Used replacement policy.
pub mod lru;

/// Most Recently Used replacement policy.
pub mod mru;

/// Bit-based pseudo-LRU replacement policy.
pub mod plru;

/// Random replacement policy.
pub mod random;

pub use fifo::FifoPolicy;
pub use lru::LruPolicy;
pub use mru::MruPolicy;
pub use plru::PlruPolicy;
pub use random::RandomPolicy;

use crate::config::ReplacementPolicy as PolicyKind;

/// Trait for cache replacement policies.
///
/// Each policy keeps its own per-block state, created for every `(set, way)` when
/// the policy is constructed, and updated through the hooks below.
pub trait ReplacementPolicy: Send + Sync + std::fmt::Debug {
    /// Updates the policy state when a block is accessed.
    ///
    /// # Arguments
    ///
    /// * `set` - The cache set index.
    /// * `way` - The way index within the set that was accessed.
    fn touch(&mut self, set: usize, way: usize);

    /// Resets the policy state when a new block is inserted.
    fn reset(&mut self, set: usize, way: usize);

    /// Clears the policy state when a block is invalidated.
    fn invalidate(&mut self, set: usize, way: usize);

    /// Selects a victim among the candidate ways of a set.
    ///
    /// # Arguments
    ///
    /// * `set` - The cache set index.
    /// * `candidates` - Ways that may be evicted, in indexing order; never empty.
    ///
    /// # Returns
    ///
    /// The way to evict; always one of `candidates`.
    fn get_victim(&mut self, set: usize, candidates: &[usize]) -> usize;
}

/// Builds the policy selected in the configuration.
///
/// # Arguments
///
/// * `kind` - Policy selected in the configuration.
/// * `sets` - Number of sets.
/// * `ways` - Associativity.
/// * `seed` - Seed for randomized policies.
pub fn build(kind: PolicyKind, sets: usize, ways: usize, seed: u64) -> Box<dyn ReplacementPolicy> {
    match kind {
        PolicyKind::Lru => Box::new(LruPolicy::new(sets, ways)),
        PolicyKind::Plru => Box::new(PlruPolicy::new(sets, ways)),
        PolicyKind::Fifo => Box::new(FifoPolicy::new(sets, ways)),
        PolicyKind::Random => Box::new(RandomPolicy::new(seed)),
        PolicyKind::Mru => Box::new(MruPolicy::new(sets, ways)),
    }
}
