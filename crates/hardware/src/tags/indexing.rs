//! Address-to-slot indexing.
//!
//! An indexing policy decides which slots of the tag store may hold a given
//! address. It provides:
//! 1. **Tag Extraction:** The bits of an address stored alongside a block.
//! 2. **Candidate Lookup:** The ordered slots an address may live in.
//! 3. **Registration:** One-time assignment of each block to a `(set, way)` position.
//! 4. **Address Regeneration:** Rebuilding a block address from its tag and set.
//!
//! Only conventional set-associative placement is provided.

use crate::common::addr::{Addr, floor_log2, is_power_of_two};
use crate::common::error::ConfigError;

/// Maps addresses to the slots of a tag store.
///
/// Slots are referred to by their linear block index in the tag store.
pub trait IndexingPolicy: Send + Sync + std::fmt::Debug {
    /// Number of sets.
    fn num_sets(&self) -> usize;

    /// Ways per set.
    fn assoc(&self) -> usize;

    /// Extracts the tag stored alongside a block holding `addr`.
    fn extract_tag(&self, addr: Addr) -> Addr;

    /// Extracts the set index of `addr`.
    fn extract_set(&self, addr: Addr) -> usize;

    /// Returns the slots that may hold `addr`, ordered by way.
    fn possible_entries(&self, addr: Addr) -> &[usize];

    /// Registers the block with linear index `index` and returns its `(set, way)`.
    ///
    /// Called exactly once per block while the tag store is built.
    fn set_entry(&mut self, index: usize) -> (usize, usize);

    /// Returns the slot registered at `(set, way)`.
    fn entry(&self, set: usize, way: usize) -> Option<usize>;

    /// Rebuilds the block address from a tag and the set it lives in.
    fn regenerate_addr(&self, tag: Addr, set: usize) -> Addr;
}

/// Conventional set-associative placement.
///
/// Block `index` lives in set `index / assoc`, way `index % assoc`. The set of an
/// address is taken from the bits just above the block offset.
#[derive(Debug, Clone)]
pub struct SetAssociative {
    assoc: usize,
    num_sets: usize,
    set_shift: u32,
    set_mask: Addr,
    tag_shift: u32,
    /// Registered slots per set, ordered by way.
    sets: Vec<Vec<usize>>,
}

impl SetAssociative {
    /// Creates the indexing for a cache geometry.
    ///
    /// # Arguments
    ///
    /// * `size` - Total capacity in bytes.
    /// * `blk_size` - Block size in bytes; a power of two.
    /// * `assoc` - Ways per set.
    ///
    /// # Returns
    ///
    /// The policy, or an error if `assoc` is zero or the set count is not a power of two.
    pub fn new(size: usize, blk_size: usize, assoc: usize) -> Result<Self, ConfigError> {
        if assoc == 0 {
            return Err(ConfigError::ZeroAssociativity);
        }
        if blk_size == 0 || !is_power_of_two(blk_size as u64) {
            return Err(ConfigError::InvalidBlockSize(blk_size));
        }
        let num_sets = size / (blk_size * assoc);
        if !is_power_of_two(num_sets as u64) {
            return Err(ConfigError::SetsNotPowerOfTwo(num_sets));
        }
        let set_shift = floor_log2(blk_size as u64);
        Ok(Self {
            assoc,
            num_sets,
            set_shift,
            set_mask: num_sets as Addr - 1,
            tag_shift: set_shift + floor_log2(num_sets as u64),
            sets: vec![Vec::with_capacity(assoc); num_sets],
        })
    }
}

impl IndexingPolicy for SetAssociative {
    fn num_sets(&self) -> usize {
        self.num_sets
    }

    fn assoc(&self) -> usize {
        self.assoc
    }

    fn extract_tag(&self, addr: Addr) -> Addr {
        addr >> self.tag_shift
    }

    fn extract_set(&self, addr: Addr) -> usize {
        ((addr >> self.set_shift) & self.set_mask) as usize
    }

    fn possible_entries(&self, addr: Addr) -> &[usize] {
        &self.sets[self.extract_set(addr)]
    }

    fn set_entry(&mut self, index: usize) -> (usize, usize) {
        let set = index / self.assoc;
        let way = index % self.assoc;
        self.sets[set].push(index);
        (set, way)
    }

    fn entry(&self, set: usize, way: usize) -> Option<usize> {
        self.sets.get(set).and_then(|ways| ways.get(way)).copied()
    }

    fn regenerate_addr(&self, tag: Addr, set: usize) -> Addr {
        (tag << self.tag_shift) | ((set as Addr) << self.set_shift)
    }
}
