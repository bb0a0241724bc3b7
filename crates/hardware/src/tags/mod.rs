//! Tag store.
//!
//! The tag store owns every block of the cache and the data array behind them.
//! It provides:
//! 1. **Lookup:** Side-effect-free `find_block` and the accounting `access_block`.
//! 2. **Replacement:** Victim selection that prefers invalid slots and otherwise
//!    defers to a pluggable [`ReplacementPolicy`].
//! 3. **Insertion and Invalidation:** Block lifecycle with per-requestor occupancy,
//!    reference counting and a one-shot warm-up latch.
//! 4. **Statistics:** Tag/data access counts, reference totals and age histograms.
//!
//! Blocks are referred to by their linear slot index; the indexing policy maps
//! addresses to candidate slots.

/// Per-slot block metadata.
pub mod block;

/// Address-to-slot indexing policies.
pub mod indexing;

/// Replacement policies.
pub mod policies;

use std::collections::BTreeMap;
use std::fmt::Write as _;

use tracing::trace;

pub use block::CacheBlock;
pub use indexing::{IndexingPolicy, SetAssociative};
pub use policies::ReplacementPolicy;

use crate::common::addr::{Addr, Cycles, RequestorId, Tick, block_align, block_offset};
use crate::common::error::{CacheError, ConfigError};
use crate::config::CacheConfig;

/// Upper bounds, in ticks, of the block-age buckets reported by [`TagStore::compute_stats`].
pub const AGE_BUCKETS: [Tick; 4] = [10_000, 100_000, 1_000_000, 10_000_000];

/// Counters maintained by the tag store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagStats {
    /// Blocks currently holding a valid tag.
    pub tags_in_use: u64,
    /// References accumulated from invalidated (and cleaned-up) blocks.
    pub total_refs: u64,
    /// Number of blocks whose references were accumulated.
    pub sampled_refs: u64,
    /// Tick at which the cache became warmed up.
    pub warmup_tick: Option<Tick>,
    /// Valid blocks per inserting requestor.
    pub occupancies: BTreeMap<RequestorId, u64>,
    /// Tag array accesses.
    pub tag_accesses: u64,
    /// Data array accesses.
    pub data_accesses: u64,
}

impl TagStats {
    /// Average number of references per sampled block.
    pub fn avg_refs(&self) -> f64 {
        if self.sampled_refs == 0 {
            0.0
        } else {
            self.total_refs as f64 / self.sampled_refs as f64
        }
    }
}

/// Blocks and data of one cache.
#[derive(Debug)]
pub struct TagStore {
    blk_size: usize,
    lookup_latency: Cycles,
    sequential_access: bool,
    indexing: Box<dyn IndexingPolicy>,
    policy: Box<dyn ReplacementPolicy>,
    blocks: Vec<CacheBlock>,
    data: Vec<u8>,
    warmup_bound: u64,
    warmed_up: bool,
    stats: TagStats,
}

impl TagStore {
    /// Builds the tag store described by a cache configuration.
    ///
    /// # Arguments
    ///
    /// * `config` - The cache configuration; its geometry is validated here.
    pub fn new(config: &CacheConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let indexing = SetAssociative::new(config.size_bytes, config.line_bytes, config.ways)?;
        let policy = policies::build(config.policy, indexing.num_sets(), config.ways, config.seed);
        Ok(Self::with_parts(
            Box::new(indexing),
            policy,
            config.line_bytes,
            config.tag_latency,
            config.sequential_access,
            config.warmup_percentage,
        ))
    }

    /// Builds a tag store from an explicit indexing and replacement policy.
    ///
    /// # Arguments
    ///
    /// * `indexing` - Address-to-slot mapping; fixes the number of blocks.
    /// * `policy` - Victim selection among valid blocks.
    /// * `blk_size` - Block size in bytes.
    /// * `lookup_latency` - Tag lookup latency in cycles.
    /// * `sequential_access` - Data is read only after the tag lookup completes.
    /// * `warmup_percentage` - Share of blocks that must be valid to latch warm-up.
    pub fn with_parts(
        mut indexing: Box<dyn IndexingPolicy>,
        policy: Box<dyn ReplacementPolicy>,
        blk_size: usize,
        lookup_latency: Cycles,
        sequential_access: bool,
        warmup_percentage: u8,
    ) -> Self {
        let num_blocks = indexing.num_sets() * indexing.assoc();
        let blocks = (0..num_blocks)
            .map(|index| {
                let (set, way) = indexing.set_entry(index);
                CacheBlock::new(set, way)
            })
            .collect();
        Self {
            blk_size,
            lookup_latency,
            sequential_access,
            indexing,
            policy,
            blocks,
            data: vec![0; num_blocks * blk_size],
            warmup_bound: (u64::from(warmup_percentage) * num_blocks as u64) / 100,
            warmed_up: false,
            stats: TagStats::default(),
        }
    }

    /// Block size in bytes.
    pub const fn blk_size(&self) -> usize {
        self.blk_size
    }

    /// Total number of blocks.
    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Number of sets.
    pub fn num_sets(&self) -> usize {
        self.indexing.num_sets()
    }

    /// Ways per set.
    pub fn assoc(&self) -> usize {
        self.indexing.assoc()
    }

    /// Tag lookup latency in cycles.
    pub const fn lookup_latency(&self) -> Cycles {
        self.lookup_latency
    }

    /// Returns `true` once the warm-up threshold has been reached.
    pub const fn is_warmed_up(&self) -> bool {
        self.warmed_up
    }

    /// Tag store counters.
    pub const fn stats(&self) -> &TagStats {
        &self.stats
    }

    /// Aligns an address to the start of its block.
    pub const fn blk_align(&self, addr: Addr) -> Addr {
        block_align(addr, self.blk_size)
    }

    /// Offset of an address within its block.
    pub const fn extract_blk_offset(&self, addr: Addr) -> usize {
        block_offset(addr, self.blk_size)
    }

    /// Extracts the tag of an address.
    pub fn extract_tag(&self, addr: Addr) -> Addr {
        self.indexing.extract_tag(addr)
    }

    /// Metadata of a slot.
    pub fn block(&self, index: usize) -> &CacheBlock {
        &self.blocks[index]
    }

    /// Mutable metadata of a slot.
    pub fn block_mut(&mut self, index: usize) -> &mut CacheBlock {
        &mut self.blocks[index]
    }

    /// Data bytes of a slot.
    pub fn data(&self, index: usize) -> &[u8] {
        let start = index * self.blk_size;
        &self.data[start..start + self.blk_size]
    }

    /// Mutable data bytes of a slot.
    pub fn data_mut(&mut self, index: usize) -> &mut [u8] {
        let start = index * self.blk_size;
        &mut self.data[start..start + self.blk_size]
    }

    /// Metadata and data of a slot, both mutable.
    pub fn block_and_data_mut(&mut self, index: usize) -> (&mut CacheBlock, &mut [u8]) {
        let start = index * self.blk_size;
        (
            &mut self.blocks[index],
            &mut self.data[start..start + self.blk_size],
        )
    }

    /// Finds the valid block holding `addr` without touching any state.
    ///
    /// # Returns
    ///
    /// The slot index, or `None` on a miss.
    pub fn find_block(&self, addr: Addr, secure: bool) -> Option<usize> {
        let tag = self.indexing.extract_tag(addr);
        self.indexing
            .possible_entries(addr)
            .iter()
            .copied()
            .find(|&index| self.blocks[index].matches(tag, secure))
    }

    /// Looks up `addr` as part of a demand access.
    ///
    /// A hit increments the block's reference count and touches its replacement
    /// state. Tag and data access counters are updated for hits and misses alike.
    ///
    /// # Returns
    ///
    /// The matching slot, if any, and the tag lookup latency.
    pub fn access_block(&mut self, addr: Addr, secure: bool) -> (Option<usize>, Cycles) {
        let found = self.find_block(addr, secure);
        let assoc = self.indexing.assoc() as u64;
        self.stats.tag_accesses += assoc;
        if self.sequential_access {
            if found.is_some() {
                self.stats.data_accesses += 1;
            }
        } else {
            self.stats.data_accesses += assoc;
        }
        if let Some(index) = found {
            let blk = &mut self.blocks[index];
            blk.ref_count += 1;
            self.policy.touch(blk.set, blk.way);
        }
        (found, self.lookup_latency)
    }

    /// Chooses the slot a new block for `addr` will be placed in.
    ///
    /// Invalid candidates are preferred; otherwise the replacement policy picks
    /// among the candidates and the chosen block is appended to `evict_list`.
    ///
    /// # Arguments
    ///
    /// * `addr` - Address of the incoming block.
    /// * `evict_list` - Receives the valid blocks that must be evicted first.
    pub fn find_victim(&mut self, addr: Addr, evict_list: &mut Vec<usize>) -> usize {
        let candidates = self.indexing.possible_entries(addr);
        if let Some(&free) = candidates.iter().find(|&&index| !self.blocks[index].valid) {
            return free;
        }
        let set = self.blocks[candidates[0]].set;
        let ways: Vec<usize> = candidates.iter().map(|&index| self.blocks[index].way).collect();
        let way = self.policy.get_victim(set, &ways);
        let victim = candidates
            .iter()
            .copied()
            .find(|&index| self.blocks[index].way == way)
            .unwrap_or(candidates[0]);
        trace!(addr, set, way, "victim selected");
        evict_list.push(victim);
        victim
    }

    /// Installs a block for `addr` into an invalid slot.
    ///
    /// # Arguments
    ///
    /// * `addr` - Any address within the incoming block.
    /// * `secure` - Secure address space flag.
    /// * `requestor` - Component that caused the insertion.
    /// * `task_id` - Task that caused the insertion.
    /// * `index` - Slot returned by [`Self::find_victim`], already invalidated.
    /// * `now` - Current tick.
    pub fn insert_block(
        &mut self,
        addr: Addr,
        secure: bool,
        requestor: RequestorId,
        task_id: u32,
        index: usize,
        now: Tick,
    ) -> Result<(), CacheError> {
        let tag = self.indexing.extract_tag(addr);
        let blk = &mut self.blocks[index];
        blk.insert(tag, secure, requestor, task_id, now)?;
        let (set, way) = (blk.set, blk.way);

        *self.stats.occupancies.entry(requestor).or_default() += 1;
        self.stats.tags_in_use += 1;
        if !self.warmed_up && self.stats.tags_in_use >= self.warmup_bound {
            self.warmed_up = true;
            self.stats.warmup_tick = Some(now);
        }
        self.policy.reset(set, way);
        self.stats.tag_accesses += 1;
        self.stats.data_accesses += 1;
        Ok(())
    }

    /// Invalidates a valid block, folding its references into the statistics.
    pub fn invalidate(&mut self, index: usize) -> Result<(), CacheError> {
        let blk = &mut self.blocks[index];
        if !blk.valid {
            return Err(CacheError::BlockNotValid {
                set: blk.set,
                way: blk.way,
            });
        }
        if let Some(requestor) = blk.requestor {
            if let Some(count) = self.stats.occupancies.get_mut(&requestor) {
                *count = count.saturating_sub(1);
            }
        }
        self.stats.total_refs += u64::from(blk.ref_count);
        self.stats.sampled_refs += 1;
        self.stats.tags_in_use = self.stats.tags_in_use.saturating_sub(1);
        self.policy.invalidate(blk.set, blk.way);
        blk.invalidate();
        Ok(())
    }

    /// Returns the slot registered at `(set, way)`, valid or not.
    pub fn find_block_by_set_and_way(&self, set: usize, way: usize) -> Option<usize> {
        self.indexing.entry(set, way)
    }

    /// Rebuilds the block address of a slot from its tag and set.
    pub fn regenerate_blk_addr(&self, index: usize) -> Addr {
        let blk = &self.blocks[index];
        self.indexing.regenerate_addr(blk.tag, blk.set)
    }

    /// Calls `f` for every slot.
    pub fn for_each_blk(&self, mut f: impl FnMut(usize, &CacheBlock)) {
        for (index, blk) in self.blocks.iter().enumerate() {
            f(index, blk);
        }
    }

    /// Returns `true` if any slot satisfies `pred`.
    pub fn any_blk(&self, pred: impl FnMut(&CacheBlock) -> bool) -> bool {
        self.blocks.iter().any(pred)
    }

    /// Folds the references of still-valid blocks into the statistics.
    ///
    /// Called once at the end of a run so long-lived blocks are not missed.
    pub fn cleanup_refs(&mut self) {
        for blk in self.blocks.iter().filter(|blk| blk.valid) {
            self.stats.total_refs += u64::from(blk.ref_count);
            self.stats.sampled_refs += 1;
        }
    }

    /// Occupancy per task, split into age buckets.
    ///
    /// # Returns
    ///
    /// For each task id, the number of valid blocks younger than each bound in
    /// [`AGE_BUCKETS`], with the last bucket counting everything older.
    pub fn compute_stats(&self, now: Tick) -> BTreeMap<u32, [u64; AGE_BUCKETS.len() + 1]> {
        let mut by_task: BTreeMap<u32, [u64; AGE_BUCKETS.len() + 1]> = BTreeMap::new();
        for blk in self.blocks.iter().filter(|blk| blk.valid) {
            let age = now.saturating_sub(blk.tick_inserted);
            let bucket = AGE_BUCKETS
                .iter()
                .position(|&bound| age < bound)
                .unwrap_or(AGE_BUCKETS.len());
            by_task.entry(blk.task_id).or_default()[bucket] += 1;
        }
        by_task
    }

    /// Renders every valid block, one per line.
    pub fn print(&self) -> String {
        let mut out = String::new();
        for (index, blk) in self.blocks.iter().enumerate().filter(|(_, blk)| blk.valid) {
            let _ = writeln!(out, "[{index:>5}] addr={:#x} {blk}", self.regenerate_blk_addr(index));
        }
        out
    }
}
