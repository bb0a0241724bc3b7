//! Configuration system for the cache model.
//!
//! This module defines all configuration structures and enums used to parameterize
//! a cache and its reference harness. It provides:
//! 1. **Defaults:** Baseline geometry, latencies and queue sizes.
//! 2. **Structures:** Cache, fault-injection, memory and top-level simulation config.
//! 3. **Enums:** Cache kind, replacement policy, prefetcher and memory controller types.
//! 4. **Validation:** Geometry checks performed before any component is built.
//!
//! Configuration is supplied as JSON (see [`SimConfig`]) or built in code from `Default`.

use std::path::PathBuf;

use serde::Deserialize;

use crate::common::addr::{Cycles, Tick, is_power_of_two};
use crate::common::error::ConfigError;

/// Default configuration constants.
///
/// These values define the baseline cache when not explicitly overridden.
mod defaults {
    /// Default cache name, also the owner tag matched by fault lists.
    pub const NAME: &str = "l1d";

    /// Default cache size in bytes (32 KiB).
    pub const CACHE_SIZE: usize = 32 * 1024;

    /// Default cache line size in bytes (64 bytes).
    pub const CACHE_LINE: usize = 64;

    /// Default cache associativity.
    pub const CACHE_WAYS: usize = 4;

    /// Default tag lookup latency in cycles.
    pub const TAG_LATENCY: u64 = 2;

    /// Default data array latency in cycles.
    pub const DATA_LATENCY: u64 = 2;

    /// Default latency to forward a response upwards, in cycles.
    pub const RESPONSE_LATENCY: u64 = 2;

    /// Default clock period in ticks.
    pub const CLOCK_PERIOD: u64 = 1;

    /// Default number of MSHRs.
    pub const MSHRS: usize = 4;

    /// Default number of MSHRs kept free of prefetches.
    pub const DEMAND_MSHR_RESERVE: usize = 1;

    /// Default number of targets that may be merged onto one MSHR.
    pub const TGTS_PER_MSHR: usize = 16;

    /// Default number of write-buffer entries.
    pub const WRITE_BUFFERS: usize = 8;

    /// Default prefetcher pattern table size (64 entries).
    pub const PREFETCH_TABLE_SIZE: usize = 64;

    /// Default prefetch degree (1 line per trigger).
    pub const PREFETCH_DEGREE: usize = 1;

    /// Default capacity of the queue of pending prefetch addresses.
    pub const PREFETCH_QUEUE_SIZE: usize = 32;

    /// Default seed for the random replacement policy.
    pub const SEED: u64 = 0x5eed;

    /// Default fixed memory latency in ticks.
    pub const MEMORY_LATENCY: u64 = 100;

    /// CAS latency in ticks.
    pub const T_CAS: u64 = 14;

    /// RAS latency in ticks.
    pub const T_RAS: u64 = 14;

    /// Precharge latency in ticks.
    pub const T_PRE: u64 = 14;

    /// Default number of requests memory accepts before pushing back.
    pub const MAX_OUTSTANDING: usize = 16;
}

/// Selects between the snoop-capable cache and the non-coherent variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum CacheKind {
    /// Cache that participates in snooping and tracks ownership.
    #[default]
    Coherent,
    /// Cache below the point of coherence; every fill is writable and snoops are rejected.
    Noncoherent,
}

/// Cache replacement policy algorithms.
///
/// Specifies the algorithm used to select which block to evict
/// when a new block must be installed in a full set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReplacementPolicy {
    /// Least Recently Used replacement policy.
    #[default]
    #[serde(alias = "Lru")]
    Lru,
    /// Bit-based pseudo-LRU replacement policy.
    #[serde(alias = "Plru")]
    Plru,
    /// First In First Out replacement policy.
    #[serde(alias = "Fifo")]
    Fifo,
    /// Uniform random choice among the candidates.
    #[serde(alias = "Random")]
    Random,
    /// Most Recently Used replacement policy.
    #[serde(alias = "Mru")]
    Mru,
}

/// Hardware prefetcher types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum Prefetcher {
    /// No prefetching enabled.
    #[default]
    None,
    /// Prefetches the blocks following each trigger address.
    NextLine,
    /// Detects constant strides and prefetches along them.
    Stride,
}

/// Memory controller implementation types for the reference harness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum MemoryController {
    /// Simple fixed-latency memory controller.
    #[default]
    Simple,
    /// DRAM controller with row buffer modeling.
    #[serde(alias = "DRAM")]
    Dram,
}

/// Top-level configuration for a cache driven by the reference harness.
///
/// # Examples
///
/// ```
/// use cachefi_core::config::{CacheKind, SimConfig};
///
/// let json = r#"{
///     "cache": {
///         "name": "l2",
///         "kind": "Noncoherent",
///         "size_bytes": 1024,
///         "line_bytes": 64,
///         "ways": 4
///     },
///     "memory": { "latency": 40 }
/// }"#;
///
/// let config = SimConfig::from_json(json).unwrap();
/// assert_eq!(config.cache.kind, CacheKind::Noncoherent);
/// assert_eq!(config.cache.num_sets(), 4);
/// assert_eq!(config.memory.latency, 40);
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SimConfig {
    /// The cache under test.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Backing memory.
    #[serde(default)]
    pub memory: MemoryConfig,
}

impl SimConfig {
    /// Parses a configuration from JSON and validates the cache parameters.
    ///
    /// # Returns
    ///
    /// The configuration, or [`ConfigError::Parse`] / the first validation failure.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.cache.validate()?;
        Ok(config)
    }
}

/// Parameters of a single cache.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Cache name; fault-list entries are matched against it
    #[serde(default = "CacheConfig::default_name")]
    pub name: String,

    /// Coherent or non-coherent variant
    #[serde(default)]
    pub kind: CacheKind,

    /// Total cache size in bytes
    #[serde(default = "CacheConfig::default_size")]
    pub size_bytes: usize,

    /// Cache line size in bytes
    #[serde(default = "CacheConfig::default_line")]
    pub line_bytes: usize,

    /// Associativity (number of ways)
    #[serde(default = "CacheConfig::default_ways")]
    pub ways: usize,

    /// Tag lookup latency in cycles
    #[serde(default = "CacheConfig::default_tag_latency")]
    pub tag_latency: Cycles,

    /// Data array access latency in cycles
    #[serde(default = "CacheConfig::default_data_latency")]
    pub data_latency: Cycles,

    /// Latency to send a response upwards in cycles
    #[serde(default = "CacheConfig::default_response_latency")]
    pub response_latency: Cycles,

    /// Ticks per cycle
    #[serde(default = "CacheConfig::default_clock_period")]
    pub clock_period: Tick,

    /// Tags and data are accessed one after the other instead of in parallel
    #[serde(default)]
    pub sequential_access: bool,

    /// Percentage of blocks that must hold valid tags before the cache counts as warmed up
    #[serde(default)]
    pub warmup_percentage: u8,

    /// Number of MSHRs
    #[serde(default = "CacheConfig::default_mshrs")]
    pub mshrs: usize,

    /// MSHRs that prefetches may never occupy
    #[serde(default = "CacheConfig::default_demand_mshr_reserve")]
    pub demand_mshr_reserve: usize,

    /// Maximum number of accesses merged onto one MSHR
    #[serde(default = "CacheConfig::default_tgts_per_mshr")]
    pub tgts_per_mshr: usize,

    /// Number of write-buffer entries
    #[serde(default = "CacheConfig::default_write_buffers")]
    pub write_buffers: usize,

    /// Cache never holds modified data (e.g. an instruction cache)
    #[serde(default)]
    pub is_read_only: bool,

    /// Evicted clean blocks are written back instead of dropped
    #[serde(default)]
    pub writeback_clean: bool,

    /// Promote aligned whole-line writes to write-invalidate transactions
    #[serde(default = "CacheConfig::default_fast_writes")]
    pub fast_writes: bool,

    /// Replacement policy
    #[serde(default)]
    pub policy: ReplacementPolicy,

    /// Seed for the random replacement policy
    #[serde(default = "CacheConfig::default_seed")]
    pub seed: u64,

    /// Hardware prefetcher type
    #[serde(default)]
    pub prefetcher: Prefetcher,

    /// Prefetcher table size (for stride prefetcher)
    #[serde(default = "CacheConfig::default_prefetch_table")]
    pub prefetch_table_size: usize,

    /// Prefetch degree (lines to prefetch per trigger)
    #[serde(default = "CacheConfig::default_prefetch_degree")]
    pub prefetch_degree: usize,

    /// Capacity of the pending prefetch queue
    #[serde(default = "CacheConfig::default_prefetch_queue")]
    pub prefetch_queue_size: usize,

    /// Notify the prefetcher on every access rather than only on misses
    #[serde(default)]
    pub prefetch_on_access: bool,

    /// Fault injection; `None` is a golden (fault-free) run
    #[serde(default)]
    pub fault_injection: Option<FaultConfig>,
}

impl CacheConfig {
    /// Returns the default cache name.
    fn default_name() -> String {
        defaults::NAME.to_owned()
    }

    /// Returns the default cache size in bytes.
    fn default_size() -> usize {
        defaults::CACHE_SIZE
    }

    /// Returns the default cache line size in bytes.
    fn default_line() -> usize {
        defaults::CACHE_LINE
    }

    /// Returns the default cache associativity (number of ways).
    fn default_ways() -> usize {
        defaults::CACHE_WAYS
    }

    fn default_tag_latency() -> Cycles {
        defaults::TAG_LATENCY
    }

    fn default_data_latency() -> Cycles {
        defaults::DATA_LATENCY
    }

    fn default_response_latency() -> Cycles {
        defaults::RESPONSE_LATENCY
    }

    fn default_clock_period() -> Tick {
        defaults::CLOCK_PERIOD
    }

    fn default_mshrs() -> usize {
        defaults::MSHRS
    }

    fn default_demand_mshr_reserve() -> usize {
        defaults::DEMAND_MSHR_RESERVE
    }

    fn default_tgts_per_mshr() -> usize {
        defaults::TGTS_PER_MSHR
    }

    fn default_write_buffers() -> usize {
        defaults::WRITE_BUFFERS
    }

    fn default_fast_writes() -> bool {
        true
    }

    fn default_seed() -> u64 {
        defaults::SEED
    }

    /// Returns the default prefetcher pattern table size.
    fn default_prefetch_table() -> usize {
        defaults::PREFETCH_TABLE_SIZE
    }

    /// Returns the default prefetch degree (lines per trigger).
    fn default_prefetch_degree() -> usize {
        defaults::PREFETCH_DEGREE
    }

    fn default_prefetch_queue() -> usize {
        defaults::PREFETCH_QUEUE_SIZE
    }

    /// Number of blocks in the cache.
    pub const fn num_blocks(&self) -> usize {
        if self.line_bytes == 0 { 0 } else { self.size_bytes / self.line_bytes }
    }

    /// Number of sets, `size / (line * ways)`.
    pub const fn num_sets(&self) -> usize {
        let set_bytes = self.line_bytes * self.ways;
        if set_bytes == 0 { 0 } else { self.size_bytes / set_bytes }
    }

    /// Converts a cycle count of this cache's clock into ticks.
    pub const fn cycles_to_ticks(&self, cycles: Cycles) -> Tick {
        cycles * self.clock_period
    }

    /// Checks the configuration for values no cache can be built from.
    ///
    /// # Returns
    ///
    /// `Ok(())` if a tag store and queues can be built, otherwise the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ways == 0 {
            return Err(ConfigError::ZeroAssociativity);
        }
        if self.line_bytes < 4 || !is_power_of_two(self.line_bytes as u64) {
            return Err(ConfigError::InvalidBlockSize(self.line_bytes));
        }
        if self.size_bytes % (self.line_bytes * self.ways) != 0 {
            return Err(ConfigError::UnevenGeometry {
                size: self.size_bytes,
                blk_size: self.line_bytes,
                assoc: self.ways,
            });
        }
        let sets = self.num_sets();
        if !is_power_of_two(sets as u64) {
            return Err(ConfigError::SetsNotPowerOfTwo(sets));
        }
        if self.mshrs == 0 {
            return Err(ConfigError::EmptyQueue { queue: "MSHRs" });
        }
        if self.write_buffers == 0 {
            return Err(ConfigError::EmptyQueue {
                queue: "write buffer",
            });
        }
        if self.demand_mshr_reserve > self.mshrs {
            return Err(ConfigError::ReserveTooLarge {
                queue: "MSHRs",
                reserve: self.demand_mshr_reserve,
                entries: self.mshrs,
            });
        }
        if self.tgts_per_mshr == 0 {
            return Err(ConfigError::ZeroTargets);
        }
        if self.warmup_percentage > 100 {
            return Err(ConfigError::WarmupOutOfRange(self.warmup_percentage));
        }
        if self.clock_period == 0 {
            return Err(ConfigError::ZeroClockPeriod);
        }
        Ok(())
    }
}

impl Default for CacheConfig {
    /// Creates a default cache configuration.
    ///
    /// A 32 KiB, 4-way coherent cache with 64-byte lines, LRU replacement,
    /// no prefetching and no fault injection.
    fn default() -> Self {
        Self {
            name: defaults::NAME.to_owned(),
            kind: CacheKind::default(),
            size_bytes: defaults::CACHE_SIZE,
            line_bytes: defaults::CACHE_LINE,
            ways: defaults::CACHE_WAYS,
            tag_latency: defaults::TAG_LATENCY,
            data_latency: defaults::DATA_LATENCY,
            response_latency: defaults::RESPONSE_LATENCY,
            clock_period: defaults::CLOCK_PERIOD,
            sequential_access: false,
            warmup_percentage: 0,
            mshrs: defaults::MSHRS,
            demand_mshr_reserve: defaults::DEMAND_MSHR_RESERVE,
            tgts_per_mshr: defaults::TGTS_PER_MSHR,
            write_buffers: defaults::WRITE_BUFFERS,
            is_read_only: false,
            writeback_clean: false,
            fast_writes: true,
            policy: ReplacementPolicy::default(),
            seed: defaults::SEED,
            prefetcher: Prefetcher::default(),
            prefetch_table_size: defaults::PREFETCH_TABLE_SIZE,
            prefetch_degree: defaults::PREFETCH_DEGREE,
            prefetch_queue_size: defaults::PREFETCH_QUEUE_SIZE,
            prefetch_on_access: false,
            fault_injection: None,
        }
    }
}

/// Fault-injection settings for one cache.
#[derive(Debug, Clone, Deserialize)]
pub struct FaultConfig {
    /// Path of the fault list
    pub input_path: PathBuf,

    /// Owner tag selecting entries from the list; defaults to the cache name
    #[serde(default)]
    pub owner: Option<String>,

    /// Start with injection enabled
    #[serde(default = "FaultConfig::default_enabled")]
    pub enabled: bool,
}

impl FaultConfig {
    fn default_enabled() -> bool {
        true
    }
}

/// Backing memory configuration for the reference harness.
#[derive(Debug, Clone, Deserialize)]
pub struct MemoryConfig {
    /// Memory controller type
    #[serde(default)]
    pub controller: MemoryController,

    /// Fixed access latency in ticks (simple controller)
    #[serde(default = "MemoryConfig::default_latency")]
    pub latency: Tick,

    /// CAS latency (column access strobe)
    #[serde(default = "MemoryConfig::default_t_cas")]
    pub t_cas: Tick,

    /// RAS latency (row access strobe)
    #[serde(default = "MemoryConfig::default_t_ras")]
    pub t_ras: Tick,

    /// Precharge latency
    #[serde(default = "MemoryConfig::default_t_pre")]
    pub t_pre: Tick,

    /// Requests accepted before memory refuses with a retry
    #[serde(default = "MemoryConfig::default_max_outstanding")]
    pub max_outstanding: usize,
}

impl MemoryConfig {
    fn default_latency() -> Tick {
        defaults::MEMORY_LATENCY
    }

    /// Returns the default CAS latency.
    fn default_t_cas() -> Tick {
        defaults::T_CAS
    }

    /// Returns the default RAS latency.
    fn default_t_ras() -> Tick {
        defaults::T_RAS
    }

    /// Returns the default precharge latency.
    fn default_t_pre() -> Tick {
        defaults::T_PRE
    }

    fn default_max_outstanding() -> usize {
        defaults::MAX_OUTSTANDING
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            controller: MemoryController::default(),
            latency: defaults::MEMORY_LATENCY,
            t_cas: defaults::T_CAS,
            t_ras: defaults::T_RAS,
            t_pre: defaults::T_PRE,
            max_outstanding: defaults::MAX_OUTSTANDING,
        }
    }
}
