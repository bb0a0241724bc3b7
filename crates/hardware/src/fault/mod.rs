//! Fault injection overlay.
//!
//! The injector corrupts stored or in-flight data to emulate hardware faults for
//! dependability studies. It provides:
//! 1. **Fault Lists:** Loading of declarative, line-oriented fault lists filtered by owner.
//! 2. **Temporal Models:** Permanent, transient and intermittent behaviour (see [`FaultKind`]).
//! 3. **Spatial Targets:** Faults located by block address or by tag-store slot.
//! 4. **Injection Points:** Application to the tag store or to a packet payload.
//!
//! An injector belongs to exactly one cache and is owned by its controller. It can
//! be switched on and off at run time, e.g. to confine faults to a region of interest.

/// Fault descriptions and their temporal behaviour.
pub mod model;

/// Fault-list parsing.
pub mod parse;

use std::fs;
use std::path::Path;

use tracing::{debug, trace, warn};

pub use model::{FaultEvent, FaultKind, FaultLocation, FaultSpec, StuckAt, flip_bit};

use crate::common::addr::{Tick, block_align, block_offset};
use crate::common::error::FaultError;
use crate::common::packet::Packet;
use crate::config::FaultConfig;
use crate::tags::TagStore;

/// Counters kept by an injector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FaultStats {
    /// Bits forced to their stuck-at value.
    pub flips: u64,
    /// Bytes restored by intermittent faults.
    pub restores: u64,
}

/// Applies a list of faults to one cache.
#[derive(Debug, Clone)]
pub struct FaultInjector {
    owner: String,
    faults: Vec<FaultSpec>,
    enabled: bool,
    stats: FaultStats,
}

impl FaultInjector {
    /// Creates an enabled injector, keeping only the faults that belong to `owner`.
    pub fn new(owner: impl Into<String>, faults: impl IntoIterator<Item = FaultSpec>) -> Self {
        let owner = owner.into();
        let faults = faults.into_iter().filter(|f| f.owner == owner).collect();
        Self {
            owner,
            faults,
            enabled: true,
            stats: FaultStats::default(),
        }
    }

    /// Parses a fault list held in memory.
    ///
    /// Malformed lines are skipped with a warning; lines for other owners are dropped.
    ///
    /// # Arguments
    ///
    /// * `contents` - The fault list.
    /// * `owner` - Name of the cache the injector belongs to.
    /// * `assoc` - Associativity, for entry-index locations.
    pub fn parse(contents: &str, owner: &str, assoc: usize) -> Self {
        let mut faults = Vec::new();
        for (number, line) in contents.lines().enumerate() {
            match parse::parse_line(line, assoc) {
                Ok(Some(fault)) if fault.owner == owner => {
                    debug!(owner, %fault, "fault loaded");
                    faults.push(fault);
                }
                Ok(_) => {}
                Err(err) => warn!(owner, line = number + 1, %err, "skipping fault list line"),
            }
        }
        debug!(owner, count = faults.len(), "fault list parsed");
        Self::new(owner, faults)
    }

    /// Loads a fault list from a file.
    ///
    /// # Returns
    ///
    /// The injector, or [`FaultError::Unreadable`] if the file cannot be read.
    pub fn load(path: &Path, owner: &str, assoc: usize) -> Result<Self, FaultError> {
        let contents = fs::read_to_string(path).map_err(|source| FaultError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::parse(&contents, owner, assoc))
    }

    /// Builds the injector described by a cache's fault configuration.
    ///
    /// # Arguments
    ///
    /// * `config` - Fault-list path, owner override and initial enable state.
    /// * `cache_name` - Owner used when the configuration names none.
    /// * `assoc` - Associativity of the cache.
    pub fn from_config(config: &FaultConfig, cache_name: &str, assoc: usize) -> Result<Self, FaultError> {
        let owner = config.owner.as_deref().unwrap_or(cache_name);
        let mut injector = Self::load(&config.input_path, owner, assoc)?;
        injector.enabled = config.enabled;
        Ok(injector)
    }

    /// Turns injection on.
    pub fn enable(&mut self) {
        debug!(owner = %self.owner, "fault injection enabled");
        self.enabled = true;
    }

    /// Turns injection off; fault state is kept.
    pub fn disable(&mut self) {
        debug!(owner = %self.owner, "fault injection disabled");
        self.enabled = false;
    }

    /// Returns `true` while injection is on.
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Name of the cache the injector belongs to.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// The loaded faults.
    pub fn faults(&self) -> &[FaultSpec] {
        &self.faults
    }

    /// Injection counters.
    pub const fn stats(&self) -> FaultStats {
        self.stats
    }

    /// Applies every applicable fault to the blocks of a tag store.
    ///
    /// A fault applies only if its block is present and valid. Injection is a
    /// no-op while disabled or when `cache_type` names a different cache.
    ///
    /// # Arguments
    ///
    /// * `tags` - The tag store whose data is corrupted in place.
    /// * `is_read` - The triggering access is a read.
    /// * `cache_type` - Name of the cache performing the access.
    /// * `now` - Current tick.
    ///
    /// # Returns
    ///
    /// The number of faults that changed a byte.
    pub fn inject_faults(&mut self, tags: &mut TagStore, is_read: bool, cache_type: &str, now: Tick) -> usize {
        if !self.enabled || cache_type != self.owner {
            return 0;
        }
        let blk_size = tags.blk_size();
        let mut applied = 0;
        for fault in &mut self.faults {
            let (slot, byte) = match fault.location {
                FaultLocation::Slot { set, way } => {
                    (tags.find_block_by_set_and_way(set, way), fault.byte_offset)
                }
                FaultLocation::Address(_) => {
                    let Some(target) = fault.target_addr() else {
                        continue;
                    };
                    let aligned = block_align(target, blk_size);
                    let slot = tags
                        .find_block(aligned, false)
                        .or_else(|| tags.find_block(aligned, true));
                    (slot, block_offset(target, blk_size))
                }
            };
            let Some(slot) = slot.filter(|&s| tags.block(s).valid) else {
                continue;
            };
            if byte >= blk_size {
                continue;
            }
            let data = tags.data_mut(slot);
            let before = data[byte];
            if let Some(event) = fault.apply(&mut data[byte], is_read, now) {
                record(&mut self.stats, event);
                applied += 1;
                trace!(owner = %self.owner, %fault, slot, before, after = data[byte], ?event, "fault applied to block");
            }
        }
        applied
    }

    /// Applies every address-located fault that falls inside a packet's payload.
    ///
    /// # Returns
    ///
    /// The number of faults that changed a byte.
    pub fn inject_packet_faults(&mut self, pkt: &mut Packet, is_read: bool, cache_type: &str, now: Tick) -> usize {
        if !self.enabled || cache_type != self.owner {
            return 0;
        }
        let mut applied = 0;
        for fault in &mut self.faults {
            if !fault.is_faulty_address(pkt.addr, pkt.size) {
                continue;
            }
            let Some(target) = fault.target_addr() else {
                continue;
            };
            let index = (target - pkt.addr) as usize;
            let Some(byte) = pkt.data.get_mut(index) else {
                continue;
            };
            if let Some(event) = fault.apply(byte, is_read, now) {
                record(&mut self.stats, event);
                applied += 1;
                trace!(owner = %self.owner, %fault, addr = pkt.addr, ?event, "fault applied to packet");
            }
        }
        applied
    }
}

fn record(stats: &mut FaultStats, event: FaultEvent) {
    match event {
        FaultEvent::Flipped => stats.flips += 1,
        FaultEvent::Restored => stats.restores += 1,
    }
}
