//! Hardware prefetchers.
//!
//! This module contains the prefetcher interface, two pattern detectors and the
//! bounded queue through which the cache consumes their candidates:
//! 1. **Detection:** A [`Prefetcher`] observes accesses and proposes block addresses.
//! 2. **Queueing:** [`PrefetchQueue`] de-duplicates candidates and drops the oldest
//!    when full; the cache pops from it whenever an MSHR may be spent on a prefetch.

/// Next-line prefetcher (prefetches sequential blocks).
pub mod next_line;

/// Stride prefetcher (detects constant-stride access patterns).
pub mod stride;

use std::collections::VecDeque;

use tracing::trace;

pub use self::next_line::NextLinePrefetcher;
pub use self::stride::StridePrefetcher;

use crate::common::addr::{Addr, RequestorId, block_align};
use crate::config::{CacheConfig, Prefetcher as PrefetcherKind};

/// Trait for cache prefetcher implementations.
///
/// Prefetchers observe memory access patterns and generate prefetch
/// candidates to reduce miss penalties.
pub trait Prefetcher: Send + Sync + std::fmt::Debug {
    /// Observes a memory access and generates prefetch addresses.
    ///
    /// # Arguments
    ///
    /// * `addr` - The address that was accessed
    /// * `requestor` - The component that issued the access; strides are tracked per requestor
    /// * `hit` - Whether the access was a cache hit
    ///
    /// # Returns
    ///
    /// Block addresses to prefetch. Empty if no prefetches are needed.
    fn observe(&mut self, addr: Addr, requestor: RequestorId, hit: bool) -> Vec<Addr>;
}

/// Pending prefetch candidates waiting for a free MSHR.
#[derive(Debug)]
pub struct PrefetchQueue {
    engine: Box<dyn Prefetcher>,
    pending: VecDeque<Addr>,
    capacity: usize,
    blk_size: usize,
    dropped: u64,
}

impl PrefetchQueue {
    /// Wraps a prefetcher.
    ///
    /// # Arguments
    ///
    /// * `engine` - Pattern detector.
    /// * `capacity` - Maximum number of pending candidates.
    /// * `blk_size` - Block size used to align candidates.
    pub fn new(engine: Box<dyn Prefetcher>, capacity: usize, blk_size: usize) -> Self {
        Self {
            engine,
            pending: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            blk_size,
            dropped: 0,
        }
    }

    /// Builds the prefetcher selected in a cache configuration, if any.
    pub fn from_config(config: &CacheConfig) -> Option<Self> {
        let engine: Box<dyn Prefetcher> = match config.prefetcher {
            PrefetcherKind::None => return None,
            PrefetcherKind::NextLine => {
                Box::new(NextLinePrefetcher::new(config.line_bytes, config.prefetch_degree))
            }
            PrefetcherKind::Stride => Box::new(StridePrefetcher::new(
                config.line_bytes,
                config.prefetch_table_size,
                config.prefetch_degree,
            )),
        };
        Some(Self::new(engine, config.prefetch_queue_size, config.line_bytes))
    }

    /// Feeds an access to the prefetcher and queues its candidates.
    pub fn notify(&mut self, addr: Addr, requestor: RequestorId, hit: bool) {
        for candidate in self.engine.observe(addr, requestor, hit) {
            let candidate = block_align(candidate, self.blk_size);
            if candidate == block_align(addr, self.blk_size) || self.pending.contains(&candidate) {
                continue;
            }
            if self.pending.len() == self.capacity {
                let _ = self.pending.pop_front();
                self.dropped += 1;
            }
            trace!(candidate, "prefetch queued");
            self.pending.push_back(candidate);
        }
    }

    /// Takes the oldest pending candidate.
    pub fn pop(&mut self) -> Option<Addr> {
        self.pending.pop_front()
    }

    /// Number of pending candidates.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Returns `true` if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Candidates discarded because the queue was full.
    pub const fn dropped(&self) -> u64 {
        self.dropped
    }
}
