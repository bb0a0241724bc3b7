//! Stride Prefetcher.
//!
//! A prefetcher that detects constant stride patterns in memory accesses.
//! It maintains a Reference Prediction Table (RPT) tracking the last address
//! and stride of each requestor.
//!
//! Prefetching is triggered only when a stable stride pattern is established
//! (confidence threshold is met).
//!
//! # Performance
//!
//! - **Time Complexity:** O(D) per observation where D is the prefetch degree
//! - **Space Complexity:** O(T) where T is the table size
//! - **Best Case:** Regular strided patterns (array traversals, matrix operations)
//! - **Worst Case:** Irregular or random access patterns (linked lists, hash tables)

use super::Prefetcher;
use crate::common::addr::{Addr, RequestorId, is_power_of_two};

/// Confidence at which prefetches start being issued.
const CONFIDENCE_THRESHOLD: u8 = 2;

/// Entry in the Reference Prediction Table.
#[derive(Debug, Default, Clone, Copy)]
struct StreamEntry {
    /// The last address accessed by this stream.
    last_addr: Addr,
    /// The detected stride (difference between consecutive accesses).
    stride: i64,
    /// Confidence counter (2-bit saturating).
    confidence: u8,
}

/// Stride Prefetcher state.
#[derive(Debug)]
pub struct StridePrefetcher {
    /// Reference Prediction Table.
    table: Vec<StreamEntry>,
    /// Size of a cache block in bytes.
    line_bytes: u64,
    /// Mask used to index the table.
    table_mask: usize,
    /// Number of strides to prefetch ahead.
    degree: usize,
}

impl StridePrefetcher {
    /// Creates a new Stride prefetcher.
    ///
    /// # Arguments
    ///
    /// * `line_bytes` - The size of a cache block in bytes.
    /// * `table_size` - Number of entries in the tracking table (power of 2, else 64).
    /// * `degree` - The number of strides to prefetch ahead.
    pub fn new(line_bytes: usize, table_size: usize, degree: usize) -> Self {
        let safe_size = if is_power_of_two(table_size as u64) {
            table_size
        } else {
            64
        };

        Self {
            table: vec![StreamEntry::default(); safe_size],
            line_bytes: line_bytes as u64,
            table_mask: safe_size - 1,
            degree: degree.max(1),
        }
    }
}

impl Prefetcher for StridePrefetcher {
    /// Updates the requestor's entry and, once the stride is trusted, returns
    /// the blocks `1..=degree` strides ahead.
    fn observe(&mut self, addr: Addr, requestor: RequestorId, _hit: bool) -> Vec<Addr> {
        let entry = &mut self.table[usize::from(requestor) & self.table_mask];

        let current_stride = (addr as i64).wrapping_sub(entry.last_addr as i64);
        let mut prefetches = Vec::new();

        if current_stride == entry.stride && current_stride != 0 {
            if entry.confidence < 3 {
                entry.confidence += 1;
            }
            if entry.confidence >= CONFIDENCE_THRESHOLD {
                for k in 1..=self.degree as i64 {
                    let target = (addr as i64).wrapping_add(entry.stride * k) as Addr;
                    prefetches.push(target & !(self.line_bytes - 1));
                }
            }
        } else if entry.confidence > 0 {
            entry.confidence -= 1;
        } else {
            entry.stride = current_stride;
        }

        entry.last_addr = addr;
        prefetches
    }
}
