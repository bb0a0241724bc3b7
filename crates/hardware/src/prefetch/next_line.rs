//! Next-Line Prefetcher.
//!
//! A simple spatial prefetcher that fetches the next sequential block(s)
//! whenever it observes an access. This exploits the spatial locality common
//! in sequential data arrays.

use super::Prefetcher;
use crate::common::addr::{Addr, RequestorId};

/// Next-Line Prefetcher state.
#[derive(Debug)]
pub struct NextLinePrefetcher {
    /// Size of a cache block in bytes.
    line_bytes: u64,
    /// Number of subsequent blocks to prefetch (prefetch degree).
    degree: usize,
}

impl NextLinePrefetcher {
    /// Creates a new Next-Line prefetcher.
    ///
    /// # Arguments
    ///
    /// * `line_bytes` - The size of a cache block in bytes.
    /// * `degree` - The number of blocks to prefetch ahead.
    pub fn new(line_bytes: usize, degree: usize) -> Self {
        Self {
            line_bytes: line_bytes as u64,
            degree: degree.max(1),
        }
    }
}

impl Prefetcher for NextLinePrefetcher {
    /// Returns the `degree` blocks following the accessed one.
    fn observe(&mut self, addr: Addr, _requestor: RequestorId, _hit: bool) -> Vec<Addr> {
        let base = addr & !(self.line_bytes - 1);
        (1..=self.degree as u64)
            .map(|k| base.wrapping_add(self.line_bytes * k))
            .collect()
    }
}
