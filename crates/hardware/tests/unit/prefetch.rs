//! Prefetcher Tests.
//!
//! Verifies the candidates proposed by the next-line and stride detectors and
//! the de-duplication and overflow behaviour of the prefetch queue.

use cachefi_core::common::{Addr, RequestorId};
use cachefi_core::config::{CacheConfig, Prefetcher as PrefetcherKind};
use cachefi_core::prefetch::{NextLinePrefetcher, PrefetchQueue, Prefetcher, StridePrefetcher};
use pretty_assertions::assert_eq;

/// Proposes exactly the address it observed.
#[derive(Debug)]
struct Echo;

impl Prefetcher for Echo {
    fn observe(&mut self, addr: Addr, _requestor: RequestorId, _hit: bool) -> Vec<Addr> {
        vec![addr, addr + 0x40]
    }
}

// ══════════════════════════════════════════════════════════
// 1. Next-line
// ══════════════════════════════════════════════════════════

#[test]
fn next_line_proposes_following_blocks() {
    let mut pf = NextLinePrefetcher::new(64, 2);
    assert_eq!(pf.observe(0x1010, 0, false), vec![0x1040, 0x1080]);
    assert_eq!(pf.observe(0x1040, 3, true), vec![0x1080, 0x10C0]);
}

#[test]
fn next_line_degree_is_at_least_one() {
    let mut pf = NextLinePrefetcher::new(64, 0);
    assert_eq!(pf.observe(0x0, 0, false), vec![0x40]);
}

// ══════════════════════════════════════════════════════════
// 2. Stride
// ══════════════════════════════════════════════════════════

#[test]
fn stride_needs_two_confirmations() {
    let mut pf = StridePrefetcher::new(64, 16, 1);
    assert!(pf.observe(0x1000, 0, false).is_empty());
    assert!(pf.observe(0x1100, 0, false).is_empty(), "stride learned");
    assert!(pf.observe(0x1200, 0, false).is_empty(), "confidence 1");
    assert_eq!(pf.observe(0x1300, 0, false), vec![0x1400]);
    assert_eq!(pf.observe(0x1400, 0, false), vec![0x1500]);
}

#[test]
fn strides_are_tracked_per_requestor() {
    let mut pf = StridePrefetcher::new(64, 16, 2);
    let mut proposed = Vec::new();
    for step in 0..4u64 {
        proposed = pf.observe(0x1000 + step * 0x80, 1, false);
        assert!(pf.observe(0x9000 - step * 0x200, 2, false).len() <= 2);
    }
    assert_eq!(proposed, vec![0x1200, 0x1280]);
}

#[test]
fn broken_stride_stops_prefetching() {
    let mut pf = StridePrefetcher::new(64, 16, 1);
    for addr in [0x0, 0x40, 0x80, 0xC0] {
        let _ = pf.observe(addr, 0, false);
    }
    assert!(pf.observe(0x5000, 0, false).is_empty());
}

// ══════════════════════════════════════════════════════════
// 3. Queue
// ══════════════════════════════════════════════════════════

#[test]
fn queue_deduplicates_and_drops_oldest() {
    let mut queue = PrefetchQueue::new(Box::new(NextLinePrefetcher::new(64, 2)), 3, 64);
    queue.notify(0x0, 0, false);
    queue.notify(0x40, 0, false);
    assert_eq!(queue.len(), 3, "0x80 is queued once");
    assert_eq!(queue.dropped(), 0);

    queue.notify(0x100, 0, false);
    assert_eq!(queue.dropped(), 2);
    let order: Vec<Addr> = std::iter::from_fn(|| queue.pop()).collect();
    assert_eq!(order, vec![0xC0, 0x140, 0x180]);
    assert!(queue.is_empty());
}

#[test]
fn queue_skips_the_block_being_accessed() {
    let mut queue = PrefetchQueue::new(Box::new(Echo), 4, 64);
    queue.notify(0x208, 0, true);
    assert_eq!(queue.pop(), Some(0x240));
    assert_eq!(queue.pop(), None);
}

#[test]
fn queue_is_built_from_config() {
    assert!(PrefetchQueue::from_config(&CacheConfig::default()).is_none());
    let config = CacheConfig {
        prefetcher: PrefetcherKind::Stride,
        ..CacheConfig::default()
    };
    assert!(PrefetchQueue::from_config(&config).is_some_and(|queue| queue.is_empty()));
}
