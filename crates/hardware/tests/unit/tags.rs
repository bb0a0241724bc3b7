//! Tag Store Unit Tests.
//!
//! Verifies indexing, victim selection, block insertion/invalidation and the
//! tag statistics. The tag store is built directly from a `CacheConfig`, no
//! controller needed.
//!
//! With the small test geometry (1 KiB, 64-byte lines, 4 ways):
//!   - num_sets = 1024 / (64 * 4) = 4
//!   - set      = (addr / 64) % 4
//!   - tag      = addr / 256

use cachefi_core::common::{Addr, CacheError};
use cachefi_core::config::{CacheConfig, CacheKind, ReplacementPolicy};
use cachefi_core::tags::policies::{FifoPolicy, LruPolicy, PlruPolicy, RandomPolicy};
use cachefi_core::tags::{AGE_BUCKETS, IndexingPolicy, ReplacementPolicy as _, SetAssociative, TagStore};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

use crate::common::harness::{BLK, addr_in_set, small_config};

fn tags() -> TagStore {
    TagStore::new(&small_config(CacheKind::Coherent)).expect("valid geometry")
}

/// Inserts the block of `addr`, evicting whatever the victim search returns.
///
/// Returns the slot used and the slots that had to be evicted.
fn install(tags: &mut TagStore, addr: Addr, now: u64) -> (usize, Vec<usize>) {
    let mut evict = Vec::new();
    let victim = tags.find_victim(addr, &mut evict);
    for &index in &evict {
        tags.invalidate(index).expect("victim is valid");
    }
    tags.insert_block(addr, false, 0, 0, victim, now).expect("slot is free");
    (victim, evict)
}

// ══════════════════════════════════════════════════════════
// 1. Indexing
// ══════════════════════════════════════════════════════════

#[test]
fn geometry_from_config() {
    let tags = tags();
    assert_eq!(tags.num_sets(), 4);
    assert_eq!(tags.assoc(), 4);
    assert_eq!(tags.num_blocks(), 16);
    assert_eq!(tags.blk_size(), BLK);
}

#[test]
fn set_associative_decomposition() {
    let indexing = SetAssociative::new(1024, 64, 4).expect("valid geometry");
    assert_eq!(indexing.extract_set(0x1C0), 3);
    assert_eq!(indexing.extract_tag(0x1C0), 1);
    assert_eq!(indexing.regenerate_addr(1, 3), 0x1C0);
}

#[test]
fn entry_index_maps_to_set_and_way() {
    let tags = tags();
    // Slots are registered in order: index = set * assoc + way.
    assert_eq!(tags.find_block_by_set_and_way(1, 1), Some(5));
    assert_eq!(tags.find_block_by_set_and_way(3, 3), Some(15));
    assert_eq!(tags.find_block_by_set_and_way(4, 0), None);
}

// ══════════════════════════════════════════════════════════
// 2. Block lifecycle
// ══════════════════════════════════════════════════════════

#[test]
fn inserted_block_is_found_until_invalidated() {
    let mut tags = tags();
    let (slot, evicted) = install(&mut tags, 0x1234, 5);
    assert!(evicted.is_empty());
    assert_eq!(tags.find_block(0x1200, false), Some(slot));
    assert_eq!(tags.find_block(0x123F, false), Some(slot), "any byte of the block");

    tags.invalidate(slot).expect("valid block");
    assert_eq!(tags.find_block(0x1234, false), None);
}

#[test]
fn secure_space_is_separate() {
    let mut tags = tags();
    let mut evict = Vec::new();
    let slot = tags.find_victim(0x400, &mut evict);
    tags.insert_block(0x400, true, 0, 0, slot, 0).expect("slot is free");
    assert_eq!(tags.find_block(0x400, true), Some(slot));
    assert_eq!(tags.find_block(0x400, false), None);
}

#[test]
fn insert_into_valid_slot_is_an_error() {
    let mut tags = tags();
    let (slot, _) = install(&mut tags, 0x0, 0);
    let err = tags.insert_block(0x400, false, 0, 0, slot, 1).unwrap_err();
    assert!(matches!(err, CacheError::BlockAlreadyValid { set: 0, way: 0 }));
}

#[test]
fn invalidate_of_invalid_slot_is_an_error() {
    let mut tags = tags();
    let err = tags.invalidate(3).unwrap_err();
    assert!(matches!(err, CacheError::BlockNotValid { set: 0, way: 3 }));
}

#[test]
fn access_block_counts_references() {
    let mut tags = tags();
    let (slot, _) = install(&mut tags, 0x80, 0);
    let (hit, latency) = tags.access_block(0x80, false);
    assert_eq!(hit, Some(slot));
    assert_eq!(latency, 1);
    let _ = tags.access_block(0x80, false);
    assert_eq!(tags.block(slot).ref_count, 3, "insert counts as the first reference");

    let (miss, _) = tags.access_block(0x8000, false);
    assert_eq!(miss, None);
}

// ══════════════════════════════════════════════════════════
// 3. Victim selection
// ══════════════════════════════════════════════════════════

/// 4 sets x 4 ways = 16 blocks: the first 16 distinct blocks fill every slot,
/// the 17th evicts exactly one.
#[test]
fn seventeen_distinct_blocks_evict_exactly_once() {
    let mut tags = tags();
    let mut evictions = 0;
    for n in 0..17u64 {
        let (_, evicted) = install(&mut tags, n * BLK as Addr, n);
        evictions += evicted.len();
        if n < 16 {
            assert_eq!(evictions, 0, "block {n} fits in a free slot");
        }
    }
    assert_eq!(evictions, 1);
    assert_eq!(tags.stats().tags_in_use, 16);
    assert_eq!(tags.find_block(0, false), None, "LRU block of set 0 was evicted");
}

#[test]
fn invalid_slots_are_filled_before_evicting() {
    let mut tags = tags();
    for n in 0..3 {
        let (_, evicted) = install(&mut tags, addr_in_set(2, n), n);
        assert!(evicted.is_empty());
    }
    let mut evict = Vec::new();
    let victim = tags.find_victim(addr_in_set(2, 9), &mut evict);
    assert!(evict.is_empty());
    assert!(!tags.block(victim).valid);
}

#[test]
fn lru_victim_skips_recently_touched_blocks() {
    let mut tags = tags();
    let blocks: Vec<Addr> = (0..4).map(|n| addr_in_set(1, n)).collect();
    for (n, &addr) in blocks.iter().enumerate() {
        let _ = install(&mut tags, addr, n as u64);
    }
    let _ = tags.access_block(blocks[0], false);

    let (_, evicted) = install(&mut tags, addr_in_set(1, 7), 10);
    assert_eq!(evicted.len(), 1);
    assert_eq!(tags.find_block(blocks[1], false), None, "oldest untouched block goes");
    assert!(tags.find_block(blocks[0], false).is_some());
}

#[test]
fn lru_policy_respects_candidates() {
    let mut policy = LruPolicy::new(1, 4);
    for way in 0..4 {
        policy.touch(0, way);
    }
    assert_eq!(policy.get_victim(0, &[0, 1, 2, 3]), 0);
    assert_eq!(policy.get_victim(0, &[2, 3]), 2);
}

#[test]
fn fifo_ignores_touches() {
    let mut policy = FifoPolicy::new(1, 4);
    for way in 0..4 {
        policy.reset(0, way);
    }
    policy.touch(0, 0);
    assert_eq!(policy.get_victim(0, &[0, 1, 2, 3]), 0);
}

#[test]
fn plru_never_picks_the_last_touched_way() {
    let mut policy = PlruPolicy::new(1, 4);
    for way in [3, 1, 2, 0] {
        policy.touch(0, way);
        assert_ne!(policy.get_victim(0, &[0, 1, 2, 3]), way);
    }
}

#[test]
fn random_victim_is_always_a_candidate() {
    let mut policy = RandomPolicy::new(7);
    let candidates = [1, 3, 5];
    for _ in 0..200 {
        assert!(candidates.contains(&policy.get_victim(0, &candidates)));
    }
}

#[test]
fn random_policy_is_reproducible_from_seed() {
    let mut a = RandomPolicy::new(42);
    let mut b = RandomPolicy::new(42);
    let candidates = [0, 1, 2, 3, 4, 5, 6, 7];
    let picks_a: Vec<usize> = (0..32).map(|_| a.get_victim(0, &candidates)).collect();
    let picks_b: Vec<usize> = (0..32).map(|_| b.get_victim(0, &candidates)).collect();
    assert_eq!(picks_a, picks_b);
}

#[test]
fn every_policy_kind_builds() {
    for kind in [
        ReplacementPolicy::Lru,
        ReplacementPolicy::Plru,
        ReplacementPolicy::Fifo,
        ReplacementPolicy::Random,
        ReplacementPolicy::Mru,
    ] {
        let config = CacheConfig {
            policy: kind,
            ..small_config(CacheKind::Coherent)
        };
        let mut tags = TagStore::new(&config).expect("valid geometry");
        for n in 0..8 {
            let _ = install(&mut tags, addr_in_set(0, n), n);
        }
        assert_eq!(tags.stats().tags_in_use, 4, "{kind:?} keeps one set full");
    }
}

// ══════════════════════════════════════════════════════════
// 4. Statistics
// ══════════════════════════════════════════════════════════

#[test]
fn warmup_latches_once() {
    let config = CacheConfig {
        warmup_percentage: 50,
        ..small_config(CacheKind::Coherent)
    };
    let mut tags = TagStore::new(&config).expect("valid geometry");
    for n in 0..7 {
        let _ = install(&mut tags, n * BLK as Addr, 100 + n);
    }
    assert!(!tags.is_warmed_up());
    let _ = install(&mut tags, 7 * BLK as Addr, 200);
    assert!(tags.is_warmed_up());
    assert_eq!(tags.stats().warmup_tick, Some(200));

    let _ = install(&mut tags, 8 * BLK as Addr, 300);
    assert_eq!(tags.stats().warmup_tick, Some(200));
}

#[test]
fn occupancy_is_tracked_per_requestor() {
    let mut tags = tags();
    let mut evict = Vec::new();
    for (n, requestor) in [(0u64, 1u16), (1, 1), (2, 2)] {
        let addr = n * BLK as Addr;
        let slot = tags.find_victim(addr, &mut evict);
        tags.insert_block(addr, false, requestor, 0, slot, 0).expect("slot is free");
    }
    assert_eq!(tags.stats().occupancies.get(&1), Some(&2));
    assert_eq!(tags.stats().occupancies.get(&2), Some(&1));

    let slot = tags.find_block(0, false).expect("present");
    tags.invalidate(slot).expect("valid");
    assert_eq!(tags.stats().occupancies.get(&1), Some(&1));
}

#[test]
fn references_fold_on_invalidate_and_cleanup() {
    let mut tags = tags();
    let (a, _) = install(&mut tags, 0x0, 0);
    let _ = install(&mut tags, 0x40, 0);
    let _ = tags.access_block(0x0, false);
    tags.invalidate(a).expect("valid");
    assert_eq!(tags.stats().total_refs, 2);
    assert_eq!(tags.stats().sampled_refs, 1);

    tags.cleanup_refs();
    assert_eq!(tags.stats().total_refs, 3);
    assert_eq!(tags.stats().sampled_refs, 2);
    assert!((tags.stats().avg_refs() - 1.5).abs() < f64::EPSILON);
}

#[test]
fn age_histogram_by_task() {
    let mut tags = tags();
    let mut evict = Vec::new();
    let young = tags.find_victim(0x0, &mut evict);
    tags.insert_block(0x0, false, 0, 7, young, AGE_BUCKETS[3]).expect("slot is free");
    let old = tags.find_victim(0x40, &mut evict);
    tags.insert_block(0x40, false, 0, 7, old, 0).expect("slot is free");

    let stats = tags.compute_stats(AGE_BUCKETS[3] + 1);
    let buckets = stats.get(&7).expect("task 7 present");
    assert_eq!(buckets[0], 1, "one block inserted a tick ago");
    assert_eq!(buckets[AGE_BUCKETS.len()], 1, "one block older than every bound");
}

#[test]
fn print_lists_valid_blocks() {
    let mut tags = tags();
    let _ = install(&mut tags, 0x140, 0);
    let dump = tags.print();
    assert_eq!(dump.lines().count(), 1);
    assert!(dump.contains("addr=0x140"), "{dump}");
}

// ══════════════════════════════════════════════════════════
// 5. Properties
// ══════════════════════════════════════════════════════════

proptest! {
    /// Inserting a block and regenerating its address from the slot gives back
    /// the block-aligned address.
    #[test]
    fn tag_round_trip(addr in 0u64..(1 << 40)) {
        let mut tags = tags();
        let (slot, _) = install(&mut tags, addr, 0);
        prop_assert_eq!(tags.regenerate_blk_addr(slot), tags.blk_align(addr));
        prop_assert_eq!(tags.find_block(addr, false), Some(slot));
    }

    /// No two valid slots ever hold the same block.
    #[test]
    fn blocks_are_unique(blocks in proptest::collection::vec(0u64..64, 1..64)) {
        let mut tags = tags();
        for (n, blk) in blocks.iter().enumerate() {
            let addr = blk * BLK as Addr;
            if tags.find_block(addr, false).is_none() {
                let _ = install(&mut tags, addr, n as u64);
            }
        }
        let mut seen = std::collections::HashSet::new();
        let mut valid = 0;
        tags.for_each_blk(|index, blk| {
            if blk.valid {
                valid += 1;
                assert!(seen.insert(tags.regenerate_blk_addr(index)));
            }
        });
        prop_assert!(valid <= tags.num_blocks());
    }
}
