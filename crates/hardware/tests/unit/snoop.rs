//! Snoop Handling Tests.
//!
//! Snoops arrive from below at a single cache. Verifies which snoops are
//! answered with data, how local copies are downgraded or invalidated, and how
//! snoops interact with the write buffer and misses already in flight.

use cachefi_core::common::{CacheError, MemCmd, Packet};
use cachefi_core::config::CacheKind;
use pretty_assertions::assert_eq;

use crate::common::harness::{BLK, TestCache, accept, build, send_and_respond, small_config};

fn coherent_with_dirty(addr: u64, byte: u8) -> TestCache {
    let mut cache = build(&small_config(CacheKind::Coherent));
    let mut pkt = Packet::write(addr, &[byte; BLK]);
    let _ = cache.recv_atomic(&mut pkt, 0).expect("atomic write");
    cache
}

fn snoop(cmd: MemCmd, addr: u64) -> Packet {
    Packet::new(cmd, addr, BLK)
}

// ══════════════════════════════════════════════════════════
// 1. Variants
// ══════════════════════════════════════════════════════════

#[test]
fn noncoherent_cache_rejects_snoops() {
    let mut cache = build(&small_config(CacheKind::Noncoherent));
    let err = cache
        .recv_timing_snoop_req(snoop(MemCmd::ReadSharedReq, 0x40), 0)
        .unwrap_err();
    assert!(matches!(err, CacheError::UnexpectedSnoop { cmd: MemCmd::ReadSharedReq, addr: 0x40, .. }));
    assert!(cache.recv_atomic_snoop(&mut snoop(MemCmd::ReadExReq, 0x40), 0).is_err());
}

// ══════════════════════════════════════════════════════════
// 2. Tag store hits
// ══════════════════════════════════════════════════════════

#[test]
fn dirty_block_answers_read_snoop_and_becomes_shared() {
    let mut cache = coherent_with_dirty(0x40, 0x9C);
    cache.recv_timing_snoop_req(snoop(MemCmd::ReadSharedReq, 0x40), 10).expect("snoop");

    let (when, resp) = &cache.mem_side().snoop_resps[0];
    assert_eq!(*when, 11);
    assert_eq!(resp.cmd, MemCmd::ReadResp);
    assert!(resp.cache_responding);
    assert!(resp.has_sharers);
    assert_eq!(resp.data, vec![0x9C; BLK]);

    let slot = cache.tags().find_block(0x40, false).expect("still cached");
    assert!(!cache.tags().block(slot).writable);
    assert_eq!(cache.stats().snoops, 1);
    assert_eq!(cache.stats().snoop_responses, 1);
}

#[test]
fn invalidating_snoop_removes_block() {
    let mut cache = coherent_with_dirty(0x80, 0x3E);
    let mut pkt = snoop(MemCmd::ReadExReq, 0x80);
    let latency = cache.recv_atomic_snoop(&mut pkt, 5).expect("snoop");
    assert_eq!(latency, 1);
    assert_eq!(pkt.cmd, MemCmd::ReadExResp);
    assert_eq!(pkt.data, vec![0x3E; BLK]);
    assert_eq!(cache.tags().find_block(0x80, false), None);
}

#[test]
fn clean_block_is_downgraded_without_response() {
    let mut cache = build(&small_config(CacheKind::Coherent));
    let _ = cache.recv_atomic(&mut Packet::read(0xC0, 8), 0).expect("atomic read");

    cache.recv_timing_snoop_req(snoop(MemCmd::ReadSharedReq, 0xC0), 3).expect("snoop");
    assert!(cache.mem_side().snoop_resps.is_empty());
    let slot = cache.tags().find_block(0xC0, false).expect("still cached");
    assert!(!cache.tags().block(slot).writable);
    assert_eq!(cache.stats().snoop_responses, 0);
}

#[test]
fn snoop_already_answered_elsewhere_gets_no_second_response() {
    let mut cache = coherent_with_dirty(0x40, 1);
    let mut pkt = snoop(MemCmd::ReadSharedReq, 0x40);
    pkt.cache_responding = true;
    cache.recv_timing_snoop_req(pkt, 0).expect("snoop");
    assert!(cache.mem_side().snoop_resps.is_empty());
}

#[test]
fn write_to_shared_block_requests_upgrade() {
    let mut cache = coherent_with_dirty(0x100, 0x10);
    cache.recv_timing_snoop_req(snoop(MemCmd::ReadSharedReq, 0x100), 1).expect("snoop");

    accept(&mut cache, Packet::write(0x104, &[0x20; 4]), 5);
    assert_eq!(cache.stats().write_misses, 1);
    assert_eq!(send_and_respond(&mut cache, 6), 1);

    let slot = cache.tags().find_block(0x100, false).expect("cached");
    let block = cache.tags().block(slot);
    assert!(block.writable);
    assert!(block.dirty);
    assert_eq!(&cache.tags().data(slot)[..8], &[0x10, 0x10, 0x10, 0x10, 0x20, 0x20, 0x20, 0x20]);
    assert_eq!(cache.cpu_side().responses[0].1.cmd, MemCmd::WriteResp);
}

#[test]
fn upgrade_is_the_miss_command_for_a_present_block() {
    let mut cache = coherent_with_dirty(0x100, 0x10);
    cache.recv_timing_snoop_req(snoop(MemCmd::ReadSharedReq, 0x100), 1).expect("snoop");
    accept(&mut cache, Packet::write(0x104, &[0x20; 4]), 5);
    cache.send_deferred(6).expect("send");
    assert_eq!(cache.mem_side().sent_cmds(), vec![MemCmd::UpgradeReq]);
}

// ══════════════════════════════════════════════════════════
// 3. Write buffer and in-flight misses
// ══════════════════════════════════════════════════════════

#[test]
fn snoop_is_answered_from_write_buffer() {
    let mut cache = coherent_with_dirty(0x300, 0x6D);
    accept(&mut cache, Packet::read(0x300, 8).with_uncacheable(true), 2);
    assert_eq!(cache.write_buffer().allocated(), 1);

    let mut pkt = snoop(MemCmd::ReadSharedReq, 0x300);
    let _ = cache.recv_atomic_snoop(&mut pkt, 3).expect("snoop");
    assert!(pkt.cache_responding);
    assert!(pkt.has_sharers);
    assert_eq!(pkt.cmd, MemCmd::ReadResp);
    assert_eq!(pkt.data, vec![0x6D; BLK]);
}

#[test]
fn invalidation_during_miss_drops_block_after_fill() {
    let mut cache = build(&small_config(CacheKind::Coherent));
    cache.mem_side_mut().fill = 0x44;
    accept(&mut cache, Packet::read(0x200, 8), 0);
    cache.send_deferred(1).expect("send");

    cache.recv_timing_snoop_req(snoop(MemCmd::InvalidateReq, 0x200), 2).expect("snoop");
    let (_, mshr) = cache.mshr_queue().iter().next().expect("in flight");
    assert!(mshr.post_invalidate());

    assert_eq!(send_and_respond(&mut cache, 3), 1);
    let (_, resp) = &cache.cpu_side().responses[0];
    assert_eq!(resp.data, vec![0x44; 8], "the waiting read still uses the fill");
    assert_eq!(cache.tags().find_block(0x200, false), None);
}

#[test]
fn snoops_are_forwarded_upward_when_snooping() {
    let mut cache = coherent_with_dirty(0x40, 2);
    cache.cpu_side_mut().snooping = true;
    cache.recv_timing_snoop_req(snoop(MemCmd::ReadSharedReq, 0x40), 0).expect("snoop");
    assert_eq!(cache.cpu_side().snoops.len(), 1);
    assert_eq!(cache.cpu_side().snoops[0].addr, 0x40);
}
