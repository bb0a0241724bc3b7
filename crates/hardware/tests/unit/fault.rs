//! Fault Injection Tests.
//!
//! Covers fault-list parsing, the temporal behaviour of each fault kind, owner
//! filtering, and faults observed through a cache's read path.

use std::io::Write;
use std::path::Path;

use cachefi_core::common::{FaultError, FaultLineError, Packet};
use cachefi_core::config::{CacheConfig, CacheKind, FaultConfig};
use cachefi_core::fault::parse::parse_line;
use cachefi_core::fault::{FaultEvent, FaultInjector, FaultKind, FaultLocation, FaultSpec, StuckAt};
use pretty_assertions::assert_eq;
use rstest::rstest;
use tempfile::NamedTempFile;

use crate::common::harness::{TestCache, build, small_config};

fn address_fault(kind: FaultKind, addr: u64, byte: usize, bit: u8, stuck_at: StuckAt) -> FaultSpec {
    FaultSpec::new(kind, FaultLocation::Address(addr), byte, bit, stuck_at, "l1d")
}

fn faulty_cache(fault: FaultSpec) -> TestCache {
    let mut cache = build(&small_config(CacheKind::Coherent));
    cache.set_fault_injector(FaultInjector::new("l1d", [fault]));
    cache
}

fn atomic_read(cache: &mut TestCache, addr: u64, size: usize, now: u64) -> Vec<u8> {
    let mut pkt = Packet::read(addr, size);
    let _ = cache.recv_atomic(&mut pkt, now).expect("atomic read");
    pkt.data
}

fn atomic_write(cache: &mut TestCache, addr: u64, data: &[u8], now: u64) {
    let mut pkt = Packet::write(addr, data);
    let _ = cache.recv_atomic(&mut pkt, now).expect("atomic write");
}

// ══════════════════════════════════════════════════════════
// 1. Fault list parsing
// ══════════════════════════════════════════════════════════

#[test]
fn full_line_carries_window_and_stuck_value() {
    let fault = parse_line("intermittent 0x1000 5 3 100 200 1 l2", 8)
        .expect("valid")
        .expect("not blank");
    assert_eq!(fault.kind, FaultKind::Intermittent);
    assert_eq!(fault.location, FaultLocation::Address(0x1000));
    assert_eq!((fault.byte_offset, fault.bit_offset), (5, 3));
    assert_eq!((fault.tick_start, fault.tick_end), (100, 200));
    assert_eq!(fault.stuck_at, StuckAt::One);
    assert_eq!(fault.owner, "l2");
}

#[test]
fn short_line_is_a_permanent_slot_fault() {
    let fault = parse_line("9 3 7 l1d", 4).expect("valid").expect("not blank");
    assert_eq!(fault.kind, FaultKind::Permanent);
    assert_eq!(fault.location, FaultLocation::Slot { set: 2, way: 1 });
    assert_eq!(fault.stuck_at, StuckAt::Zero);
    assert_eq!(fault.tick_end, u64::MAX);
}

#[rstest]
#[case::field_count("1 2 3", FaultLineError::FieldCount(3))]
#[case::kind("3 0x40 0 0 0 10 1 l1d", FaultLineError::UnknownKind("3".to_owned()))]
#[case::bit("0 0x40 0 8 0 10 1 l1d", FaultLineError::BitOutOfRange(8))]
#[case::window("0 0x40 0 0 20 10 1 l1d", FaultLineError::EmptyWindow { start: 20, end: 10 })]
#[case::number(
    "0 zz 0 0 0 10 1 l1d",
    FaultLineError::InvalidField { field: "blk_addr", value: "zz".to_owned() }
)]
#[case::overflow(
    "0 0xffffffffffffffc0 0x100 0 0 10 1 l1d",
    FaultLineError::AddressOverflow { blk_addr: 0xFFFF_FFFF_FFFF_FFC0, byte_offset: 0x100 }
)]
fn malformed_lines_are_rejected(#[case] line: &str, #[case] expected: FaultLineError) {
    assert_eq!(parse_line(line, 4), Err(expected));
}

#[test]
fn parse_keeps_only_the_owners_faults() {
    let list = "\
# kind addr byte bit start end stuck owner
0 0x40 0 0 0 100 1 l1d
0 0x80 0 0 0 100 1 l2
not a fault line
1 4 2 1 l1d
";
    let injector = FaultInjector::parse(list, "l1d", 4);
    assert_eq!(injector.owner(), "l1d");
    assert_eq!(injector.faults().len(), 2);
    assert!(injector.faults().iter().all(|f| f.owner == "l1d"));
    assert!(injector.is_enabled());
}

#[test]
fn load_reads_a_fault_file() {
    let mut file = NamedTempFile::new().expect("temp file");
    writeln!(file, "0 0x100 0 0 0 50 0 l1d").expect("write");
    writeln!(file, "2 0x200 1 1 10 20 1 l1d").expect("write");

    let injector = FaultInjector::load(file.path(), "l1d", 4).expect("readable");
    assert_eq!(injector.faults().len(), 2);
    assert_eq!(injector.faults()[1].kind, FaultKind::Intermittent);
}

#[test]
fn missing_fault_file_is_an_error() {
    let err = FaultInjector::load(Path::new("/nonexistent/faults.txt"), "l1d", 4).unwrap_err();
    assert!(matches!(err, FaultError::Unreadable { ref path, .. } if path.ends_with("faults.txt")));
}

#[test]
fn config_owner_override_and_initial_state() {
    let mut file = NamedTempFile::new().expect("temp file");
    writeln!(file, "0 0x100 0 0 0 50 0 shared").expect("write");
    writeln!(file, "0 0x100 0 0 0 50 0 l1d").expect("write");
    let config = FaultConfig {
        input_path: file.path().to_path_buf(),
        owner: Some("shared".to_owned()),
        enabled: false,
    };

    let injector = FaultInjector::from_config(&config, "l1d", 4).expect("readable");
    assert_eq!(injector.owner(), "shared");
    assert_eq!(injector.faults().len(), 1);
    assert!(!injector.is_enabled());
}

#[test]
fn cache_builds_injector_from_its_config() {
    let mut file = NamedTempFile::new().expect("temp file");
    writeln!(file, "0 0x0 0 0 0 1000 1 l1d").expect("write");
    let config = CacheConfig {
        fault_injection: Some(FaultConfig {
            input_path: file.path().to_path_buf(),
            owner: None,
            enabled: true,
        }),
        ..small_config(CacheKind::Coherent)
    };
    let cache = build(&config);
    let injector = cache.fault_injector().expect("configured");
    assert_eq!(injector.owner(), "l1d");
    assert_eq!(injector.faults().len(), 1);
}

// ══════════════════════════════════════════════════════════
// 2. Temporal behaviour
// ══════════════════════════════════════════════════════════

#[test]
fn permanent_fault_applies_on_every_touch() {
    let mut fault = address_fault(FaultKind::Permanent, 0, 0, 3, StuckAt::One);
    let mut byte = 0;
    assert_eq!(fault.apply(&mut byte, false, 0), Some(FaultEvent::Flipped));
    assert_eq!(byte, 0b1000);
    byte = 0;
    assert_eq!(fault.apply(&mut byte, true, 99), Some(FaultEvent::Flipped));
    assert_eq!(byte, 0b1000);
    assert!(fault.is_injected());
}

#[test]
fn transient_fault_fires_once_on_a_read() {
    let mut fault = address_fault(FaultKind::Transient, 0, 0, 0, StuckAt::Zero).with_window(10, 20);
    let mut byte = 0xFF;
    assert_eq!(fault.apply(&mut byte, true, 5), None, "before the window");
    assert_eq!(fault.apply(&mut byte, false, 15), None, "writes never trigger it");
    assert_eq!(fault.apply(&mut byte, true, 15), Some(FaultEvent::Flipped));
    assert_eq!(byte, 0xFE);

    byte = 0xFF;
    assert_eq!(fault.apply(&mut byte, true, 16), None);
    assert_eq!(byte, 0xFF);
}

#[test]
fn intermittent_fault_restores_after_window() {
    let mut fault = address_fault(FaultKind::Intermittent, 0, 0, 7, StuckAt::One).with_window(10, 20);
    let mut byte = 0x01;
    assert_eq!(fault.apply(&mut byte, true, 9), None);
    assert_eq!(fault.apply(&mut byte, true, 10), Some(FaultEvent::Flipped));
    assert_eq!(byte, 0x81);
    assert_eq!(fault.altered_byte(), Some(0x01));

    assert_eq!(fault.apply(&mut byte, true, 21), Some(FaultEvent::Restored));
    assert_eq!(byte, 0x01);
    assert!(fault.is_recovered());
    assert_eq!(fault.apply(&mut byte, true, 30), None);
}

// ══════════════════════════════════════════════════════════
// 3. Injector
// ══════════════════════════════════════════════════════════

#[test]
fn packet_faults_follow_the_address() {
    let fault = address_fault(FaultKind::Permanent, 0x100, 4, 2, StuckAt::One);
    let mut injector = FaultInjector::new("l1d", [fault]);

    let mut pkt = Packet::read(0x100, 8);
    assert_eq!(injector.inject_packet_faults(&mut pkt, true, "l1d", 0), 1);
    assert_eq!(pkt.data, vec![0, 0, 0, 0, 0x04, 0, 0, 0]);

    let mut elsewhere = Packet::read(0x108, 8);
    assert_eq!(injector.inject_packet_faults(&mut elsewhere, true, "l1d", 0), 0);
    assert_eq!(injector.inject_packet_faults(&mut pkt, true, "l2", 0), 0, "other owner");
    assert_eq!(injector.stats().flips, 1);
}

#[test]
fn disabled_injector_does_nothing() {
    let mut cache = faulty_cache(address_fault(FaultKind::Permanent, 0x40, 0, 0, StuckAt::One));
    cache.fault_injector_mut().expect("attached").disable();
    assert_eq!(atomic_read(&mut cache, 0x40, 4, 0), vec![0; 4]);
    assert_eq!(cache.stats().faults_injected, 0);

    cache.fault_injector_mut().expect("attached").enable();
    assert_eq!(atomic_read(&mut cache, 0x40, 4, 1), vec![1, 0, 0, 0]);
}

#[test]
fn injector_for_another_cache_is_inert() {
    let mut cache = build(&small_config(CacheKind::Coherent));
    let fault = FaultSpec::new(FaultKind::Permanent, FaultLocation::Address(0), 0, 0, StuckAt::One, "l2");
    cache.set_fault_injector(FaultInjector::new("l2", [fault]));
    assert_eq!(atomic_read(&mut cache, 0x0, 1, 0), vec![0]);
}

#[test]
fn fault_past_the_address_space_never_matches() {
    let injector = FaultInjector::parse("0 0xffffffffffffffc0 0x100 0 0 10 1 l1d\n", "l1d", 4);
    assert!(injector.faults().is_empty(), "overflowing line is skipped");

    let fault = address_fault(FaultKind::Permanent, 0xFFFF_FFFF_FFFF_FFC0, 0x100, 0, StuckAt::One);
    assert_eq!(fault.target_addr(), None);
    assert!(!fault.is_faulty_address(0xFFFF_FFFF_FFFF_FFC0, 64));

    let mut cache = faulty_cache(fault);
    assert_eq!(atomic_read(&mut cache, 0x0, 4, 0), vec![0; 4]);
    assert_eq!(atomic_read(&mut cache, 0x40, 4, 1).len(), 4);
    assert_eq!(cache.stats().faults_injected, 0);
}

// ══════════════════════════════════════════════════════════
// 4. Faults seen through the cache
// ══════════════════════════════════════════════════════════

/// A permanent stuck-at-1 fault on bit 0 of byte 0 of block 0 is observed on
/// every read, even after the byte is rewritten.
#[test]
fn permanent_fault_is_observed_on_every_read() {
    let mut cache = faulty_cache(address_fault(FaultKind::Permanent, 0x0, 0, 0, StuckAt::One));
    atomic_write(&mut cache, 0x0, &[0; 8], 0);

    for now in [10, 20, 30] {
        assert_eq!(atomic_read(&mut cache, 0x0, 2, now), vec![0x01, 0x00], "tick {now}");
    }
    atomic_write(&mut cache, 0x0, &[0; 2], 40);
    assert_eq!(atomic_read(&mut cache, 0x0, 1, 50), vec![0x01]);
    assert!(cache.stats().faults_injected >= 5);
    assert!(cache.fault_injector().expect("attached").faults()[0].is_injected());
}

#[test]
fn transient_fault_is_cleared_by_a_rewrite() {
    let fault = address_fault(FaultKind::Transient, 0x40, 3, 7, StuckAt::One).with_window(5, 5);
    let mut cache = faulty_cache(fault);

    assert_eq!(atomic_read(&mut cache, 0x40, 4, 1), vec![0; 4], "window not open yet");
    assert_eq!(atomic_read(&mut cache, 0x40, 4, 10), vec![0, 0, 0, 0x80]);
    atomic_write(&mut cache, 0x40, &[0; 4], 20);
    assert_eq!(atomic_read(&mut cache, 0x40, 4, 30), vec![0; 4]);
    assert_eq!(cache.fault_injector().expect("attached").stats().flips, 1);
}

#[test]
fn intermittent_fault_is_visible_only_inside_its_window() {
    let fault = address_fault(FaultKind::Intermittent, 0x80, 0, 0, StuckAt::One).with_window(10, 20);
    let mut cache = faulty_cache(fault);
    atomic_write(&mut cache, 0x80, &[0xF0; 8], 0);

    assert_eq!(atomic_read(&mut cache, 0x80, 1, 15), vec![0xF1]);
    assert_eq!(atomic_read(&mut cache, 0x80, 1, 25), vec![0xF0]);
    let stats = cache.fault_injector().expect("attached").stats();
    assert_eq!((stats.flips, stats.restores), (1, 1));
}

#[test]
fn slot_fault_hits_whatever_block_occupies_the_slot() {
    let mut cache = build(&small_config(CacheKind::Coherent));
    atomic_write(&mut cache, 0x0, &[0xFF; 8], 0);
    let slot = cache.tags().find_block(0x0, false).expect("cached");
    let (set, way) = (cache.tags().block(slot).set, cache.tags().block(slot).way);

    let fault = FaultSpec::new(
        FaultKind::Permanent,
        FaultLocation::Slot { set, way },
        2,
        1,
        StuckAt::Zero,
        "l1d",
    );
    cache.set_fault_injector(FaultInjector::new("l1d", [fault]));
    assert_eq!(atomic_read(&mut cache, 0x0, 4, 5), vec![0xFF, 0xFF, 0xFD, 0xFF]);
}

#[test]
fn uncacheable_reads_see_address_faults() {
    let mut cache = faulty_cache(address_fault(FaultKind::Permanent, 0x500, 1, 4, StuckAt::One));
    cache.mem_side_mut().fill = 0;
    let mut pkt = Packet::read(0x500, 4).with_uncacheable(true);
    let _ = cache.recv_atomic(&mut pkt, 0).expect("atomic read");
    assert_eq!(pkt.data, vec![0, 0x10, 0, 0]);
}
