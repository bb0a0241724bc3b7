//! Configuration Tests.
//!
//! Defaults, JSON loading and the validation performed before a cache is built.

use cachefi_core::Cache;
use cachefi_core::SimConfig;
use cachefi_core::common::{CacheError, ConfigError};
use cachefi_core::config::{CacheConfig, CacheKind, MemoryController, Prefetcher, ReplacementPolicy};
use pretty_assertions::assert_eq;
use rstest::rstest;

use crate::common::mocks::ports::{RecordingCpu, RecordingMem};

// ══════════════════════════════════════════════════════════
// 1. Defaults
// ══════════════════════════════════════════════════════════

#[test]
fn default_cache_is_valid() {
    let config = CacheConfig::default();
    assert_eq!(config.name, "l1d");
    assert_eq!(config.kind, CacheKind::Coherent);
    assert_eq!((config.size_bytes, config.line_bytes, config.ways), (32 * 1024, 64, 4));
    assert_eq!(config.num_blocks(), 512);
    assert_eq!(config.num_sets(), 128);
    assert_eq!(config.policy, ReplacementPolicy::Lru);
    assert_eq!(config.prefetcher, Prefetcher::None);
    assert!(config.fast_writes);
    assert!(config.fault_injection.is_none());
    assert_eq!(config.validate(), Ok(()));
}

#[test]
fn default_memory() {
    let memory = SimConfig::default().memory;
    assert_eq!(memory.controller, MemoryController::Simple);
    assert_eq!(memory.latency, 100);
    assert_eq!((memory.t_cas, memory.t_ras, memory.t_pre), (14, 14, 14));
    assert_eq!(memory.max_outstanding, 16);
}

#[test]
fn cycles_scale_with_clock_period() {
    let config = CacheConfig {
        clock_period: 500,
        ..CacheConfig::default()
    };
    assert_eq!(config.cycles_to_ticks(3), 1500);
}

// ══════════════════════════════════════════════════════════
// 2. JSON
// ══════════════════════════════════════════════════════════

#[test]
fn json_overrides_and_defaults_mix() {
    let json = r#"{
        "cache": {
            "name": "l2",
            "kind": "Noncoherent",
            "size_bytes": 262144,
            "line_bytes": 128,
            "ways": 8,
            "policy": "PLRU",
            "prefetcher": "Stride",
            "prefetch_degree": 2,
            "fault_injection": { "input_path": "faults.txt" }
        },
        "memory": { "controller": "Dram", "t_cas": 20 }
    }"#;
    let config = SimConfig::from_json(json).expect("valid configuration");
    assert_eq!(config.cache.name, "l2");
    assert_eq!(config.cache.kind, CacheKind::Noncoherent);
    assert_eq!(config.cache.num_sets(), 256);
    assert_eq!(config.cache.policy, ReplacementPolicy::Plru);
    assert_eq!(config.cache.prefetcher, Prefetcher::Stride);
    assert_eq!(config.cache.prefetch_degree, 2);
    assert_eq!(config.cache.mshrs, 4, "unspecified fields keep their defaults");

    let faults = config.cache.fault_injection.expect("fault list configured");
    assert_eq!(faults.input_path.to_str(), Some("faults.txt"));
    assert_eq!(faults.owner, None);
    assert!(faults.enabled);

    assert_eq!(config.memory.controller, MemoryController::Dram);
    assert_eq!(config.memory.t_cas, 20);
    assert_eq!(config.memory.t_ras, 14);
}

#[test]
fn empty_json_is_the_default() {
    let config = SimConfig::from_json("{}").expect("valid configuration");
    assert_eq!(config.cache.size_bytes, CacheConfig::default().size_bytes);
}

#[test]
fn malformed_json_is_a_parse_error() {
    assert!(matches!(SimConfig::from_json("{ cache: "), Err(ConfigError::Parse(_))));
    assert!(matches!(
        SimConfig::from_json(r#"{ "cache": { "kind": "Exclusive" } }"#),
        Err(ConfigError::Parse(_))
    ));
}

#[test]
fn json_geometry_is_validated() {
    let err = SimConfig::from_json(r#"{ "cache": { "ways": 0 } }"#).unwrap_err();
    assert_eq!(err, ConfigError::ZeroAssociativity);
}

// ══════════════════════════════════════════════════════════
// 3. Validation
// ══════════════════════════════════════════════════════════

#[rstest]
#[case::ways(|c: &mut CacheConfig| c.ways = 0, ConfigError::ZeroAssociativity)]
#[case::tiny_block(|c: &mut CacheConfig| c.line_bytes = 2, ConfigError::InvalidBlockSize(2))]
#[case::odd_block(|c: &mut CacheConfig| c.line_bytes = 48, ConfigError::InvalidBlockSize(48))]
#[case::uneven(
    |c: &mut CacheConfig| c.size_bytes = 1000,
    ConfigError::UnevenGeometry { size: 1000, blk_size: 64, assoc: 4 }
)]
#[case::sets(|c: &mut CacheConfig| c.size_bytes = 768, ConfigError::SetsNotPowerOfTwo(3))]
#[case::no_mshrs(|c: &mut CacheConfig| c.mshrs = 0, ConfigError::EmptyQueue { queue: "MSHRs" })]
#[case::no_write_buffer(
    |c: &mut CacheConfig| c.write_buffers = 0,
    ConfigError::EmptyQueue { queue: "write buffer" }
)]
#[case::reserve(
    |c: &mut CacheConfig| c.demand_mshr_reserve = 5,
    ConfigError::ReserveTooLarge { queue: "MSHRs", reserve: 5, entries: 4 }
)]
#[case::targets(|c: &mut CacheConfig| c.tgts_per_mshr = 0, ConfigError::ZeroTargets)]
#[case::warmup(|c: &mut CacheConfig| c.warmup_percentage = 101, ConfigError::WarmupOutOfRange(101))]
#[case::clock(|c: &mut CacheConfig| c.clock_period = 0, ConfigError::ZeroClockPeriod)]
fn invalid_configuration_is_rejected(#[case] tweak: fn(&mut CacheConfig), #[case] expected: ConfigError) {
    let mut config = CacheConfig {
        size_bytes: 1024,
        ..CacheConfig::default()
    };
    tweak(&mut config);
    assert_eq!(config.validate(), Err(expected));
}

#[test]
fn cache_construction_validates() {
    let config = CacheConfig {
        ways: 3,
        ..CacheConfig::default()
    };
    let err = Cache::new(&config, RecordingMem::default(), RecordingCpu::default()).unwrap_err();
    assert!(matches!(err, CacheError::Config(ConfigError::UnevenGeometry { assoc: 3, .. })));
}
