use cachefi_core::Cache;
use cachefi_core::cache::Admission;
use cachefi_core::common::{Addr, Packet, Tick};
use cachefi_core::config::{CacheConfig, CacheKind, Prefetcher, ReplacementPolicy};
use tracing_subscriber::EnvFilter;

use super::mocks::ports::{RecordingCpu, RecordingMem};

/// A cache wired to recording ports.
pub type TestCache = Cache<RecordingMem, RecordingCpu>;

/// Block size of the test configurations.
pub const BLK: usize = 64;

/// Installs a test subscriber; set `RUST_LOG` to see protocol events.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

/// Creates a small, deterministic cache configuration.
///
/// 1 KiB, 64-byte lines, 4-way set-associative (4 sets), LRU, 1-cycle
/// latencies, 4 MSHRs with one kept for demand misses, 4 targets per MSHR
/// and 4 write-buffer entries.
///
/// Set index = (addr / 64) % 4
pub fn small_config(kind: CacheKind) -> CacheConfig {
    CacheConfig {
        name: "l1d".to_owned(),
        kind,
        size_bytes: 1024,
        line_bytes: BLK,
        ways: 4,
        tag_latency: 1,
        data_latency: 1,
        response_latency: 1,
        clock_period: 1,
        mshrs: 4,
        demand_mshr_reserve: 1,
        tgts_per_mshr: 4,
        write_buffers: 4,
        policy: ReplacementPolicy::Lru,
        prefetcher: Prefetcher::None,
        ..CacheConfig::default()
    }
}

/// Builds a cache with fresh recording ports.
pub fn build(config: &CacheConfig) -> TestCache {
    init_tracing();
    Cache::new(config, RecordingMem::default(), RecordingCpu::default()).expect("valid test configuration")
}

/// Address of the `n`-th block mapping to `set` in the small configuration.
pub const fn addr_in_set(set: u64, n: u64) -> Addr {
    (n * 4 + set) * BLK as Addr
}

/// Offers a request and asserts it was accepted.
pub fn accept(cache: &mut TestCache, pkt: Packet, now: Tick) {
    let admission = cache.recv_timing_req(pkt, now).expect("request handled");
    assert_eq!(admission, Admission::Accepted, "request should be accepted");
}

/// Sends everything the cache has queued, then answers every request that
/// reached memory as a plain exclusive fill.
///
/// # Returns
///
/// The number of responses delivered to the cache.
pub fn send_and_respond(cache: &mut TestCache, now: Tick) -> usize {
    cache.send_deferred(now).expect("send queued work");
    let requests = cache.mem_side_mut().take_requests();
    let fill = cache.mem_side().fill;
    let count = requests.len();
    for mut pkt in requests {
        if pkt.cmd.is_read() {
            pkt.data = vec![fill; pkt.size];
        }
        pkt.make_response();
        cache.recv_timing_resp(pkt, now).expect("response accepted");
    }
    count
}
