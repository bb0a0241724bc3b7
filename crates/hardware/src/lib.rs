//! Cycle-level set-associative cache model.
//!
//! This crate models one cache of a memory hierarchy at tick granularity, with the following:
//! 1. **Tags:** Set-associative indexing, block metadata, pluggable replacement and tag statistics.
//! 2. **Queues:** MSHRs with target merging and deferral, and a write buffer for evictions.
//! 3. **Controller:** Coherent and non-coherent caches with timing, atomic and functional access.
//! 4. **Fault Injection:** Permanent, transient and intermittent stuck-at faults on stored or
//!    in-flight data.
//! 5. **Harness:** A trace-driven memory/CPU environment for running a cache end to end.

/// Cache controller, ports and controller statistics.
pub mod cache;
/// Common types (addresses, ticks, packets, errors).
pub mod common;
/// Cache, fault-injection and memory configuration.
pub mod config;
/// Fault lists and the fault injector.
pub mod fault;
/// Hardware prefetchers feeding the cache's MSHR queue.
pub mod prefetch;
/// MSHR queue and write buffer.
pub mod queue;
/// Reference harness (memory, traces, replay).
pub mod sim;
/// Tag store, indexing and replacement policies.
pub mod tags;

/// The cache controller; construct with `Cache::new`.
pub use crate::cache::Cache;
/// Root configuration type; use `SimConfig::default()` or deserialize from JSON.
pub use crate::config::SimConfig;
/// The fault injector attached to a cache.
pub use crate::fault::FaultInjector;
