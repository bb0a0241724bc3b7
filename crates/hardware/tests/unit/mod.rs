//! # Unit Components
//!
//! This module serves as the central hub for the per-component tests of the
//! cache model, from the tag store up to the trace-driven harness.

/// Unit tests for the tag store, indexing and replacement policies.
///
/// This module covers address decomposition, victim selection, block lifecycle
/// and tag statistics.
pub mod tags;



/// Unit tests for snoop handling in coherent and non-coherent caches.
pub mod snoop;

/// Unit tests for fault-list parsing and fault injection.
pub mod fault;

/// Unit tests for the prefetchers and the prefetch queue.
pub mod prefetch;

/// Unit tests for configuration defaults, JSON loading and validation.
pub mod config;
