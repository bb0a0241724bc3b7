//! Reference harness.
//!
//! A minimal environment for running a cache end to end from a trace. It provides:
//! 1. **Memory:** A sparse backing store with fixed or DRAM-row latency, used as the
//!    cache's memory-side port.
//! 2. **Traces:** Parsing of line-oriented memory-access traces.
//! 3. **Driver:** An event queue, a trace-replaying CPU port and timing/atomic replay loops.

/// Event queue, trace CPU and replay loops.
pub mod driver;

/// Backing memory and latency models.
pub mod memory;

/// Trace parsing.
pub mod trace;

pub use driver::{EventQueue, RunSummary, SimCache, TraceCpu, build_cache, run_atomic, run_timing};
pub use memory::{DramController, LatencyModel, SimpleController, SimpleMemory};
pub use trace::{TraceOp, TraceRecord, load_trace, parse_trace};
