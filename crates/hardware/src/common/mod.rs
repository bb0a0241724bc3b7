//! Common types shared by every part of the cache model.
//!
//! This module provides the building blocks used across the crate. It includes:
//! 1. **Address Types:** Addresses, ticks, cycles and block arithmetic.
//! 2. **Packets:** Memory commands and the packet that carries them.
//! 3. **Error Handling:** Configuration, protocol and fault-list error enums.

/// Address, tick and cycle types and block arithmetic.
pub mod addr;

/// Error types for configuration, protocol violations, fault lists and traces.
pub mod error;

/// Memory commands and packets.
pub mod packet;

pub use addr::{Addr, Cycles, MAX_TICK, RequestorId, Tick};
pub use error::{CacheError, ConfigError, FaultError, FaultLineError, TraceError};
pub use packet::{MemCmd, Packet};
