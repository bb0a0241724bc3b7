//! Error definitions for the cache model.
//!
//! This module defines the error types returned by the library. It provides:
//! 1. **Configuration Errors:** Invalid geometry or queue sizing, detected before simulation starts.
//! 2. **Protocol Errors:** Violations of cache/queue invariants that make the run meaningless.
//! 3. **Fault List Errors:** I/O failures while loading a fault-injection list.
//!
//! Backpressure (a full queue, a busy port) is never an error; it is reported through
//! ordinary return values such as [`Admission`](crate::cache::Admission).

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use super::addr::Addr;
use super::packet::MemCmd;

/// Invalid cache or queue parameters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Associativity of zero.
    #[error("associativity must be greater than zero")]
    ZeroAssociativity,

    /// Block size below four bytes or not a power of two.
    #[error("block size {0} must be at least 4 bytes and a power of 2")]
    InvalidBlockSize(usize),

    /// Cache size does not divide evenly into blocks and ways.
    #[error("cache size {size} is not a multiple of block size {blk_size} times associativity {assoc}")]
    UnevenGeometry {
        /// Total capacity in bytes.
        size: usize,
        /// Block size in bytes.
        blk_size: usize,
        /// Ways per set.
        assoc: usize,
    },

    /// The derived number of sets is zero or not a power of two.
    #[error("number of sets {0} must be a non-zero power of 2")]
    SetsNotPowerOfTwo(usize),

    /// A queue was configured with no usable entries.
    #[error("{queue} needs at least one entry")]
    EmptyQueue {
        /// Queue label.
        queue: &'static str,
    },

    /// The reserve of a queue leaves no entries for demand traffic.
    #[error("{queue}: reserve {reserve} leaves no entries out of {entries}")]
    ReserveTooLarge {
        /// Queue label.
        queue: &'static str,
        /// Requested reserve.
        reserve: usize,
        /// Requested entries.
        entries: usize,
    },

    /// Zero targets per MSHR.
    #[error("targets per MSHR must be greater than zero")]
    ZeroTargets,

    /// Warm-up percentage outside `0..=100`.
    #[error("warm-up percentage {0} must be within 0..=100")]
    WarmupOutOfRange(u8),

    /// Clock period of zero ticks.
    #[error("clock period must be at least one tick")]
    ZeroClockPeriod,

    /// The configuration text could not be parsed.
    #[error("invalid configuration: {0}")]
    Parse(String),
}

/// Fatal protocol or invariant violations raised by the controller, tags or queues.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Wrapped configuration error.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Wrapped fault-list error.
    #[error(transparent)]
    Fault(#[from] FaultError),

    /// `allocate` was called on a queue with no free entries.
    #[error("{queue}: allocate called with no free entries")]
    QueueExhausted {
        /// Queue label.
        queue: String,
    },

    /// An entry handle does not refer to an allocated entry.
    #[error("{queue}: entry {index} is not allocated")]
    StaleEntry {
        /// Queue label.
        queue: String,
        /// Arena index of the entry.
        index: usize,
    },

    /// A queue operation was applied to an entry in the wrong service state.
    #[error("{queue}: entry {index} is {state}")]
    EntryState {
        /// Queue label.
        queue: String,
        /// Arena index of the entry.
        index: usize,
        /// Human-readable description of the offending state.
        state: &'static str,
    },

    /// `insert_block` on a block that is still valid.
    #[error("insert into valid block at set {set} way {way}")]
    BlockAlreadyValid {
        /// Set index.
        set: usize,
        /// Way index.
        way: usize,
    },

    /// `invalidate` on a block that is not valid.
    #[error("invalidate of invalid block at set {set} way {way}")]
    BlockNotValid {
        /// Set index.
        set: usize,
        /// Way index.
        way: usize,
    },

    /// A response arrived that no in-service MSHR is waiting for.
    #[error("{cmd} for {addr:#x} does not match any in-service MSHR")]
    UnexpectedResponse {
        /// Response command.
        cmd: MemCmd,
        /// Response address.
        addr: Addr,
    },

    /// A non-coherent cache received a snoop.
    #[error("non-coherent cache {cache} received snoop {cmd} for {addr:#x}")]
    UnexpectedSnoop {
        /// Cache name.
        cache: String,
        /// Snoop command.
        cmd: MemCmd,
        /// Snoop address.
        addr: Addr,
    },

    /// A request spans more than one cache block.
    #[error("{cmd} for {addr:#x} size {size} crosses a block boundary")]
    CrossesBlock {
        /// Request command.
        cmd: MemCmd,
        /// Request address.
        addr: Addr,
        /// Request size in bytes.
        size: usize,
    },

    /// A request whose payload does not match its size.
    #[error("{cmd} for {addr:#x} size {size} carries {len} data bytes")]
    PayloadSize {
        /// Request command.
        cmd: MemCmd,
        /// Request address.
        addr: Addr,
        /// Request size in bytes.
        size: usize,
        /// Length of the payload buffer.
        len: usize,
    },

    /// A command that cannot appear on this side of the cache.
    #[error("unsupported command {cmd} for {addr:#x}")]
    UnsupportedCommand {
        /// Offending command.
        cmd: MemCmd,
        /// Request address.
        addr: Addr,
    },
}

/// Errors raised while loading a fault list.
#[derive(Debug, Error)]
pub enum FaultError {
    /// The fault list could not be read.
    #[error("cannot read fault list {path}: {source}")]
    Unreadable {
        /// Path of the fault list.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

/// Reasons a single fault-list line is rejected. Rejected lines are skipped, not fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FaultLineError {
    /// Wrong number of whitespace-separated fields.
    #[error("expected 4, 5 or 8 fields, found {0}")]
    FieldCount(usize),

    /// A numeric field failed to parse.
    #[error("invalid {field} `{value}`")]
    InvalidField {
        /// Field name.
        field: &'static str,
        /// Raw text.
        value: String,
    },

    /// Unknown fault kind.
    #[error("unknown fault kind `{0}`")]
    UnknownKind(String),

    /// Bit offset outside a byte.
    #[error("bit offset {0} must be below 8")]
    BitOutOfRange(u8),

    /// Stuck-at value other than 0 or 1.
    #[error("stuck-at value {0} must be 0 or 1")]
    StuckAtOutOfRange(u8),

    /// The faulty byte lies beyond the end of the address space.
    #[error("byte offset {byte_offset:#x} past block {blk_addr:#x} overflows the address space")]
    AddressOverflow {
        /// Block address.
        blk_addr: u64,
        /// Byte offset from the block address.
        byte_offset: u64,
    },

    /// Activation window ends before it starts.
    #[error("activation window [{start}, {end}] is empty")]
    EmptyWindow {
        /// Window start tick.
        start: u64,
        /// Window end tick.
        end: u64,
    },
}

/// Errors raised while loading a memory-access trace.
#[derive(Debug, Error)]
pub enum TraceError {
    /// The trace could not be read.
    #[error("cannot read trace {path}: {source}")]
    Unreadable {
        /// Path of the trace.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A line does not follow `tick R|W addr size [requestor]`.
    #[error("trace line {line}: {reason}")]
    Malformed {
        /// One-based line number.
        line: usize,
        /// What was wrong with it.
        reason: String,
    },
}
