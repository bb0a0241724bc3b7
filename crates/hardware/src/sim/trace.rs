//! Memory-access traces.
//!
//! A trace has one access per line: `tick R|W addr size [requestor]`. Addresses
//! and sizes accept a `0x` prefix, `#` starts a comment and blank lines are
//! ignored. An op of `UR` or `UW` marks the access uncacheable. Write data is
//! not part of the trace; each written byte is derived from its address.

use std::fs;
use std::path::Path;

use crate::common::addr::{Addr, RequestorId, Tick};
use crate::common::error::TraceError;
use crate::common::packet::Packet;

/// Direction of a traced access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceOp {
    /// Load.
    Read,
    /// Store.
    Write,
}

/// One traced access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceRecord {
    /// Tick at which the access is issued.
    pub tick: Tick,
    /// Load or store.
    pub op: TraceOp,
    /// First byte addressed.
    pub addr: Addr,
    /// Bytes addressed.
    pub size: usize,
    /// Issuing component.
    pub requestor: RequestorId,
    /// Bypasses the cache.
    pub uncacheable: bool,
}

impl TraceRecord {
    /// Builds the request packet for this access.
    pub fn to_packet(&self) -> Packet {
        let pkt = match self.op {
            TraceOp::Read => Packet::read(self.addr, self.size),
            TraceOp::Write => Packet::write(self.addr, &write_pattern(self.addr, self.size)),
        };
        pkt.with_requestor(self.requestor).with_uncacheable(self.uncacheable)
    }
}

/// Bytes stored by a traced write of `size` bytes at `addr`.
pub fn write_pattern(addr: Addr, size: usize) -> Vec<u8> {
    (0..size as Addr).map(|i| (addr + i) as u8 ^ 0xA5).collect()
}

/// Parses a whole trace.
///
/// # Returns
///
/// The records in file order, or the first malformed line.
pub fn parse_trace(contents: &str) -> Result<Vec<TraceRecord>, TraceError> {
    let mut records = Vec::new();
    for (index, raw) in contents.lines().enumerate() {
        let line = raw.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        records.push(parse_record(line).map_err(|reason| TraceError::Malformed {
            line: index + 1,
            reason,
        })?);
    }
    Ok(records)
}

/// Loads and parses a trace file.
pub fn load_trace(path: &Path) -> Result<Vec<TraceRecord>, TraceError> {
    let contents = fs::read_to_string(path).map_err(|source| TraceError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;
    parse_trace(&contents)
}

fn parse_record(line: &str) -> Result<TraceRecord, String> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if !(4..=5).contains(&fields.len()) {
        return Err(format!("expected 4 or 5 fields, found {}", fields.len()));
    }
    let (op, uncacheable) = match fields[1].to_ascii_uppercase().as_str() {
        "R" => (TraceOp::Read, false),
        "W" => (TraceOp::Write, false),
        "UR" => (TraceOp::Read, true),
        "UW" => (TraceOp::Write, true),
        other => return Err(format!("unknown op `{other}`")),
    };
    let size = parse_number(fields[3], "size")? as usize;
    if size == 0 {
        return Err("size must be greater than zero".to_owned());
    }
    let requestor = match fields.get(4) {
        Some(field) => RequestorId::try_from(parse_number(field, "requestor")?)
            .map_err(|_| format!("requestor `{field}` out of range"))?,
        None => 0,
    };
    Ok(TraceRecord {
        tick: parse_number(fields[0], "tick")?,
        op,
        addr: parse_number(fields[2], "address")?,
        size,
        requestor,
        uncacheable,
    })
}

fn parse_number(field: &str, what: &str) -> Result<u64, String> {
    let parsed = match field.strip_prefix("0x").or_else(|| field.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => field.parse(),
    };
    parsed.map_err(|_| format!("invalid {what} `{field}`"))
}
