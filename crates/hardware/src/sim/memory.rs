//! Backing memory for the reference harness.
//!
//! This module provides:
//! 1. **Latency Models:** A fixed-latency controller and a row-buffer-aware DRAM controller.
//! 2. **SimpleMemory:** A sparse byte store acting as the [`MemSidePort`] of a cache, with
//!    a bound on outstanding requests beyond which it refuses and later sends a retry.

use std::collections::HashMap;

use tracing::trace;

use crate::cache::MemSidePort;
use crate::common::addr::{Addr, Tick};
use crate::common::packet::{MemCmd, Packet};
use crate::config::{MemoryConfig, MemoryController};

/// Trait for memory controllers that report access latency in ticks.
pub trait LatencyModel: Send + Sync + std::fmt::Debug {
    /// Returns the number of ticks required for an access to the given address.
    ///
    /// # Arguments
    ///
    /// * `addr` - Physical address being accessed (may be used for row-buffer modeling).
    fn access_latency(&mut self, addr: Addr) -> Tick;
}

/// Fixed-latency memory controller; every access takes the same number of ticks.
#[derive(Debug)]
pub struct SimpleController {
    latency: Tick,
}

impl SimpleController {
    /// Creates a simple controller with the given fixed latency.
    pub const fn new(latency: Tick) -> Self {
        Self { latency }
    }
}

impl LatencyModel for SimpleController {
    fn access_latency(&mut self, _addr: Addr) -> Tick {
        self.latency
    }
}

/// DRAM-style controller with a single open row; models CAS, RAS and precharge.
#[derive(Debug)]
pub struct DramController {
    last_row: Option<Addr>,
    t_cas: Tick,
    t_ras: Tick,
    t_pre: Tick,
    row_mask: Addr,
}

impl DramController {
    /// Creates a DRAM controller with the given timing parameters.
    ///
    /// # Arguments
    ///
    /// * `t_cas` - Column access strobe latency.
    /// * `t_ras` - Row access strobe latency.
    /// * `t_pre` - Precharge latency.
    pub const fn new(t_cas: Tick, t_ras: Tick, t_pre: Tick) -> Self {
        Self {
            last_row: None,
            t_cas,
            t_ras,
            t_pre,
            row_mask: !2047,
        }
    }
}

impl LatencyModel for DramController {
    fn access_latency(&mut self, addr: Addr) -> Tick {
        let row = addr & self.row_mask;
        match self.last_row {
            Some(open_row) if open_row == row => self.t_cas,
            Some(_) => {
                self.last_row = Some(row);
                self.t_pre + self.t_ras + self.t_cas
            }
            None => {
                self.last_row = Some(row);
                self.t_ras + self.t_cas
            }
        }
    }
}

/// Counters kept by [`SimpleMemory`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    /// Requests that read data.
    pub reads: u64,
    /// Requests that wrote data.
    pub writes: u64,
    /// Requests refused because too many were outstanding.
    pub refused: u64,
    /// Snoop responses received.
    pub snoop_responses: u64,
}

/// Sparse main memory with a latency model.
///
/// Unwritten bytes read as zero. Responses to timing requests are queued with
/// their completion tick and collected by the driver through [`Self::take_responses`].
#[derive(Debug)]
pub struct SimpleMemory {
    controller: Box<dyn LatencyModel>,
    bytes: HashMap<Addr, u8>,
    max_outstanding: usize,
    outstanding: usize,
    responses: Vec<(Tick, Packet)>,
    need_retry: bool,
    stats: MemoryStats,
}

impl SimpleMemory {
    /// Creates a memory with an explicit latency model.
    ///
    /// # Arguments
    ///
    /// * `controller` - Latency model.
    /// * `max_outstanding` - Timing requests accepted before refusing.
    pub fn new(controller: Box<dyn LatencyModel>, max_outstanding: usize) -> Self {
        Self {
            controller,
            bytes: HashMap::new(),
            max_outstanding: max_outstanding.max(1),
            outstanding: 0,
            responses: Vec::new(),
            need_retry: false,
            stats: MemoryStats::default(),
        }
    }

    /// Creates the memory described by a configuration.
    pub fn from_config(config: &MemoryConfig) -> Self {
        let controller: Box<dyn LatencyModel> = match config.controller {
            MemoryController::Simple => Box::new(SimpleController::new(config.latency)),
            MemoryController::Dram => Box::new(DramController::new(config.t_cas, config.t_ras, config.t_pre)),
        };
        Self::new(controller, config.max_outstanding)
    }

    /// Reads bytes directly, bypassing timing.
    pub fn peek(&self, addr: Addr, len: usize) -> Vec<u8> {
        (0..len as Addr)
            .map(|i| self.bytes.get(&(addr + i)).copied().unwrap_or(0))
            .collect()
    }

    /// Writes bytes directly, bypassing timing.
    pub fn poke(&mut self, addr: Addr, data: &[u8]) {
        for (i, &byte) in data.iter().enumerate() {
            let _ = self.bytes.insert(addr + i as Addr, byte);
        }
    }

    /// Takes the responses produced since the last call, with their completion ticks.
    pub fn take_responses(&mut self) -> Vec<(Tick, Packet)> {
        std::mem::take(&mut self.responses)
    }

    /// Records that a response has been delivered, freeing its slot.
    pub fn complete(&mut self) {
        self.outstanding = self.outstanding.saturating_sub(1);
    }

    /// Returns `true` once if a refused requester may now retry.
    pub fn take_retry(&mut self) -> bool {
        if self.need_retry && self.outstanding < self.max_outstanding {
            self.need_retry = false;
            true
        } else {
            false
        }
    }

    /// Requests waiting for their response.
    pub const fn outstanding(&self) -> usize {
        self.outstanding
    }

    /// Memory counters.
    pub const fn stats(&self) -> MemoryStats {
        self.stats
    }

    /// Reads or writes the packet's bytes and turns it into its response.
    fn perform(&mut self, pkt: &mut Packet) {
        match pkt.cmd {
            MemCmd::WriteReq | MemCmd::WriteLineReq | MemCmd::WritebackDirty | MemCmd::WritebackClean => {
                self.stats.writes += 1;
                let data = pkt.data.clone();
                self.poke(pkt.addr, &data);
            }
            cmd if cmd.is_read() => {
                self.stats.reads += 1;
                pkt.data = self.peek(pkt.addr, pkt.size);
            }
            _ => {}
        }
        pkt.make_response();
    }
}

impl MemSidePort for SimpleMemory {
    fn send_timing_req(&mut self, mut pkt: Packet, now: Tick) -> Result<(), Packet> {
        let needs_response = pkt.cmd.needs_response();
        if needs_response && self.outstanding >= self.max_outstanding {
            self.stats.refused += 1;
            self.need_retry = true;
            trace!(cmd = %pkt.cmd, addr = pkt.addr, "memory busy");
            return Err(pkt);
        }
        let latency = self.controller.access_latency(pkt.addr);
        self.perform(&mut pkt);
        if needs_response {
            self.outstanding += 1;
            self.responses.push((now + latency, pkt));
        }
        Ok(())
    }

    fn send_atomic(&mut self, pkt: &mut Packet, _now: Tick) -> Tick {
        let latency = self.controller.access_latency(pkt.addr);
        self.perform(pkt);
        latency
    }

    fn send_functional(&mut self, pkt: &mut Packet) {
        if pkt.cmd.is_write() {
            let data = pkt.data.clone();
            self.poke(pkt.addr, &data);
        } else {
            pkt.data = self.peek(pkt.addr, pkt.size);
        }
    }

    fn send_timing_snoop_resp(&mut self, _pkt: Packet, _when: Tick) {
        self.stats.snoop_responses += 1;
    }
}
