//! Atomic and functional access paths.
//!
//! Atomic accesses run the same protocol as timing accesses but complete in a
//! single call: misses are fetched from below on the spot and evictions are
//! written back immediately, so no MSHR or write-buffer entry is ever allocated.
//! Functional accesses read or update data wherever it currently lives without
//! changing any cache state.

use tracing::trace;

use super::{Cache, CpuSidePort, MemSidePort};
use crate::common::addr::Tick;
use crate::common::error::CacheError;
use crate::common::packet::{MemCmd, Packet};

impl<M: MemSidePort, C: CpuSidePort> Cache<M, C> {
    /// Performs a request synchronously.
    ///
    /// On return `pkt` holds the response (data for reads).
    ///
    /// # Returns
    ///
    /// The latency of the access in ticks.
    pub fn recv_atomic(&mut self, pkt: &mut Packet, now: Tick) -> Result<Tick, CacheError> {
        self.check_request(pkt)?;
        pkt.req_tick = now;
        self.promote_whole_line_write(pkt);

        if pkt.uncacheable {
            self.stats.mshr_uncacheable += 1;
            if let Some(index) = self.tags.find_block(pkt.addr, pkt.secure) {
                let writebacks = self.evict_block(index)?.into_iter().collect();
                self.do_writebacks_atomic(writebacks, now);
            }
            let latency = self.forward_latency + self.mem_side.send_atomic(pkt, now);
            let is_read = pkt.cmd.is_read();
            self.inject_packet_faults(pkt, is_read, now);
            return Ok(latency);
        }

        let mut writebacks = Vec::new();
        let outcome = self.access(pkt, now, &mut writebacks)?;
        let mut latency = outcome.latency;

        if pkt.cmd.is_eviction() {
            if !outcome.satisfied {
                latency += self.mem_side.send_atomic(pkt, now);
            }
        } else {
            self.record_access(pkt.cmd, outcome.satisfied);
            if !outcome.satisfied {
                self.stats.mshr_misses += 1;
                latency += self.handle_atomic_req_miss(pkt, outcome.blk, &mut writebacks, now)?;
            }
            if pkt.cmd.needs_response() {
                pkt.make_response();
            }
        }
        self.do_writebacks_atomic(writebacks, now);
        Ok(latency)
    }

    /// Fetches a missing block (or the missing permission) from below and
    /// satisfies `pkt` from it.
    ///
    /// # Returns
    ///
    /// The latency of the downstream access.
    fn handle_atomic_req_miss(
        &mut self,
        pkt: &mut Packet,
        blk: Option<usize>,
        writebacks: &mut Vec<Packet>,
        now: Tick,
    ) -> Result<Tick, CacheError> {
        let (needs_writable, whole_line) = (pkt.cmd.needs_writable(), pkt.cmd == MemCmd::WriteLineReq);
        let mut bus_pkt = self.create_miss_packet(pkt, blk, needs_writable, whole_line);
        let latency = self.mem_side.send_atomic(&mut bus_pkt, now);
        trace!(cache = %self.name, cmd = %bus_pkt.cmd, addr = bus_pkt.addr, latency, "atomic miss");

        match self.handle_fill(&bus_pkt, blk, true, writebacks, now)? {
            Some(index) => self.satisfy_request(pkt, index, now)?,
            None if pkt.cmd.is_write() => {
                let mut temp = bus_pkt;
                temp.data.resize(self.blk_size, 0);
                pkt.write_data_to_block(&mut temp.data);
                temp.cmd = MemCmd::WritebackDirty;
                writebacks.push(temp);
            }
            None => {
                pkt.set_data_from_packet(&bus_pkt);
                self.inject_packet_faults(pkt, true, now);
            }
        }
        Ok(latency)
    }

    /// Writes evictions back immediately.
    ///
    /// Clean evictions are dropped while a cache above still holds the block.
    fn do_writebacks_atomic(&mut self, writebacks: Vec<Packet>, now: Tick) {
        for mut pkt in writebacks {
            if matches!(pkt.cmd, MemCmd::CleanEvict | MemCmd::WritebackClean) && self.is_cached_above(&pkt) {
                if pkt.cmd == MemCmd::CleanEvict {
                    self.stats.clean_evicts_squashed += 1;
                    continue;
                }
                pkt.block_cached = true;
            }
            if pkt.cmd == MemCmd::CleanEvict {
                self.stats.clean_evicts += 1;
            } else {
                self.stats.writebacks += 1;
            }
            let _ = self.mem_side.send_atomic(&mut pkt, now);
        }
    }

    /// Reads or writes data without timing or state changes.
    ///
    /// The tag store is checked first, then the write buffer. Reads stop at the
    /// first copy found; writes update every copy and continue below.
    ///
    /// # Arguments
    ///
    /// * `pkt` - A read or write request; reads receive the data in place.
    /// * `from_cpu_side` - The access came from above and may be forwarded below.
    pub fn functional_access(&mut self, pkt: &mut Packet, from_cpu_side: bool) {
        let is_write = pkt.cmd.is_write();
        if let Some(index) = self.tags.find_block(pkt.addr, pkt.secure) {
            if is_write {
                pkt.write_data_to_block(self.tags.data_mut(index));
            } else {
                pkt.set_data_from_block(self.tags.data(index));
                trace!(cache = %self.name, addr = pkt.addr, "functional read hit");
                return;
            }
        }

        let blk_addr = self.blk_align(pkt.addr);
        if let Some(id) = self.write_buffer.find_match(blk_addr, pkt.secure, false) {
            let queued = self
                .write_buffer
                .entry_mut(id)
                .ok()
                .and_then(|entry| entry.packet_mut())
                .filter(|queued| queued.cmd.has_data());
            if let Some(queued) = queued {
                if is_write {
                    pkt.write_data_to_block(&mut queued.data);
                } else {
                    pkt.set_data_from_block(&queued.data);
                    trace!(cache = %self.name, addr = pkt.addr, "functional read from write buffer");
                    return;
                }
            }
        }

        if from_cpu_side {
            self.mem_side.send_functional(pkt);
        }
    }
}
