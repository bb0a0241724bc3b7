//! Snoop handling for the coherent variant.
//!
//! A snoop from below may find the block in the tag store or, if it was just
//! evicted, in the write buffer. A dirty copy answers the snoop with data; an
//! invalidating snoop removes the local copy and a read snoop downgrades it to
//! shared. A miss already in service is marked to invalidate its block once
//! the fill has been used.

use tracing::{debug, trace};

use super::{Cache, CpuSidePort, MemSidePort};
use crate::common::addr::Tick;
use crate::common::error::CacheError;
use crate::common::packet::Packet;
use crate::config::CacheKind;
use crate::queue::QueueEntry;

/// What handling a snoop produced.
#[derive(Debug, Clone, Copy)]
struct SnoopOutcome {
    responded: bool,
    latency: Tick,
}

impl<M: MemSidePort, C: CpuSidePort> Cache<M, C> {
    /// Handles a timing snoop from below, sending a response if this cache supplies the data.
    ///
    /// # Errors
    ///
    /// [`CacheError::UnexpectedSnoop`] for a non-coherent cache.
    pub fn recv_timing_snoop_req(&mut self, mut pkt: Packet, now: Tick) -> Result<(), CacheError> {
        let outcome = self.handle_snoop(&mut pkt, now, true)?;
        if outcome.responded {
            pkt.make_response();
            self.mem_side.send_timing_snoop_resp(pkt, now + outcome.latency);
        }
        Ok(())
    }

    /// Handles an atomic snoop from below.
    ///
    /// # Returns
    ///
    /// The snoop latency; `pkt` becomes a response if this cache supplied the data.
    pub fn recv_atomic_snoop(&mut self, pkt: &mut Packet, now: Tick) -> Result<Tick, CacheError> {
        let outcome = self.handle_snoop(pkt, now, false)?;
        if outcome.responded {
            pkt.make_response();
        }
        Ok(outcome.latency)
    }

    fn handle_snoop(&mut self, pkt: &mut Packet, now: Tick, is_timing: bool) -> Result<SnoopOutcome, CacheError> {
        if self.kind == CacheKind::Noncoherent {
            return Err(CacheError::UnexpectedSnoop {
                cache: self.name.clone(),
                cmd: pkt.cmd,
                addr: pkt.addr,
            });
        }
        self.stats.snoops += 1;
        let blk_addr = self.blk_align(pkt.addr);
        let mut latency = self.lookup_latency;
        if self.cpu_side.is_snooping() {
            latency += self.cpu_side.snoop_upward(pkt).latency;
        }

        if is_timing && pkt.cmd.is_invalidate() {
            if let Some(id) = self.mshr_queue.find_match(blk_addr, pkt.secure, true) {
                let mshr = self.mshr_queue.entry_mut(id)?;
                if mshr.is_in_service() {
                    mshr.set_post_invalidate();
                    debug!(cache = %self.name, %id, blk_addr, "snoop invalidates in-flight miss");
                }
            }
        }

        let mut responded = false;
        if let Some(index) = self.tags.find_block(pkt.addr, pkt.secure) {
            let dirty = self.tags.block(index).dirty;
            if dirty && pkt.cmd.needs_response() && !pkt.cache_responding {
                responded = true;
                pkt.cache_responding = true;
                if pkt.cmd.is_read() {
                    self.inject_block_faults(true, now);
                    pkt.set_data_from_block(self.tags.data(index));
                }
            }
            if pkt.cmd.is_invalidate() {
                self.tags.invalidate(index)?;
            } else if pkt.cmd.is_read() {
                self.tags.block_mut(index).writable = false;
                pkt.has_sharers = true;
            }
        } else if let Some(id) = self.write_buffer.find_match(blk_addr, pkt.secure, false) {
            let queued = self.write_buffer.entry(id)?.packet().filter(|q| q.cmd.is_writeback());
            if let Some(queued) = queued {
                if pkt.cmd.is_read() && pkt.cmd.needs_response() && !pkt.cache_responding {
                    pkt.set_data_from_block(&queued.data);
                    pkt.cache_responding = true;
                    responded = true;
                }
                if !pkt.cmd.is_invalidate() {
                    pkt.has_sharers = true;
                }
            }
        }

        if responded {
            self.stats.snoop_responses += 1;
        }
        trace!(cache = %self.name, cmd = %pkt.cmd, addr = pkt.addr, responded, latency, "snoop");
        Ok(SnoopOutcome { responded, latency })
    }
}
