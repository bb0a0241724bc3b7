//! Timing-mode request, send and response handling.
//!
//! Requests enter through [`Cache::recv_timing_req`], queued work leaves through
//! [`Cache::send_deferred`] and responses come back through
//! [`Cache::recv_timing_resp`]. Nothing here waits: a busy port is recorded and
//! resumed from [`Cache::recv_req_retry`], a full queue blocks the cache until an
//! entry is freed.

use tracing::{debug, trace};

use super::{AccessOutcome, Admission, BlockedCause, Cache, CpuSidePort, MemSidePort};
use crate::common::addr::Tick;
use crate::common::error::CacheError;
use crate::common::packet::{MemCmd, Packet};
use crate::config::CacheKind;
use crate::queue::{EntryId, QueueEntry, Target, TargetSource};

impl<M: MemSidePort, C: CpuSidePort> Cache<M, C> {
    /// Offers a request from above.
    ///
    /// # Arguments
    ///
    /// * `pkt` - The request; ownership passes to the cache when accepted.
    /// * `now` - Current tick.
    ///
    /// # Returns
    ///
    /// [`Admission::Accepted`], or [`Admission::Retry`] with the packet while the
    /// cache is blocked; a retry is sent upward once it unblocks.
    pub fn recv_timing_req(&mut self, mut pkt: Packet, now: Tick) -> Result<Admission, CacheError> {
        self.check_request(&pkt)?;
        if self.is_blocked() {
            self.need_retry = true;
            for cause in BlockedCause::ALL {
                if self.is_blocked_by(cause) {
                    self.stats.blocked_refusals[cause as usize] += 1;
                }
            }
            trace!(cache = %self.name, cmd = %pkt.cmd, addr = pkt.addr, "blocked, request refused");
            return Ok(Admission::Retry(pkt));
        }

        pkt.req_tick = now;
        self.promote_whole_line_write(&mut pkt);

        if pkt.uncacheable {
            self.handle_uncacheable(pkt, now)?;
            return Ok(Admission::Accepted);
        }

        let mut writebacks = Vec::new();
        let outcome = self.access(&mut pkt, now, &mut writebacks)?;
        self.do_writebacks(writebacks, now)?;

        if !pkt.cmd.is_eviction() {
            self.record_access(pkt.cmd, outcome.satisfied);
            self.notify_prefetcher(&pkt, outcome.satisfied);
        }

        if outcome.satisfied {
            self.handle_timing_req_hit(pkt, outcome.latency, now);
        } else {
            self.handle_timing_req_miss(pkt, outcome, now)?;
        }
        Ok(Admission::Accepted)
    }

    fn handle_timing_req_hit(&mut self, mut pkt: Packet, latency: Tick, now: Tick) {
        if pkt.cmd.needs_response() {
            pkt.make_response();
            self.cpu_side.schedule_timing_resp(pkt, now + latency);
        }
    }

    /// Records a miss in the MSHR queue, merging with an outstanding miss to the
    /// same block when there is one.
    ///
    /// An eviction from above that reaches this point could not be absorbed and
    /// is passed on through the write buffer.
    fn handle_timing_req_miss(&mut self, pkt: Packet, outcome: AccessOutcome, now: Tick) -> Result<(), CacheError> {
        let ready_time = now + outcome.latency.max(self.forward_latency);
        if pkt.cmd.is_eviction() {
            let _ = self.allocate_write_buffer(pkt, ready_time)?;
            return Ok(());
        }

        let blk_addr = self.blk_align(pkt.addr);
        if let Some(id) = self.mshr_queue.find_match(blk_addr, pkt.secure, true) {
            self.stats.mshr_hits += 1;
            let order = self.next_order();
            let mshr = self.mshr_queue.entry_mut(id)?;
            let deferred = mshr.allocate_target(Target::new(pkt, ready_time, order, true));
            let targets = mshr.num_targets();
            debug!(cache = %self.name, %id, blk_addr, deferred, targets, "miss merged");
            if targets >= self.tgts_per_mshr {
                self.no_target_mshr = Some(id);
                self.set_blocked(BlockedCause::NoTargets);
            }
        } else {
            self.stats.mshr_misses += 1;
            let _ = self.allocate_miss_buffer(pkt, ready_time, true)?;
        }
        Ok(())
    }

    /// Forwards an uncacheable access through its own MSHR.
    ///
    /// A cached copy of the block is evicted first.
    fn handle_uncacheable(&mut self, pkt: Packet, now: Tick) -> Result<(), CacheError> {
        self.stats.mshr_uncacheable += 1;
        if let Some(index) = self.tags.find_block(pkt.addr, pkt.secure) {
            let writebacks = self.evict_block(index)?.into_iter().collect();
            self.do_writebacks(writebacks, now)?;
        }
        let _ = self.allocate_miss_buffer(pkt, now + self.forward_latency, false)?;
        Ok(())
    }

    fn allocate_miss_buffer(&mut self, pkt: Packet, ready_time: Tick, alloc_on_fill: bool) -> Result<EntryId, CacheError> {
        let blk_addr = if pkt.uncacheable {
            pkt.addr
        } else {
            self.blk_align(pkt.addr)
        };
        let order = self.next_order();
        let id = self
            .mshr_queue
            .allocate(blk_addr, self.blk_size, pkt, ready_time, order, alloc_on_fill)?;
        if self.mshr_queue.is_full() {
            self.set_blocked(BlockedCause::MshrQueueFull);
        }
        if self.tgts_per_mshr <= 1 {
            self.no_target_mshr = Some(id);
            self.set_blocked(BlockedCause::NoTargets);
        }
        Ok(id)
    }

    fn notify_prefetcher(&mut self, pkt: &Packet, hit: bool) {
        if hit && !self.prefetch_on_access {
            return;
        }
        if let Some(prefetcher) = self.prefetcher.as_mut() {
            prefetcher.notify(pkt.addr, pkt.requestor, hit);
        }
    }

    /// Sends every queued request that is ready at `now`, until the port below
    /// refuses one or nothing is left.
    pub fn send_deferred(&mut self, now: Tick) -> Result<(), CacheError> {
        while !self.waiting_on_retry && self.send_next(now)? {}
        Ok(())
    }

    /// Resumes sending after the port below has freed up.
    pub fn recv_req_retry(&mut self, now: Tick) -> Result<(), CacheError> {
        trace!(cache = %self.name, "retry from below");
        self.waiting_on_retry = false;
        self.send_deferred(now)
    }

    /// Picks and sends the next queued request.
    ///
    /// Writes go first when the write buffer is full or no miss is ready. Either
    /// way, an earlier-ordered entry for the same block in the other queue is
    /// sent before the chosen one so the two never overtake each other.
    ///
    /// # Returns
    ///
    /// `true` if progress was made and another attempt may succeed.
    fn send_next(&mut self, now: Tick) -> Result<bool, CacheError> {
        let mshr = self.mshr_queue.get_next(now);
        let write = self.write_buffer.get_next(now);

        if let Some(wid) = write.filter(|_| self.write_buffer.is_full() || mshr.is_none()) {
            let entry = self.write_buffer.entry(wid)?;
            let (blk_addr, secure, order) = (entry.blk_addr(), entry.is_secure(), entry.order());
            if let Some(mid) = self.mshr_queue.find_pending(blk_addr, secure) {
                if self.mshr_queue.entry(mid)?.order() < order {
                    return Ok(!self.send_mshr_queue_packet(mid, now)?);
                }
            }
            return Ok(!self.send_write_queue_packet(wid, now)?);
        }

        if let Some(mid) = mshr {
            let entry = self.mshr_queue.entry(mid)?;
            let (blk_addr, secure, order) = (entry.blk_addr(), entry.is_secure(), entry.order());
            if let Some(wid) = self.write_buffer.find_pending(blk_addr, secure) {
                if self.write_buffer.entry(wid)?.order() < order {
                    return Ok(!self.send_write_queue_packet(wid, now)?);
                }
            }
            return Ok(!self.send_mshr_queue_packet(mid, now)?);
        }

        self.issue_prefetch(now)
    }

    /// Sends the request for an MSHR.
    ///
    /// A prefetch whose block has meanwhile arrived by other means is dropped
    /// instead of being sent.
    ///
    /// # Returns
    ///
    /// `true` if the port refused the request and the cache now waits for a retry.
    pub fn send_mshr_queue_packet(&mut self, id: EntryId, now: Tick) -> Result<bool, CacheError> {
        let mshr = self.mshr_queue.entry(id)?;
        let (blk_addr, secure) = (mshr.blk_addr(), mshr.is_secure());
        let blk = if mshr.is_uncacheable() {
            None
        } else {
            self.tags.find_block(blk_addr, secure)
        };

        if mshr.is_prefetch_only() && blk.is_some() {
            self.stats.prefetches_dropped += 1;
            trace!(cache = %self.name, %id, blk_addr, "prefetch already cached, dropped");
            if self.mshr_queue.force_deallocate_target(id)? {
                self.clear_blocked(BlockedCause::MshrQueueFull);
            }
            return Ok(false);
        }

        let first = mshr
            .first_target()
            .map(|target| target.pkt.clone())
            .ok_or_else(|| self.mshr_queue.state_error(id, "without targets"))?;
        let (needs_writable, whole_line) = (mshr.needs_writable(), mshr.is_whole_line_write());
        let mut pkt = self.create_miss_packet(&first, blk, needs_writable, whole_line);
        pkt.sender_state = Some(id);
        pkt.req_tick = now;
        let cmd = pkt.cmd;
        let pending_modified = self.kind == CacheKind::Noncoherent || cmd.needs_writable();

        match self.mem_side.send_timing_req(pkt, now) {
            Ok(()) => {
                self.mshr_queue.mark_in_service(id, pending_modified)?;
                if cmd == MemCmd::HardPfReq {
                    self.stats.prefetches_issued += 1;
                }
                debug!(cache = %self.name, %id, %cmd, blk_addr, "miss sent");
                Ok(false)
            }
            Err(_) => {
                self.waiting_on_retry = true;
                trace!(cache = %self.name, %id, %cmd, blk_addr, "port busy, waiting for retry");
                Ok(true)
            }
        }
    }

    /// Sends the eviction held by a write-buffer entry.
    ///
    /// # Returns
    ///
    /// `true` if the port refused the request and the cache now waits for a retry.
    fn send_write_queue_packet(&mut self, id: EntryId, now: Tick) -> Result<bool, CacheError> {
        let pkt = self
            .write_buffer
            .entry(id)?
            .packet()
            .cloned()
            .ok_or_else(|| self.write_buffer.state_error(id, "empty"))?;
        let cmd = pkt.cmd;
        let addr = pkt.addr;
        let was_full = self.write_buffer.is_full();

        match self.mem_side.send_timing_req(pkt, now) {
            Ok(()) => {
                self.write_buffer.mark_in_service(id)?;
                debug!(cache = %self.name, %id, %cmd, addr, "eviction sent");
                if was_full && !self.write_buffer.is_full() {
                    self.clear_blocked(BlockedCause::WriteBufferFull);
                }
                Ok(false)
            }
            Err(_) => {
                self.waiting_on_retry = true;
                trace!(cache = %self.name, %id, %cmd, addr, "port busy, waiting for retry");
                Ok(true)
            }
        }
    }

    /// Turns the oldest useful prefetch candidate into an MSHR.
    ///
    /// Candidates already cached or already outstanding are discarded.
    fn issue_prefetch(&mut self, now: Tick) -> Result<bool, CacheError> {
        if !self.mshr_queue.can_prefetch() {
            return Ok(false);
        }
        while let Some(addr) = self.prefetcher.as_mut().and_then(|pf| pf.pop()) {
            let blk_addr = self.blk_align(addr);
            if self.tags.find_block(blk_addr, false).is_some()
                || self.mshr_queue.find_match(blk_addr, false, true).is_some()
                || self.write_buffer.find_match(blk_addr, false, true).is_some()
            {
                trace!(cache = %self.name, blk_addr, "prefetch redundant");
                continue;
            }
            let mut pkt = Packet::new(MemCmd::HardPfReq, blk_addr, self.blk_size);
            pkt.req_tick = now;
            let _ = self.allocate_miss_buffer(pkt, now, true)?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Handles a response from below.
    ///
    /// The response fills the block (evicting a victim if needed) and services
    /// every target merged onto the MSHR in arrival order. Deferred targets are
    /// then promoted and re-requested; otherwise the MSHR is freed.
    ///
    /// # Errors
    ///
    /// [`CacheError::UnexpectedResponse`] if no in-service MSHR is waiting for `pkt`.
    pub fn recv_timing_resp(&mut self, pkt: Packet, now: Tick) -> Result<(), CacheError> {
        let id = pkt
            .sender_state
            .filter(|&id| self.mshr_queue.entry(id).is_ok_and(|mshr| mshr.is_in_service()))
            .ok_or(CacheError::UnexpectedResponse {
                cmd: pkt.cmd,
                addr: pkt.addr,
            })?;
        let mshr = self.mshr_queue.entry(id)?;
        let (blk_addr, secure) = (mshr.blk_addr(), mshr.is_secure());
        let (uncacheable, alloc_on_fill) = (mshr.is_uncacheable(), mshr.alloc_on_fill());
        let was_full = self.mshr_queue.is_full();
        trace!(cache = %self.name, %id, cmd = %pkt.cmd, blk_addr, "response");

        if uncacheable {
            let targets = self.mshr_queue.entry_mut(id)?.extract_service_targets();
            self.respond_uncacheable(&pkt, targets, now);
            self.mshr_queue.deallocate(id)?;
            self.finish_mshr(id, was_full);
            return Ok(());
        }

        let blk = self.tags.find_block(blk_addr, secure);
        if pkt.cmd == MemCmd::UpgradeResp && blk.is_none() {
            debug!(cache = %self.name, %id, blk_addr, "block lost during upgrade, reissuing");
            self.mshr_queue.mark_pending(id)?;
            return Ok(());
        }

        let mut writebacks = Vec::new();
        let blk = self.handle_fill(&pkt, blk, alloc_on_fill, &mut writebacks, now)?;
        if let Some(temp_writeback) = self.service_mshr_targets(id, &pkt, blk, now)? {
            writebacks.push(temp_writeback);
        }

        if self.mshr_queue.entry(id)?.post_invalidate() {
            if let Some(index) = blk.filter(|&index| self.tags.block(index).valid) {
                debug!(cache = %self.name, blk_addr, "invalidating after fill");
                self.tags.invalidate(index)?;
            }
        }
        if self.mshr_queue.entry_mut(id)?.promote_deferred_targets() {
            self.mshr_queue.mark_pending(id)?;
        } else {
            self.mshr_queue.deallocate(id)?;
        }
        self.finish_mshr(id, was_full);
        self.do_writebacks(writebacks, now)
    }

    /// Satisfies the targets of an MSHR from a fill, oldest first.
    ///
    /// When the fill could not be allocated, targets are served from the response
    /// payload; writes among them turn that payload into a dirty writeback.
    /// Writes that the fill left without write permission are deferred, together
    /// with every target behind them, and re-requested.
    ///
    /// # Returns
    ///
    /// The writeback built from the unallocated payload, if any target wrote to it.
    fn service_mshr_targets(
        &mut self,
        id: EntryId,
        pkt: &Packet,
        blk: Option<usize>,
        now: Tick,
    ) -> Result<Option<Packet>, CacheError> {
        let targets = self.mshr_queue.entry_mut(id)?.extract_service_targets();
        let completion = now + self.response_latency;
        let mut temp = pkt.data.clone();
        temp.resize(self.blk_size, 0);
        let mut temp_dirty = false;
        let unwritable = self.kind == CacheKind::Coherent
            && blk.is_some_and(|index| {
                let block = self.tags.block(index);
                block.valid && !block.writable
            });
        let mut deferring = false;

        for target in targets {
            if target.source == TargetSource::Prefetcher {
                self.stats.prefetch_fills += 1;
                continue;
            }
            // Later targets stay behind a deferred write to keep arrival order.
            if deferring || (unwritable && target.pkt.cmd.needs_writable()) {
                deferring = true;
                trace!(cache = %self.name, %id, addr = target.pkt.addr, "fill not writable, target deferred");
                self.mshr_queue.entry_mut(id)?.defer_target(target);
                continue;
            }
            let mut req = target.pkt;
            match blk.filter(|&index| self.tags.block(index).valid) {
                Some(index) => self.satisfy_request(&mut req, index, now)?,
                None if req.cmd.is_write() => {
                    req.write_data_to_block(&mut temp);
                    temp_dirty = true;
                }
                None if req.cmd.is_read() => {
                    req.set_data_from_block(&temp);
                    self.inject_packet_faults(&mut req, true, now);
                }
                None => {}
            }
            self.stats.total_miss_latency += now.saturating_sub(target.recv_time);
            self.stats.miss_latency_samples += 1;
            if req.cmd.needs_response() {
                req.make_response();
                self.cpu_side.schedule_timing_resp(req, completion);
            }
        }

        if !temp_dirty {
            return Ok(None);
        }
        let mut writeback = Packet::new(MemCmd::WritebackDirty, pkt.block_addr(self.blk_size), self.blk_size)
            .with_secure(pkt.secure)
            .with_requestor(pkt.requestor)
            .with_task(pkt.task_id);
        writeback.data = temp;
        Ok(Some(writeback))
    }

    /// Clears the blocking causes an MSHR may have been holding.
    fn finish_mshr(&mut self, id: EntryId, was_full: bool) {
        if was_full && !self.mshr_queue.is_full() {
            self.clear_blocked(BlockedCause::MshrQueueFull);
        }
        if self.no_target_mshr == Some(id) {
            self.no_target_mshr = None;
            self.clear_blocked(BlockedCause::NoTargets);
        }
    }
}
