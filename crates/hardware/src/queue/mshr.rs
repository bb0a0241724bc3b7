//! Miss-status holding registers.
//!
//! An MSHR tracks one outstanding miss for one block. Accesses to the same block
//! that arrive while the miss is outstanding are merged onto it as targets and
//! are all serviced, in arrival order, by the single response.
//!
//! Targets that the in-flight request cannot satisfy (they need a writable copy
//! the request will not grant) are parked on a deferred list and re-requested
//! once the current response has been handled.

use std::collections::VecDeque;

use super::QueueEntry;
use crate::common::addr::{Addr, Tick};
use crate::common::packet::{MemCmd, Packet};

/// Where a target came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetSource {
    /// A demand access from above.
    Cpu,
    /// The cache's own prefetcher.
    Prefetcher,
}

/// One access waiting on an MSHR.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// The original request.
    pub pkt: Packet,
    /// Tick at which the access arrived.
    pub recv_time: Tick,
    /// Tick from which the access could be serviced.
    pub ready_time: Tick,
    /// Global allocation sequence number of the access.
    pub order: u64,
    /// Origin of the access.
    pub source: TargetSource,
    /// The block should be allocated when the response arrives.
    pub alloc_on_fill: bool,
}

impl Target {
    /// Wraps a request as a target.
    ///
    /// Hardware prefetches are attributed to the prefetcher, everything else to the CPU side.
    pub fn new(pkt: Packet, ready_time: Tick, order: u64, alloc_on_fill: bool) -> Self {
        let source = if pkt.cmd == MemCmd::HardPfReq {
            TargetSource::Prefetcher
        } else {
            TargetSource::Cpu
        };
        Self {
            recv_time: pkt.req_tick,
            pkt,
            ready_time,
            order,
            source,
            alloc_on_fill,
        }
    }
}

/// An outstanding miss.
#[derive(Debug, Clone, Default)]
pub struct Mshr {
    blk_addr: Addr,
    blk_size: usize,
    secure: bool,
    ready_time: Tick,
    order: u64,
    in_service: bool,
    uncacheable: bool,
    alloc_on_fill: bool,
    pending_modified: bool,
    post_invalidate: bool,
    targets: VecDeque<Target>,
    deferred_targets: VecDeque<Target>,
}

impl Mshr {
    /// Initialises a free MSHR for a new miss.
    pub(crate) fn allocate(&mut self, blk_addr: Addr, blk_size: usize, target: Target) {
        self.blk_addr = blk_addr;
        self.blk_size = blk_size;
        self.secure = target.pkt.secure;
        self.ready_time = target.ready_time;
        self.order = target.order;
        self.in_service = false;
        self.uncacheable = target.pkt.uncacheable;
        self.alloc_on_fill = target.alloc_on_fill;
        self.pending_modified = false;
        self.post_invalidate = false;
        self.targets.clear();
        self.deferred_targets.clear();
        self.targets.push_back(target);
    }

    /// Merges another access onto this MSHR.
    ///
    /// The access is deferred when the request already in service cannot satisfy
    /// it: it needs a writable copy the response will not grant, the block will be
    /// invalidated after the fill, or earlier accesses are already deferred.
    ///
    /// # Returns
    ///
    /// `true` if the target was deferred.
    pub fn allocate_target(&mut self, target: Target) -> bool {
        let defer = self.in_service
            && (!self.deferred_targets.is_empty()
                || self.post_invalidate
                || (target.pkt.cmd.needs_writable() && !self.pending_modified));
        self.alloc_on_fill |= target.alloc_on_fill;
        if defer {
            self.deferred_targets.push_back(target);
        } else {
            self.targets.push_back(target);
        }
        defer
    }

    /// Block-aligned address of the miss.
    pub const fn blk_addr(&self) -> Addr {
        self.blk_addr
    }

    /// Block size in bytes.
    pub const fn blk_size(&self) -> usize {
        self.blk_size
    }

    /// The block should be allocated when the response arrives.
    pub const fn alloc_on_fill(&self) -> bool {
        self.alloc_on_fill
    }

    /// The in-service request will be answered with a writable copy.
    pub const fn is_pending_modified(&self) -> bool {
        self.pending_modified
    }

    /// The block must be invalidated once the current targets are serviced.
    pub const fn post_invalidate(&self) -> bool {
        self.post_invalidate
    }

    /// Requests invalidation of the block after the fill has been serviced.
    pub fn set_post_invalidate(&mut self) {
        self.post_invalidate = true;
    }

    /// Returns `true` if any regular target needs a writable copy.
    pub fn needs_writable(&self) -> bool {
        self.targets.iter().any(|t| t.pkt.cmd.needs_writable())
    }

    /// Returns `true` if every regular target writes the whole block, so the
    /// miss needs no data from below.
    pub fn is_whole_line_write(&self) -> bool {
        !self.targets.is_empty() && self.targets.iter().all(|t| t.pkt.cmd == MemCmd::WriteLineReq)
    }

    /// Returns `true` if every target was generated by the prefetcher.
    pub fn is_prefetch_only(&self) -> bool {
        !self.targets.is_empty()
            && self.deferred_targets.is_empty()
            && self.targets.iter().all(|t| t.source == TargetSource::Prefetcher)
    }

    /// Regular and deferred targets together.
    pub fn num_targets(&self) -> usize {
        self.targets.len() + self.deferred_targets.len()
    }

    /// Returns `true` while any target is waiting.
    pub fn has_targets(&self) -> bool {
        self.num_targets() > 0
    }

    /// Regular targets in arrival order.
    pub fn targets(&self) -> impl Iterator<Item = &Target> + '_ {
        self.targets.iter()
    }

    /// Deferred targets in arrival order.
    pub fn deferred_targets(&self) -> impl Iterator<Item = &Target> + '_ {
        self.deferred_targets.iter()
    }

    /// The oldest regular target.
    pub fn first_target(&self) -> Option<&Target> {
        self.targets.front()
    }

    /// Removes the oldest regular target.
    pub fn pop_target(&mut self) -> Option<Target> {
        self.targets.pop_front()
    }

    /// Removes every regular target for servicing, oldest first.
    pub fn extract_service_targets(&mut self) -> Vec<Target> {
        self.targets.drain(..).collect()
    }

    /// Parks a target that the current fill could not satisfy.
    pub fn defer_target(&mut self, target: Target) {
        self.deferred_targets.push_back(target);
    }

    /// Moves the deferred targets onto the regular list.
    ///
    /// # Returns
    ///
    /// `true` if there were deferred targets; the MSHR then needs a new request.
    pub fn promote_deferred_targets(&mut self) -> bool {
        if self.deferred_targets.is_empty() {
            return false;
        }
        self.targets.extend(self.deferred_targets.drain(..));
        if let Some(first) = self.targets.front() {
            self.ready_time = first.ready_time;
            self.order = first.order;
        }
        self.pending_modified = false;
        self.post_invalidate = false;
        true
    }

    pub(crate) fn mark_in_service(&mut self, pending_modified_resp: bool) {
        self.in_service = true;
        self.pending_modified = pending_modified_resp;
    }

    pub(crate) fn mark_pending(&mut self) {
        self.in_service = false;
        self.pending_modified = false;
    }

    /// Pushes the ready time of the MSHR and of all its targets back by `ticks`.
    pub(crate) fn delay(&mut self, ticks: Tick) {
        self.ready_time += ticks;
        for target in &mut self.targets {
            target.ready_time += ticks;
        }
    }
}

impl QueueEntry for Mshr {
    fn blk_addr(&self) -> Addr {
        self.blk_addr
    }

    fn is_secure(&self) -> bool {
        self.secure
    }

    fn ready_time(&self) -> Tick {
        self.ready_time
    }

    fn order(&self) -> u64 {
        self.order
    }

    fn is_in_service(&self) -> bool {
        self.in_service
    }

    fn is_uncacheable(&self) -> bool {
        self.uncacheable
    }
}
