//! The MSHR queue.
//!
//! Wraps the generic [`Queue`] with the operations specific to misses: target
//! allocation, re-prioritisation, service-state transitions and the prefetch
//! admission check that keeps demand MSHRs available.

use std::ops::{Deref, DerefMut};

use tracing::debug;

use super::mshr::{Mshr, Target};
use super::{EntryId, Queue, QueueEntry};
use crate::common::addr::{Addr, Tick};
use crate::common::error::CacheError;
use crate::common::packet::Packet;

/// Queue of outstanding misses.
#[derive(Debug)]
pub struct MshrQueue {
    queue: Queue<Mshr>,
    demand_reserve: usize,
}

impl MshrQueue {
    /// Creates an MSHR queue.
    ///
    /// # Arguments
    ///
    /// * `label` - Name used in logs and errors.
    /// * `num_entries` - MSHRs available to ordinary allocations.
    /// * `reserve` - Extra MSHRs usable once the queue reports full.
    /// * `demand_reserve` - MSHRs prefetches may never take.
    pub fn new(label: impl Into<String>, num_entries: usize, reserve: usize, demand_reserve: usize) -> Self {
        Self {
            queue: Queue::new(label, num_entries, reserve),
            demand_reserve,
        }
    }

    /// Allocates an MSHR for a miss, with `pkt` as its first target.
    ///
    /// # Arguments
    ///
    /// * `blk_addr` - Block-aligned address of the miss.
    /// * `blk_size` - Block size in bytes.
    /// * `pkt` - The access that missed.
    /// * `ready_time` - Tick from which the miss may be sent downstream.
    /// * `order` - Global allocation sequence number.
    /// * `alloc_on_fill` - Allocate the block when the response arrives.
    ///
    /// # Returns
    ///
    /// The new entry, or [`CacheError::QueueExhausted`] if every entry, reserve
    /// included, is taken.
    pub fn allocate(
        &mut self,
        blk_addr: Addr,
        blk_size: usize,
        pkt: Packet,
        ready_time: Tick,
        order: u64,
        alloc_on_fill: bool,
    ) -> Result<EntryId, CacheError> {
        let id = self.queue.take_free()?;
        let target = Target::new(pkt, ready_time, order, alloc_on_fill);
        debug!(queue = %self.queue.label(), %id, blk_addr, ready_time, "allocate MSHR");
        self.queue.entry_mut(id)?.allocate(blk_addr, blk_size, target);
        self.queue.add_to_ready_list(id);
        Ok(id)
    }

    /// Moves a waiting MSHR to the head of the ready list.
    ///
    /// MSHRs already in service are left where they are.
    pub fn move_to_front(&mut self, id: EntryId) -> Result<(), CacheError> {
        if !self.queue.entry(id)?.is_in_service() {
            self.queue.push_ready_front(id);
        }
        Ok(())
    }

    /// Pushes a waiting MSHR's ready time back and re-sorts it.
    pub fn delay(&mut self, id: EntryId, ticks: Tick) -> Result<(), CacheError> {
        let mshr = self.queue.entry_mut(id)?;
        if mshr.is_in_service() {
            return Err(self.queue.state_error(id, "in service"));
        }
        mshr.delay(ticks);
        self.queue.remove_from_ready_list(id);
        self.queue.add_to_ready_list(id);
        Ok(())
    }

    /// Records that the MSHR's request has been sent.
    ///
    /// # Arguments
    ///
    /// * `id` - The MSHR.
    /// * `pending_modified_resp` - The response will grant a writable copy.
    pub fn mark_in_service(&mut self, id: EntryId, pending_modified_resp: bool) -> Result<(), CacheError> {
        let mshr = self.queue.entry_mut(id)?;
        if mshr.is_in_service() {
            return Err(self.queue.state_error(id, "already in service"));
        }
        mshr.mark_in_service(pending_modified_resp);
        self.queue.note_in_service(id);
        Ok(())
    }

    /// Returns an in-service MSHR to the ready list so its request is sent again.
    pub fn mark_pending(&mut self, id: EntryId) -> Result<(), CacheError> {
        let mshr = self.queue.entry_mut(id)?;
        if !mshr.is_in_service() {
            return Err(self.queue.state_error(id, "not in service"));
        }
        mshr.mark_pending();
        self.queue.note_pending(id);
        Ok(())
    }

    /// Drops the oldest target, freeing the MSHR if nothing else is waiting on it.
    ///
    /// # Returns
    ///
    /// `true` if the queue was full before and no longer is.
    pub fn force_deallocate_target(&mut self, id: EntryId) -> Result<bool, CacheError> {
        let was_full = self.queue.is_full();
        let mshr = self.queue.entry_mut(id)?;
        let _ = mshr.pop_target();
        if mshr.first_target().is_none() && !mshr.promote_deferred_targets() {
            self.queue.deallocate(id)?;
        }
        Ok(was_full && !self.queue.is_full())
    }

    /// Returns `true` if any MSHR is still waiting to be sent.
    pub fn have_pending(&self) -> bool {
        self.queue.num_in_service() != self.queue.allocated()
    }

    /// Returns `true` if a prefetch may allocate an MSHR without eating into the
    /// entries kept for demand misses.
    pub fn can_prefetch(&self) -> bool {
        let keep_free = self.queue.num_reserve() + 1 + self.demand_reserve;
        self.queue.allocated() < self.queue.num_entries().saturating_sub(keep_free)
    }
}

impl Deref for MshrQueue {
    type Target = Queue<Mshr>;

    fn deref(&self) -> &Self::Target {
        &self.queue
    }
}

impl DerefMut for MshrQueue {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.queue
    }
}
