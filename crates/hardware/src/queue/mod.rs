//! Outstanding-request queues.
//!
//! This module implements the bounded registries that track work a cache has
//! handed (or will hand) to the level below. It provides:
//! 1. **Generic Queue:** An arena of entries threaded through an allocation-ordered
//!    list, a ready list sorted by `(ready_time, order)` and a free pool.
//! 2. **MSHRs:** Miss-status holding registers with merged and deferred targets.
//! 3. **Write Buffer:** Entries holding writebacks and clean evictions.
//! 4. **Drain Support:** Queues report drained once their last entry is freed.
//!
//! Entries are addressed by [`EntryId`] handles; the lists hold handles rather
//! than references, so no entry ever points at another.
//!
//! Each queue holds `requested + reserve` entries. It reports full once only the
//! reserve is left, so work already accepted can still allocate while new
//! requests are refused.

/// Miss-status holding registers and their targets.
pub mod mshr;

/// The MSHR queue.
pub mod mshr_queue;

/// Write-buffer entries and queue.
pub mod write_queue;

use std::collections::VecDeque;
use std::fmt;

use tracing::debug;

pub use mshr::{Mshr, Target, TargetSource};
pub use mshr_queue::MshrQueue;
pub use write_queue::{WriteQueue, WriteQueueEntry};

use crate::common::addr::{Addr, MAX_TICK, Tick};
use crate::common::error::CacheError;

/// Handle of an entry in a [`Queue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(usize);

impl EntryId {
    /// Arena index of the entry.
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Drain progress of a queue or a cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainState {
    /// Normal operation; no drain requested.
    Running,
    /// A drain was requested and entries are still outstanding.
    Draining,
    /// Nothing outstanding.
    Drained,
}

/// Behaviour shared by every kind of queue entry.
pub trait QueueEntry: Default + fmt::Debug {
    /// Address of the block the entry is for.
    fn blk_addr(&self) -> Addr;

    /// Secure address space flag.
    fn is_secure(&self) -> bool;

    /// Tick from which the entry may be sent.
    fn ready_time(&self) -> Tick;

    /// Global allocation sequence number.
    fn order(&self) -> u64;

    /// The entry's request has been sent downstream.
    fn is_in_service(&self) -> bool;

    /// The entry is for an uncacheable access and never merges.
    fn is_uncacheable(&self) -> bool;

    /// Returns `true` if the entry is for `blk_addr` in the given address space.
    fn matches(&self, blk_addr: Addr, secure: bool) -> bool {
        self.blk_addr() == blk_addr && self.is_secure() == secure
    }
}

/// A bounded arena of queue entries.
#[derive(Debug)]
pub struct Queue<E: QueueEntry> {
    label: String,
    num_entries: usize,
    num_reserve: usize,
    entries: Vec<E>,
    in_use: Vec<bool>,
    allocated_list: Vec<EntryId>,
    ready_list: Vec<EntryId>,
    free_list: VecDeque<EntryId>,
    num_in_service: usize,
    drain: DrainState,
}

impl<E: QueueEntry> Queue<E> {
    /// Creates a queue.
    ///
    /// # Arguments
    ///
    /// * `label` - Name used in logs and errors.
    /// * `num_entries` - Entries available to ordinary allocations.
    /// * `reserve` - Extra entries only usable once the queue reports full.
    pub fn new(label: impl Into<String>, num_entries: usize, reserve: usize) -> Self {
        let total = num_entries + reserve;
        Self {
            label: label.into(),
            num_entries: total,
            num_reserve: reserve,
            entries: (0..total).map(|_| E::default()).collect(),
            in_use: vec![false; total],
            allocated_list: Vec::with_capacity(total),
            ready_list: Vec::with_capacity(total),
            free_list: (0..total).map(EntryId).collect(),
            num_in_service: 0,
            drain: DrainState::Running,
        }
    }

    /// Name of the queue.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Total entries, reserve included.
    pub const fn num_entries(&self) -> usize {
        self.num_entries
    }

    /// Entries held back for work already accepted.
    pub const fn num_reserve(&self) -> usize {
        self.num_reserve
    }

    /// Entries currently allocated.
    pub fn allocated(&self) -> usize {
        self.allocated_list.len()
    }

    /// Allocated entries whose request has been sent.
    pub const fn num_in_service(&self) -> usize {
        self.num_in_service
    }

    /// Returns `true` once only the reserve is left.
    pub fn is_full(&self) -> bool {
        self.allocated() >= self.num_entries - self.num_reserve
    }

    /// Returns `true` if no entry is allocated.
    pub fn is_empty(&self) -> bool {
        self.allocated_list.is_empty()
    }

    /// Borrows an allocated entry.
    pub fn entry(&self, id: EntryId) -> Result<&E, CacheError> {
        self.check(id)?;
        Ok(&self.entries[id.0])
    }

    /// Mutably borrows an allocated entry.
    pub fn entry_mut(&mut self, id: EntryId) -> Result<&mut E, CacheError> {
        self.check(id)?;
        Ok(&mut self.entries[id.0])
    }

    /// Returns `true` if `id` refers to an allocated entry.
    pub fn contains(&self, id: EntryId) -> bool {
        self.in_use.get(id.0).copied().unwrap_or(false)
    }

    /// Allocated entries in allocation order.
    pub fn iter(&self) -> impl Iterator<Item = (EntryId, &E)> + '_ {
        self.allocated_list.iter().map(|&id| (id, &self.entries[id.0]))
    }

    /// Handles of the entries waiting to be sent, in send order.
    pub fn ready_list(&self) -> &[EntryId] {
        &self.ready_list
    }

    /// Finds the allocated entry for a block.
    ///
    /// # Arguments
    ///
    /// * `blk_addr` - Block-aligned address.
    /// * `secure` - Secure address space flag.
    /// * `ignore_uncacheable` - Skip uncacheable entries; they never merge.
    pub fn find_match(&self, blk_addr: Addr, secure: bool, ignore_uncacheable: bool) -> Option<EntryId> {
        self.allocated_list.iter().copied().find(|&id| {
            let entry = &self.entries[id.0];
            !(ignore_uncacheable && entry.is_uncacheable()) && entry.matches(blk_addr, secure)
        })
    }

    /// Finds a not-yet-sent entry for a block.
    ///
    /// Only the ready list is searched; entries in service are ignored.
    pub fn find_pending(&self, blk_addr: Addr, secure: bool) -> Option<EntryId> {
        self.ready_list
            .iter()
            .copied()
            .find(|&id| self.entries[id.0].matches(blk_addr, secure))
    }

    /// Returns the head of the ready list if it may be sent at `now`.
    pub fn get_next(&self, now: Tick) -> Option<EntryId> {
        self.ready_list
            .first()
            .copied()
            .filter(|&id| self.entries[id.0].ready_time() <= now)
    }

    /// Earliest ready time on the ready list, or [`MAX_TICK`] when it is empty.
    pub fn next_ready_time(&self) -> Tick {
        self.ready_list
            .iter()
            .map(|&id| self.entries[id.0].ready_time())
            .min()
            .unwrap_or(MAX_TICK)
    }

    /// Frees an entry.
    ///
    /// An entry in service only leaves the in-service count; one still waiting is
    /// taken off the ready list. A draining queue that becomes empty reports drained.
    pub fn deallocate(&mut self, id: EntryId) -> Result<(), CacheError> {
        self.check(id)?;
        if self.entries[id.0].is_in_service() {
            self.num_in_service -= 1;
        } else {
            self.remove_from_ready_list(id);
        }
        self.allocated_list.retain(|&other| other != id);
        self.entries[id.0] = E::default();
        self.in_use[id.0] = false;
        self.free_list.push_back(id);
        if self.drain == DrainState::Draining && self.allocated_list.is_empty() {
            debug!(queue = %self.label, "queue drained");
            self.drain = DrainState::Drained;
        }
        Ok(())
    }

    /// Requests a drain.
    ///
    /// # Returns
    ///
    /// [`DrainState::Drained`] if nothing is allocated, otherwise [`DrainState::Draining`];
    /// the queue switches to drained when its last entry is freed.
    pub fn drain(&mut self) -> DrainState {
        self.drain = if self.allocated_list.is_empty() {
            DrainState::Drained
        } else {
            DrainState::Draining
        };
        self.drain
    }

    /// Current drain state.
    pub const fn drain_state(&self) -> DrainState {
        self.drain
    }

    /// Leaves drain mode.
    pub fn drain_resume(&mut self) {
        self.drain = DrainState::Running;
    }

    /// Takes an entry from the free pool and appends it to the allocated list.
    pub(crate) fn take_free(&mut self) -> Result<EntryId, CacheError> {
        let id = self.free_list.pop_front().ok_or_else(|| CacheError::QueueExhausted {
            queue: self.label.clone(),
        })?;
        self.in_use[id.0] = true;
        self.allocated_list.push(id);
        if self.drain == DrainState::Drained {
            self.drain = DrainState::Draining;
        }
        Ok(id)
    }

    /// Inserts an entry after every ready entry that sorts before or equal to it.
    pub(crate) fn add_to_ready_list(&mut self, id: EntryId) {
        let key = (self.entries[id.0].ready_time(), self.entries[id.0].order());
        let pos = self
            .ready_list
            .iter()
            .position(|&other| {
                let entry = &self.entries[other.0];
                (entry.ready_time(), entry.order()) > key
            })
            .unwrap_or(self.ready_list.len());
        self.ready_list.insert(pos, id);
    }

    pub(crate) fn remove_from_ready_list(&mut self, id: EntryId) {
        self.ready_list.retain(|&other| other != id);
    }

    /// Places an entry at the head of the ready list regardless of its ready time.
    pub(crate) fn push_ready_front(&mut self, id: EntryId) {
        self.remove_from_ready_list(id);
        self.ready_list.insert(0, id);
    }

    /// Bookkeeping for an entry whose request has just been sent.
    pub(crate) fn note_in_service(&mut self, id: EntryId) {
        self.remove_from_ready_list(id);
        self.num_in_service += 1;
    }

    /// Bookkeeping for an in-service entry that must be sent again.
    pub(crate) fn note_pending(&mut self, id: EntryId) {
        self.num_in_service -= 1;
        self.add_to_ready_list(id);
    }

    pub(crate) fn state_error(&self, id: EntryId, state: &'static str) -> CacheError {
        CacheError::EntryState {
            queue: self.label.clone(),
            index: id.0,
            state,
        }
    }

    fn check(&self, id: EntryId) -> Result<(), CacheError> {
        if self.contains(id) {
            Ok(())
        } else {
            Err(CacheError::StaleEntry {
                queue: self.label.clone(),
                index: id.0,
            })
        }
    }
}
