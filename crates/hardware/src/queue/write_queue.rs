//! The write buffer.
//!
//! Holds evictions (dirty and clean writebacks, clean-evict notifications) until
//! the port below accepts them. Entries never merge and never expect a response,
//! so an entry is freed as soon as its packet has been sent.

use std::ops::{Deref, DerefMut};

use tracing::debug;

use super::mshr::Target;
use super::{EntryId, Queue, QueueEntry};
use crate::common::addr::{Addr, Tick};
use crate::common::error::CacheError;
use crate::common::packet::Packet;

/// One pending eviction.
#[derive(Debug, Clone, Default)]
pub struct WriteQueueEntry {
    blk_addr: Addr,
    blk_size: usize,
    secure: bool,
    ready_time: Tick,
    order: u64,
    in_service: bool,
    uncacheable: bool,
    target: Option<Target>,
}

impl WriteQueueEntry {
    /// Block size in bytes.
    pub const fn blk_size(&self) -> usize {
        self.blk_size
    }

    /// The queued eviction.
    pub fn target(&self) -> Option<&Target> {
        self.target.as_ref()
    }

    /// The queued packet.
    pub fn packet(&self) -> Option<&Packet> {
        self.target.as_ref().map(|t| &t.pkt)
    }

    /// Mutable access to the queued packet.
    pub fn packet_mut(&mut self) -> Option<&mut Packet> {
        self.target.as_mut().map(|t| &mut t.pkt)
    }
}

impl QueueEntry for WriteQueueEntry {
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

/// Queue of pending evictions.
#[derive(Debug)]
pub struct WriteQueue {
    queue: Queue<WriteQueueEntry>,
}

impl WriteQueue {
    /// Creates a write buffer.
    ///
    /// # Arguments
    ///
    /// * `label` - Name used in logs and errors.
    /// * `num_entries` - Entries available before the buffer reports full.
    /// * `reserve` - Extra entries for evictions caused by fills already in flight.
    pub fn new(label: impl Into<String>, num_entries: usize, reserve: usize) -> Self {
        Self {
            queue: Queue::new(label, num_entries, reserve),
        }
    }

    /// Queues an eviction.
    ///
    /// # Arguments
    ///
    /// * `blk_addr` - Block-aligned address of the evicted block.
    /// * `blk_size` - Block size in bytes.
    /// * `pkt` - Writeback or clean-evict packet.
    /// * `ready_time` - Tick from which the packet may be sent.
    /// * `order` - Global allocation sequence number.
    pub fn allocate(
        &mut self,
        blk_addr: Addr,
        blk_size: usize,
        pkt: Packet,
        ready_time: Tick,
        order: u64,
    ) -> Result<EntryId, CacheError> {
        let id = self.queue.take_free()?;
        debug!(queue = %self.queue.label(), %id, blk_addr, cmd = %pkt.cmd, "allocate write buffer entry");
        let entry = self.queue.entry_mut(id)?;
        *entry = WriteQueueEntry {
            blk_addr,
            blk_size,
            secure: pkt.secure,
            ready_time,
            order,
            in_service: false,
            uncacheable: pkt.uncacheable,
            target: Some(Target::new(pkt, ready_time, order, false)),
        };
        self.queue.add_to_ready_list(id);
        Ok(id)
    }

    /// Records that an entry's packet has been sent.
    ///
    /// Entries whose packet expects no response are freed immediately.
    pub fn mark_in_service(&mut self, id: EntryId) -> Result<(), CacheError> {
        let entry = self.queue.entry_mut(id)?;
        if entry.in_service {
            return Err(self.queue.state_error(id, "already in service"));
        }
        let needs_response = entry.packet().is_some_and(|pkt| pkt.cmd.needs_response());
        entry.in_service = true;
        self.queue.note_in_service(id);
        if !needs_response {
            self.queue.deallocate(id)?;
        }
        Ok(())
    }
}

impl Deref for WriteQueue {
    type Target = Queue<WriteQueueEntry>;

    fn deref(&self) -> &Self::Target {
        &self.queue
    }
}

impl DerefMut for WriteQueue {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.queue
    }
}
