//! Per-slot block metadata.
//!
//! The data bytes of a block live in the tag store's data array; this type only
//! carries the state bits and bookkeeping for one `(set, way)` slot.

use std::fmt;

use crate::common::addr::{Addr, RequestorId, Tick};
use crate::common::error::CacheError;

/// Metadata of one cache block.
///
/// When `valid` is clear the remaining fields are meaningless and the block is
/// never returned by a lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheBlock {
    /// Address bits above the set index.
    pub tag: Addr,
    /// Holds a copy of the block at `tag`.
    pub valid: bool,
    /// Modified relative to the level below.
    pub dirty: bool,
    /// May be written without asking the level below for permission.
    pub writable: bool,
    /// Belongs to the secure address space.
    pub secure: bool,
    /// Component that caused the block to be inserted.
    pub requestor: Option<RequestorId>,
    /// Task that caused the block to be inserted.
    pub task_id: u32,
    /// Tick at which the block was inserted.
    pub tick_inserted: Tick,
    /// Number of accesses since insertion, the insertion included.
    pub ref_count: u32,
    /// Set the slot belongs to.
    pub set: usize,
    /// Way of the slot within its set.
    pub way: usize,
}

impl CacheBlock {
    /// Creates an invalid block registered at `(set, way)`.
    pub fn new(set: usize, way: usize) -> Self {
        Self {
            set,
            way,
            ..Self::default()
        }
    }

    /// Installs a new block into this slot.
    ///
    /// # Arguments
    ///
    /// * `tag` - Tag of the incoming block.
    /// * `secure` - Secure address space flag.
    /// * `requestor` - Component that caused the insertion.
    /// * `task_id` - Task that caused the insertion.
    /// * `now` - Current tick.
    ///
    /// # Returns
    ///
    /// An error if the slot still holds a valid block.
    pub fn insert(
        &mut self,
        tag: Addr,
        secure: bool,
        requestor: RequestorId,
        task_id: u32,
        now: Tick,
    ) -> Result<(), CacheError> {
        if self.valid {
            return Err(CacheError::BlockAlreadyValid {
                set: self.set,
                way: self.way,
            });
        }
        self.tag = tag;
        self.valid = true;
        self.secure = secure;
        self.requestor = Some(requestor);
        self.task_id = task_id;
        self.tick_inserted = now;
        self.ref_count = 1;
        Ok(())
    }

    /// Clears all state, keeping only the slot position.
    pub fn invalidate(&mut self) {
        *self = Self::new(self.set, self.way);
    }

    /// Returns `true` if the block holds `tag` in the given address space.
    pub const fn matches(&self, tag: Addr, secure: bool) -> bool {
        self.valid && self.tag == tag && self.secure == secure
    }
}

impl fmt::Display for CacheBlock {
    /// Formats the block as `set:way tag state refs`, e.g. `3:1 0x2a VD-- refs=4`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} {:#x} {}{}{}{} refs={}",
            self.set,
            self.way,
            self.tag,
            if self.valid { 'V' } else { '-' },
            if self.dirty { 'D' } else { '-' },
            if self.writable { 'W' } else { '-' },
            if self.secure { 'S' } else { '-' },
            self.ref_count
        )
    }
}
