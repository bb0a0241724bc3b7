//! Memory commands and packets.
//!
//! A [`Packet`] is the unit of communication between the cache and its neighbours. It
//! carries:
//! 1. **Command:** A [`MemCmd`] whose attribute queries drive every protocol decision.
//! 2. **Payload:** A byte buffer of exactly `size` bytes that the cache reads or writes in place.
//! 3. **Coherence Flags:** `has_sharers`, `cache_responding` and `block_cached`.
//! 4. **Routing State:** The MSHR or write-buffer entry a downstream request belongs to.

use std::fmt;

use super::addr::{Addr, RequestorId, Tick, block_align, block_offset};
use crate::queue::EntryId;

/// Memory command carried by a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemCmd {
    /// Read that does not care about ownership.
    ReadReq,
    /// Response to a read carrying data.
    ReadResp,
    /// Read from a cache above that is willing to share the block.
    ReadSharedReq,
    /// Read from a read-only cache above; the response never grants ownership.
    ReadCleanReq,
    /// Read that requires a writable copy.
    ReadExReq,
    /// Response to `ReadExReq`, granting a writable copy.
    ReadExResp,
    /// Request for write permission on a block already held.
    UpgradeReq,
    /// Response to `UpgradeReq`.
    UpgradeResp,
    /// Partial write.
    WriteReq,
    /// Response to a write.
    WriteResp,
    /// Write covering a whole, aligned block.
    WriteLineReq,
    /// Request for ownership of a block without its data.
    InvalidateReq,
    /// Response to `InvalidateReq`.
    InvalidateResp,
    /// Hardware prefetch.
    HardPfReq,
    /// Response to a hardware prefetch.
    HardPfResp,
    /// Eviction of a modified block.
    WritebackDirty,
    /// Eviction of an unmodified block that still carries its data.
    WritebackClean,
    /// Notification that an unmodified block was dropped.
    CleanEvict,
}

impl MemCmd {
    /// Returns `true` for commands that read data.
    pub const fn is_read(self) -> bool {
        matches!(
            self,
            Self::ReadReq
                | Self::ReadSharedReq
                | Self::ReadCleanReq
                | Self::ReadExReq
                | Self::HardPfReq
                | Self::ReadResp
                | Self::ReadExResp
                | Self::HardPfResp
        )
    }

    /// Returns `true` for commands that write data into the receiving cache.
    pub const fn is_write(self) -> bool {
        matches!(
            self,
            Self::WriteReq | Self::WriteLineReq | Self::WritebackDirty | Self::WritebackClean
        )
    }

    /// Returns `true` for responses.
    pub const fn is_response(self) -> bool {
        matches!(
            self,
            Self::ReadResp
                | Self::ReadExResp
                | Self::UpgradeResp
                | Self::WriteResp
                | Self::InvalidateResp
                | Self::HardPfResp
        )
    }

    /// Returns `true` for requests that expect a response.
    pub const fn needs_response(self) -> bool {
        !self.is_response() && !self.is_eviction()
    }

    /// Returns `true` if the requester needs a writable copy.
    pub const fn needs_writable(self) -> bool {
        matches!(
            self,
            Self::ReadExReq | Self::UpgradeReq | Self::WriteReq | Self::WriteLineReq | Self::InvalidateReq
        )
    }

    /// Returns `true` if other copies of the block must be invalidated.
    pub const fn is_invalidate(self) -> bool {
        matches!(
            self,
            Self::ReadExReq | Self::UpgradeReq | Self::InvalidateReq | Self::WriteLineReq
        )
    }

    /// Returns `true` for evictions travelling downwards.
    pub const fn is_eviction(self) -> bool {
        matches!(self, Self::WritebackDirty | Self::WritebackClean | Self::CleanEvict)
    }

    /// Returns `true` for writebacks that carry data.
    pub const fn is_writeback(self) -> bool {
        matches!(self, Self::WritebackDirty | Self::WritebackClean)
    }

    /// Returns `true` for upgrade requests and responses.
    pub const fn is_upgrade(self) -> bool {
        matches!(self, Self::UpgradeReq | Self::UpgradeResp)
    }

    /// Returns `true` for prefetches and their responses.
    pub const fn is_prefetch(self) -> bool {
        matches!(self, Self::HardPfReq | Self::HardPfResp)
    }

    /// Returns `true` if the packet payload is meaningful for this command.
    pub const fn has_data(self) -> bool {
        matches!(
            self,
            Self::ReadResp
                | Self::ReadExResp
                | Self::HardPfResp
                | Self::WriteReq
                | Self::WriteLineReq
                | Self::WritebackDirty
                | Self::WritebackClean
        )
    }

    /// The response command for a request, if the request expects one.
    pub const fn response_command(self) -> Option<Self> {
        match self {
            Self::ReadReq | Self::ReadSharedReq | Self::ReadCleanReq => Some(Self::ReadResp),
            Self::ReadExReq => Some(Self::ReadExResp),
            Self::UpgradeReq => Some(Self::UpgradeResp),
            Self::WriteReq | Self::WriteLineReq => Some(Self::WriteResp),
            Self::InvalidateReq => Some(Self::InvalidateResp),
            Self::HardPfReq => Some(Self::HardPfResp),
            _ => None,
        }
    }
}

impl fmt::Display for MemCmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A memory request or response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Command, rewritten in place when the request becomes a response.
    pub cmd: MemCmd,
    /// First byte addressed.
    pub addr: Addr,
    /// Number of bytes addressed.
    pub size: usize,
    /// Secure address space flag; secure and non-secure copies never alias.
    pub secure: bool,
    /// Payload of exactly `size` bytes.
    pub data: Vec<u8>,
    /// Issuing component.
    pub requestor: RequestorId,
    /// Software task (context) that issued the request.
    pub task_id: u32,
    /// Request bypasses all caches.
    pub uncacheable: bool,
    /// Another cache keeps a copy; the receiver must not treat its copy as writable.
    pub has_sharers: bool,
    /// A cache has committed to supply the data for this request.
    pub cache_responding: bool,
    /// Set on clean writebacks when a copy is still cached above.
    pub block_cached: bool,
    /// Tick at which the request entered the cache.
    pub req_tick: Tick,
    /// Queue entry a downstream request was generated for.
    pub sender_state: Option<EntryId>,
}

impl Packet {
    /// Creates a request with a zero-filled payload.
    ///
    /// # Arguments
    ///
    /// * `cmd` - The request command.
    /// * `addr` - The first byte addressed.
    /// * `size` - Number of bytes addressed.
    pub fn new(cmd: MemCmd, addr: Addr, size: usize) -> Self {
        Self {
            cmd,
            addr,
            size,
            secure: false,
            data: vec![0; size],
            requestor: 0,
            task_id: 0,
            uncacheable: false,
            has_sharers: false,
            cache_responding: false,
            block_cached: false,
            req_tick: 0,
            sender_state: None,
        }
    }

    /// Creates a read request.
    pub fn read(addr: Addr, size: usize) -> Self {
        Self::new(MemCmd::ReadReq, addr, size)
    }

    /// Creates a write request carrying `data`.
    pub fn write(addr: Addr, data: &[u8]) -> Self {
        let mut pkt = Self::new(MemCmd::WriteReq, addr, data.len());
        pkt.data.copy_from_slice(data);
        pkt
    }

    /// Sets the issuing component.
    #[must_use]
    pub const fn with_requestor(mut self, requestor: RequestorId) -> Self {
        self.requestor = requestor;
        self
    }

    /// Marks the packet as targeting the secure address space.
    #[must_use]
    pub const fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Marks the packet as uncacheable.
    #[must_use]
    pub const fn with_uncacheable(mut self, uncacheable: bool) -> Self {
        self.uncacheable = uncacheable;
        self
    }

    /// Sets the task identifier.
    #[must_use]
    pub const fn with_task(mut self, task_id: u32) -> Self {
        self.task_id = task_id;
        self
    }

    /// Address of the block containing the first byte.
    pub const fn block_addr(&self, blk_size: usize) -> Addr {
        block_align(self.addr, blk_size)
    }

    /// Offset of the first byte within its block.
    pub const fn offset(&self, blk_size: usize) -> usize {
        block_offset(self.addr, blk_size)
    }

    /// Returns `true` if the packet stays within one block.
    pub const fn fits_in_block(&self, blk_size: usize) -> bool {
        self.size > 0 && self.offset(blk_size) + self.size <= blk_size
    }

    /// Returns `true` if the packet covers exactly one aligned block.
    pub const fn is_whole_line(&self, blk_size: usize) -> bool {
        self.size == blk_size && self.offset(blk_size) == 0
    }

    /// Turns a request into its response in place.
    ///
    /// Commands without a response are left unchanged.
    pub fn make_response(&mut self) {
        if let Some(resp) = self.cmd.response_command() {
            self.cmd = resp;
        }
    }

    /// Copies the packet payload into the matching bytes of a block.
    ///
    /// # Arguments
    ///
    /// * `blk` - The block's data buffer; its length is the block size.
    pub fn write_data_to_block(&self, blk: &mut [u8]) {
        let offset = self.offset(blk.len());
        let len = self.copy_len(blk.len(), offset);
        blk[offset..offset + len].copy_from_slice(&self.data[..len]);
    }

    /// Fills the packet payload from the matching bytes of a block.
    pub fn set_data_from_block(&mut self, blk: &[u8]) {
        let offset = self.offset(blk.len());
        let len = self.copy_len(blk.len(), offset);
        self.data[..len].copy_from_slice(&blk[offset..offset + len]);
    }

    /// Bytes shared by the payload and a block from `offset` on.
    fn copy_len(&self, blk_len: usize, offset: usize) -> usize {
        self.size.min(self.data.len()).min(blk_len.saturating_sub(offset))
    }

    /// Fills the packet payload from another packet that covers it.
    ///
    /// Used when a response for a whole block satisfies a narrower request.
    pub fn set_data_from_packet(&mut self, other: &Self) {
        if other.addr > self.addr {
            return;
        }
        let start = (self.addr - other.addr) as usize;
        let len = self.size.min(self.data.len());
        if let Some(src) = other.data.get(start..start.saturating_add(len)) {
            self.data[..len].copy_from_slice(src);
        }
    }
}
