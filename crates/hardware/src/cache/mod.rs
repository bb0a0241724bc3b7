//! Cache controller.
//!
//! The controller ties the tag store, the MSHR queue, the write buffer, the
//! optional prefetcher and the optional fault injector together. It implements:
//! 1. **Access:** Tag lookup, whole-line write promotion and absorption of evictions from above.
//! 2. **Miss Handling:** MSHR allocation and target merging, downstream request creation,
//!    retries on a busy port and blocking when a queue or target list fills up.
//! 3. **Fills:** Victim selection, eviction into the write buffer and servicing of every
//!    merged target in arrival order.
//! 4. **Coherence:** Snoop handling for the coherent variant; the non-coherent variant
//!    treats any snoop as a protocol error.
//! 5. **Modes:** Timing (event driven), atomic (synchronous) and functional (debug) access.
//!
//! The two variants share one implementation and differ only where [`CacheKind`]
//! is consulted: the request issued on a miss, permissions granted by a fill,
//! whether clean blocks announce their eviction, and snoop support.

/// Atomic and functional access paths.
mod atomic;

/// Port contracts towards the neighbouring levels.
pub mod ports;

/// Snoop handling.
mod snoop;

/// Controller statistics.
pub mod stats;

/// Timing access path.
mod timing;

use tracing::{debug, trace};

pub use ports::{CpuSidePort, MemSidePort, SnoopReply};
pub use stats::CacheStats;

use crate::common::addr::{Addr, MAX_TICK, Tick};
use crate::common::error::CacheError;
use crate::common::packet::{MemCmd, Packet};
use crate::config::{CacheConfig, CacheKind};
use crate::fault::FaultInjector;
use crate::prefetch::PrefetchQueue;
use crate::queue::{DrainState, EntryId, MshrQueue, Target, WriteQueue};
use crate::tags::TagStore;

/// Outcome of offering a request to the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// The cache took ownership of the request.
    Accepted,
    /// The cache is blocked; the request is handed back and a retry will follow.
    Retry(Packet),
}

/// Reasons the cache refuses new requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockedCause {
    /// Every MSHR is allocated.
    MshrQueueFull = 0,
    /// The write buffer is full.
    WriteBufferFull = 1,
    /// An MSHR reached its target limit.
    NoTargets = 2,
}

impl BlockedCause {
    /// Number of causes.
    pub const COUNT: usize = 3;

    /// Every cause, in index order.
    pub const ALL: [Self; Self::COUNT] = [Self::MshrQueueFull, Self::WriteBufferFull, Self::NoTargets];

    /// Short name used in statistics.
    pub const fn label(self) -> &'static str {
        match self {
            Self::MshrQueueFull => "mshr_full",
            Self::WriteBufferFull => "write_buf_full",
            Self::NoTargets => "no_targets",
        }
    }

    const fn mask(self) -> u8 {
        1 << self as u8
    }
}

/// Result of a tag lookup performed on behalf of a request.
#[derive(Debug, Clone, Copy)]
struct AccessOutcome {
    satisfied: bool,
    blk: Option<usize>,
    latency: Tick,
}

/// A set-associative cache with MSHRs, a write buffer and optional fault injection.
#[derive(Debug)]
pub struct Cache<M: MemSidePort, C: CpuSidePort> {
    name: String,
    kind: CacheKind,
    tags: TagStore,
    mshr_queue: MshrQueue,
    write_buffer: WriteQueue,
    prefetcher: Option<PrefetchQueue>,
    fault_injector: Option<FaultInjector>,
    mem_side: M,
    cpu_side: C,
    blk_size: usize,
    lookup_latency: Tick,
    data_latency: Tick,
    forward_latency: Tick,
    response_latency: Tick,
    sequential_access: bool,
    tgts_per_mshr: usize,
    is_read_only: bool,
    writeback_clean: bool,
    fast_writes: bool,
    prefetch_on_access: bool,
    order: u64,
    blocked: u8,
    need_retry: bool,
    waiting_on_retry: bool,
    no_target_mshr: Option<EntryId>,
    stats: CacheStats,
}

impl<M: MemSidePort, C: CpuSidePort> Cache<M, C> {
    /// Builds a cache from its configuration.
    ///
    /// The MSHR queue has no reserve; the write buffer reserves one entry per MSHR
    /// so that every fill in flight can always queue its eviction.
    ///
    /// # Arguments
    ///
    /// * `config` - Geometry, latencies, queue sizes and optional prefetcher / fault list.
    /// * `mem_side` - Port towards the level below.
    /// * `cpu_side` - Port towards the requestors above.
    ///
    /// # Returns
    ///
    /// The cache, or an error if the configuration is invalid or the fault list
    /// cannot be read.
    pub fn new(config: &CacheConfig, mem_side: M, cpu_side: C) -> Result<Self, CacheError> {
        let tags = TagStore::new(config)?;
        let fault_injector = config
            .fault_injection
            .as_ref()
            .map(|fi| FaultInjector::from_config(fi, &config.name, config.ways))
            .transpose()?;
        debug!(
            cache = %config.name,
            kind = ?config.kind,
            size = config.size_bytes,
            ways = config.ways,
            line = config.line_bytes,
            faults = fault_injector.as_ref().map_or(0, |fi| fi.faults().len()),
            "cache built"
        );
        Ok(Self {
            name: config.name.clone(),
            kind: config.kind,
            tags,
            mshr_queue: MshrQueue::new(
                format!("{}.mshr", config.name),
                config.mshrs,
                0,
                config.demand_mshr_reserve,
            ),
            write_buffer: WriteQueue::new(format!("{}.wb", config.name), config.write_buffers, config.mshrs),
            prefetcher: PrefetchQueue::from_config(config),
            fault_injector,
            mem_side,
            cpu_side,
            blk_size: config.line_bytes,
            lookup_latency: config.cycles_to_ticks(config.tag_latency),
            data_latency: config.cycles_to_ticks(config.data_latency),
            forward_latency: config.cycles_to_ticks(config.tag_latency),
            response_latency: config.cycles_to_ticks(config.response_latency),
            sequential_access: config.sequential_access,
            tgts_per_mshr: config.tgts_per_mshr,
            is_read_only: config.is_read_only,
            writeback_clean: config.writeback_clean,
            fast_writes: config.fast_writes,
            prefetch_on_access: config.prefetch_on_access,
            order: 0,
            blocked: 0,
            need_retry: false,
            waiting_on_retry: false,
            no_target_mshr: None,
            stats: CacheStats::default(),
        })
    }

    /// Attaches (or replaces) the fault injector.
    pub fn set_fault_injector(&mut self, injector: FaultInjector) {
        self.fault_injector = Some(injector);
    }

    /// Name of the cache; also the owner tag matched against fault lists.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Coherent or non-coherent.
    pub const fn kind(&self) -> CacheKind {
        self.kind
    }

    /// Block size in bytes.
    pub const fn blk_size(&self) -> usize {
        self.blk_size
    }

    /// The tag store.
    pub const fn tags(&self) -> &TagStore {
        &self.tags
    }

    /// Mutable tag store, for end-of-run bookkeeping and tests.
    pub fn tags_mut(&mut self) -> &mut TagStore {
        &mut self.tags
    }

    /// The MSHR queue.
    pub const fn mshr_queue(&self) -> &MshrQueue {
        &self.mshr_queue
    }

    /// The write buffer.
    pub const fn write_buffer(&self) -> &WriteQueue {
        &self.write_buffer
    }

    /// The prefetcher, if one is configured.
    pub const fn prefetcher(&self) -> Option<&PrefetchQueue> {
        self.prefetcher.as_ref()
    }

    /// The fault injector, if one is attached.
    pub const fn fault_injector(&self) -> Option<&FaultInjector> {
        self.fault_injector.as_ref()
    }

    /// Mutable fault injector, e.g. to enable or disable injection.
    pub fn fault_injector_mut(&mut self) -> Option<&mut FaultInjector> {
        self.fault_injector.as_mut()
    }

    /// Port towards the level below.
    pub const fn mem_side(&self) -> &M {
        &self.mem_side
    }

    /// Mutable port towards the level below.
    pub fn mem_side_mut(&mut self) -> &mut M {
        &mut self.mem_side
    }

    /// Port towards the requestors.
    pub const fn cpu_side(&self) -> &C {
        &self.cpu_side
    }

    /// Mutable port towards the requestors.
    pub fn cpu_side_mut(&mut self) -> &mut C {
        &mut self.cpu_side
    }

    /// Controller counters.
    pub const fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Returns `true` while any blocking cause is active.
    pub const fn is_blocked(&self) -> bool {
        self.blocked != 0
    }

    /// Returns `true` if `cause` is currently blocking the cache.
    pub const fn is_blocked_by(&self, cause: BlockedCause) -> bool {
        self.blocked & cause.mask() != 0
    }

    /// Returns `true` while the port below owes the cache a retry.
    pub const fn is_waiting_on_retry(&self) -> bool {
        self.waiting_on_retry
    }

    /// Earliest tick at which queued work may be sent downstream.
    ///
    /// # Returns
    ///
    /// `now` when a prefetch could be issued right away, the earliest ready time
    /// of either queue otherwise, and [`MAX_TICK`] when nothing is queued or the
    /// cache is waiting for a retry.
    pub fn next_event_tick(&self, now: Tick) -> Tick {
        if self.waiting_on_retry {
            return MAX_TICK;
        }
        let queued = self
            .mshr_queue
            .next_ready_time()
            .min(self.write_buffer.next_ready_time());
        let prefetch_ready = self
            .prefetcher
            .as_ref()
            .is_some_and(|pf| !pf.is_empty() && self.mshr_queue.can_prefetch());
        if prefetch_ready { now.min(queued) } else { queued }
    }

    /// Requests a drain of both queues.
    ///
    /// # Returns
    ///
    /// [`DrainState::Drained`] once no miss and no writeback is outstanding.
    pub fn drain(&mut self) -> DrainState {
        let mshrs = self.mshr_queue.drain();
        let writes = self.write_buffer.drain();
        debug!(cache = %self.name, ?mshrs, ?writes, "drain requested");
        Self::combine_drain(mshrs, writes)
    }

    /// Current drain state of the cache.
    pub fn drain_state(&self) -> DrainState {
        Self::combine_drain(self.mshr_queue.drain_state(), self.write_buffer.drain_state())
    }

    /// Leaves drain mode.
    pub fn drain_resume(&mut self) {
        self.mshr_queue.drain_resume();
        self.write_buffer.drain_resume();
    }

    /// Folds the references of blocks still resident into the tag statistics.
    pub fn cleanup_refs(&mut self) {
        self.tags.cleanup_refs();
    }

    fn combine_drain(a: DrainState, b: DrainState) -> DrainState {
        match (a, b) {
            (DrainState::Running, DrainState::Running) => DrainState::Running,
            (DrainState::Drained, DrainState::Drained) => DrainState::Drained,
            _ => DrainState::Draining,
        }
    }

    fn next_order(&mut self) -> u64 {
        self.order += 1;
        self.order
    }

    fn set_blocked(&mut self, cause: BlockedCause) {
        if self.blocked & cause.mask() == 0 {
            debug!(cache = %self.name, cause = cause.label(), "blocked");
        }
        self.blocked |= cause.mask();
    }

    /// Clears a blocking cause; once none is left, a pending retry is sent upward.
    fn clear_blocked(&mut self, cause: BlockedCause) {
        if self.blocked & cause.mask() == 0 {
            return;
        }
        self.blocked &= !cause.mask();
        debug!(cache = %self.name, cause = cause.label(), "unblocked");
        if self.blocked == 0 && self.need_retry {
            self.need_retry = false;
            trace!(cache = %self.name, "sending retry upward");
            self.cpu_side.send_retry_req();
        }
    }

    /// Rejects requests the controller cannot handle as a single block access.
    ///
    /// A read-only cache never obtains write permission, so writes to it are
    /// unsupported.
    fn check_request(&self, pkt: &Packet) -> Result<(), CacheError> {
        if pkt.cmd.is_response() || (self.is_read_only && pkt.cmd.needs_writable()) {
            return Err(CacheError::UnsupportedCommand {
                cmd: pkt.cmd,
                addr: pkt.addr,
            });
        }
        if !pkt.uncacheable && !pkt.fits_in_block(self.blk_size) {
            return Err(CacheError::CrossesBlock {
                cmd: pkt.cmd,
                addr: pkt.addr,
                size: pkt.size,
            });
        }
        if (pkt.cmd.is_read() || pkt.cmd.is_write()) && pkt.data.len() != pkt.size {
            return Err(CacheError::PayloadSize {
                cmd: pkt.cmd,
                addr: pkt.addr,
                size: pkt.size,
                len: pkt.data.len(),
            });
        }
        Ok(())
    }

    /// Turns a block-sized aligned write into a whole-line write.
    fn promote_whole_line_write(&self, pkt: &mut Packet) {
        if self.kind == CacheKind::Coherent
            && self.fast_writes
            && pkt.cmd == MemCmd::WriteReq
            && pkt.is_whole_line(self.blk_size)
        {
            pkt.cmd = MemCmd::WriteLineReq;
        }
    }

    /// Runs the fault injector over the tag store.
    fn inject_block_faults(&mut self, is_read: bool, now: Tick) {
        if let Some(injector) = self.fault_injector.as_mut() {
            let applied = injector.inject_faults(&mut self.tags, is_read, &self.name, now);
            self.stats.faults_injected += applied as u64;
        }
    }

    /// Runs the fault injector over a packet payload.
    fn inject_packet_faults(&mut self, pkt: &mut Packet, is_read: bool, now: Tick) {
        if let Some(injector) = self.fault_injector.as_mut() {
            let applied = injector.inject_packet_faults(pkt, is_read, &self.name, now);
            self.stats.faults_injected += applied as u64;
        }
    }

    fn record_access(&mut self, cmd: MemCmd, hit: bool) {
        match (cmd.is_write(), hit) {
            (true, true) => self.stats.write_hits += 1,
            (true, false) => self.stats.write_misses += 1,
            (false, true) => self.stats.read_hits += 1,
            (false, false) => self.stats.read_misses += 1,
        }
    }

    /// Looks a request up in the tag store and satisfies it if possible.
    ///
    /// Evictions from above are absorbed: a writeback allocates (or updates) the
    /// block and a clean eviction is dropped. A writeback that cannot allocate
    /// because its victim has a miss outstanding is reported unsatisfied and ends
    /// up in the write buffer.
    fn access(&mut self, pkt: &mut Packet, now: Tick, writebacks: &mut Vec<Packet>) -> Result<AccessOutcome, CacheError> {
        if pkt.cmd.is_eviction() {
            return self.access_eviction(pkt, now, writebacks);
        }

        let (blk, _) = self.tags.access_block(pkt.addr, pkt.secure);
        let latency = match blk {
            Some(_) if self.sequential_access => self.lookup_latency + self.data_latency,
            Some(_) => self.lookup_latency.max(self.data_latency),
            None => self.lookup_latency,
        };

        let satisfied = blk.is_some_and(|index| {
            let block = self.tags.block(index);
            !pkt.cmd.needs_writable() || block.writable
        });
        trace!(cache = %self.name, cmd = %pkt.cmd, addr = pkt.addr, hit = satisfied, latency, "access");

        if satisfied {
            if let Some(index) = blk {
                self.satisfy_request(pkt, index, now)?;
            }
        }
        Ok(AccessOutcome {
            satisfied,
            blk,
            latency,
        })
    }

    fn access_eviction(&mut self, pkt: &Packet, now: Tick, writebacks: &mut Vec<Packet>) -> Result<AccessOutcome, CacheError> {
        let latency = self.lookup_latency;
        let blk = self.tags.find_block(pkt.addr, pkt.secure);
        if pkt.cmd == MemCmd::CleanEvict {
            trace!(cache = %self.name, addr = pkt.addr, "clean evict absorbed");
            return Ok(AccessOutcome {
                satisfied: true,
                blk,
                latency,
            });
        }

        let blk = match blk {
            Some(index) => Some(index),
            None => self.allocate_block(pkt, writebacks, now)?,
        };
        let Some(index) = blk else {
            return Ok(AccessOutcome {
                satisfied: false,
                blk: None,
                latency,
            });
        };
        let (block, data) = self.tags.block_and_data_mut(index);
        pkt.write_data_to_block(data);
        block.dirty |= pkt.cmd == MemCmd::WritebackDirty;
        block.writable |= !pkt.has_sharers;
        self.stats.writebacks_absorbed += 1;
        self.inject_block_faults(false, now);
        trace!(cache = %self.name, cmd = %pkt.cmd, addr = pkt.addr, "writeback absorbed");
        Ok(AccessOutcome {
            satisfied: true,
            blk: Some(index),
            latency,
        })
    }

    /// Performs a request against a present block.
    ///
    /// Writes update the block first and then let the fault injector corrupt the
    /// stored data; reads let the injector run first so the requester observes
    /// the corruption.
    fn satisfy_request(&mut self, pkt: &mut Packet, index: usize, now: Tick) -> Result<(), CacheError> {
        match pkt.cmd {
            cmd if cmd.is_write() => {
                let (block, data) = self.tags.block_and_data_mut(index);
                pkt.write_data_to_block(data);
                block.dirty = true;
                self.inject_block_faults(false, now);
            }
            MemCmd::InvalidateReq | MemCmd::UpgradeReq => {
                self.tags.invalidate(index)?;
            }
            cmd if cmd.is_read() => {
                self.inject_block_faults(true, now);
                pkt.set_data_from_block(self.tags.data(index));
                if cmd.needs_writable() {
                    self.tags.invalidate(index)?;
                } else if self.kind == CacheKind::Coherent && cmd != MemCmd::ReadReq {
                    pkt.has_sharers = true;
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Makes room for and installs the block of `pkt`.
    ///
    /// # Returns
    ///
    /// The slot, or `None` when the chosen victim still has a miss outstanding
    /// and therefore cannot be replaced.
    fn allocate_block(&mut self, pkt: &Packet, writebacks: &mut Vec<Packet>, now: Tick) -> Result<Option<usize>, CacheError> {
        let addr = self.tags.blk_align(pkt.addr);
        let mut evict_list = Vec::new();
        let victim = self.tags.find_victim(addr, &mut evict_list);

        for &index in &evict_list {
            let victim_addr = self.tags.regenerate_blk_addr(index);
            let secure = self.tags.block(index).secure;
            if self.mshr_queue.find_match(victim_addr, secure, false).is_some() {
                self.stats.blocked_replacements += 1;
                trace!(cache = %self.name, addr, victim_addr, "victim has an outstanding miss");
                return Ok(None);
            }
        }
        for index in evict_list {
            self.stats.replacements += 1;
            if let Some(wb) = self.evict_block(index)? {
                writebacks.push(wb);
            }
        }
        self.tags
            .insert_block(addr, pkt.secure, pkt.requestor, pkt.task_id, victim, now)?;
        Ok(Some(victim))
    }

    /// Invalidates a block and builds the packet announcing its eviction.
    ///
    /// Dirty blocks, and clean ones when clean writebacks are enabled, produce a
    /// writeback carrying the data. Otherwise the coherent variant produces a
    /// clean-evict notification and the non-coherent variant drops the block silently.
    fn evict_block(&mut self, index: usize) -> Result<Option<Packet>, CacheError> {
        let addr = self.tags.regenerate_blk_addr(index);
        let block = self.tags.block(index).clone();
        let cmd = if block.dirty {
            Some(MemCmd::WritebackDirty)
        } else if self.writeback_clean {
            Some(MemCmd::WritebackClean)
        } else if self.kind == CacheKind::Coherent {
            Some(MemCmd::CleanEvict)
        } else {
            None
        };
        let pkt = cmd.map(|cmd| {
            let mut pkt = Packet::new(cmd, addr, self.blk_size)
                .with_secure(block.secure)
                .with_requestor(block.requestor.unwrap_or_default())
                .with_task(block.task_id);
            pkt.has_sharers = !block.writable;
            if cmd.has_data() {
                pkt.data.copy_from_slice(self.tags.data(index));
            }
            pkt
        });
        debug!(cache = %self.name, addr, dirty = block.dirty, cmd = ?pkt.as_ref().map(|p| p.cmd), "evict");
        self.tags.invalidate(index)?;
        Ok(pkt)
    }

    /// Installs the data and permissions carried by a response.
    ///
    /// # Arguments
    ///
    /// * `pkt` - The response.
    /// * `blk` - The slot already holding the block, if any.
    /// * `alloc_on_fill` - Allocate a slot when the block is not present.
    /// * `writebacks` - Receives evictions caused by the allocation.
    ///
    /// # Returns
    ///
    /// The slot holding the block afterwards, or `None` if it was not allocated.
    fn handle_fill(
        &mut self,
        pkt: &Packet,
        blk: Option<usize>,
        alloc_on_fill: bool,
        writebacks: &mut Vec<Packet>,
        now: Tick,
    ) -> Result<Option<usize>, CacheError> {
        let blk = match blk {
            Some(index) => Some(index),
            None if alloc_on_fill => self.allocate_block(pkt, writebacks, now)?,
            None => None,
        };
        let Some(index) = blk else {
            return Ok(None);
        };
        let writable = match self.kind {
            CacheKind::Noncoherent => true,
            CacheKind::Coherent => !pkt.has_sharers && !self.is_read_only,
        };
        let has_data = pkt.cmd.has_data() && pkt.data.len() == self.blk_size;
        let (block, data) = self.tags.block_and_data_mut(index);
        block.writable |= writable;
        if has_data {
            data.copy_from_slice(&pkt.data);
        }
        trace!(cache = %self.name, cmd = %pkt.cmd, addr = pkt.addr, slot = index, writable, "fill");
        if has_data {
            self.inject_block_faults(false, now);
        }
        Ok(Some(index))
    }

    /// Returns `true` if a cache above reports a copy of the block.
    fn is_cached_above(&mut self, pkt: &Packet) -> bool {
        if !self.cpu_side.is_snooping() {
            return false;
        }
        let mut probe = pkt.clone();
        self.cpu_side.snoop_upward(&mut probe).cached_above
    }

    /// Queues evictions in the write buffer.
    ///
    /// A clean eviction is dropped while a cache above still holds the block;
    /// a clean writeback is flagged instead.
    fn do_writebacks(&mut self, writebacks: Vec<Packet>, now: Tick) -> Result<(), CacheError> {
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
            let _ = self.allocate_write_buffer(pkt, now + self.forward_latency)?;
        }
        Ok(())
    }

    fn allocate_write_buffer(&mut self, pkt: Packet, ready_time: Tick) -> Result<EntryId, CacheError> {
        let blk_addr = self.tags.blk_align(pkt.addr);
        let order = self.next_order();
        let id = self
            .write_buffer
            .allocate(blk_addr, self.blk_size, pkt, ready_time, order)?;
        if self.write_buffer.is_full() {
            self.set_blocked(BlockedCause::WriteBufferFull);
        }
        Ok(id)
    }

    /// Builds the downstream request for a miss.
    ///
    /// # Arguments
    ///
    /// * `cpu_pkt` - The first target of the miss.
    /// * `blk` - The slot holding the block, when the miss is for permission only.
    /// * `needs_writable` - Some target of the miss writes the block.
    /// * `whole_line` - Every target overwrites the whole block.
    fn create_miss_packet(
        &self,
        cpu_pkt: &Packet,
        blk: Option<usize>,
        needs_writable: bool,
        whole_line: bool,
    ) -> Packet {
        if cpu_pkt.uncacheable {
            let mut pkt = cpu_pkt.clone();
            pkt.sender_state = None;
            return pkt;
        }
        let blk_addr = self.tags.blk_align(cpu_pkt.addr);
        let cmd = match self.kind {
            CacheKind::Noncoherent if cpu_pkt.cmd == MemCmd::HardPfReq => MemCmd::HardPfReq,
            CacheKind::Noncoherent => MemCmd::ReadReq,
            CacheKind::Coherent => {
                if cpu_pkt.cmd == MemCmd::HardPfReq {
                    MemCmd::HardPfReq
                } else if blk.is_none() && whole_line {
                    MemCmd::InvalidateReq
                } else if blk.is_some() && needs_writable {
                    MemCmd::UpgradeReq
                } else if needs_writable {
                    MemCmd::ReadExReq
                } else if self.is_read_only {
                    MemCmd::ReadCleanReq
                } else {
                    MemCmd::ReadSharedReq
                }
            }
        };
        Packet::new(cmd, blk_addr, self.blk_size)
            .with_secure(cpu_pkt.secure)
            .with_requestor(cpu_pkt.requestor)
            .with_task(cpu_pkt.task_id)
    }

    /// Responds to the targets of an uncacheable access from the response payload.
    fn respond_uncacheable(&mut self, pkt: &Packet, targets: Vec<Target>, now: Tick) {
        for target in targets {
            let mut resp = target.pkt;
            let is_read = resp.cmd.is_read();
            if is_read {
                resp.set_data_from_packet(pkt);
            }
            self.inject_packet_faults(&mut resp, is_read, now);
            resp.make_response();
            self.stats.total_miss_latency += now.saturating_sub(target.recv_time);
            self.stats.miss_latency_samples += 1;
            self.cpu_side.schedule_timing_resp(resp, now + self.response_latency);
        }
    }

    /// Address of the block `addr` falls in.
    fn blk_align(&self, addr: Addr) -> Addr {
        self.tags.blk_align(addr)
    }
}
