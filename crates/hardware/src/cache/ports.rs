//! Port contracts between a cache and its neighbours.
//!
//! The cache never holds a pointer back to whoever owns it. Everything it has to
//! tell the outside world (responses, retries, requests for the level below, snoops
//! towards the level above) goes through one of these two traits.

use crate::common::addr::Tick;
use crate::common::packet::Packet;

/// Answer from the caches above to an upward snoop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnoopReply {
    /// A cache above still holds a copy of the block.
    pub cached_above: bool,
    /// Ticks the snoop spent above.
    pub latency: Tick,
}

/// The port towards the next level of the hierarchy.
pub trait MemSidePort {
    /// Offers a request to the level below.
    ///
    /// # Returns
    ///
    /// `Ok(())` if the request was accepted, otherwise the packet back. A refusal
    /// promises a later [`Cache::recv_req_retry`](super::Cache::recv_req_retry).
    fn send_timing_req(&mut self, pkt: Packet, now: Tick) -> Result<(), Packet>;

    /// Performs a request synchronously, turning `pkt` into its response.
    ///
    /// # Returns
    ///
    /// The latency of the access in ticks.
    fn send_atomic(&mut self, pkt: &mut Packet, now: Tick) -> Tick;

    /// Reads or writes the backing data without timing or state changes.
    fn send_functional(&mut self, pkt: &mut Packet);

    /// Delivers the response to a snoop this cache answered.
    fn send_timing_snoop_resp(&mut self, pkt: Packet, when: Tick);
}

/// The port towards the requestors above the cache.
pub trait CpuSidePort {
    /// Delivers a response at tick `when`.
    fn schedule_timing_resp(&mut self, pkt: Packet, when: Tick);

    /// Tells the requestor that a previously refused request may be sent again.
    fn send_retry_req(&mut self);

    /// Returns `true` if caches above must be snooped.
    fn is_snooping(&self) -> bool {
        false
    }

    /// Snoops the caches above for the block of `pkt`.
    fn snoop_upward(&mut self, _pkt: &mut Packet) -> SnoopReply {
        SnoopReply::default()
    }
}
