use cachefi_core::cache::{CpuSidePort, MemSidePort, SnoopReply};
use cachefi_core::common::{MemCmd, Packet, Tick};
use mockall::mock;

mock! {
    pub MemPort {}
    impl MemSidePort for MemPort {
        fn send_timing_req(&mut self, pkt: Packet, now: Tick) -> Result<(), Packet>;
        fn send_atomic(&mut self, pkt: &mut Packet, now: Tick) -> Tick;
        fn send_functional(&mut self, pkt: &mut Packet);
        fn send_timing_snoop_resp(&mut self, pkt: Packet, when: Tick);
    }
}

/// Memory-side port that accepts everything (unless told to refuse) and keeps it.
///
/// Reads are answered with `fill` in every byte.
#[derive(Debug, Default)]
pub struct RecordingMem {
    /// Timing requests accepted, with the tick they were sent at.
    pub sent: Vec<(Tick, Packet)>,
    /// Atomic requests, as they arrived.
    pub atomic: Vec<Packet>,
    /// Snoop responses sent downward.
    pub snoop_resps: Vec<(Tick, Packet)>,
    /// Functional writes that reached memory.
    pub functional_writes: Vec<Packet>,
    /// Number of upcoming timing requests to refuse.
    pub refuse: usize,
    /// Timing requests refused so far.
    pub refused: usize,
    /// Byte value returned by reads.
    pub fill: u8,
    /// Latency reported for atomic accesses.
    pub latency: Tick,
}

impl RecordingMem {
    /// Timing requests of a given command.
    pub fn sent_cmds(&self) -> Vec<MemCmd> {
        self.sent.iter().map(|(_, pkt)| pkt.cmd).collect()
    }

    /// Removes and returns the accepted timing requests that expect a response.
    pub fn take_requests(&mut self) -> Vec<Packet> {
        let (requests, rest): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.sent).into_iter().partition(|(_, pkt)| pkt.cmd.needs_response());
        self.sent = rest;
        requests.into_iter().map(|(_, pkt)| pkt).collect()
    }

    fn answer(&self, pkt: &mut Packet) {
        if pkt.cmd.is_read() {
            pkt.data = vec![self.fill; pkt.size];
        }
        pkt.make_response();
    }
}

impl MemSidePort for RecordingMem {
    fn send_timing_req(&mut self, pkt: Packet, now: Tick) -> Result<(), Packet> {
        if self.refuse > 0 {
            self.refuse -= 1;
            self.refused += 1;
            return Err(pkt);
        }
        self.sent.push((now, pkt));
        Ok(())
    }

    fn send_atomic(&mut self, pkt: &mut Packet, _now: Tick) -> Tick {
        self.atomic.push(pkt.clone());
        self.answer(pkt);
        self.latency
    }

    fn send_functional(&mut self, pkt: &mut Packet) {
        if pkt.cmd.is_write() {
            self.functional_writes.push(pkt.clone());
        } else {
            pkt.data = vec![self.fill; pkt.size];
        }
    }

    fn send_timing_snoop_resp(&mut self, pkt: Packet, when: Tick) {
        self.snoop_resps.push((when, pkt));
    }
}

/// CPU-side port that keeps responses and counts retries.
#[derive(Debug, Default)]
pub struct RecordingCpu {
    /// Responses with their delivery tick.
    pub responses: Vec<(Tick, Packet)>,
    /// Retries received.
    pub retries: usize,
    /// Report that caches above must be snooped.
    pub snooping: bool,
    /// Answer to upward snoops.
    pub cached_above: bool,
    /// Upward snoops received.
    pub snoops: Vec<Packet>,
}

impl CpuSidePort for RecordingCpu {
    fn schedule_timing_resp(&mut self, pkt: Packet, when: Tick) {
        self.responses.push((when, pkt));
    }

    fn send_retry_req(&mut self) {
        self.retries += 1;
    }

    fn is_snooping(&self) -> bool {
        self.snooping
    }

    fn snoop_upward(&mut self, pkt: &mut Packet) -> SnoopReply {
        self.snoops.push(pkt.clone());
        SnoopReply {
            cached_above: self.cached_above,
            latency: 0,
        }
    }
}
