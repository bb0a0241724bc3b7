//! Trace replay.
//!
//! The driver plays the role of the CPU above the cache and of the event queue
//! around it:
//! 1. **TraceCpu:** The cache's [`CpuSidePort`]; collects responses and retries.
//! 2. **EventQueue:** A binary heap of `(tick, sequence)`-ordered events.
//! 3. **Timing Replay:** Issues trace records in order, backs off on refusals
//!    and wakes the cache whenever it has queued work.
//! 4. **Atomic Replay:** Performs each access synchronously.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use tracing::{debug, trace};

use super::memory::SimpleMemory;
use super::trace::TraceRecord;
use crate::cache::{Admission, Cache, CpuSidePort};
use crate::common::addr::{MAX_TICK, Tick};
use crate::common::error::CacheError;
use crate::common::packet::Packet;
use crate::config::SimConfig;

/// A cache wired to the harness memory and trace CPU.
pub type SimCache = Cache<SimpleMemory, TraceCpu>;

/// Builds the cache and memory described by a configuration.
pub fn build_cache(config: &SimConfig) -> Result<SimCache, CacheError> {
    Cache::new(&config.cache, SimpleMemory::from_config(&config.memory), TraceCpu::default())
}

/// CPU-side port that records what the cache sends upward.
#[derive(Debug, Default)]
pub struct TraceCpu {
    responses: Vec<(Tick, Packet)>,
    retry: bool,
}

impl TraceCpu {
    /// Takes the responses scheduled since the last call.
    pub fn take_responses(&mut self) -> Vec<(Tick, Packet)> {
        std::mem::take(&mut self.responses)
    }

    /// Returns `true` once after the cache has signalled a retry.
    pub fn take_retry(&mut self) -> bool {
        std::mem::take(&mut self.retry)
    }
}

impl CpuSidePort for TraceCpu {
    fn schedule_timing_resp(&mut self, pkt: Packet, when: Tick) {
        self.responses.push((when, pkt));
    }

    fn send_retry_req(&mut self) {
        self.retry = true;
    }
}

/// Something that happens at a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Issue every trace record due by now.
    Issue,
    /// A response from memory reaches the cache.
    MemResponse(Packet),
    /// A response from the cache reaches the CPU.
    CpuResponse(Packet),
    /// The cache may have queued work to send.
    CacheWake,
}

#[derive(Debug)]
struct Scheduled {
    when: Tick,
    seq: u64,
    event: Event,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        (self.when, self.seq) == (other.when, other.seq)
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    /// Reversed so that the max-heap pops the earliest event first.
    fn cmp(&self, other: &Self) -> Ordering {
        (other.when, other.seq).cmp(&(self.when, self.seq))
    }
}

/// Min-heap of events; events at the same tick pop in scheduling order.
#[derive(Debug, Default)]
pub struct EventQueue {
    heap: BinaryHeap<Scheduled>,
    seq: u64,
}

impl EventQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `event` at tick `when`.
    pub fn schedule(&mut self, when: Tick, event: Event) {
        self.seq += 1;
        self.heap.push(Scheduled {
            when,
            seq: self.seq,
            event,
        });
    }

    /// Removes the earliest event.
    pub fn pop(&mut self) -> Option<(Tick, Event)> {
        self.heap.pop().map(|s| (s.when, s.event))
    }

    /// Number of scheduled events.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Returns `true` if nothing is scheduled.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

/// Outcome of a replay.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Requests accepted by the cache.
    pub requests: u64,
    /// Responses received.
    pub completed: u64,
    /// Sum of request-to-response latencies.
    pub total_latency: u64,
    /// Tick of the last event.
    pub final_tick: Tick,
    /// Every response with its arrival tick, in arrival order.
    pub responses: Vec<(Tick, Packet)>,
}

impl RunSummary {
    /// Mean request-to-response latency in ticks.
    pub fn avg_latency(&self) -> f64 {
        if self.completed == 0 {
            0.0
        } else {
            self.total_latency as f64 / self.completed as f64
        }
    }

    /// Prints the summary to stdout.
    pub fn print(&self) {
        println!("\n==========================================================");
        println!("TRACE REPLAY");
        println!("==========================================================");
        println!("sim_ticks                {}", self.final_tick);
        println!("requests                 {}", self.requests);
        println!("responses                {}", self.completed);
        println!("avg_latency              {:.2} ticks", self.avg_latency());
        println!("----------------------------------------------------------");
    }
}

/// Replays a trace in timing mode.
///
/// Records are issued in order at their tick. A refused record holds back every
/// later one until the cache sends a retry.
///
/// # Returns
///
/// The replay summary, or the first protocol error raised by the cache.
pub fn run_timing(cache: &mut SimCache, trace: &[TraceRecord]) -> Result<RunSummary, CacheError> {
    let mut events = EventQueue::new();
    let mut summary = RunSummary::default();
    let mut next = 0;
    let mut refused: Option<Packet> = None;
    let mut wake: Option<Tick> = None;

    if let Some(first) = trace.first() {
        events.schedule(first.tick, Event::Issue);
    }

    while let Some((now, event)) = events.pop() {
        match event {
            Event::Issue => {
                while let Some(record) = trace.get(next).filter(|r| r.tick <= now) {
                    let pkt = refused.take().unwrap_or_else(|| record.to_packet());
                    match cache.recv_timing_req(pkt, now)? {
                        Admission::Accepted => {
                            next += 1;
                            summary.requests += 1;
                        }
                        Admission::Retry(pkt) => {
                            trace!(now, addr = pkt.addr, "request refused, waiting for retry");
                            refused = Some(pkt);
                            break;
                        }
                    }
                }
                if refused.is_none() {
                    if let Some(record) = trace.get(next) {
                        events.schedule(record.tick.max(now), Event::Issue);
                    }
                }
            }
            Event::MemResponse(pkt) => {
                cache.mem_side_mut().complete();
                cache.recv_timing_resp(pkt, now)?;
            }
            Event::CpuResponse(pkt) => {
                summary.completed += 1;
                summary.total_latency += now.saturating_sub(pkt.req_tick);
                summary.responses.push((now, pkt));
            }
            Event::CacheWake => {
                wake = None;
                cache.send_deferred(now)?;
            }
        }

        if cache.mem_side_mut().take_retry() {
            cache.recv_req_retry(now)?;
        }
        for (when, pkt) in cache.mem_side_mut().take_responses() {
            events.schedule(when.max(now), Event::MemResponse(pkt));
        }
        for (when, pkt) in cache.cpu_side_mut().take_responses() {
            events.schedule(when.max(now), Event::CpuResponse(pkt));
        }
        if cache.cpu_side_mut().take_retry() && refused.is_some() {
            events.schedule(now, Event::Issue);
        }
        let due = cache.next_event_tick(now);
        if due != MAX_TICK && wake.is_none_or(|scheduled| due < scheduled) {
            let at = due.max(now);
            wake = Some(at);
            events.schedule(at, Event::CacheWake);
        }
        summary.final_tick = now;
    }

    debug!(
        requests = summary.requests,
        completed = summary.completed,
        final_tick = summary.final_tick,
        "timing replay finished"
    );
    Ok(summary)
}

/// Replays a trace in atomic mode.
///
/// Each access completes before the next is issued; time advances by the
/// access latency.
pub fn run_atomic(cache: &mut SimCache, trace: &[TraceRecord]) -> Result<RunSummary, CacheError> {
    let mut summary = RunSummary::default();
    let mut now = 0;
    for record in trace {
        now = now.max(record.tick);
        let mut pkt = record.to_packet();
        let latency = cache.recv_atomic(&mut pkt, now)?;
        now += latency;
        summary.requests += 1;
        summary.completed += 1;
        summary.total_latency += latency;
        summary.responses.push((now, pkt));
    }
    summary.final_tick = now;
    debug!(requests = summary.requests, final_tick = now, "atomic replay finished");
    Ok(summary)
}
