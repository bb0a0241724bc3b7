//! Cache controller statistics.
//!
//! Counters are plain fields updated by the controller as it goes. They provide:
//! 1. **Demand Accesses:** Hits and misses split into reads and writes.
//! 2. **Miss Handling:** MSHR hits (merges), MSHR misses, uncacheable accesses and miss latency.
//! 3. **Evictions:** Replacements, writebacks and clean evictions.
//! 4. **Flow Control:** Requests refused per blocking cause.
//! 5. **Prefetching and Faults:** Prefetches issued, filled and dropped; faults injected.

use super::BlockedCause;

/// Counters maintained by a cache controller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Reads satisfied by the tag store.
    pub read_hits: u64,
    /// Reads that needed the level below.
    pub read_misses: u64,
    /// Writes satisfied by the tag store.
    pub write_hits: u64,
    /// Writes that needed the level below.
    pub write_misses: u64,
    /// Misses merged onto an existing MSHR.
    pub mshr_hits: u64,
    /// Misses that allocated a new MSHR.
    pub mshr_misses: u64,
    /// Uncacheable accesses forwarded through an MSHR.
    pub mshr_uncacheable: u64,
    /// Evictions received from above and absorbed into the tag store.
    pub writebacks_absorbed: u64,
    /// Valid blocks evicted to make room for a fill.
    pub replacements: u64,
    /// Fills that could not allocate because the victim had an outstanding miss.
    pub blocked_replacements: u64,
    /// Writebacks (dirty or clean) queued in the write buffer.
    pub writebacks: u64,
    /// Clean-evict notifications queued in the write buffer.
    pub clean_evicts: u64,
    /// Clean evictions dropped because a cache above still holds the block.
    pub clean_evicts_squashed: u64,
    /// Snoops received from below.
    pub snoops: u64,
    /// Snoops this cache answered with data.
    pub snoop_responses: u64,
    /// Requests refused per blocking cause, indexed by [`BlockedCause`].
    pub blocked_refusals: [u64; BlockedCause::COUNT],
    /// Prefetch requests sent downstream.
    pub prefetches_issued: u64,
    /// Prefetch responses installed.
    pub prefetch_fills: u64,
    /// Prefetches abandoned because the block arrived by other means.
    pub prefetches_dropped: u64,
    /// Sum of ticks from request arrival to response for serviced misses.
    pub total_miss_latency: u64,
    /// Number of misses contributing to `total_miss_latency`.
    pub miss_latency_samples: u64,
    /// Bytes changed by the fault injector.
    pub faults_injected: u64,
}

impl CacheStats {
    /// Demand accesses of any kind.
    pub const fn accesses(&self) -> u64 {
        self.read_hits + self.read_misses + self.write_hits + self.write_misses
    }

    /// Hits as a share of demand accesses.
    pub fn hit_rate(&self) -> f64 {
        let total = self.accesses();
        if total == 0 {
            0.0
        } else {
            (self.read_hits + self.write_hits) as f64 / total as f64
        }
    }

    /// Mean miss latency in ticks.
    pub fn avg_miss_latency(&self) -> f64 {
        if self.miss_latency_samples == 0 {
            0.0
        } else {
            self.total_miss_latency as f64 / self.miss_latency_samples as f64
        }
    }

    /// Prints the counters of the cache called `name` to stdout.
    pub fn print(&self, name: &str) {
        println!("\n==========================================================");
        println!("CACHE STATISTICS: {name}");
        println!("==========================================================");
        println!("accesses                 {}", self.accesses());
        println!("hit_rate                 {:.2}%", self.hit_rate() * 100.0);
        println!("  read.hits              {}", self.read_hits);
        println!("  read.misses            {}", self.read_misses);
        println!("  write.hits             {}", self.write_hits);
        println!("  write.misses           {}", self.write_misses);
        println!("----------------------------------------------------------");
        println!("MISS HANDLING");
        println!("  mshr.hits              {}", self.mshr_hits);
        println!("  mshr.misses            {}", self.mshr_misses);
        println!("  mshr.uncacheable       {}", self.mshr_uncacheable);
        println!("  miss.avg_latency       {:.2} ticks", self.avg_miss_latency());
        println!("----------------------------------------------------------");
        println!("EVICTIONS");
        println!("  replacements           {}", self.replacements);
        println!("  replacements.blocked   {}", self.blocked_replacements);
        println!("  writebacks             {}", self.writebacks);
        println!("  writebacks.absorbed    {}", self.writebacks_absorbed);
        println!("  clean_evicts           {}", self.clean_evicts);
        println!("  clean_evicts.squashed  {}", self.clean_evicts_squashed);
        println!("----------------------------------------------------------");
        println!("FLOW CONTROL");
        for cause in BlockedCause::ALL {
            println!(
                "  blocked.{:<15} {}",
                cause.label(),
                self.blocked_refusals[cause as usize]
            );
        }
        println!("  snoops                 {}", self.snoops);
        println!("  snoop.responses        {}", self.snoop_responses);
        println!("----------------------------------------------------------");
        println!("PREFETCH / FAULTS");
        println!("  prefetch.issued        {}", self.prefetches_issued);
        println!("  prefetch.fills         {}", self.prefetch_fills);
        println!("  prefetch.dropped       {}", self.prefetches_dropped);
        println!("  faults.injected        {}", self.faults_injected);
        println!("==========================================================");
    }
}
