//! Cache model CLI.
//!
//! This binary replays memory-access traces through a single cache. It performs:
//! 1. **Run:** Build the cache and memory from a JSON configuration, replay a trace in
//!    timing or atomic mode and print the statistics.
//! 2. **Faults:** Parse a fault list for one cache and print the faults it would inject.
//!
//! Logging goes through `tracing`; set `RUST_LOG` (e.g. `RUST_LOG=cachefi_core=debug`)
//! to see protocol events.

use std::path::{Path, PathBuf};
use std::{fs, process};

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use cachefi_core::config::{FaultConfig, SimConfig};
use cachefi_core::fault::FaultInjector;
use cachefi_core::sim::{self, SimCache};

#[derive(Parser, Debug)]
#[command(
    name = "cachefi",
    author,
    version,
    about = "Cycle-level cache model with fault injection",
    long_about = "Replay a memory-access trace through a set-associative cache.\n\nTrace lines are `tick R|W addr size [requestor]`; fault lines are\n`kind blk_addr byte bit start end stuck_at owner`.\n\nExamples:\n  cachefi run --trace traces/stream.txt\n  cachefi run --config l1d.json --trace t.txt --faults faults.txt\n  cachefi faults --list faults.txt --owner l1d --assoc 4"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay a trace through the configured cache.
    Run {
        /// JSON configuration (cache and memory); built-in defaults when omitted.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Trace to replay.
        #[arg(short, long)]
        trace: PathBuf,

        /// Fault list; overrides the configuration's fault_injection path.
        #[arg(long)]
        faults: Option<PathBuf>,

        /// Replay in atomic mode instead of timing mode.
        #[arg(long)]
        atomic: bool,

        /// Print the valid blocks left in the cache after the run.
        #[arg(long)]
        dump_tags: bool,
    },

    /// Parse a fault list and print the faults that belong to one cache.
    Faults {
        /// Fault list to parse.
        #[arg(short, long)]
        list: PathBuf,

        /// Cache name the faults must belong to.
        #[arg(short, long, default_value = "l1d")]
        owner: String,

        /// Associativity used to resolve entry-index locations.
        #[arg(short, long, default_value_t = 4)]
        assoc: usize,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            config,
            trace,
            faults,
            atomic,
            dump_tags,
        } => cmd_run(config.as_deref(), &trace, faults, atomic, dump_tags),
        Commands::Faults { list, owner, assoc } => cmd_faults(&list, &owner, assoc),
    }
}

/// Loads the configuration, or the defaults when no path is given. Exits on error.
fn load_config(path: Option<&Path>) -> SimConfig {
    let Some(path) = path else {
        return SimConfig::default();
    };
    let text = fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("Error: cannot read config {}: {e}", path.display());
        process::exit(1);
    });
    SimConfig::from_json(&text).unwrap_or_else(|e| {
        eprintln!("Error: {}: {e}", path.display());
        process::exit(1);
    })
}

/// Builds the cache, replays the trace and prints statistics.
fn cmd_run(config: Option<&Path>, trace: &Path, faults: Option<PathBuf>, atomic: bool, dump_tags: bool) {
    let mut config = load_config(config);
    if let Some(input_path) = faults {
        let owner = config.cache.fault_injection.take().and_then(|f| f.owner);
        config.cache.fault_injection = Some(FaultConfig {
            input_path,
            owner,
            enabled: true,
        });
    }

    let records = sim::load_trace(trace).unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        process::exit(1);
    });
    let mut cache: SimCache = sim::build_cache(&config).unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        process::exit(1);
    });

    println!(
        "[*] {} ({:?}): {} KiB, {}-way, {} B lines, {} MSHRs, {} write buffers",
        config.cache.name,
        config.cache.kind,
        config.cache.size_bytes / 1024,
        config.cache.ways,
        config.cache.line_bytes,
        config.cache.mshrs,
        config.cache.write_buffers
    );
    println!(
        "[*] Replaying {} accesses in {} mode",
        records.len(),
        if atomic { "atomic" } else { "timing" }
    );
    info!(trace = %trace.display(), records = records.len(), atomic, "replay started");

    let result = if atomic {
        sim::run_atomic(&mut cache, &records)
    } else {
        sim::run_timing(&mut cache, &records)
    };
    let summary = result.unwrap_or_else(|e| {
        eprintln!("\n[!] FATAL: {e}");
        cache.stats().print(cache.name());
        process::exit(1);
    });

    cache.cleanup_refs();
    summary.print();
    cache.stats().print(cache.name());
    print_tag_stats(&cache, summary.final_tick);
    if let Some(injector) = cache.fault_injector() {
        let stats = injector.stats();
        println!("FAULT INJECTOR ({})", injector.owner());
        println!("  faults.loaded          {}", injector.faults().len());
        println!("  faults.flips           {}", stats.flips);
        println!("  faults.restores        {}", stats.restores);
        println!("==========================================================");
    }
    if dump_tags {
        print!("{}", cache.tags().print());
    }
}

fn print_tag_stats(cache: &SimCache, now: u64) {
    let tags = cache.tags();
    let stats = tags.stats();
    println!("TAG STORE");
    println!("  tags.in_use            {} / {}", stats.tags_in_use, tags.num_blocks());
    println!("  tags.avg_refs          {:.2}", stats.avg_refs());
    println!("  tags.tag_accesses      {}", stats.tag_accesses);
    println!("  tags.data_accesses     {}", stats.data_accesses);
    match stats.warmup_tick {
        Some(tick) => println!("  tags.warmup_tick       {tick}"),
        None => println!("  tags.warmup_tick       -"),
    }
    for (requestor, blocks) in &stats.occupancies {
        println!("  occupancy.requestor{requestor:<4} {blocks}");
    }
    for (task, buckets) in tags.compute_stats(now) {
        println!("  age.task{task:<6}         {buckets:?}");
    }
    println!("==========================================================");
}

/// Parses a fault list and prints the faults kept for `owner`.
fn cmd_faults(list: &Path, owner: &str, assoc: usize) {
    let injector = FaultInjector::load(list, owner, assoc).unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        process::exit(1);
    });
    println!("[*] {} fault(s) for {owner}", injector.faults().len());
    for fault in injector.faults() {
        println!("  {fault}");
    }
}
