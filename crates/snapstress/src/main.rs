//! snapstress - multi-threaded load driver for snapcache

use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Serialize;
use snapcache::{CacheConfig, Error, SnapCache};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Worker threads sharing one cache
    #[arg(short, long, default_value_t = 4)]
    threads: usize,

    /// Cache capacity (number of keys)
    #[arg(short, long, default_value_t = 1000)]
    capacity: usize,

    /// Operations per thread
    #[arg(short, long, default_value_t = 100_000)]
    ops: usize,

    /// Number of distinct keys touched
    #[arg(short, long, default_value_t = 2000)]
    key_space: u64,

    /// Percentage of operations that are reads
    #[arg(short, long, default_value_t = 80, value_parser = clap::value_parser!(u8).range(0..=100))]
    read_percent: u8,

    /// Give up an operation after this many publish attempts
    #[arg(long)]
    retry_limit: Option<usize>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

/// Per-thread tallies
#[derive(Debug, Default, Clone, Copy)]
struct WorkerTally {
    reads: u64,
    writes: u64,
    abandoned: u64,
}

#[derive(Debug, Serialize)]
struct Report {
    config: CacheConfig,
    threads: usize,
    elapsed_ms: u128,
    ops_per_sec: f64,
    reads: u64,
    writes: u64,
    abandoned: u64,
    hits: u64,
    misses: u64,
    hit_ratio: f64,
    evictions: u64,
    contention: u64,
    resident: usize,
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    if args.threads == 0 {
        bail!("--threads must be at least 1");
    }
    if args.key_space == 0 {
        bail!("--key-space must be at least 1");
    }

    let mut config = CacheConfig::new(args.capacity);
    if let Some(limit) = args.retry_limit {
        config = config.with_retry_limit(limit);
    }
    let cache = SnapCache::<u64>::with_config(config).context("invalid cache configuration")?;

    info!("Starting snapstress v{}", env!("CARGO_PKG_VERSION"));
    info!(
        threads = args.threads,
        capacity = args.capacity,
        ops = args.ops,
        key_space = args.key_space,
        read_percent = args.read_percent,
        "Running workload"
    );

    let started = Instant::now();
    let tallies = thread::scope(|scope| {
        let handles: Vec<_> = (0..args.threads)
            .map(|worker| {
                let cache = &cache;
                let args = &args;
                scope.spawn(move || run_worker(cache, args, worker as u64))
            })
            .collect();

        handles
            .into_iter()
            .map(|handle| handle.join())
            .collect::<std::result::Result<Vec<_>, _>>()
    })
    .map_err(|_| anyhow::anyhow!("worker thread panicked"))?;
    let elapsed = started.elapsed();

    cache
        .snapshot()
        .check_invariants()
        .context("published snapshot is inconsistent")?;

    let report = build_report(&cache, &args, &tallies, elapsed);
    if report.abandoned > 0 {
        warn!(abandoned = report.abandoned, "Operations gave up under contention");
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        info!(
            elapsed_ms = report.elapsed_ms as u64,
            ops_per_sec = report.ops_per_sec as u64,
            hit_ratio = report.hit_ratio,
            evictions = report.evictions,
            contention = report.contention,
            resident = report.resident,
            "Workload finished"
        );
    }

    Ok(())
}

fn run_worker(cache: &SnapCache<u64>, args: &Args, worker: u64) -> WorkerTally {
    let mut tally = WorkerTally::default();
    let mut rng = XorShift::new(worker);

    for _ in 0..args.ops {
        let key = rng.next_u64() % args.key_space;
        let is_read = rng.next_u64() % 100 < u64::from(args.read_percent);

        let result = match (is_read, args.retry_limit.is_some()) {
            (true, false) => {
                cache.get(&key);
                Ok(())
            }
            (false, false) => {
                cache.set(&key, worker);
                Ok(())
            }
            (true, true) => cache.try_get(&key).map(|_| ()),
            (false, true) => cache.try_set(&key, worker),
        };

        match result {
            Ok(()) if is_read => tally.reads += 1,
            Ok(()) => tally.writes += 1,
            Err(Error::Contended { .. }) => tally.abandoned += 1,
            Err(e) => warn!(worker, "Unexpected cache error: {}", e),
        }
    }

    tally
}

fn build_report(
    cache: &SnapCache<u64>,
    args: &Args,
    tallies: &[WorkerTally],
    elapsed: Duration,
) -> Report {
    let total = tallies.iter().fold(WorkerTally::default(), |acc, t| WorkerTally {
        reads: acc.reads + t.reads,
        writes: acc.writes + t.writes,
        abandoned: acc.abandoned + t.abandoned,
    });
    let committed = total.reads + total.writes;
    let secs = elapsed.as_secs_f64();
    let stats = cache.stats();

    Report {
        config: *cache.config(),
        threads: args.threads,
        elapsed_ms: elapsed.as_millis(),
        ops_per_sec: if secs > 0.0 { committed as f64 / secs } else { 0.0 },
        reads: total.reads,
        writes: total.writes,
        abandoned: total.abandoned,
        hits: stats.hits(),
        misses: stats.misses(),
        hit_ratio: stats.hit_ratio(),
        evictions: stats.evictions(),
        contention: stats.contention(),
        resident: cache.len(),
    }
}

/// Small deterministic generator so runs are reproducible per thread
struct XorShift(u64);

impl XorShift {
    fn new(seed: u64) -> Self {
        // Zero is a fixed point of xorshift
        Self(seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1)
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }
}
