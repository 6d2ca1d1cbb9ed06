//! Drives a concurrent memoized workload through a gateway pool and prints
//! the pool counters.
//!
//! ```text
//! memo-bench [CONFIG.json] [THREADS] [ITERATIONS]
//! ```
//!
//! The JSON file follows `BenchConfig`; positional numbers override it.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use serde::Deserialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use memo_client::{memoize, GatewayPool, MemoError, PoolConfig, PoolStats, RespConfig};
use memo_common::Connector;
use memo_engine::MemoryEngine;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum BackendConfig {
    #[default]
    Memory,
    Resp(RespConfig),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct BenchConfig {
    backend: BackendConfig,
    pool: PoolConfig,
    threads: usize,
    iterations: usize,
    /// Distinct argument values; smaller spaces give more cache hits.
    key_space: u64,
}

impl Default for BenchConfig {
    fn default() -> Self {
        BenchConfig {
            backend: BackendConfig::Memory,
            pool: PoolConfig {
                name: "bench".to_string(),
                lower_limit: 2,
                upper_limit: 8,
                ..PoolConfig::default()
            },
            threads: 4,
            iterations: 10_000,
            key_space: 512,
        }
    }
}

impl BenchConfig {
    fn from_args(args: &[String]) -> anyhow::Result<Self> {
        let mut rest = args;
        let mut config = match rest.first() {
            Some(path) if path.ends_with(".json") => {
                rest = &rest[1..];
                Self::load(Path::new(path))?
            }
            _ => BenchConfig::default(),
        };

        if let Some(threads) = rest.first() {
            config.threads = threads.parse().with_context(|| format!("invalid thread count {threads:?}"))?;
        }
        if let Some(iterations) = rest.get(1) {
            config.iterations = iterations
                .parse()
                .with_context(|| format!("invalid iteration count {iterations:?}"))?;
        }
        if rest.len() > 2 {
            bail!("usage: memo-bench [CONFIG.json] [THREADS] [ITERATIONS]");
        }
        if config.threads == 0 || config.key_space == 0 {
            bail!("threads and key_space must be positive");
        }
        Ok(config)
    }

    fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }
}

#[derive(Debug, Default)]
struct Tally {
    calls: AtomicU64,
    computed: AtomicU64,
    exhausted: AtomicU64,
}

/// Steps for `n` to reach 1 under the Collatz map.
fn collatz_steps(mut n: u64) -> u32 {
    let mut steps = 0;
    while n > 1 {
        n = if n % 2 == 0 { n / 2 } else { 3 * n + 1 };
        steps += 1;
    }
    steps
}

fn run<C: Connector>(pool: &GatewayPool<C>, config: &BenchConfig) -> anyhow::Result<(Tally, Duration)> {
    let tally = Tally::default();
    let started = Instant::now();

    thread::scope(|scope| -> anyhow::Result<()> {
        let workers: Vec<_> = (0..config.threads as u64)
            .map(|worker| {
                let tally = &tally;
                scope.spawn(move || -> Result<(), MemoError> {
                    let steps = memoize("collatz", pool, |(n,): (u64,)| {
                        tally.computed.fetch_add(1, Ordering::Relaxed);
                        collatz_steps(n)
                    });
                    for i in 0..config.iterations as u64 {
                        let n = 1 + (worker * 7919 + i * 104_729) % config.key_space;
                        match steps.call((n,)) {
                            Ok(_) => {
                                tally.calls.fetch_add(1, Ordering::Relaxed);
                            }
                            Err(MemoError::PoolExhausted) => {
                                tally.exhausted.fetch_add(1, Ordering::Relaxed);
                            }
                            Err(err) => return Err(err),
                        }
                    }
                    Ok(())
                })
            })
            .collect();

        for worker in workers {
            match worker.join() {
                Ok(result) => result?,
                Err(_) => bail!("worker thread panicked"),
            }
        }
        Ok(())
    })?;

    Ok((tally, started.elapsed()))
}

fn report(tally: &Tally, elapsed: Duration, stats: PoolStats) {
    let calls = tally.calls.load(Ordering::Relaxed);
    let secs = elapsed.as_secs_f64().max(f64::EPSILON);
    println!("calls:      {calls}");
    println!("computed:   {}", tally.computed.load(Ordering::Relaxed));
    println!("exhausted:  {}", tally.exhausted.load(Ordering::Relaxed));
    println!("elapsed:    {:.3}s ({:.0} calls/s)", secs, calls as f64 / secs);
    println!(
        "pool:       idle={} claimed={} limits={}..={}",
        stats.idle, stats.claimed, stats.lower_limit, stats.upper_limit
    );
    println!(
        "members:    opened={} disposed={} claims={} on_demand={} rejected={}",
        stats.opened, stats.disposed, stats.claims, stats.on_demand, stats.exhausted
    );
}

fn bench<C: Connector>(connector: C, config: &BenchConfig) -> anyhow::Result<()> {
    let pool = GatewayPool::new(connector, config.pool.clone()).context("creating pool")?;
    info!(threads = config.threads, iterations = config.iterations, "starting workload");
    let (tally, elapsed) = run(&pool, config)?;
    report(&tally, elapsed, pool.stats());
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = BenchConfig::from_args(&args)?;

    match config.backend.clone() {
        BackendConfig::Memory => bench(MemoryEngine::new(), &config),
        BackendConfig::Resp(resp) => bench(resp, &config),
    }
}
