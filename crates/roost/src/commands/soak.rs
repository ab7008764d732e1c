//! Soak command - concurrent check-out/check-in workload.
//!
//! Boots a local cluster, adds sessions, hammers them from blocking workers
//! and tears everything down with `remove_all`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context as _, Result};
use clap::Args;
use console::{Style, style};
use serde::Serialize;
use tracing::{debug, info};

use roost_cluster::local::LocalConnector;
use roost_session::{
    Cache, CacheConfig, CacheListener, ClusterRegistry, SessionInstance, StatefulCache,
};

use super::Context;

/// Arguments for the soak command.
#[derive(Args, Debug)]
pub struct SoakArgs {
    /// Number of sessions to add
    #[arg(long, default_value = "16")]
    pub keys: usize,

    /// Number of concurrent workers
    #[arg(long, default_value = "4")]
    pub workers: usize,

    /// Check-out/check-in cycles per worker
    #[arg(long, default_value = "1000")]
    pub iterations: usize,

    /// Idle timeout for every session; also waits for the evictions
    #[arg(long)]
    pub timeout_ms: Option<u64>,
}

type Session = SessionInstance<u64>;

/// Counts `timed_out` callbacks.
#[derive(Default)]
struct TimeoutCounter {
    count: AtomicU64,
}

impl CacheListener<Session> for TimeoutCounter {
    fn timed_out(&self, instance: Session) {
        debug!(instance_id = %instance.id, "Session timed out");
        self.count.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Default)]
struct WorkerTally {
    checked_out: u64,
    missing: u64,
    errors: u64,
}

/// Soak summary for JSON output.
#[derive(Debug, Serialize)]
struct SoakReport {
    cache_id: String,
    keys: usize,
    workers: usize,
    iterations: usize,
    checked_out: u64,
    missing: u64,
    errors: u64,
    timed_out: u64,
    removed: usize,
    elapsed_ms: u64,
}

/// Run the soak command.
pub async fn run(args: SoakArgs, ctx: &Context) -> Result<()> {
    if args.keys == 0 || args.workers == 0 {
        anyhow::bail!("--keys and --workers must be at least 1");
    }

    let config = CacheConfig::from(&ctx.loaded.config);
    let cache: Arc<StatefulCache<String, Session>> = Arc::new(StatefulCache::new(
        config,
        Arc::new(LocalConnector::new()),
        Arc::new(ClusterRegistry::new()),
    ));
    let timeouts = Arc::new(TimeoutCounter::default());
    cache.set_listener(timeouts.clone())?;
    cache.init().context("Failed to initialize cache")?;

    let started = Instant::now();
    let timeout = args.timeout_ms.map(Duration::from_millis);

    for i in 0..args.keys {
        let mut session = Session::new(0);
        if let Some(timeout) = timeout {
            session = session.with_timeout(timeout);
        }
        let key = session_key(i);
        cache.add(key.clone(), session)?;
        cache.check_in(&key)?;
    }
    info!(keys = args.keys, workers = args.workers, "Soak started");

    let mut handles = Vec::with_capacity(args.workers);
    for worker in 0..args.workers {
        let cache = Arc::clone(&cache);
        let keys = args.keys;
        let iterations = args.iterations;
        handles.push(tokio::task::spawn_blocking(move || {
            run_worker(cache.as_ref(), worker, keys, iterations)
        }));
    }

    let mut total = WorkerTally::default();
    for handle in handles {
        let tally = handle.await?;
        total.checked_out += tally.checked_out;
        total.missing += tally.missing;
        total.errors += tally.errors;
    }

    if let Some(timeout) = timeout {
        // Leave the reaper a few sweeps past the deadline.
        tokio::time::sleep(timeout * 2 + Duration::from_millis(500)).await;
    }

    let removed = {
        let cache = Arc::clone(&cache);
        tokio::task::spawn_blocking(move || cache.remove_all(&|_: &Session| true)).await??
    };
    cache.destroy()?;

    let report = SoakReport {
        cache_id: cache.config().cache_id.clone(),
        keys: args.keys,
        workers: args.workers,
        iterations: args.iterations,
        checked_out: total.checked_out,
        missing: total.missing,
        errors: total.errors,
        timed_out: timeouts.count.load(Ordering::Relaxed),
        removed: removed.len(),
        elapsed_ms: started.elapsed().as_millis() as u64,
    };
    info!(
        checked_out = report.checked_out,
        errors = report.errors,
        timed_out = report.timed_out,
        "Soak finished"
    );

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if report.errors > 0 {
        anyhow::bail!("{} operations failed", report.errors);
    }
    Ok(())
}

fn session_key(i: usize) -> String {
    format!("session-{i}")
}

fn run_worker(
    cache: &dyn Cache<String, Session>,
    worker: usize,
    keys: usize,
    iterations: usize,
) -> WorkerTally {
    let mut tally = WorkerTally::default();
    for i in 0..iterations {
        let key = session_key((worker + i) % keys);
        match cache.check_out(&key, false) {
            Ok(Some(_)) => {
                tally.checked_out += 1;
                if let Err(e) = cache.check_in(&key) {
                    tracing::warn!(key = %key, error = %e, "Check-in failed");
                    tally.errors += 1;
                }
            }
            Ok(None) => tally.missing += 1,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Check-out failed");
                tally.errors += 1;
            }
        }
    }
    tally
}

fn print_report(report: &SoakReport) {
    let dim = Style::new().dim();
    let status = if report.errors == 0 {
        Style::new().green().apply_to("● ok")
    } else {
        Style::new().red().apply_to("● failed")
    };

    println!();
    println!("{}", style("Roost Soak").bold());
    println!("{}", dim.apply_to("─".repeat(40)));
    println!();
    println!("  {} {}", dim.apply_to("Status:"), status);
    println!("  {} {}", dim.apply_to("Cache:"), report.cache_id);
    println!(
        "  {} {} keys × {} workers × {} iterations",
        dim.apply_to("Load:"),
        report.keys,
        report.workers,
        report.iterations
    );
    println!("  {} {}", dim.apply_to("Checked out:"), report.checked_out);
    println!("  {} {}", dim.apply_to("Missing:"), report.missing);
    println!("  {} {}", dim.apply_to("Errors:"), report.errors);
    println!("  {} {}", dim.apply_to("Timed out:"), report.timed_out);
    println!("  {} {}", dim.apply_to("Removed:"), report.removed);
    println!("  {} {}ms", dim.apply_to("Elapsed:"), report.elapsed_ms);
    println!();
}
