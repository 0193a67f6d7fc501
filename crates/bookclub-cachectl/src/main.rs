//! # BookClub Cache CLI
//!
//! Binary entry point for `cachectl`.

use anyhow::Result;
use clap::Parser;
use serde::Serialize;
use std::net::SocketAddr;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bookclub_cache::HybridCache;
use bookclub_cachectl::{Config, LogFormat, metrics, smoke};

#[derive(Parser, Debug)]
#[command(name = "cachectl")]
#[command(about = "Probe the BookClub cache tiers and print their stats")]
struct Args {
    /// Run a set/get/delete round-trip before printing stats
    #[arg(long)]
    smoke: bool,

    /// Keep printing stats every SECS seconds until interrupted
    #[arg(long, value_name = "SECS")]
    watch: Option<u64>,

    /// Ignore REDIS_ENABLED and run with the local tier only
    #[arg(long)]
    local_only: bool,

    /// Serve Prometheus metrics on ADDR (e.g. 0.0.0.0:9090)
    #[arg(long, value_name = "ADDR")]
    metrics_addr: Option<SocketAddr>,

    /// Print the Prometheus exposition instead of the JSON stats
    #[arg(long, conflicts_with = "metrics_addr")]
    prometheus: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let mut config = Config::from_env();
    if args.local_only {
        config.cache.remote.enabled = false;
    }

    init_tracing(&config);

    tracing::info!(version = bookclub_cachectl::VERSION, "Starting cachectl");

    let exposition = match args.metrics_addr {
        Some(addr) => {
            metrics::serve(addr)?;
            None
        }
        None if args.prometheus => Some(metrics::capture()?),
        None => None,
    };

    let cache = HybridCache::connect(&config.cache).await?;

    if args.smoke {
        let report = smoke::run(&cache).await?;
        print_json(&report)?;
        if !report.passed() {
            anyhow::bail!("smoke round-trip failed");
        }
    }

    match (args.watch, exposition) {
        (Some(secs), _) => watch(&cache, Duration::from_secs(secs.max(1))).await?,
        (None, Some(handle)) => print!("{}", handle.render()),
        (None, None) => print_json(&cache.stats())?,
    }

    Ok(())
}

/// Logs go to stderr; stdout carries only the JSON reports.
fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.log_level.clone().into());

    match config.log_format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn watch(cache: &HybridCache, every: Duration) -> Result<()> {
    let mut interval = tokio::time::interval(every);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = interval.tick() => print_json(&cache.stats())?,
            _ = &mut shutdown => {
                tracing::info!("Received Ctrl+C, shutting down");
                return Ok(());
            }
        }
    }
}
