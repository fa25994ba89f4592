//! Chronicle relay engine daemon.
//!
//! Loads the relay configuration, builds the trust network, archives owner
//! history and keeps both fresh until interrupted. Events are kept in the
//! in-memory host; serving them over the wire is left to the embedding relay.
//!
//! # Usage
//!
//! ```bash
//! # Run with ./config.toml
//! chronicle
//!
//! # Run with a custom config file and the Prometheus exporter on port 9090
//! chronicle --config /etc/chronicle/config.toml --metrics-port 9090
//! ```
//!
//! # Graceful Shutdown
//!
//! On Ctrl+C the daemon:
//! 1. Cancels pending backfills and backup publishes
//! 2. Stops the refresh scheduler
//! 3. Compacts the root registry file

use anyhow::{Context, Result};
use chronicle_core::metrics::{set_gauge, start_metrics_server, try_init_metrics};
use chronicle_relay::{Broadcaster, Config, Engine, EventStore, MemoryHost, NostrPool, RemotePool};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Chronicle relay engine daemon.
#[derive(Parser, Debug)]
#[command(name = "chronicle")]
#[command(about = "Trust-gated moderation and archival engine for a Nostr relay")]
#[command(version)]
struct Args {
    /// Path to the TOML config file
    #[arg(long, short, default_value = "config.toml")]
    config: PathBuf,

    /// Metrics HTTP server port (0 to disable, overrides the config file)
    #[arg(long)]
    metrics_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("info".parse()?)
                .add_directive("chronicle_relay=debug".parse()?),
        )
        .init();

    let args = Args::parse();

    tracing::info!("Chronicle starting...");

    let config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    let metrics_port = args.metrics_port.unwrap_or(config.metrics_port);
    if metrics_port > 0 {
        match try_init_metrics() {
            Some(handle) => {
                start_metrics_server(metrics_port, handle)
                    .await
                    .context("Failed to start metrics server")?;
                set_gauge("chronicle_running", 1.0);
            }
            None => tracing::warn!("Metrics recorder already installed, exporter disabled"),
        }
    }

    tracing::info!("Configuration:");
    tracing::info!("  Owners: {}", config.owner_pubkeys.len());
    tracing::info!("  Registry: {}", config.registry_path().display());
    tracing::info!("  Refresh interval: {} hours", config.refresh_interval);
    tracing::info!("  Minimum followers: {}", config.min_followers);
    tracing::info!("  Trust hops: {}", config.trust_hops);
    tracing::info!("  Fetch sync: {}", config.fetch_sync);
    tracing::info!("  Seed relays: {}", config.seed_relays.len());
    tracing::info!("  Backup relays: {}", config.backup_relays.len());

    let host = Arc::new(MemoryHost::new());
    let pool = Arc::new(NostrPool::new());

    let mut engine = Engine::build(
        &config,
        Arc::clone(&host) as Arc<dyn EventStore>,
        Arc::clone(&host) as Arc<dyn Broadcaster>,
        Arc::clone(&pool) as Arc<dyn RemotePool>,
    )
    .context("Failed to initialize engine")?;

    // The first refresh cycle can take minutes; allow interrupting it
    let started = tokio::select! {
        started = engine.start() => Some(started),
        _ = tokio::signal::ctrl_c() => None,
    };
    match started {
        Some(result) => result.context("Engine failed to start")?,
        None => {
            tracing::info!("Shutdown signal received during startup");
            engine.shutdown().await?;
            pool.shutdown().await;
            return Ok(());
        }
    }

    tracing::info!("Relay ready: {} trusted authors", engine.trust().snapshot().len());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    tracing::info!("Shutdown signal received, stopping gracefully...");

    let counters = Arc::clone(engine.counters());
    let threads = engine.registry().size();
    engine.shutdown().await.context("Failed to stop engine")?;
    pool.shutdown().await;
    set_gauge("chronicle_running", 0.0);

    tracing::info!("═══════════════════════════════════════════════════════");
    tracing::info!("SHUTDOWN COMPLETE");
    tracing::info!("═══════════════════════════════════════════════════════");
    tracing::info!("Events accepted:      {}", counters.accepted());
    tracing::info!("Events rejected:      {}", counters.rejected());
    tracing::info!("Threads monitored:    {}", threads);
    tracing::info!("Events in memory:     {}", host.len().await?);

    Ok(())
}
