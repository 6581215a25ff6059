//! seqcalc service
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                           seqcalc                            │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌────────────┐    ┌───────────────┐    ┌────────────────┐   │
//! │  │    HTTP    │───▶│ ComputeEngine │───▶│  Checkpoint    │   │
//! │  │   server   │    │   (L1 cache)  │    │  store (Redis) │   │
//! │  └────────────┘    └───────────────┘    └────────────────┘   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Startup: connect store → preheat L1 → bind → serve.
//! Shutdown (SIGINT/SIGTERM): stop accepting → drain connections → flush L1
//! checkpoints → close store, all within the shutdown timeout.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use seqcalc::checkpoint::{CheckpointStore, InMemoryCheckpointStore, RedisCheckpointStore};
use seqcalc::error::Result;
use seqcalc::{server, ComputeEngine, EngineConfig, RedisStoreConfig};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Checkpoint store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StoreKind {
    /// Shared Redis instance
    Redis,
    /// Process-local store; checkpoints die with the process
    Memory,
}

/// seqcalc - cached logistic series compute service
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// HTTP listen port
    #[arg(long, env = "PORT", default_value = "2586")]
    port: u16,

    /// Redis address (host:port or redis:// URL)
    #[arg(long, env = "REDIS_ADDR", default_value = "localhost:6379")]
    redis_addr: String,

    /// Checkpoint store backend
    #[arg(long = "store", env = "CHECKPOINT_STORE", value_enum, default_value = "redis")]
    store: StoreKind,

    /// Identifier of this pod, e.g. pod-2
    #[arg(long, env = "POD_ID", default_value = "pod-0")]
    pod_id: String,

    /// Number of cooperating pods
    #[arg(long, env = "TOTAL_PODS", default_value = "3")]
    total_pods: usize,

    /// Series held in the L1 cache
    #[arg(long, env = "CACHE_CAPACITY", default_value = "75")]
    cache_capacity: usize,

    /// Steps persisted as checkpoints are multiples of this
    #[arg(long, env = "CHECKPOINT_INTERVAL", default_value = "1000")]
    checkpoint_interval: u64,

    /// Sliding expiry of a series' checkpoints in seconds
    #[arg(long, env = "CHECKPOINT_TTL_SECS", default_value = "3600")]
    checkpoint_ttl_secs: u64,

    /// Series loaded into L1 at startup
    #[arg(long, env = "PREHEAT_LIMIT", default_value = "50")]
    preheat_limit: usize,

    /// Store connect timeout in milliseconds
    #[arg(long, env = "CONNECT_TIMEOUT_MS", default_value = "2000")]
    connect_timeout_ms: u64,

    /// Store operation timeout in milliseconds
    #[arg(long, env = "OP_TIMEOUT_MS", default_value = "1000")]
    op_timeout_ms: u64,

    /// Time allowed for draining and flushing on shutdown
    #[arg(long, env = "SHUTDOWN_TIMEOUT_SECS", default_value = "10")]
    shutdown_timeout_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            pod_id: self.pod_id.clone(),
            total_pods: self.total_pods,
            cache_capacity: self.cache_capacity,
            checkpoint_interval: self.checkpoint_interval,
            preheat_limit: self.preheat_limit,
        }
    }

    fn redis_config(&self) -> RedisStoreConfig {
        RedisStoreConfig {
            addr: self.redis_addr.clone(),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            op_timeout: Duration::from_millis(self.op_timeout_ms),
            ttl: Duration::from_secs(self.checkpoint_ttl_secs),
        }
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args);

    info!("Starting seqcalc");
    info!("  Pod: {} of {}", args.pod_id, args.total_pods);
    info!("  Store: {:?} ({})", args.store, args.redis_addr);
    info!("  Cache capacity: {} series", args.cache_capacity);
    info!("  Checkpoint interval: {} steps", args.checkpoint_interval);

    let config = args.engine_config();
    config.validate()?;

    let store: Arc<dyn CheckpointStore> = match args.store {
        StoreKind::Redis => Arc::new(RedisCheckpointStore::connect(args.redis_config()).await?),
        StoreKind::Memory => Arc::new(InMemoryCheckpointStore::with_ttl(Duration::from_secs(
            args.checkpoint_ttl_secs,
        ))),
    };

    let engine = Arc::new(ComputeEngine::new(config, store)?);
    engine.preheat().await;

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = server::bind(addr).await?;

    let shutdown = CancellationToken::new();
    let tracker = TaskTracker::new();

    let server_handle = tokio::spawn(server::serve(
        listener,
        engine.clone(),
        shutdown.clone(),
        tracker.clone(),
    ));

    wait_for_signal().await;
    info!("Shutdown signal received");

    let budget = Duration::from_secs(args.shutdown_timeout_secs);
    let flush_reserve = (Duration::from_millis(args.connect_timeout_ms)
        + Duration::from_millis(args.op_timeout_ms))
    .min(budget / 2);
    shutdown.cancel();

    match server_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("HTTP server error: {}", e),
        Err(e) => error!("HTTP server task failed: {}", e),
    }

    let flushed = drain_then_flush(&engine, &tracker, budget, flush_reserve).await;
    info!("Flushed {} checkpoints on shutdown", flushed);

    engine.close().await;
    info!("seqcalc shutdown complete");
    Ok(())
}

/// Wait for open connections, then flush L1, inside `budget`.
///
/// Draining may use everything except `flush_reserve`, so a stuck request
/// cannot starve the flush.
async fn drain_then_flush(
    engine: &ComputeEngine,
    tracker: &TaskTracker,
    budget: Duration,
    flush_reserve: Duration,
) -> usize {
    let deadline = Instant::now() + budget;

    tracker.close();
    let drain_budget = budget.saturating_sub(flush_reserve);
    if tokio::time::timeout(drain_budget, tracker.wait())
        .await
        .is_err()
    {
        warn!(
            "{} connections still open after {:?}, abandoning them",
            tracker.len(),
            drain_budget
        );
    }

    let flush_budget = deadline.saturating_duration_since(Instant::now());
    match tokio::time::timeout(flush_budget, engine.flush_to_store()).await {
        Ok(flushed) => flushed,
        Err(_) => {
            warn!("Shutdown timeout reached before L1 flush completed");
            0
        }
    }
}

// =============================================================================
// Signals
// =============================================================================

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "redis=warn"] {
        match directive.parse() {
            Ok(d) => filter = filter.add_directive(d),
            Err(e) => eprintln!("Ignoring log directive {}: {}", directive, e),
        }
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}
