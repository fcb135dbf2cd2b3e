//! BrowserHub Server: virtual browser admission and scheduling
//!
//! Main entry point that wires all crates together and runs the scheduler
//! with its maintenance worker until shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing;
use tracing_subscriber::{EnvFilter, fmt};

use browserhub_cache::RedisClient;
use browserhub_core::config::{AppConfig, BackendKind};
use browserhub_core::error::AppError;
use browserhub_core::types::SystemClock;
use browserhub_realtime::RealtimeHub;
use browserhub_realtime::bridge::{RedisEventRelay, RedisNotifier};
use browserhub_scheduler::pool::{MemoryContainerPool, RedisContainerPool};
use browserhub_scheduler::queue::{MemoryQueueStore, RedisQueueStore};
use browserhub_scheduler::runtime::StaticContainerRuntime;
use browserhub_scheduler::store::{
    MemoryLeaseStore, MemoryRoomStore, RedisLeaseStore, RedisRoomStore,
};
use browserhub_scheduler::{SchedulerBackends, VirtualBrowserScheduler};
use browserhub_worker::MaintenanceRunner;

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

/// Load configuration from files and environment
fn load_configuration() -> Result<AppConfig, AppError> {
    let env = std::env::var("BROWSERHUB_ENV").unwrap_or_else(|_| "development".to_string());
    AppConfig::load(&env)
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Main server run function
async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting BrowserHub v{}", env!("CARGO_PKG_VERSION"));

    // ── Step 1: Shutdown channel ─────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut background: Vec<JoinHandle<()>> = Vec::new();

    // ── Step 2: Realtime hub + backends ──────────────────────────
    let hub = Arc::new(RealtimeHub::new(config.realtime.channel_buffer));
    let runtime = Arc::new(StaticContainerRuntime::from_config(&config.runtime));

    let backends = match config.backend.kind {
        BackendKind::Memory => {
            tracing::info!("Using process-local backends");
            SchedulerBackends {
                pool: Arc::new(MemoryContainerPool::new(Vec::new())),
                queue_store: Arc::new(MemoryQueueStore::new()),
                leases: Arc::new(MemoryLeaseStore::new()),
                rooms: Arc::new(MemoryRoomStore::new()),
                notifier: Arc::clone(&hub) as _,
                runtime: Arc::clone(&runtime) as _,
            }
        }
        BackendKind::Redis => {
            tracing::info!("Using Redis backends");
            let client = RedisClient::connect(&config.cache.redis).await?;
            if !client.ping().await? {
                return Err(AppError::service_unavailable(
                    "Redis did not answer PING with PONG",
                ));
            }
            tracing::info!("Redis connection verified");

            let relay = RedisEventRelay::new(
                &config.cache.redis.url,
                config.realtime.redis_channel_prefix.clone(),
                Arc::clone(&hub),
            );
            let relay_cancel = shutdown_rx.clone();
            background.push(tokio::spawn(async move {
                if let Err(e) = relay.run(relay_cancel).await {
                    tracing::error!("Realtime relay error: {}", e);
                }
            }));

            SchedulerBackends {
                pool: Arc::new(RedisContainerPool::new(client.clone())),
                queue_store: Arc::new(RedisQueueStore::new(client.clone(), &config.cache.redis)),
                leases: Arc::new(RedisLeaseStore::new(client.clone())),
                rooms: Arc::new(RedisRoomStore::new(client.clone())),
                notifier: Arc::new(RedisNotifier::new(
                    client,
                    config.realtime.redis_channel_prefix.clone(),
                )),
                runtime: Arc::clone(&runtime) as _,
            }
        }
    };

    // ── Step 3: Scheduler + startup reconciliation ───────────────
    let scheduler =
        VirtualBrowserScheduler::new(backends, &config.scheduler, Arc::new(SystemClock));

    let report = scheduler.reconcile_on_startup().await?;
    tracing::info!(
        running = report.running,
        held = report.held,
        stale_leases_removed = report.stale_leases_removed,
        leases_updated = report.leases_updated,
        notified = report.notified,
        "Startup reconciliation complete"
    );

    // ── Step 4: Maintenance worker ───────────────────────────────
    if config.worker.enabled {
        let runner = MaintenanceRunner::new(scheduler.clone(), &config.worker);
        let worker_cancel = shutdown_rx.clone();
        background.push(tokio::spawn(async move {
            let passes = runner.run(worker_cancel).await;
            tracing::info!("Maintenance runner stopped after {} passes", passes);
        }));
        tracing::info!("Maintenance worker started");
    } else {
        tracing::info!("Maintenance worker disabled");
    }

    tracing::info!("BrowserHub scheduler running");

    // ── Step 5: Graceful shutdown ────────────────────────────────
    shutdown_signal().await?;
    tracing::info!("Shutdown signal received, starting graceful shutdown...");
    let _ = shutdown_tx.send(true);

    for handle in background {
        let _ = tokio::time::timeout(Duration::from_secs(10), handle).await;
    }

    if !scheduler.shutdown(Duration::from_secs(30)).await {
        tracing::warn!("Pending container returns did not finish before shutdown");
    }

    tracing::info!("BrowserHub server shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() -> Result<(), AppError> {
    #[cfg(unix)]
    {
        let mut terminate =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = terminate.recv() => {},
        }
    }

    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;

    Ok(())
}
