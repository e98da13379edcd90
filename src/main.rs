//! Binary entry point: parses configuration, wires the KV backend, starts
//! the sweeper and registry-cleanup background loops, and serves the HTTP
//! API surface until the process receives a shutdown signal.

use clap::Parser;
use coordinator_core::api::{self, AppState};
use coordinator_core::config::{Cli, CoordinatorConfig};
use coordinator_core::kv::{KvStore, MemoryStore, RedisStore};
use coordinator_core::telemetry;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = CoordinatorConfig::from_cli(cli);
    telemetry::init("coordinatord", config.log_format);

    let kv: Arc<dyn KvStore> = match &config.kv_url {
        Some(url) => {
            info!("connecting to redis backend");
            Arc::new(RedisStore::connect(url).await?)
        }
        None => {
            warn!("no KV_URL set; running against an in-memory store (single process only)");
            Arc::new(MemoryStore::new())
        }
    };

    let state = AppState::new(kv, config.clone());

    spawn_sweeper_loop(state.clone(), config.sweep_interval, config.heartbeat_stale_after);
    spawn_registry_cleanup_loop(state.clone(), config.registry_cleanup_interval, config.node_inactivity_horizon);

    let router = api::build(state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    info!(port = config.port, "coordinator listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Periodically reclaims jobs whose lease has expired or whose heartbeat
/// has gone stale.
fn spawn_sweeper_loop(state: AppState, interval: Duration, stale_after: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match state.sweeper.sweep(stale_after).await {
                Ok(reclaimed) if !reclaimed.is_empty() => {
                    info!(count = reclaimed.len(), "sweeper reclaimed abandoned jobs");
                }
                Ok(_) => {}
                Err(err) => error!(%err, "sweeper pass failed"),
            }
        }
    });
}

/// Hard-removes node records past their soft-TTL (default horizon 7
/// days, checked hourly).
fn spawn_registry_cleanup_loop(state: AppState, interval: Duration, max_age: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match state.registry.cleanup_inactive(max_age).await {
                Ok(removed) if removed > 0 => {
                    info!(removed, "registry cleanup removed inactive nodes");
                }
                Ok(_) => {}
                Err(err) => error!(%err, "registry cleanup pass failed"),
            }
        }
    });
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        warn!("shutdown signal received, draining in-flight requests");
    }
}
