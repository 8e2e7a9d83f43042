//! pgmuxd - tenant routing daemon
//!
//! Boots the platform database, restores pools and service configuration
//! for every active project, then keeps pools trimmed and services probed
//! until interrupted.

mod logging;
mod state;

use std::time::Duration;

use anyhow::{Context, Result};
use pgmux_core::Settings;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::state::AppState;

const REAP_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::from_env().context("invalid configuration")?;
    let _log_guard = logging::init_tracing(&settings.log_dir)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        data_path = %settings.data_path.display(),
        pooling_backend = %settings.pooling_backend,
        max_connections = settings.pool.max_connections,
        "[pgmuxd] Starting"
    );

    let state = AppState::new(settings)?;
    spawn_event_logger(&state);

    match state.services.lifecycle.restore_active_projects().await {
        Ok(restored) => info!("[pgmuxd] {} projects online", restored.len()),
        Err(e) => error!("[pgmuxd] Failed to restore projects: {}", e),
    }

    let maintenance = tokio::spawn(run_maintenance(
        state.services.clone(),
        state.settings.health_check_interval,
    ));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("[pgmuxd] Shutting down");

    maintenance.abort();
    state.shutdown().await;
    info!("[pgmuxd] Stopped");
    Ok(())
}

/// Mirror every domain event into the log
fn spawn_event_logger(state: &AppState) {
    let mut receiver = state.events.subscribe();
    tokio::spawn(async move {
        while let Some(event) = receiver.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => debug!(target: "pgmuxd::events", "{}", json),
                Err(e) => warn!("[pgmuxd] Could not serialize event: {}", e),
            }
        }
    });
}

async fn run_maintenance(services: pgmux_router::RouterServices, health_interval: Option<Duration>) {
    let mut reap = tokio::time::interval(REAP_INTERVAL);
    reap.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // The health branch is disabled below when no interval is configured
    let mut health = tokio::time::interval(health_interval.unwrap_or(REAP_INTERVAL));
    health.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // Both intervals tick immediately; startup already configured everything
    reap.tick().await;
    health.tick().await;

    loop {
        tokio::select! {
            _ = reap.tick() => {
                services.registry.reap_idle().await;
            }
            _ = health.tick(), if health_interval.is_some() => {
                let report = services.service_manager.health_check(None).await;
                if report.healthy {
                    debug!("[pgmuxd] {} projects healthy", report.projects.len());
                }
            }
        }
    }
}
