//! poolpatch daemon
//!
//! Pool update orchestration over HTTP: the same binary runs as host agent on
//! every pool member and as coordinator on the pool master.

use std::sync::Arc;

use color_eyre::Result;
use poolpatch_api::events::PoolEvent;
use poolpatch_exec::LocalExecutor;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod api;
mod config;
mod control;
mod factory;
mod router;
mod session;
mod state;

use config::Config;
use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let config_path = Config::find();
    let config = match &config_path {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.daemon.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match &config_path {
        Some(path) => info!(path = %path.display(), "loaded configuration"),
        None => warn!("no configuration file found, using defaults"),
    }
    if config.daemon.session_secret.is_empty() {
        warn!("session_secret is empty, authenticated endpoints are unreachable");
    }

    let bind = config.daemon.bind.clone();
    let state = Arc::new(AppState::new(config, Arc::new(LocalExecutor::new()))?);

    tokio::spawn(log_events(state.orchestrator.subscribe()));

    let app = router::create_router(state);
    let listener = TcpListener::bind(&bind).await?;
    info!(addr = %listener.local_addr()?, "poolpatch daemon listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("poolpatch daemon shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
    }
}

/// Forward orchestrator events to the log
async fn log_events(mut events: broadcast::Receiver<PoolEvent>) {
    loop {
        match events.recv().await {
            Ok(PoolEvent::SyncStarted { repository, at }) => {
                info!(%repository, %at, "sync started");
            }
            Ok(PoolEvent::SyncFinished {
                repository,
                hash,
                up_to_date,
            }) => {
                info!(%repository, %hash, up_to_date, "sync finished");
            }
            Ok(PoolEvent::PoolStatusComputed {
                repository,
                hosts_with_updates,
            }) => {
                info!(%repository, hosts_with_updates, "pool update status computed");
            }
            Ok(PoolEvent::UpdatesApplied { host, guidance }) => {
                info!(%host, ?guidance, "updates applied");
            }
            Ok(PoolEvent::GuidanceExecuted { host, guidance }) => {
                info!(%host, ?guidance, "guidance executed");
            }
            Ok(PoolEvent::HostUnreachable { host, reason }) => {
                warn!(%host, %reason, "host unreachable");
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "event log fell behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
