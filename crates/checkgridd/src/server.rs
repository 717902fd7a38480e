//! Dispatcher daemon — wires the store, the sweep task and the API.
//!
//! The daemon:
//! 1. Creates the in-memory cluster store
//! 2. Schedules the static checks from the config file
//! 3. Runs the expiration sweep in the background
//! 4. Serves the REST API until Ctrl-C

use std::net::SocketAddr;

use tokio::sync::watch;
use tracing::info;

use checkgrid_core::CheckgridConfig;
use checkgrid_dispatch::{ConfigChanges, Dispatcher};
use checkgrid_state::ClusterStore;

/// Build a dispatcher and push the static checks into it.
pub fn build_dispatcher(config: &CheckgridConfig) -> anyhow::Result<Dispatcher> {
    let dispatcher = Dispatcher::from_config(ClusterStore::new(), &config.dispatcher);

    let changes = ConfigChanges {
        schedule: config.checks.clone(),
        unschedule: Vec::new(),
    };
    if !changes.is_empty() {
        dispatcher.apply_changes(&changes)?;
        info!(checks = changes.schedule.len(), "static checks scheduled");
    }
    Ok(dispatcher)
}

/// Run the daemon until Ctrl-C.
pub async fn run(config: CheckgridConfig) -> anyhow::Result<()> {
    info!("checkgrid dispatcher starting");

    let dispatcher = build_dispatcher(&config)?;
    info!(
        timeout_secs = config.dispatcher.node_expiration_timeout_secs,
        "dispatcher initialized"
    );

    // ── Expiration sweep ─────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = dispatcher.clone();
    let sweep_interval = config.dispatcher.sweep_interval();
    let sweep_handle = tokio::spawn(async move {
        sweeper.run(sweep_interval, shutdown_rx).await;
    });

    // ── REST API server ──────────────────────────────────────────
    let router = checkgrid_api::build_router(dispatcher);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.api.port));

    info!(%addr, "API server starting");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C handler");
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;
    let _ = sweep_handle.await;

    info!("checkgrid dispatcher stopped");
    Ok(())
}
