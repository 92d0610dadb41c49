//! mic-mute-daemon: Background daemon keeping one authoritative
//! microphone mute state for AirPods-style headsets on macOS
//!
//! This daemon runs as a LaunchAgent and provides:
//! - Hardware gesture, OS notification and polling signal sources
//! - A single reconciled mute state with change notifications
//! - IPC server for query, toggle and set from the menu bar app
//!
//! Non-macOS hosts run against the simulated audio backend.

mod audio;
mod config;
mod control;
mod devices;
mod events;
mod ipc;
mod lifecycle;
mod reconcile;
mod service;
mod sources;
mod state;

use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::ipc::Server;
use crate::lifecycle::ShutdownSignal;
use crate::service::MuteService;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "mic-mute-daemon starting"
    );

    // Load configuration
    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(?config.socket_path, "configuration loaded");

    // Create shutdown signal handler
    let shutdown = ShutdownSignal::new();

    // Build the service and register signal sources
    let service = Arc::new(MuteService::new(
        audio::system_backend(),
        config.service_settings(),
    ));
    service.start();
    tracing::debug!("{}", service.diagnostics());

    // Create IPC server
    let server = Server::new(&config.socket_path, Arc::clone(&service))?;

    let mut changes = service.subscribe();

    info!(muted = service.muted(), "daemon initialized, entering main loop");

    // Main event loop
    tokio::select! {
        // Run the IPC server (accepts client connections)
        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        // Log every accepted mute change
        _ = async {
            while let Some(event) = changes.recv().await {
                info!(%event, "mute state changed");
            }
        } => {
            info!("change event handler exited");
        }

        // Wait for shutdown signal
        result = shutdown.wait() => {
            match result {
                Ok(()) => info!("shutdown signal received"),
                Err(e) => error!(?e, "failed to install signal handlers"),
            }
        }
    }

    // Cleanup
    info!("shutting down...");

    service.shutdown();
    server.shutdown().await;

    info!("mic-mute-daemon stopped");

    Ok(())
}
