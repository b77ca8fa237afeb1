/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

use crate::api;
use crate::service::UpdateService;
use crate::storage::{MemoryStorage, Storage};
use crate::topology::TargetingIndex;
use eitri_utils::config::Settings;
use eitri_utils::logging::prelude::*;
use std::sync::Arc;
use tokio::signal;

/// Function to start the Eitri server
///
/// This function loads the topology, seeds the storage backend from
/// configuration, configures API routes, and starts the server with
/// graceful shutdown support.
pub async fn serve(config: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting Eitri server");

    // Load the topology and build the targeting index
    info!("Loading topology from {}", config.server.topology_file);
    let index = Arc::new(TargetingIndex::load(&config.server.topology_file)?);
    info!("Topology loaded: {} packages", index.package_count());

    // Seed the storage backend from configuration
    let storage = MemoryStorage::new();
    storage.seed_setting(
        "subscribe_to_containers",
        config.server.subscribe_to_containers,
    );
    storage.seed_setting(
        "subscribe_to_service_manager",
        config.server.subscribe_to_service_manager,
    );
    storage.seed_watched_services(config.server.watched_services.clone());
    let storage: Arc<dyn Storage> = Arc::new(storage);

    let service = UpdateService::new(index, storage);

    // Configure API routes
    info!("Configuring API routes");
    let app = api::configure_api_routes(service.clone());

    // Set up the server address
    let addr = format!("0.0.0.0:{}", config.server.port);
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    // Set up shutdown signal handler
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    tokio::spawn(async move {
        signal::ctrl_c().await.expect("Failed to listen for ctrl+c");
        shutdown_tx.send(()).ok();
    });

    // Start the server with graceful shutdown
    info!("Eitri server is now running");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown(shutdown_rx))
        .await?;

    // End every open release stream so in-flight agents see a clean close
    service.stop();
    info!("Eitri server stopped");
    Ok(())
}

/// Validates the topology file and prints a summary of what it declares.
pub fn check_topology(
    config: &Settings,
    path: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let path = path.unwrap_or_else(|| config.server.topology_file.clone());
    let index = TargetingIndex::load(&path)?;
    println!("Topology OK: {} packages ({})", index.package_count(), path);
    Ok(())
}

async fn shutdown(rx: tokio::sync::oneshot::Receiver<()>) {
    let _ = rx.await;
    info!("Shutdown signal received");
}
