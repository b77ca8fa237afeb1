/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # CLI Commands Module
//!
//! Implements the command-line interface for the Eitri agent.
//!
//! ## Main Command
//!
//! ```text
//! pub async fn start() -> Result<(), Box<dyn std::error::Error>>
//! ```
//!
//! The primary entry point for the agent, which:
//! 1. Loads configuration
//! 2. Initializes logging
//! 3. Waits for the server to be ready
//! 4. Runs agent cycles until shutdown
//!
//! Each cycle registers with the server, starts the service reporter, and
//! consumes the release stream until it ends. A failed cycle is retried
//! after a cooldown; the agent only exits on a shutdown signal.
//!
//! ## Signal Handling
//!
//! The agent catches SIGINT, closes the reporting stream so the server
//! sees a clean end of the session, and stops.

use crate::{installer, server, services, utils};
use eitri_models::models::releases::ReleaseEnvelope;
use eitri_utils::config::Settings;
use eitri_utils::logging::prelude::*;
use eitri_utils::ndjson;
use reqwest::Client;
use std::path::PathBuf;
use tokio::signal::ctrl_c;
use tokio::sync::broadcast;
use tokio::time::{sleep, timeout, Duration};

pub async fn start() -> Result<(), Box<dyn std::error::Error>> {
    let config = Settings::new(None).expect("Failed to load configuration");
    eitri_utils::logging::init_with_format(&config.log.level, &config.log.format)
        .expect("Failed to initialize logger");
    info!("Starting Eitri Agent");

    info!("Waiting for server to be ready");
    server::wait_for_server_ready(&config).await?;

    let hostname = utils::resolve_hostname(&config);
    info!("Agent hostname resolved to '{}'", hostname);

    let client = Client::new();

    // Create channels for shutdown coordination
    let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);

    // Set up ctrl-c handler
    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        if let Ok(()) = ctrl_c().await {
            info!("Received shutdown signal");
            let _ = signal_tx.send(());
        }
    });

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("Shutdown complete for agent '{}'", hostname);
                return Ok(());
            }
            result = run_cycle(&config, &client, &hostname, &shutdown_tx) => {
                match result {
                    Ok(()) => info!("Release stream ended, reconnecting"),
                    Err(e) => error!("Agent cycle failed: {}", e),
                }
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Shutdown complete for agent '{}'", hostname);
                        return Ok(());
                    }
                    _ = sleep(Duration::from_secs(config.agent.retry_cooldown_seconds)) => {}
                }
            }
        }
    }
}

/// One agent session: register, start the service reporter, and consume
/// the release stream until it ends. The reporter is stopped when the
/// cycle ends so the next cycle starts a fresh reporting session.
async fn run_cycle(
    config: &Settings,
    client: &Client,
    hostname: &str,
    shutdown: &broadcast::Sender<()>,
) -> Result<(), Box<dyn std::error::Error>> {
    let registration = timeout(
        Duration::from_secs(config.agent.register_timeout_seconds),
        server::register(config, client, hostname),
    )
    .await
    .map_err(|_| "registration timed out")??;

    let mut sources: Vec<Box<dyn services::StatusSource>> = Vec::new();
    if registration.subscribe_to_containers {
        sources.push(Box::new(services::ContainerSource));
    }
    if registration.subscribe_to_service_manager {
        sources.push(Box::new(services::ServiceManagerSource::new(
            registration.watched_services.clone(),
        )));
    }

    let reporter = {
        let config = config.clone();
        let client = client.clone();
        let hostname = hostname.to_string();
        let shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            services::report_services(&config, &client, &hostname, sources, shutdown_rx).await;
        })
    };

    let result = consume_release_stream(config, client, hostname).await;

    // The reporter's session is tied to this cycle.
    reporter.abort();
    let _ = reporter.await;

    result
}

/// Consumes release envelopes from the stream until the server closes it.
/// Malformed frames are skipped; a failed installation is logged but does
/// not end the stream.
async fn consume_release_stream(
    config: &Settings,
    client: &Client,
    hostname: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let response = server::open_release_stream(config, client, hostname).await?;
    let mut stream = response.bytes_stream();
    let mut buf = Vec::new();
    let download_dir = PathBuf::from(&config.agent.download_dir);

    while let Some(line) = ndjson::next_line(&mut stream, &mut buf).await? {
        let envelope: ReleaseEnvelope = match serde_json::from_str(&line) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("malformed release frame, skipping: {}", e);
                continue;
            }
        };
        info!(
            "Received release '{}' {} from stream",
            envelope.release.name, envelope.release.version
        );
        if !installer::install_release(client, &download_dir, &envelope.release).await {
            error!(
                "Installation of '{}' {} failed",
                envelope.release.name, envelope.release.version
            );
        }
    }

    info!("Release stream closed by server");
    Ok(())
}
