/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # Server Communication Module
//!
//! Handles all communication between the agent and the Eitri server.
//!
//! ## Core Functions
//!
//! ### Server Health Check
//! ```text
//! pub async fn wait_for_server_ready(config: &Settings) -> Result<(), Box<dyn std::error::Error>>
//! ```
//! Waits for the server to become available, retrying with a fixed delay.
//!
//! ### Registration
//! ```text
//! pub async fn register(config: &Settings, client: &Client, hostname: &str)
//!     -> Result<RegisterResponse, Box<dyn std::error::Error>>
//! ```
//! Announces the agent and learns which collectors it should run.
//!
//! ### Release Stream
//! ```text
//! pub async fn open_release_stream(config: &Settings, client: &Client, hostname: &str)
//!     -> Result<reqwest::Response, Box<dyn std::error::Error>>
//! ```
//! Opens the long-lived release stream for this host.

use eitri_models::models::registration::{RegisterRequest, RegisterResponse};
use eitri_utils::config::Settings;
use eitri_utils::logging::prelude::*;
use reqwest::Client;
use std::time::Duration;
use tokio::time::sleep;

/// Waits for the server to become ready, polling `/readyz`.
///
/// # Arguments
/// * `config` - Application settings containing server configuration
pub async fn wait_for_server_ready(config: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    let client = Client::new();
    let readyz_url = format!("{}/readyz", config.agent.server_url);

    for attempt in 1..=config.agent.max_retries {
        match client.get(&readyz_url).send().await {
            Ok(response) => {
                if response.status().is_success() {
                    info!("Successfully connected to server at {}", readyz_url);
                    return Ok(());
                }
                warn!(
                    "Server at {} returned non-success status: {}",
                    readyz_url,
                    response.status()
                );
            }
            Err(e) => {
                warn!(
                    "Failed to connect to server at {} (attempt {}/{}): {:?}",
                    readyz_url, attempt, config.agent.max_retries, e
                );
            }
        }
        if attempt < config.agent.max_retries {
            sleep(Duration::from_secs(1)).await;
        }
    }
    Err(format!(
        "failed to connect to server at {} after {} attempts",
        readyz_url, config.agent.max_retries
    )
    .into())
}

/// Registers the agent with the server and returns its subscription flags
/// and watched-service list.
pub async fn register(
    config: &Settings,
    client: &Client,
    hostname: &str,
) -> Result<RegisterResponse, Box<dyn std::error::Error>> {
    let url = format!("{}/api/v1/agents/register", config.agent.server_url);
    let request = RegisterRequest {
        hostname: hostname.to_string(),
        timestamp: chrono::Utc::now(),
    };

    let response = client.post(&url).json(&request).send().await?;
    if !response.status().is_success() {
        return Err(format!("registration failed with status {}", response.status()).into());
    }

    let registration: RegisterResponse = response.json().await?;
    info!(
        "Registered with server (containers: {}, service manager: {}, {} watched service(s))",
        registration.subscribe_to_containers,
        registration.subscribe_to_service_manager,
        registration.watched_services.len()
    );
    Ok(registration)
}

/// Opens the long-lived release stream for this host. The caller consumes
/// the response body as newline-delimited JSON envelopes.
pub async fn open_release_stream(
    config: &Settings,
    client: &Client,
    hostname: &str,
) -> Result<reqwest::Response, Box<dyn std::error::Error>> {
    let url = format!("{}/api/v1/releases/stream", config.agent.server_url);
    let response = client
        .get(&url)
        .query(&[("hostname", hostname)])
        .send()
        .await?;
    if !response.status().is_success() {
        return Err(format!("release stream refused with status {}", response.status()).into());
    }
    info!("Release stream opened for '{}'", hostname);
    Ok(response)
}
