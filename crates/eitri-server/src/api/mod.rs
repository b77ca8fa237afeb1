/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

use crate::service::UpdateService;
use axum::routing::get;
use axum::Router;

pub mod v1;

/// Configures all API routes for the application.
pub fn configure_api_routes(service: UpdateService) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .nest("/api/v1", v1::routes())
        .with_state(service)
}

async fn healthz() -> &'static str {
    "OK"
}

async fn readyz() -> &'static str {
    "OK"
}
