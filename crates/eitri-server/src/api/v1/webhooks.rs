/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

use crate::service::UpdateService;
use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use eitri_models::models::releases::GithubReleaseEvent;
use eitri_utils::logging::prelude::*;

pub fn routes() -> Router<UpdateService> {
    Router::new().route("/webhooks/github", post(github_release))
}

/// Accepts GitHub release webhooks. Every well-formed payload is accepted;
/// events that match no configured package are dropped after logging, so
/// the sender never sees retries for topology mismatches.
async fn github_release(
    State(service): State<UpdateService>,
    Json(event): Json<GithubReleaseEvent>,
) -> StatusCode {
    if let Some(action) = &event.action {
        if action != "published" {
            debug!("ignoring github release action '{}'", action);
            return StatusCode::ACCEPTED;
        }
    }
    service.propagate_release(&event);
    StatusCode::ACCEPTED
}
