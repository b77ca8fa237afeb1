/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

use crate::service::UpdateService;
use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, StatusCode},
    response::Response,
    routing::get,
    Json, Router,
};
use eitri_utils::logging::prelude::*;
use futures::StreamExt;
use serde::Deserialize;
use std::convert::Infallible;

pub fn routes() -> Router<UpdateService> {
    Router::new().route("/releases/stream", get(release_stream))
}

#[derive(Debug, Deserialize)]
struct StreamParams {
    hostname: String,
}

/// Long-lived response carrying one JSON envelope per line for every
/// release targeted at the requesting host. Ends when the server shuts
/// down.
async fn release_stream(
    State(service): State<UpdateService>,
    Query(params): Query<StreamParams>,
) -> Result<Response, (StatusCode, Json<serde_json::Value>)> {
    let stream = service
        .release_stream(params.hostname.clone())
        .await
        .map_err(|e| {
            warn!("release stream for '{}' refused: {}", params.hostname, e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({"error": "server is shutting down"})),
            )
        })?;

    let body = stream.map(|envelope| {
        let mut line = serde_json::to_string(&envelope).unwrap_or_default();
        line.push('\n');
        Ok::<_, Infallible>(line)
    });

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/x-ndjson")
        .body(Body::from_stream(body))
        .map_err(|e| {
            error!("failed to build stream response: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "failed to open stream"})),
            )
        })?;
    Ok(response)
}
