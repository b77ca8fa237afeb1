/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

use crate::service::UpdateService;
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use eitri_models::models::registration::{RegisterRequest, RegisterResponse};
use serde_json::Value;

pub fn routes() -> Router<UpdateService> {
    Router::new()
        .route("/agents/register", post(register_agent))
        .route("/agents/connected", get(connected_agents))
}

async fn register_agent(
    State(service): State<UpdateService>,
    Json(request): Json<RegisterRequest>,
) -> Json<RegisterResponse> {
    Json(service.register(&request))
}

async fn connected_agents(State(service): State<UpdateService>) -> Json<Value> {
    let count = service.connected_agents().await;
    Json(serde_json::json!({ "connected": count }))
}
