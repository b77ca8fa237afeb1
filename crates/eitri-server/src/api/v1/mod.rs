/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

mod agents;
mod releases;
mod services;
mod webhooks;

use crate::service::UpdateService;
use axum::Router;

pub fn routes() -> Router<UpdateService> {
    Router::new()
        .merge(agents::routes())
        .merge(releases::routes())
        .merge(services::routes())
        .merge(webhooks::routes())
}
