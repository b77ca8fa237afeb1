/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

use crate::service::UpdateService;
use axum::{body::Body, extract::State, http::StatusCode, routing::post, Router};
use eitri_models::models::services::ServicesReport;
use eitri_utils::logging::prelude::*;
use eitri_utils::ndjson;
use futures::stream::BoxStream;

pub fn routes() -> Router<UpdateService> {
    Router::new().route("/services/stream", post(services_stream))
}

/// Consumes an agent's long-lived report upload. Each request body line is
/// one JSON report; the handler returns once the agent closes the body.
async fn services_stream(State(service): State<UpdateService>, body: Body) -> StatusCode {
    let reports = report_stream(body.into_data_stream());
    service.ingest_services(reports).await;
    StatusCode::OK
}

/// Adapts the raw chunked body into a stream of parsed reports. Lines that
/// fail to parse are logged and skipped; transport errors end the stream.
fn report_stream(
    body: axum::body::BodyDataStream,
) -> BoxStream<'static, Result<ServicesReport, axum::Error>> {
    let stream = futures::stream::unfold(
        (body, Vec::new()),
        |(mut body, mut buf)| async move {
            loop {
                match ndjson::next_line(&mut body, &mut buf).await {
                    Ok(Some(line)) => match serde_json::from_str::<ServicesReport>(&line) {
                        Ok(report) => return Some((Ok(report), (body, buf))),
                        Err(e) => {
                            warn!("malformed services report line, skipping: {}", e);
                            continue;
                        }
                    },
                    Ok(None) => return None,
                    Err(e) => return Some((Err(e), (body, buf))),
                }
            }
        },
    );
    Box::pin(stream)
}
