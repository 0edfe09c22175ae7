//! HTTP ingress for SDK envelopes.
//!
//! The accept path is synchronous only for decompress + decode + enqueue;
//! all storage writes happen in background workers.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use chrono::Utc;
use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use std::io::Read as IoRead;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::debug;
use utoipa::{OpenApi, ToSchema};

use faultline_core::IngestEventJob;
use faultline_queue::{QueueService, QueueServiceError};

use crate::envelope::Envelope;

#[derive(OpenApi)]
#[openapi(
    paths(ingest_envelope),
    components(schemas(EventIngestResponse)),
    tags(
        (name = "ingest", description = "SDK-compatible envelope ingest endpoints")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub queue: QueueService,
}

pub fn configure_routes() -> Router<Arc<AppState>> {
    // Browser SDKs post envelopes cross-origin, so CORS must be wide open
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers(Any);

    Router::new()
        .route("/{project_id}/envelope/", post(ingest_envelope))
        .layer(cors)
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct EventIngestResponse {
    /// Accepted event id, envelope id, or a generated id, in that order.
    pub id: String,
}

/// Ingest an SDK envelope (binary payload)
#[utoipa::path(
    post,
    path = "/api/{project_id}/envelope/",
    params(
        ("project_id" = i32, Path, description = "Project ID")
    ),
    request_body(content = String, description = "Envelope as binary data", content_type = "application/octet-stream"),
    responses(
        (status = 200, description = "Envelope accepted", body = EventIngestResponse),
        (status = 400, description = "Bad request"),
        (status = 503, description = "Ingestion queue saturated"),
    ),
    tag = "ingest"
)]
async fn ingest_envelope(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<i32>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let decompressed_body = match decompress_if_needed(&headers, &body) {
        Ok(data) => data,
        Err(e) => {
            tracing::warn!("Failed to decompress envelope: {}", e);
            return (
                StatusCode::BAD_REQUEST,
                format!("Failed to decompress envelope: {}", e),
            )
                .into_response();
        }
    };

    let envelope = match Envelope::from_slice(&decompressed_body) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!("Failed to parse envelope: {}", e);
            return (
                StatusCode::BAD_REQUEST,
                format!("Failed to parse envelope: {}", e),
            )
                .into_response();
        }
    };

    // Event payloads must be JSON objects; anything else is a client error
    let mut events = Vec::new();
    for item in envelope.event_items() {
        match serde_json::from_slice::<serde_json::Value>(&item.payload) {
            Ok(payload) if payload.is_object() => events.push(payload),
            Ok(_) => {
                return (
                    StatusCode::BAD_REQUEST,
                    "Event payload is not a JSON object".to_string(),
                )
                    .into_response();
            }
            Err(e) => {
                return (
                    StatusCode::BAD_REQUEST,
                    format!("Invalid event payload: {}", e),
                )
                    .into_response();
            }
        }
    }

    debug!(
        "Accepted envelope for project {}: {} event(s)",
        project_id,
        events.len()
    );

    // Acknowledge with the first event's id, the envelope id, or a fresh one
    let ack_id = events
        .first()
        .and_then(|payload| payload.get("event_id"))
        .and_then(|id| id.as_str())
        .map(str::to_string)
        .or_else(|| envelope.header().event_id.clone())
        .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());

    let received_at = Utc::now();
    for payload in events {
        let event_id = payload
            .get("event_id")
            .and_then(|id| id.as_str())
            .map(str::to_string);

        let job = IngestEventJob {
            project_id,
            event_id,
            event_payload: payload,
            received_at,
            attempt: 0,
        };

        if let Err(e) = state.queue.launch_event_ingestion(job) {
            tracing::error!("Failed to enqueue event: {}", e);
            let status = match e {
                QueueServiceError::QueueFull { .. } => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            return (status, format!("Failed to enqueue event: {}", e)).into_response();
        }
    }

    (StatusCode::OK, Json(EventIngestResponse { id: ack_id })).into_response()
}

/// Decompress the request body if it's gzip-compressed.
/// SDKs send gzip-compressed envelopes with a Content-Encoding: gzip header;
/// any other encoding passes through unchanged.
fn decompress_if_needed(headers: &HeaderMap, body: &Bytes) -> Result<Bytes, String> {
    let is_gzip = headers
        .get("content-encoding")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_lowercase().contains("gzip"))
        .unwrap_or(false);

    if !is_gzip {
        return Ok(body.clone());
    }

    let mut decoder = GzDecoder::new(&body[..]);
    let mut decompressed = Vec::new();

    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| format!("Failed to decompress gzip data: {}", e))?;

    tracing::debug!(
        "Decompressed envelope: {} bytes -> {} bytes",
        body.len(),
        decompressed.len()
    );

    Ok(Bytes::from(decompressed))
}
