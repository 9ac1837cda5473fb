//! Status and health HTTP surface
//!
//! Two read-only endpoints over the state the pipeline publishes:
//! `GET /stats` for the counters, `GET /health` for connectivity. Health
//! returns 500 unless both the object store and the search engine look
//! reachable.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::ingest::stats::{Health, ParserStats, ShipperStats};
use crate::search::DocumentStore;

/// State shared across handlers.
#[derive(Clone)]
pub struct ApiState {
    pub parser_stats: Arc<ParserStats>,
    pub shipper_stats: Arc<ShipperStats>,
    pub storage_health: Health,
    pub search: Arc<dyn DocumentStore>,
}

/// Build the status router.
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/stats", get(get_stats))
        .route("/health", get(get_health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Statistics handler
async fn get_stats(State(state): State<ApiState>) -> impl IntoResponse {
    let parser = state.parser_stats.snapshot();
    let shipper = state.shipper_stats.snapshot();

    Json(json!({
        "parser": {
            "lines_processed": parser.lines_processed,
            "lines_errored": parser.lines_errored,
            "files_processed": parser.files_processed,
            "last_new_file_time": parser.last_new_file_time.to_string(),
        },
        "shipper": {
            "documents_indexed": shipper.documents_indexed,
            "documents_errored": shipper.documents_errored,
            "duplicates_skipped": shipper.duplicates_skipped,
            "last_document_indexed_at": shipper.last_document_indexed_at.to_string(),
        },
    }))
}

/// Health handler. The search engine is probed on demand; storage health is
/// whatever the fetcher last observed.
async fn get_health(State(state): State<ApiState>) -> Response {
    let elasticsearch_connected = state.search.ping().await;
    let s3_connected = state.storage_health.is_healthy();
    let up = elasticsearch_connected && s3_connected;

    let body = Json(json!({
        "elasticsearch_connected": elasticsearch_connected,
        "s3_connected": s3_connected,
        "status": if up { "UP" } else { "DOWN" },
    }));

    let status = if up {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };

    (status, body).into_response()
}
