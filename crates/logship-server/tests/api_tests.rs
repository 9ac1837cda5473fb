//! Integration tests for the status endpoints

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::util::ServiceExt;

use logship_server::api::{router, ApiState};
use logship_server::ingest::stats::{Health, ParserStats, ShipperStats};
use logship_server::search::{DocumentStore, IndexOutcome};

/// Document store whose ping always answers the same way.
struct StaticPing(bool);

#[async_trait]
impl DocumentStore for StaticPing {
    async fn create(&self, _index: &str, _id: &str, _document: &Value) -> Result<IndexOutcome> {
        Ok(IndexOutcome::Created)
    }

    async fn ping(&self) -> bool {
        self.0
    }
}

fn state(elasticsearch_up: bool, storage_up: bool) -> ApiState {
    let storage_health = Health::new();
    storage_health.set(storage_up);
    ApiState {
        parser_stats: Arc::new(ParserStats::new()),
        shipper_stats: Arc::new(ShipperStats::new()),
        storage_health,
        search: Arc::new(StaticPing(elasticsearch_up)),
    }
}

async fn get(state: ApiState, uri: &str) -> (StatusCode, Value) {
    let response = router(state)
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap();
    (status, body)
}

#[tokio::test]
async fn test_health_up_when_both_connected() {
    let (status, body) = get(state(true, true), "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "UP");
    assert_eq!(body["elasticsearch_connected"], true);
    assert_eq!(body["s3_connected"], true);
}

#[tokio::test]
async fn test_health_down_when_elasticsearch_unreachable() {
    let (status, body) = get(state(false, true), "/health").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["status"], "DOWN");
    assert_eq!(body["elasticsearch_connected"], false);
    assert_eq!(body["s3_connected"], true);
}

#[tokio::test]
async fn test_health_down_when_storage_unhealthy() {
    let (status, body) = get(state(true, false), "/health").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["status"], "DOWN");
    assert_eq!(body["s3_connected"], false);
}

#[tokio::test]
async fn test_stats_reports_counters() {
    let state = state(true, true);
    state.parser_stats.increment_lines_processed();
    state.parser_stats.increment_lines_processed();
    state.parser_stats.increment_lines_errored();
    state.parser_stats.increment_files_processed();
    state.shipper_stats.increment_documents_indexed();
    state.shipper_stats.increment_duplicates_skipped();

    let (status, body) = get(state, "/stats").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["parser"]["lines_processed"], 2);
    assert_eq!(body["parser"]["lines_errored"], 1);
    assert_eq!(body["parser"]["files_processed"], 1);
    assert_eq!(body["shipper"]["documents_indexed"], 1);
    assert_eq!(body["shipper"]["documents_errored"], 0);
    assert_eq!(body["shipper"]["duplicates_skipped"], 1);

    // timestamps serialize as their string representation
    assert!(body["parser"]["last_new_file_time"].is_string());
    assert!(body["shipper"]["last_document_indexed_at"].is_string());
}
