//! Document shipping worker
//!
//! Pulls identified documents off the record channel and indexes them with
//! create-only semantics. A conflict means the document was already indexed
//! (possibly by an earlier attempt or a duplicate claim upstream) and is
//! counted, not retried. Transient failures requeue the record, so delivery
//! is at-least-once and the conflict path absorbs the redeliveries.

use std::sync::Arc;

use chrono::DateTime;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use logship_common::LogshipError;

use crate::search::{DocumentStore, IndexOutcome};

use super::stats::ShipperStats;
use super::Record;

pub struct Shipper<S> {
    search: S,
    records_in: mpsc::UnboundedReceiver<Record>,
    retry_out: mpsc::UnboundedSender<Record>,
    index_pattern: String,
    stats: Arc<ShipperStats>,
}

impl<S: DocumentStore> Shipper<S> {
    pub fn new(
        search: S,
        records_in: mpsc::UnboundedReceiver<Record>,
        retry_out: mpsc::UnboundedSender<Record>,
        index_pattern: String,
        stats: Arc<ShipperStats>,
    ) -> Self {
        Self {
            search,
            records_in,
            retry_out,
            index_pattern,
            stats,
        }
    }

    /// Worker loop: runs until the record channel closes.
    pub async fn run(mut self) {
        while let Some(record) = self.records_in.recv().await {
            self.index_record(record).await;
        }
    }

    async fn index_record(&self, record: Record) {
        let index = match index_for(&record.document, &self.index_pattern) {
            Ok(index) => index,
            Err(error) => {
                // a document without a usable timestamp will never index
                self.stats.increment_documents_errored();
                error!(id = %record.id, error = %error, "document has no usable timestamp, dropping");
                return;
            }
        };

        match self.search.create(&index, &record.id, &record.document).await {
            Ok(IndexOutcome::Created) => {
                self.stats.increment_documents_indexed();
                self.stats.mark_document_indexed();
                debug!(id = %record.id, index = %index, "indexed document");
            }
            Ok(IndexOutcome::Conflict) => {
                self.stats.increment_duplicates_skipped();
                info!(id = %record.id, "skipping duplicate document");
            }
            Err(error) => {
                self.stats.increment_documents_errored();
                error!(id = %record.id, error = %error, "failed to index document, requeueing");
                let _ = self.retry_out.send(record);
            }
        }
    }
}

/// Derive the target index from the document's `@timestamp` and the
/// configured date pattern (daily rollover by default).
fn index_for(document: &Value, pattern: &str) -> std::result::Result<String, LogshipError> {
    let timestamp = document
        .get("@timestamp")
        .and_then(Value::as_str)
        .ok_or_else(|| LogshipError::Timestamp("missing @timestamp".to_string()))?;

    let parsed = DateTime::parse_from_rfc3339(timestamp)
        .map_err(|e| LogshipError::Timestamp(format!("{:?}: {}", timestamp, e)))?;

    Ok(parsed.format(pattern).to_string())
}
