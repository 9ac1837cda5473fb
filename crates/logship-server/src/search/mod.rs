//! Elasticsearch client
//!
//! Thin HTTP client over the two operations the shipper needs: create-only
//! document indexing and a connectivity probe. Create-only indexing
//! (`PUT /{index}/_create/{id}`) is what makes dedup work: indexing an id
//! that already exists returns 409 instead of overwriting.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::debug;

/// Result of a create-only index request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOutcome {
    /// The document was newly indexed.
    Created,
    /// A document with this id already exists.
    Conflict,
}

/// The search engine operations the shipper and health endpoint need.
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// Index a document if and only if its id is not already present.
    async fn create(&self, index: &str, id: &str, document: &Value) -> Result<IndexOutcome>;

    /// Probe connectivity; false on any failure.
    async fn ping(&self) -> bool;
}

#[derive(Clone)]
pub struct ElasticsearchClient {
    http: reqwest::Client,
    base_url: String,
}

impl ElasticsearchClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }
}

#[async_trait]
impl DocumentStore for ElasticsearchClient {
    async fn create(&self, index: &str, id: &str, document: &Value) -> Result<IndexOutcome> {
        let url = format!("{}/{}/_create/{}", self.base_url, index, id);

        let response = self
            .http
            .put(&url)
            .json(document)
            .send()
            .await
            .context("Failed to send create request to Elasticsearch")?;

        let status = response.status();
        if status.is_success() {
            debug!(index = %index, id = %id, "created document");
            return Ok(IndexOutcome::Created);
        }
        if status == StatusCode::CONFLICT {
            return Ok(IndexOutcome::Conflict);
        }

        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("Elasticsearch create returned {}: {}", status, body)
    }

    async fn ping(&self) -> bool {
        match self.http.get(&self.base_url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}
