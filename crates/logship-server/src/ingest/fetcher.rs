//! Log fetching worker: the prefix state machine
//!
//! A log file's lifecycle is encoded entirely in its key prefix:
//! unprocessed -> processing -> processed. The fetcher claims files by
//! moving them to the processing prefix before handing their content to the
//! parser, and moves them to the processed prefix once the parser reports
//! them done.
//!
//! Two fetchers (or a fetcher racing a delayed finalize) can claim the same
//! unprocessed object twice. That race is tolerated: it produces duplicate
//! records downstream, which the shipper's create-conflict dedup absorbs.

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, error, info};

use logship_common::LogshipError;

use crate::config::IngestConfig;
use crate::storage::ObjectStore;

use super::stats::Health;
use super::LogFile;

/// How long to wait for a done notification before checking for new work.
const DONE_POLL_INTERVAL: Duration = Duration::from_secs(1);

pub struct LogFetcher<S> {
    store: S,
    config: IngestConfig,
    to_do: mpsc::Sender<LogFile>,
    done_tx: mpsc::UnboundedSender<String>,
    done_rx: mpsc::UnboundedReceiver<String>,
    health: Health,
}

impl<S: ObjectStore> LogFetcher<S> {
    pub fn new(
        store: S,
        config: IngestConfig,
        to_do: mpsc::Sender<LogFile>,
        done_tx: mpsc::UnboundedSender<String>,
        done_rx: mpsc::UnboundedReceiver<String>,
        health: Health,
    ) -> Self {
        Self {
            store,
            config,
            to_do,
            done_tx,
            done_rx,
            health,
        }
    }

    /// Worker loop: replenish the to-do channel when it drains, finalize
    /// files the parser reports done.
    pub async fn run(mut self) {
        loop {
            if self.to_do.capacity() == self.to_do.max_capacity() {
                self.replenish().await;
            }

            let next_done = timeout(DONE_POLL_INTERVAL, self.done_rx.recv()).await;
            match next_done {
                Ok(Some(key)) => self.finalize(key).await,
                // all done senders dropped, nothing will ever finish again
                Ok(None) => return,
                // timed out, go look for new work
                Err(_) => continue,
            }
        }
    }

    /// Claim up to one batch of unprocessed log files. Listing failures are
    /// swallowed so the loop keeps running; someone is watching /health.
    async fn replenish(&self) {
        let keys = match self
            .store
            .list(
                &self.config.unprocessed_prefix,
                self.config.file_batch_size as i32,
            )
            .await
        {
            Ok(keys) => {
                self.health.set(true);
                keys
            }
            Err(error) => {
                error!(error = %error, "failed listing unprocessed log files");
                self.health.set(false);
                return;
            }
        };

        for key in keys {
            if let Err(error) = self.claim(&key).await {
                error!(key = %key, error = %error, "failed to claim log file");
                self.health.set(false);
            }
        }
    }

    /// Move one file to the processing prefix, download it, and hand its
    /// lines to the parser.
    async fn claim(&self, key: &str) -> Result<()> {
        let processing_key = replace_prefix(
            key,
            &self.config.unprocessed_prefix,
            &self.config.processing_prefix,
        )?;

        self.store.rename(key, &processing_key).await?;

        let content = self.store.download(&processing_key).await?;
        let content = String::from_utf8(content)
            .with_context(|| format!("log file {} is not valid UTF-8", processing_key))?;
        let lines: Vec<String> = content.lines().map(str::to_string).collect();

        debug!(key = %processing_key, lines = lines.len(), "claimed log file");

        self.to_do
            .send(LogFile {
                key: processing_key,
                lines,
            })
            .await
            .map_err(|_| anyhow::anyhow!("parser channel closed"))?;

        Ok(())
    }

    /// Move a fully parsed file to the processed prefix. A storage failure
    /// puts the name back on the done channel for retry.
    async fn finalize(&mut self, key: String) {
        let processed_key = match replace_prefix(
            &key,
            &self.config.processing_prefix,
            &self.config.processed_prefix,
        ) {
            Ok(processed_key) => processed_key,
            Err(error) => {
                // retrying cannot fix a malformed key
                error!(key = %key, error = %error, "finished file has an unexpected key, leaving it in place");
                return;
            }
        };

        match self.store.rename(&key, &processed_key).await {
            Ok(()) => {
                info!(key = %key, "log file fully processed");
                self.health.set(true);
            }
            Err(error) => {
                error!(key = %key, error = %error, "failed to mark log file processed, will retry");
                let _ = self.done_tx.send(key);
                self.health.set(false);
            }
        }
    }
}

/// Swap one key prefix for another, strictly. A key outside the expected
/// prefix is an error, never silently rewritten.
fn replace_prefix(key: &str, from: &str, to: &str) -> std::result::Result<String, LogshipError> {
    match key.strip_prefix(from) {
        Some(rest) => Ok(format!("{}{}", to, rest)),
        None => Err(LogshipError::KeyOutsidePrefix {
            key: key.to_string(),
            prefix: from.to_string(),
        }),
    }
}
