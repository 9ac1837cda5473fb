//! Thread-safe stat trackers for the parser and shipper workers
//!
//! Each worker owns one stats struct; the status endpoint reads them. All
//! reads and writes go through one lock per struct so multi-field snapshots
//! are never torn.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};

/// Counters published by the parser worker.
#[derive(Debug)]
pub struct ParserStats {
    inner: Mutex<ParserCounters>,
}

#[derive(Debug, Clone)]
struct ParserCounters {
    lines_processed: u64,
    lines_errored: u64,
    files_processed: u64,
    last_new_file_time: DateTime<Utc>,
}

/// A consistent point-in-time read of [`ParserStats`].
#[derive(Debug, Clone)]
pub struct ParserSnapshot {
    pub lines_processed: u64,
    pub lines_errored: u64,
    pub files_processed: u64,
    pub last_new_file_time: DateTime<Utc>,
}

impl ParserStats {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ParserCounters {
                lines_processed: 0,
                lines_errored: 0,
                files_processed: 0,
                last_new_file_time: DateTime::<Utc>::MIN_UTC,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ParserCounters> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn increment_lines_processed(&self) {
        self.lock().lines_processed += 1;
    }

    pub fn increment_lines_errored(&self) {
        self.lock().lines_errored += 1;
    }

    pub fn increment_files_processed(&self) {
        self.lock().files_processed += 1;
    }

    /// Record the pickup time of a new file batch.
    pub fn mark_new_file(&self) {
        self.lock().last_new_file_time = Utc::now();
    }

    pub fn snapshot(&self) -> ParserSnapshot {
        let counters = self.lock();
        ParserSnapshot {
            lines_processed: counters.lines_processed,
            lines_errored: counters.lines_errored,
            files_processed: counters.files_processed,
            last_new_file_time: counters.last_new_file_time,
        }
    }
}

impl Default for ParserStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Counters published by the shipper worker.
#[derive(Debug)]
pub struct ShipperStats {
    inner: Mutex<ShipperCounters>,
}

#[derive(Debug, Clone)]
struct ShipperCounters {
    documents_indexed: u64,
    documents_errored: u64,
    duplicates_skipped: u64,
    last_document_time: DateTime<Utc>,
}

/// A consistent point-in-time read of [`ShipperStats`].
#[derive(Debug, Clone)]
pub struct ShipperSnapshot {
    pub documents_indexed: u64,
    pub documents_errored: u64,
    pub duplicates_skipped: u64,
    pub last_document_indexed_at: DateTime<Utc>,
}

impl ShipperStats {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ShipperCounters {
                documents_indexed: 0,
                documents_errored: 0,
                duplicates_skipped: 0,
                last_document_time: DateTime::<Utc>::MIN_UTC,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ShipperCounters> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn increment_documents_indexed(&self) {
        self.lock().documents_indexed += 1;
    }

    pub fn increment_documents_errored(&self) {
        self.lock().documents_errored += 1;
    }

    pub fn increment_duplicates_skipped(&self) {
        self.lock().duplicates_skipped += 1;
    }

    /// Record the time of the latest successful index operation.
    pub fn mark_document_indexed(&self) {
        self.lock().last_document_time = Utc::now();
    }

    pub fn snapshot(&self) -> ShipperSnapshot {
        let counters = self.lock();
        ShipperSnapshot {
            documents_indexed: counters.documents_indexed,
            documents_errored: counters.documents_errored,
            duplicates_skipped: counters.duplicates_skipped,
            last_document_indexed_at: counters.last_document_time,
        }
    }
}

impl Default for ShipperStats {
    fn default() -> Self {
        Self::new()
    }
}

/// A shared boolean health flag, owned by the worker that writes it and
/// read by the status endpoint. Reflects only the last operation's outcome.
#[derive(Debug, Clone)]
pub struct Health {
    healthy: Arc<AtomicBool>,
}

impl Health {
    pub fn new() -> Self {
        Self {
            healthy: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn set(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::Relaxed);
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }
}

impl Default for Health {
    fn default() -> Self {
        Self::new()
    }
}
