//! Configuration management

use serde::{Deserialize, Serialize};

// ============================================================================
// Server Configuration Constants
// ============================================================================

/// Default server host binding.
pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";

/// Default server port.
pub const DEFAULT_SERVER_PORT: u16 = 13131;

/// Default shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Default key prefix for log files that have not been claimed yet.
pub const DEFAULT_UNPROCESSED_PREFIX: &str = "logs/";

/// Default key prefix for log files currently being processed.
pub const DEFAULT_PROCESSING_PREFIX: &str = "logs-working/";

/// Default key prefix for fully processed log files.
pub const DEFAULT_PROCESSED_PREFIX: &str = "logs-done/";

/// Default number of log files to claim per listing.
pub const DEFAULT_FILE_BATCH_SIZE: usize = 5;

/// Default Elasticsearch base URL.
pub const DEFAULT_ELASTICSEARCH_URL: &str = "http://localhost:9200";

/// Default index name pattern (chrono format string, daily rollover).
pub const DEFAULT_INDEX_PATTERN: &str = "logs-%Y.%m.%d";

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub ingest: IngestConfig,
    pub search: SearchConfig,
}

/// Server-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_secs: u64,
}

/// Ingestion pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub unprocessed_prefix: String,
    pub processing_prefix: String,
    pub processed_prefix: String,
    pub file_batch_size: usize,
}

/// Search engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub url: String,
    pub index_pattern: String,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config {
            server: ServerConfig {
                host: std::env::var("LOGSHIP_HOST")
                    .unwrap_or_else(|_| DEFAULT_SERVER_HOST.to_string()),
                port: std::env::var("LOGSHIP_PORT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_SERVER_PORT),
                shutdown_timeout_secs: std::env::var("LOGSHIP_SHUTDOWN_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
            },
            ingest: IngestConfig {
                unprocessed_prefix: std::env::var("LOGSHIP_UNPROCESSED_PREFIX")
                    .unwrap_or_else(|_| DEFAULT_UNPROCESSED_PREFIX.to_string()),
                processing_prefix: std::env::var("LOGSHIP_PROCESSING_PREFIX")
                    .unwrap_or_else(|_| DEFAULT_PROCESSING_PREFIX.to_string()),
                processed_prefix: std::env::var("LOGSHIP_PROCESSED_PREFIX")
                    .unwrap_or_else(|_| DEFAULT_PROCESSED_PREFIX.to_string()),
                file_batch_size: std::env::var("LOGSHIP_FILE_BATCH_SIZE")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_FILE_BATCH_SIZE),
            },
            search: SearchConfig {
                url: std::env::var("ELASTICSEARCH_URL")
                    .unwrap_or_else(|_| DEFAULT_ELASTICSEARCH_URL.to_string()),
                index_pattern: std::env::var("LOGSHIP_INDEX_PATTERN")
                    .unwrap_or_else(|_| DEFAULT_INDEX_PATTERN.to_string()),
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port must be greater than 0");
        }

        if self.ingest.file_batch_size == 0 {
            anyhow::bail!("File batch size must be greater than 0");
        }

        let prefixes = [
            &self.ingest.unprocessed_prefix,
            &self.ingest.processing_prefix,
            &self.ingest.processed_prefix,
        ];

        for prefix in prefixes {
            if prefix.is_empty() {
                anyhow::bail!("Key prefixes cannot be empty");
            }
        }

        // A shared prefix would break the unprocessed/processing/processed
        // state machine: objects would never leave a stage.
        for (i, a) in prefixes.iter().enumerate() {
            for b in prefixes.iter().skip(i + 1) {
                if a == b {
                    anyhow::bail!("Key prefixes must be distinct, got {:?} twice", a);
                }
            }
        }

        if self.search.url.is_empty() {
            anyhow::bail!("Elasticsearch URL cannot be empty");
        }

        if self.search.index_pattern.is_empty() {
            anyhow::bail!("Index pattern cannot be empty");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: DEFAULT_SERVER_HOST.to_string(),
                port: DEFAULT_SERVER_PORT,
                shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            },
            ingest: IngestConfig {
                unprocessed_prefix: DEFAULT_UNPROCESSED_PREFIX.to_string(),
                processing_prefix: DEFAULT_PROCESSING_PREFIX.to_string(),
                processed_prefix: DEFAULT_PROCESSED_PREFIX.to_string(),
                file_batch_size: DEFAULT_FILE_BATCH_SIZE,
            },
            search: SearchConfig {
                url: DEFAULT_ELASTICSEARCH_URL.to_string(),
                index_pattern: DEFAULT_INDEX_PATTERN.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_zero_port_rejected() {
        let mut config = Config::default();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let mut config = Config::default();
        config.ingest.file_batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_prefixes_rejected() {
        let mut config = Config::default();
        config.ingest.processed_prefix = config.ingest.unprocessed_prefix.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_prefix_rejected() {
        let mut config = Config::default();
        config.ingest.processing_prefix = String::new();
        assert!(config.validate().is_err());
    }
}
