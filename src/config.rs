//! Configuration for viewfold
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

/// Main configuration for a viewfold instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Index Configuration
    // -------------------------------------------------------------------------
    /// Path of the view index file served by this instance
    pub index_path: PathBuf,

    /// Upper bound on a header payload, guards against corrupt length fields
    pub max_header_size: usize,

    // -------------------------------------------------------------------------
    // Query Configuration
    // -------------------------------------------------------------------------
    /// Rows returned by a query that does not pass `limit`
    pub default_limit: u64,

    /// Hard cap on `limit`
    pub max_limit: u64,

    /// Rows buffered between the traversal thread and the response body
    pub chunk_queue_depth: usize,

    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// HTTP listen address
    pub listen_addr: String,

    /// Worker threads pulling requests off the listener
    pub worker_threads: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            index_path: PathBuf::from("./view.index"),
            max_header_size: 64 * 1024, // 64 KB
            default_limit: 5,
            max_limit: 10_000,
            chunk_queue_depth: 64,
            listen_addr: "0.0.0.0:8081".to_string(),
            worker_threads: 8,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Clamp a requested row limit to the configured cap
    pub fn effective_limit(&self, requested: Option<u64>) -> u64 {
        requested.unwrap_or(self.default_limit).min(self.max_limit)
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the index file path
    pub fn index_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.index_path = path.into();
        self
    }

    /// Set the maximum accepted header payload (in bytes)
    pub fn max_header_size(mut self, size: usize) -> Self {
        self.config.max_header_size = size;
        self
    }

    /// Set the default row limit
    pub fn default_limit(mut self, limit: u64) -> Self {
        self.config.default_limit = limit;
        self
    }

    /// Set the maximum row limit
    pub fn max_limit(mut self, limit: u64) -> Self {
        self.config.max_limit = limit;
        self
    }

    /// Set the depth of the per-query row queue
    pub fn chunk_queue_depth(mut self, depth: usize) -> Self {
        self.config.chunk_queue_depth = depth;
        self
    }

    /// Set the HTTP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the number of worker threads
    pub fn worker_threads(mut self, count: usize) -> Self {
        self.config.worker_threads = count;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
