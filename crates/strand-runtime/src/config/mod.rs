//! Multiplexer configuration
//!
//! Library defaults with runtime environment overrides.
//!
//! # Configuration Priority (highest wins)
//!
//! 1. Builder calls
//! 2. Environment variables
//! 3. Library defaults (`defaults`)
//!
//! # Example
//!
//! ```rust,ignore
//! use strand_runtime::MultiplexerConfig;
//!
//! let config = MultiplexerConfig::from_env()
//!     .num_workers(8)
//!     .poll_timeout(Duration::from_millis(20));
//! ```

pub mod defaults;

use std::time::Duration;
use strand_core::env::{env_get, env_get_millis};
use strand_core::{Result, StrandError};

/// Multiplexer configuration with builder pattern.
#[derive(Debug, Clone)]
pub struct MultiplexerConfig {
    /// Number of worker threads
    pub num_workers: usize,
    /// Longest a single readiness poll may block
    pub poll_timeout: Duration,
    /// Pause after a failed poll before retrying
    pub poll_backoff: Duration,
    /// Idle worker park timeout
    pub park_timeout: Duration,
    /// Staging buffer size for built-in streams
    pub buffer_size: usize,
}

impl Default for MultiplexerConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(defaults::FALLBACK_WORKERS)
        .clamp(1, defaults::MAX_WORKERS)
}

impl MultiplexerConfig {
    /// Defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `STRAND_NUM_WORKERS` - Number of worker threads
    /// - `STRAND_POLL_TIMEOUT_MS` - Poll timeout in milliseconds
    /// - `STRAND_POLL_BACKOFF_MS` - Backoff after poll failure
    /// - `STRAND_PARK_TIMEOUT_MS` - Idle worker park timeout
    /// - `STRAND_BUFFER_SIZE` - Stream staging buffer size
    pub fn from_env() -> Self {
        Self {
            num_workers: env_get("STRAND_NUM_WORKERS", default_workers()),
            poll_timeout: env_get_millis("STRAND_POLL_TIMEOUT_MS", defaults::POLL_TIMEOUT_MS),
            poll_backoff: env_get_millis("STRAND_POLL_BACKOFF_MS", defaults::POLL_BACKOFF_MS),
            park_timeout: env_get_millis("STRAND_PARK_TIMEOUT_MS", defaults::PARK_TIMEOUT_MS),
            buffer_size: env_get("STRAND_BUFFER_SIZE", defaults::BUFFER_SIZE),
        }
    }

    /// Plain defaults, no environment lookups. Useful in tests.
    pub fn new() -> Self {
        Self {
            num_workers: default_workers(),
            poll_timeout: Duration::from_millis(defaults::POLL_TIMEOUT_MS),
            poll_backoff: Duration::from_millis(defaults::POLL_BACKOFF_MS),
            park_timeout: Duration::from_millis(defaults::PARK_TIMEOUT_MS),
            buffer_size: defaults::BUFFER_SIZE,
        }
    }

    // Builder methods

    pub fn num_workers(mut self, n: usize) -> Self {
        self.num_workers = n;
        self
    }

    pub fn poll_timeout(mut self, d: Duration) -> Self {
        self.poll_timeout = d;
        self
    }

    pub fn poll_backoff(mut self, d: Duration) -> Self {
        self.poll_backoff = d;
        self
    }

    pub fn park_timeout(mut self, d: Duration) -> Self {
        self.park_timeout = d;
        self
    }

    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_workers == 0 {
            return Err(StrandError::Config("num_workers must be > 0"));
        }
        if self.num_workers > defaults::MAX_WORKERS {
            return Err(StrandError::Config("num_workers must be <= 64"));
        }
        if self.park_timeout.is_zero() {
            return Err(StrandError::Config("park_timeout must be > 0"));
        }
        if self.buffer_size == 0 {
            return Err(StrandError::Config("buffer_size must be > 0"));
        }
        Ok(())
    }

    /// Emit the effective configuration at info level
    pub fn log(&self) {
        tracing::info!(
            num_workers = self.num_workers,
            poll_timeout_ms = self.poll_timeout.as_millis() as u64,
            poll_backoff_ms = self.poll_backoff.as_millis() as u64,
            park_timeout_ms = self.park_timeout.as_millis() as u64,
            buffer_size = self.buffer_size,
            "multiplexer configuration"
        );
    }
}
