//! Library defaults for `MultiplexerConfig`

/// Upper bound on worker threads
pub const MAX_WORKERS: usize = 64;

/// Used when available parallelism cannot be determined
pub const FALLBACK_WORKERS: usize = 4;

/// Longest a single readiness poll may block
pub const POLL_TIMEOUT_MS: u64 = 100;

/// Pause after a failed poll before retrying
pub const POLL_BACKOFF_MS: u64 = 50;

/// Idle worker park timeout
pub const PARK_TIMEOUT_MS: u64 = 10;

/// Default stream staging buffer size
pub const BUFFER_SIZE: usize = 8192;
