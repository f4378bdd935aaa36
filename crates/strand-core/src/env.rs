//! Environment variable helpers used by the configuration layer
//!
//! ```ignore
//! use strand_core::env::{env_get, env_get_bool, env_get_millis};
//!
//! let workers: usize = env_get("STRAND_NUM_WORKERS", 4);
//! let timeout = env_get_millis("STRAND_POLL_TIMEOUT_MS", 100);
//! let verbose = env_get_bool("STRAND_TRACE_STREAMS", false);
//! ```

use std::str::FromStr;
use std::time::Duration;

/// Parse `key` as `T`, falling back to `default` when unset or malformed
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env_get_opt(key).unwrap_or(default)
}

/// `Some(T)` only if `key` is set and parses
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Boolean flag: "1", "true", "yes", "on" (any case) are true, anything
/// else set is false, unset yields `default`.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => matches!(val.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

/// Millisecond value as a `Duration`
#[inline]
pub fn env_get_millis(key: &str, default_ms: u64) -> Duration {
    Duration::from_millis(env_get(key, default_ms))
}
