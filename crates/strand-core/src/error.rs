//! Error types for multiplexer operations
//!
//! Per-connection I/O problems are not errors at this level; they travel
//! as `Condition` values through the stream chain. `StrandError` covers
//! API misuse and scheduler-level failures.

use crate::id::{DescriptorId, JobId};
use nix::errno::Errno;
use thiserror::Error;

/// Result type for multiplexer operations
pub type Result<T> = std::result::Result<T, StrandError>;

#[derive(Debug, Error)]
pub enum StrandError {
    /// Stream added to, or application write on, a closing descriptor
    #[error("descriptor is closing")]
    DescriptorClosing,

    #[error("{0} not found")]
    JobNotFound(JobId),

    #[error("{0} is not registered")]
    DescriptorNotRegistered(DescriptorId),

    /// Operation does not apply to this kind of job
    #[error("{0} does not accept this operation")]
    InvalidJobKind(JobId),

    #[error("multiplexer is shutting down")]
    ShuttingDown,

    #[error("periodic interval must be non-zero")]
    InvalidInterval,

    #[error("invalid config: {0}")]
    Config(&'static str),

    #[error("readiness poll failed: {0}")]
    Poll(Errno),

    #[error("os error: {0}")]
    Os(#[from] Errno),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to spawn thread: {0}")]
    Spawn(std::io::Error),
}
