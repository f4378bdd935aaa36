//! The low-level I/O end of a descriptor.
//!
//! An `Endpoint` wraps exactly one OS handle (socket, pipe, file,
//! terminal) or an in-memory stand-in. It is the bottom of every stream
//! chain: when no stream handles a read or write, it lands here.
//!
//! # Implementors (in `strand-runtime`)
//!
//! - `FdEndpoint`: any non-blocking file descriptor.
//! - `MemoryEndpoint`: fd-less loopback; readiness arrives via
//!   `Multiplexer::notify`.

use crate::condition::Condition;
use std::os::fd::RawFd;

/// Raw readable/writable endpoint.
///
/// **Contract:**
/// - `read`/`write` must not block; "nothing right now" is `Wait`.
/// - A read of zero bytes from a live peer is `End`, not `Ok`.
/// - After `release()` every call returns `(0, Close)`.
pub trait Endpoint: Send {
    /// Read into `dst`.
    fn read(&mut self, dst: &mut [u8]) -> (usize, Condition);

    /// Write from `src`.
    fn write(&mut self, src: &[u8]) -> (usize, Condition);

    /// Handle the poller should watch, if any.
    fn raw_fd(&self) -> Option<RawFd>;

    /// Release the OS handle. Idempotent.
    fn release(&mut self);

    fn is_released(&self) -> bool;

    /// Short label for logs ("tcp", "pipe", "memory", ...)
    fn kind(&self) -> &'static str;
}
