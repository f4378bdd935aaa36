//! # strand-runtime
//!
//! OS-facing half of the strand multiplexer.
//!
//! This crate provides:
//! - The `Multiplexer`: job table, readiness poller and worker pool
//! - `Descriptor`: an endpoint plus its stream chain
//! - Endpoints over file descriptors and in-memory pipes
//! - Built-in streams (buffering, tracing)
//! - Environment-driven configuration

cfg_if::cfg_if! {
    if #[cfg(not(unix))] {
        compile_error!("strand-runtime requires a unix platform");
    }
}

pub mod clock;
pub mod config;
pub mod descriptor;
pub mod endpoint;
pub mod multiplexer;
pub mod poller;
pub mod streams;

mod job;
mod run_queue;
mod timer;
mod waker;
mod worker;

// Re-exports
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::MultiplexerConfig;
pub use descriptor::{Descriptor, DispatchStatus};
pub use endpoint::{FdEndpoint, MemoryEndpoint, MemoryPeer};
pub use multiplexer::{Handle, Multiplexer, Stats};
pub use poller::{PollEntry, PollPoller, Poller, Readiness};
pub use streams::{BufferedStream, TraceStream};
