//! # strand - descriptor multiplexer
//!
//! Readiness-driven I/O for many descriptors on a small worker pool.
//!
//! ## Features
//!
//! - **Stream chains**: each descriptor is an endpoint plus an ordered
//!   stack of filter streams (buffering, framing, protocols)
//! - **One dispatch per descriptor at a time**, any number of descriptors
//!   in parallel
//! - **Periodic jobs** on the same workers
//! - **Orderly teardown**: closing runs top-down through the chain before
//!   the OS handle is released
//!
//! ## Quick Start
//!
//! ```ignore
//! use strand::{BufferedStream, Descriptor, FdEndpoint, Runtime};
//!
//! let runtime = Runtime::new(Default::default())?;
//! runtime.block_on(|handle| {
//!     let mut d = Descriptor::new(FdEndpoint::from_tcp(stream)?);
//!     d.add_stream(BufferedStream::new(handle.config().buffer_size))?;
//!     d.add_stream(MyProtocol::new())?;
//!     handle.register(d)?;
//!     Ok(())
//! })?;
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      User Code                              │
//! │        Stream impls, register(), schedule_periodic()        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Multiplexer                             │
//! │        job table, Waiting/Running/Cycling/Purged            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!          ┌───────────────────┼───────────────────┐
//!          ▼                   ▼                   ▼
//!    ┌───────────┐      ┌───────────┐      ┌───────────┐
//!    │  Worker   │      │  Worker   │      │  Poller   │
//!    │  Thread   │      │  Thread   │      │  Thread   │
//!    └───────────┘      └───────────┘      └───────────┘
//!          │                   │
//!          ▼                   ▼
//!    ┌─────────────────────────────────────────────────────────┐
//!    │   Descriptor: Sn > ... > S1 > Endpoint (fd / memory)    │
//!    └─────────────────────────────────────────────────────────┘
//! ```

// Re-export core types
pub use strand_core::{
    Buffer,
    Capabilities,
    Chain,
    Condition,
    Cycle,
    DescriptorId,
    Endpoint,
    EventSet,
    EventType,
    Interest,
    JobId,
    JobState,
    PeriodicTask,
    Result,
    Stream,
    StrandError,
    TaskContext,
};

// Re-export env utilities
pub use strand_core::{env_get, env_get_bool, env_get_millis, env_get_opt};

// Re-export runtime types
pub use strand_runtime::{
    BufferedStream,
    Clock,
    Descriptor,
    DispatchStatus,
    FdEndpoint,
    Handle,
    ManualClock,
    MemoryEndpoint,
    MemoryPeer,
    Multiplexer,
    MultiplexerConfig,
    Poller,
    PollPoller,
    Stats,
    SystemClock,
    TraceStream,
};

use std::sync::OnceLock;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

static LOGGING_INIT: OnceLock<()> = OnceLock::new();

/// Install the process-wide tracing subscriber. Only the first call does
/// anything.
///
/// Filter comes from `RUST_LOG` (default `info`). `STRAND_LOG_FORMAT=json`
/// switches to JSON lines.
pub fn init_logging() {
    LOGGING_INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let json = env_get_opt::<String>("STRAND_LOG_FORMAT")
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let result = if json {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_thread_names(true))
                .try_init()
        } else {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().compact().with_thread_names(true))
                .try_init()
        };

        if let Err(err) = result {
            eprintln!("logging init skipped: {err}");
        }
    });
}

/// Owns a running multiplexer (poller thread included).
///
/// Dropping the runtime shuts the multiplexer down.
pub struct Runtime {
    mux: Multiplexer,
}

impl Runtime {
    /// Create the multiplexer and start polling.
    pub fn new(config: MultiplexerConfig) -> Result<Self> {
        let mux = Multiplexer::new(config)?;
        mux.start()?;
        Ok(Self { mux })
    }

    pub fn handle(&self) -> Handle {
        self.mux.handle()
    }

    pub fn multiplexer(&self) -> &Multiplexer {
        &self.mux
    }

    /// Run `f` with a handle, then shut down.
    pub fn block_on<F, T>(self, f: F) -> T
    where
        F: FnOnce(&Handle) -> T,
    {
        let handle = self.mux.handle();
        let result = f(&handle);
        self.shutdown();
        result
    }

    pub fn shutdown(self) {
        self.mux.shutdown();
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime").field("mux", &self.mux).finish()
    }
}
