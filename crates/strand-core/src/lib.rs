//! # strand-core
//!
//! Contracts shared by every layer of the strand multiplexer.
//!
//! Nothing in here touches the OS directly; polling, endpoints and the
//! worker pool live in `strand-runtime`.
//!
//! ## Modules
//!
//! - `id` - Job and descriptor identifiers
//! - `state` - Job state machine states
//! - `condition` - Universal I/O outcome codes
//! - `event` - Lifecycle events, event sets and poll interest
//! - `buffer` - Byte staging buffer with head/tail cursors
//! - `endpoint` - The low-level I/O end of a descriptor
//! - `stream` - Stream trait and the chain context streams run in
//! - `task` - Periodic task contract
//! - `error` - Error types
//! - `env` - Environment variable utilities

pub mod id;
pub mod state;
pub mod condition;
pub mod event;
pub mod buffer;
pub mod endpoint;
pub mod stream;
pub mod task;
pub mod error;
pub mod env;

// Re-exports for convenience
pub use id::{DescriptorId, JobId};
pub use state::JobState;
pub use condition::Condition;
pub use event::{EventSet, EventType, Interest};
pub use buffer::Buffer;
pub use endpoint::Endpoint;
pub use stream::{Capabilities, Chain, ChainControl, Stream};
pub use task::{Cycle, PeriodicTask, TaskContext};
pub use error::{Result, StrandError};
pub use env::{env_get, env_get_bool, env_get_millis, env_get_opt};
