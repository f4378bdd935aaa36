//! Built-in streams
//!
//! - `BufferedStream` - read-ahead / write-behind staging
//! - `TraceStream` - logs events and byte counts at trace level

mod buffered;
mod trace;

pub use buffered::BufferedStream;
pub use trace::TraceStream;
