//! Concrete endpoints
//!
//! | Endpoint         | Handle       | Readiness source        |
//! |------------------|--------------|-------------------------|
//! | `FdEndpoint`     | `OwnedFd`    | readiness poller        |
//! | `MemoryEndpoint` | none         | `Multiplexer::notify()` |

mod fd;
mod memory;

pub use fd::FdEndpoint;
pub use memory::{MemoryEndpoint, MemoryPeer};
