//! `MemoryEndpoint`: fd-less loopback endpoint.
//!
//! The endpoint side lives inside a descriptor; the `MemoryPeer` side
//! stays with whoever created it and plays the remote party: it feeds
//! input, signals end of input, and collects everything the chain wrote.
//! Nothing here is visible to the poller, so readiness must be delivered
//! with `Multiplexer::notify`.

use parking_lot::Mutex;
use strand_core::{Buffer, Condition, Endpoint};

use std::os::fd::RawFd;
use std::sync::Arc;

const INITIAL_INPUT: usize = 4096;

struct Shared {
    input: Buffer,
    eof: bool,
    output: Vec<u8>,
    released: bool,
}

pub struct MemoryEndpoint {
    shared: Arc<Mutex<Shared>>,
}

/// Remote side of a `MemoryEndpoint`
#[derive(Clone)]
pub struct MemoryPeer {
    shared: Arc<Mutex<Shared>>,
}

impl MemoryEndpoint {
    pub fn new() -> (MemoryEndpoint, MemoryPeer) {
        let shared = Arc::new(Mutex::new(Shared {
            input: Buffer::new(INITIAL_INPUT),
            eof: false,
            output: Vec::new(),
            released: false,
        }));
        (
            MemoryEndpoint { shared: shared.clone() },
            MemoryPeer { shared },
        )
    }
}

impl Endpoint for MemoryEndpoint {
    fn read(&mut self, dst: &mut [u8]) -> (usize, Condition) {
        let mut s = self.shared.lock();
        if s.released {
            return (0, Condition::Close);
        }
        if s.input.is_empty() {
            return (0, if s.eof { Condition::End } else { Condition::Wait });
        }
        (s.input.drain_into(dst), Condition::Ok)
    }

    fn write(&mut self, src: &[u8]) -> (usize, Condition) {
        let mut s = self.shared.lock();
        if s.released {
            return (0, Condition::Close);
        }
        s.output.extend_from_slice(src);
        (src.len(), Condition::Ok)
    }

    fn raw_fd(&self) -> Option<RawFd> {
        None
    }

    fn release(&mut self) {
        self.shared.lock().released = true;
    }

    fn is_released(&self) -> bool {
        self.shared.lock().released
    }

    fn kind(&self) -> &'static str {
        "memory"
    }
}

impl MemoryPeer {
    /// Queue bytes for the endpoint to read
    pub fn feed(&self, bytes: &[u8]) {
        let mut s = self.shared.lock();
        s.input.reserve(bytes.len());
        s.input.append(bytes);
    }

    /// Signal end of input; reads return `End` once drained
    pub fn finish(&self) {
        self.shared.lock().eof = true;
    }

    /// Copy of everything written so far
    pub fn output(&self) -> Vec<u8> {
        self.shared.lock().output.clone()
    }

    pub fn take_output(&self) -> Vec<u8> {
        std::mem::take(&mut self.shared.lock().output)
    }

    /// Whether the endpoint side released its handle
    pub fn is_released(&self) -> bool {
        self.shared.lock().released
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_read_finish() {
        let (mut ep, peer) = MemoryEndpoint::new();
        let mut buf = [0u8; 8];
        assert_eq!(ep.read(&mut buf), (0, Condition::Wait));

        peer.feed(b"abc");
        let (n, cond) = ep.read(&mut buf);
        assert_eq!((&buf[..n], cond), (&b"abc"[..], Condition::Ok));

        peer.finish();
        assert_eq!(ep.read(&mut buf), (0, Condition::End));
    }

    #[test]
    fn test_large_feed_grows_input() {
        let (mut ep, peer) = MemoryEndpoint::new();
        let big = vec![7u8; INITIAL_INPUT * 3];
        peer.feed(&big);
        let mut out = vec![0u8; big.len()];
        let (n, _) = ep.read(&mut out);
        assert_eq!(n, big.len());
    }

    #[test]
    fn test_write_and_release() {
        let (mut ep, peer) = MemoryEndpoint::new();
        assert_eq!(ep.write(b"out"), (3, Condition::Ok));
        assert_eq!(peer.output(), b"out");
        ep.release();
        assert!(peer.is_released());
        assert_eq!(ep.write(b"more"), (0, Condition::Close));
        assert_eq!(peer.take_output(), b"out");
        assert!(peer.output().is_empty());
    }
}
