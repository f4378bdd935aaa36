//! Readiness polling.
//!
//! # Implementors
//!
//! - `PollPoller` (default): `poll(2)` over the registered handles. Works
//!   everywhere, O(n) per tick; fine for the descriptor counts this
//!   runtime targets.
//! - Test pollers: inject failures or scripted readiness via
//!   `Multiplexer::with_parts`.

use strand_core::{EventSet, EventType, Interest, Result, StrandError};

use nix::errno::Errno;
use std::os::fd::RawFd;
use std::time::Duration;

/// One handle to watch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollEntry {
    pub fd: RawFd,
    pub interest: Interest,
}

/// Readiness for `entries[index]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    pub index: usize,
    pub events: EventSet,
}

/// Waits for readiness on a set of OS handles.
///
/// **Contract:**
/// - Blocks at most `timeout`.
/// - Appends one `Readiness` per ready entry to `ready`; never reports
///   an entry that is not ready.
/// - Hang-up and error conditions are reported as `Readable` so the
///   owning chain discovers them on its next read.
/// - An interrupted wait (`EINTR`) is not an error; it reports nothing.
pub trait Poller: Send {
    fn poll(&mut self, entries: &[PollEntry], timeout: Duration, ready: &mut Vec<Readiness>) -> Result<()>;
}

#[derive(Default)]
pub struct PollPoller {
    fds: Vec<libc::pollfd>,
}

impl PollPoller {
    pub fn new() -> Self {
        Self::default()
    }
}

fn timeout_ms(timeout: Duration) -> libc::c_int {
    // Round up so a sub-millisecond deadline does not turn into a busy loop
    let ms = timeout.as_nanos().div_ceil(1_000_000);
    ms.min(libc::c_int::MAX as u128) as libc::c_int
}

impl Poller for PollPoller {
    fn poll(&mut self, entries: &[PollEntry], timeout: Duration, ready: &mut Vec<Readiness>) -> Result<()> {
        self.fds.clear();
        self.fds.extend(entries.iter().map(|e| {
            let mut events: libc::c_short = 0;
            if e.interest.readable {
                events |= libc::POLLIN;
            }
            if e.interest.writable {
                events |= libc::POLLOUT;
            }
            libc::pollfd { fd: e.fd, events, revents: 0 }
        }));

        let n = unsafe { libc::poll(self.fds.as_mut_ptr(), self.fds.len() as libc::nfds_t, timeout_ms(timeout)) };
        match Errno::result(n) {
            Ok(0) | Err(Errno::EINTR) => return Ok(()),
            Ok(_) => {}
            Err(e) => return Err(StrandError::Poll(e)),
        }

        for (index, pfd) in self.fds.iter().enumerate() {
            let revents = pfd.revents;
            if revents == 0 {
                continue;
            }
            let mut events = EventSet::EMPTY;
            if revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR | libc::POLLNVAL) != 0 {
                events.insert(EventType::Readable);
            }
            if revents & libc::POLLOUT != 0 {
                events.insert(EventType::Writable);
            }
            ready.push(Readiness { index, events });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::fd::AsRawFd;
    use std::os::unix::net::UnixStream;
    use std::io::Write;

    #[test]
    fn test_timeout_rounds_up() {
        assert_eq!(timeout_ms(Duration::ZERO), 0);
        assert_eq!(timeout_ms(Duration::from_micros(300)), 1);
        assert_eq!(timeout_ms(Duration::from_millis(100)), 100);
    }

    #[test]
    fn test_reports_only_ready_entries() {
        let (mut a, b) = UnixStream::pair().unwrap();
        let (_c, d) = UnixStream::pair().unwrap();
        a.write_all(b"ping").unwrap();

        let entries = [
            PollEntry { fd: b.as_raw_fd(), interest: Interest::READABLE },
            PollEntry { fd: d.as_raw_fd(), interest: Interest::READABLE },
        ];
        let mut ready = Vec::new();
        PollPoller::new().poll(&entries, Duration::from_millis(100), &mut ready).unwrap();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].index, 0);
        assert!(ready[0].events.contains(EventType::Readable));
    }

    #[test]
    fn test_writable_interest() {
        let (a, _b) = UnixStream::pair().unwrap();
        let entries = [PollEntry { fd: a.as_raw_fd(), interest: Interest::WRITABLE }];
        let mut ready = Vec::new();
        PollPoller::new().poll(&entries, Duration::from_millis(100), &mut ready).unwrap();
        assert_eq!(ready.len(), 1);
        assert!(ready[0].events.contains(EventType::Writable));
        assert!(!ready[0].events.contains(EventType::Readable));
    }

    #[test]
    fn test_hangup_reads_as_readable() {
        let (a, b) = UnixStream::pair().unwrap();
        drop(b);
        let entries = [PollEntry { fd: a.as_raw_fd(), interest: Interest::READABLE }];
        let mut ready = Vec::new();
        PollPoller::new().poll(&entries, Duration::from_millis(100), &mut ready).unwrap();
        assert!(ready[0].events.contains(EventType::Readable));
    }

    #[test]
    fn test_empty_times_out() {
        let mut ready = Vec::new();
        PollPoller::new().poll(&[], Duration::from_millis(5), &mut ready).unwrap();
        assert!(ready.is_empty());
    }
}
