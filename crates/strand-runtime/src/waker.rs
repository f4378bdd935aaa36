//! Self-notification handle that interrupts the readiness poll.
//!
//! Multiple `wake()` calls before the poller drains are coalesced into a
//! single wake-up (eventfd counter semantics; the pipe variant just
//! accumulates bytes and drains them all).

use strand_core::Result;

use nix::errno::Errno;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

cfg_if::cfg_if! {
    if #[cfg(any(target_os = "linux", target_os = "android"))] {
        pub struct Waker {
            fd: OwnedFd,
        }

        impl Waker {
            pub fn new() -> Result<Self> {
                let fd = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) };
                let fd = Errno::result(fd)?;
                Ok(Self { fd: unsafe { OwnedFd::from_raw_fd(fd) } })
            }

            /// Never blocks.
            pub fn wake(&self) -> Result<()> {
                let val: u64 = 1;
                let ret = unsafe {
                    libc::write(
                        self.fd.as_raw_fd(),
                        &val as *const u64 as *const libc::c_void,
                        std::mem::size_of::<u64>(),
                    )
                };
                match Errno::result(ret) {
                    Ok(_) | Err(Errno::EAGAIN) => Ok(()),
                    Err(e) => Err(e.into()),
                }
            }

            /// Reset the counter after the poller woke up
            pub fn drain(&self) {
                let mut val: u64 = 0;
                unsafe {
                    libc::read(
                        self.fd.as_raw_fd(),
                        &mut val as *mut u64 as *mut libc::c_void,
                        std::mem::size_of::<u64>(),
                    );
                }
            }

            /// The fd the poller watches for readability
            pub fn raw_fd(&self) -> RawFd {
                self.fd.as_raw_fd()
            }
        }
    } else {
        pub struct Waker {
            read: OwnedFd,
            write: OwnedFd,
        }

        impl Waker {
            pub fn new() -> Result<Self> {
                let mut fds = [0 as libc::c_int; 2];
                Errno::result(unsafe { libc::pipe(fds.as_mut_ptr()) })?;
                let (read, write) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };
                for fd in [read.as_raw_fd(), write.as_raw_fd()] {
                    let flags = Errno::result(unsafe { libc::fcntl(fd, libc::F_GETFL) })?;
                    Errno::result(unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) })?;
                    Errno::result(unsafe { libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC) })?;
                }
                Ok(Self { read, write })
            }

            pub fn wake(&self) -> Result<()> {
                let byte = 1u8;
                let ret = unsafe {
                    libc::write(self.write.as_raw_fd(), &byte as *const u8 as *const libc::c_void, 1)
                };
                match Errno::result(ret) {
                    // Pipe full means a wake-up is already pending
                    Ok(_) | Err(Errno::EAGAIN) => Ok(()),
                    Err(e) => Err(e.into()),
                }
            }

            pub fn drain(&self) {
                let mut buf = [0u8; 64];
                loop {
                    let n = unsafe {
                        libc::read(self.read.as_raw_fd(), buf.as_mut_ptr() as *mut libc::c_void, buf.len())
                    };
                    if n <= 0 {
                        break;
                    }
                }
            }

            pub fn raw_fd(&self) -> RawFd {
                self.read.as_raw_fd()
            }
        }
    }
}

impl std::fmt::Debug for Waker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Waker").field("fd", &self.raw_fd()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn readable(fd: RawFd) -> bool {
        let mut pfd = libc::pollfd { fd, events: libc::POLLIN, revents: 0 };
        let n = unsafe { libc::poll(&mut pfd, 1, 0) };
        n == 1 && pfd.revents & libc::POLLIN != 0
    }

    #[test]
    fn test_wake_then_drain() {
        let waker = Waker::new().unwrap();
        assert!(!readable(waker.raw_fd()));
        waker.wake().unwrap();
        waker.wake().unwrap();
        assert!(readable(waker.raw_fd()));
        waker.drain();
        assert!(!readable(waker.raw_fd()));
    }
}
