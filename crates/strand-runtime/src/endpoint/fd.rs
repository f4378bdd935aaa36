//! `FdEndpoint`: any non-blocking file descriptor.
//!
//! Maps errno onto `Condition`:
//!
//! | OS result              | Condition |
//! |------------------------|-----------|
//! | n > 0 bytes            | `Ok`      |
//! | read of 0 bytes        | `End`     |
//! | EAGAIN / EWOULDBLOCK   | `Wait`    |
//! | EINTR                  | retried   |
//! | anything else          | `Error`   |

use nix::errno::Errno;
use strand_core::{Condition, Endpoint, Result};

use std::fs::File;
use std::net::TcpStream;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::net::UnixStream;

pub struct FdEndpoint {
    fd: Option<OwnedFd>,
    kind: &'static str,
}

impl FdEndpoint {
    /// Wrap an owned descriptor, switching it to non-blocking mode.
    pub fn new(fd: OwnedFd, kind: &'static str) -> Result<Self> {
        set_nonblocking(fd.as_raw_fd())?;
        Ok(Self { fd: Some(fd), kind })
    }

    pub fn from_tcp(stream: TcpStream) -> Result<Self> {
        let _ = stream.set_nodelay(true);
        Self::new(OwnedFd::from(stream), "tcp")
    }

    pub fn from_unix(stream: UnixStream) -> Result<Self> {
        Self::new(OwnedFd::from(stream), "unix")
    }

    pub fn from_file(file: File) -> Result<Self> {
        Self::new(OwnedFd::from(file), "file")
    }

    /// Create a pipe. Returns `(read_end, write_end)`.
    pub fn pipe() -> Result<(Self, Self)> {
        let mut fds = [0 as libc::c_int; 2];
        // Safety: fds points at two writable ints
        Errno::result(unsafe { libc::pipe(fds.as_mut_ptr()) })?;
        // Safety: pipe() just returned these two fresh descriptors
        let (r, w) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };
        set_cloexec(r.as_raw_fd())?;
        set_cloexec(w.as_raw_fd())?;
        Ok((Self::new(r, "pipe")?, Self::new(w, "pipe")?))
    }
}

impl Endpoint for FdEndpoint {
    fn read(&mut self, dst: &mut [u8]) -> (usize, Condition) {
        let Some(fd) = self.fd.as_ref().map(|fd| fd.as_raw_fd()) else {
            return (0, Condition::Close);
        };
        if dst.is_empty() {
            return (0, Condition::Ok);
        }
        loop {
            // Safety: dst is a valid writable slice for its whole length
            let ret = unsafe { libc::read(fd, dst.as_mut_ptr() as *mut libc::c_void, dst.len()) };
            if ret > 0 {
                return (ret as usize, Condition::Ok);
            }
            if ret == 0 {
                return (0, Condition::End);
            }
            match Errno::last() {
                Errno::EINTR => continue,
                e if would_block(e) => return (0, Condition::Wait),
                e => {
                    tracing::warn!(fd, kind = self.kind, errno = %e, "endpoint read failed");
                    return (0, Condition::Error);
                }
            }
        }
    }

    fn write(&mut self, src: &[u8]) -> (usize, Condition) {
        let Some(fd) = self.fd.as_ref().map(|fd| fd.as_raw_fd()) else {
            return (0, Condition::Close);
        };
        if src.is_empty() {
            return (0, Condition::Ok);
        }
        loop {
            // Safety: src is a valid readable slice for its whole length
            let ret = unsafe { libc::write(fd, src.as_ptr() as *const libc::c_void, src.len()) };
            if ret >= 0 {
                return (ret as usize, Condition::Ok);
            }
            match Errno::last() {
                Errno::EINTR => continue,
                e if would_block(e) => return (0, Condition::Wait),
                e => {
                    tracing::warn!(fd, kind = self.kind, errno = %e, "endpoint write failed");
                    return (0, Condition::Error);
                }
            }
        }
    }

    fn raw_fd(&self) -> Option<RawFd> {
        self.fd.as_ref().map(|fd| fd.as_raw_fd())
    }

    fn release(&mut self) {
        if let Some(fd) = self.fd.take() {
            tracing::trace!(fd = fd.as_raw_fd(), kind = self.kind, "endpoint released");
        }
    }

    fn is_released(&self) -> bool {
        self.fd.is_none()
    }

    fn kind(&self) -> &'static str {
        self.kind
    }
}

#[inline]
fn would_block(e: Errno) -> bool {
    e == Errno::EAGAIN || e == Errno::EWOULDBLOCK
}

fn set_nonblocking(fd: RawFd) -> Result<()> {
    // Safety: plain fcntl on a descriptor we own
    let flags = Errno::result(unsafe { libc::fcntl(fd, libc::F_GETFL) })?;
    if flags & libc::O_NONBLOCK == 0 {
        Errno::result(unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) })?;
    }
    Ok(())
}

fn set_cloexec(fd: RawFd) -> Result<()> {
    // Safety: plain fcntl on a descriptor we own
    let flags = Errno::result(unsafe { libc::fcntl(fd, libc::F_GETFD) })?;
    Errno::result(unsafe { libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC) })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_pipe_roundtrip_and_wait() {
        let (mut r, mut w) = FdEndpoint::pipe().unwrap();
        let mut buf = [0u8; 16];

        // Nothing written yet: non-blocking read must not hang
        assert_eq!(r.read(&mut buf), (0, Condition::Wait));

        assert_eq!(w.write(b"ping"), (4, Condition::Ok));
        let (n, cond) = r.read(&mut buf);
        assert_eq!(cond, Condition::Ok);
        assert_eq!(&buf[..n], b"ping");
    }

    #[test]
    fn test_peer_close_reads_end() {
        let (mut r, mut w) = FdEndpoint::pipe().unwrap();
        w.release();
        assert!(w.is_released());
        let mut buf = [0u8; 4];
        assert_eq!(r.read(&mut buf), (0, Condition::End));
    }

    #[test]
    fn test_write_to_closed_reader_is_error() {
        let (mut r, mut w) = FdEndpoint::pipe().unwrap();
        r.release();
        // EPIPE (SIGPIPE is ignored by the Rust runtime)
        assert_eq!(w.write(b"x").1, Condition::Error);
    }

    #[test]
    fn test_released_endpoint_reports_close() {
        let (a, b) = UnixStream::pair().unwrap();
        let mut ep = FdEndpoint::from_unix(a).unwrap();
        assert!(ep.raw_fd().is_some());
        ep.release();
        assert_eq!(ep.raw_fd(), None);
        assert_eq!(ep.write(b"late"), (0, Condition::Close));
        drop(b);
    }

    #[test]
    fn test_unix_stream_data() {
        let (a, mut b) = UnixStream::pair().unwrap();
        let mut ep = FdEndpoint::from_unix(a).unwrap();
        b.write_all(b"hello").unwrap();
        let mut buf = [0u8; 8];
        let (n, cond) = ep.read(&mut buf);
        assert_eq!((&buf[..n], cond), (&b"hello"[..], Condition::Ok));
        assert_eq!(ep.kind(), "unix");
    }
}
