//! Strand Echo Server
//!
//! TCP echo server: one listening descriptor whose accept stream
//! registers every connection as its own descriptor
//! (`buffered > echo`). A periodic job logs multiplexer stats.
//!
//! Usage:
//!     cargo build --release -p strand-echo
//!     ./target/release/strand-echo [port]
//!
//! Test with:
//!     echo "hello" | nc localhost 9999
//!
//! Environment:
//!     RUST_LOG=debug            more detail
//!     STRAND_LOG_FORMAT=json    JSON log lines
//!     STRAND_NUM_WORKERS=4      worker count (see MultiplexerConfig)

use strand::{
    BufferedStream, Chain, Condition, Cycle, Descriptor, EventType, FdEndpoint, Handle, Multiplexer,
    MultiplexerConfig, Stream, TaskContext,
};

use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use std::io;
use std::net::TcpListener;
use std::os::fd::OwnedFd;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

const DEFAULT_PORT: u16 = 9999;
const STATS_INTERVAL: Duration = Duration::from_secs(5);

static RUNNING: AtomicBool = AtomicBool::new(true);

extern "C" fn handle_signal(_: libc::c_int) {
    RUNNING.store(false, Ordering::SeqCst);
}

/// Echoes everything it can read back down the chain.
///
/// Bytes the chain cannot take yet wait in `backlog`; reading pauses until
/// they are out so a peer that never reads cannot grow the process.
struct EchoStream {
    echoed: u64,
    backlog: Vec<u8>,
}

impl EchoStream {
    fn new() -> Self {
        Self { echoed: 0, backlog: Vec::new() }
    }

    fn send(&mut self, chain: &mut Chain<'_>) -> Condition {
        if self.backlog.is_empty() {
            return Condition::Ok;
        }
        let (written, cond) = chain.write_all(&self.backlog);
        self.echoed += written as u64;
        self.backlog.drain(..written);
        cond
    }

    fn pump(&mut self, chain: &mut Chain<'_>) -> Condition {
        let mut buf = [0u8; 4096];
        loop {
            match self.send(chain) {
                Condition::Ok => {}
                Condition::Wait => {
                    set_reading(chain, false);
                    return Condition::Ok;
                }
                other => return other,
            }
            set_reading(chain, true);
            let (n, cond) = chain.read(&mut buf);
            self.backlog.extend_from_slice(&buf[..n]);
            match cond {
                Condition::Ok => continue,
                Condition::Wait if self.backlog.is_empty() => return Condition::Ok,
                Condition::Wait => continue,
                other => {
                    let _ = self.send(chain);
                    return other;
                }
            }
        }
    }
}

fn set_reading(chain: &mut Chain<'_>, on: bool) {
    let mut interest = chain.interest();
    interest.readable = on;
    chain.set_interest(interest);
}

impl Stream for EchoStream {
    fn name(&self) -> &str {
        "echo"
    }

    fn event(&mut self, event: EventType, chain: &mut Chain<'_>) -> Condition {
        match event {
            EventType::Readable | EventType::Writable => self.pump(chain),
            EventType::Closing => {
                // Bytes read ahead before the peer's FIN still get echoed
                self.pump(chain);
                tracing::debug!(
                    descriptor = %chain.descriptor_id(),
                    bytes = self.echoed,
                    unsent = self.backlog.len(),
                    "connection closed"
                );
                Condition::Ok
            }
            EventType::Opened => Condition::Ok,
        }
    }
}

/// Accepts connections on the listener and registers each one
struct AcceptStream {
    listener: TcpListener,
    handle: Handle,
}

impl AcceptStream {
    fn register(&self, stream: std::net::TcpStream) -> strand::Result<()> {
        let mut d = Descriptor::new(FdEndpoint::from_tcp(stream)?);
        d.add_stream(BufferedStream::new(self.handle.config().buffer_size))?;
        d.add_stream(EchoStream::new())?;
        self.handle.register(d)?;
        Ok(())
    }
}

impl Stream for AcceptStream {
    fn name(&self) -> &str {
        "accept"
    }

    fn event(&mut self, event: EventType, _chain: &mut Chain<'_>) -> Condition {
        if event != EventType::Readable {
            return Condition::Ok;
        }
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    tracing::debug!(%peer, "accepted");
                    if let Err(e) = self.register(stream) {
                        tracing::warn!(%peer, error = %e, "failed to register connection");
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Condition::Ok,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    // Transient (EMFILE and friends); try again on the next readiness
                    tracing::warn!(error = %e, "accept failed");
                    return Condition::Ok;
                }
            }
        }
    }
}

fn install_signal_handlers() -> strand::Result<()> {
    let action = SigAction::new(SigHandler::Handler(handle_signal), SaFlags::empty(), SigSet::empty());
    unsafe {
        sigaction(Signal::SIGINT, &action)?;
        sigaction(Signal::SIGTERM, &action)?;
    }
    Ok(())
}

fn run(port: u16) -> strand::Result<()> {
    install_signal_handlers()?;

    let mux = Multiplexer::new(MultiplexerConfig::from_env())?;
    let handle = mux.handle();

    let listener = TcpListener::bind(("0.0.0.0", port))?;
    listener.set_nonblocking(true)?;
    let accept = AcceptStream { listener: listener.try_clone()?, handle: handle.clone() };
    let mut d = Descriptor::new(FdEndpoint::new(OwnedFd::from(listener), "listener")?);
    d.add_stream(accept)?;
    mux.register(d)?;

    let stats_handle = handle.clone();
    mux.schedule_periodic(
        move |_: &TaskContext| {
            tracing::info!(stats = %stats_handle.stats(), "stats");
            Cycle::Again
        },
        STATS_INTERVAL,
    )?;

    mux.start()?;
    tracing::info!(port, "strand-echo listening");

    while RUNNING.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(100));
    }

    tracing::info!("signal received, shutting down");
    mux.shutdown();
    Ok(())
}

fn main() -> ExitCode {
    strand::init_logging();

    let port = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_PORT);

    match run(port) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "strand-echo failed");
            ExitCode::FAILURE
        }
    }
}
