//! Stream trait and the chain context streams run in.
//!
//! A descriptor owns its streams in a `Vec`, index 0 sitting directly on
//! the endpoint and the last index facing the application:
//!
//! ```text
//!   application
//!        ▲   descriptor.read() enters at the top
//!   ┌────┴────┐
//!   │   S3    │  <- added last
//!   ├─────────┤
//!   │   S2    │
//!   ├─────────┤
//!   │   S1    │  <- added first
//!   └────┬────┘
//!    endpoint
//! ```
//!
//! Reads and writes travel top-down: a stream reaches only what is below
//! it through the `Chain` it is handed. Events travel bottom-up (S1, S2,
//! S3), except `Closing`, which goes top-down (S3, S2, S1) so a stream can
//! still push final bytes through the layers beneath it before they go.

use crate::condition::Condition;
use crate::endpoint::Endpoint;
use crate::event::{EventSet, EventType, Interest};
use crate::id::DescriptorId;

/// Buffering capabilities a stream advertises (informational; used in
/// chain summaries).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub read_buffer: bool,
    pub write_buffer: bool,
}

impl Capabilities {
    pub const NONE: Capabilities = Capabilities { read_buffer: false, write_buffer: false };
    pub const READ: Capabilities = Capabilities { read_buffer: true, write_buffer: false };
    pub const WRITE: Capabilities = Capabilities { read_buffer: false, write_buffer: true };
    pub const BOTH: Capabilities = Capabilities { read_buffer: true, write_buffer: true };
}

/// A filter unit in a descriptor's chain.
///
/// Streams are not required to be thread-safe beyond `Send`: the
/// multiplexer never dispatches the same descriptor on two workers at
/// once.
pub trait Stream: Send {
    /// Identifying name (logs, chain summaries)
    fn name(&self) -> &str;

    fn capabilities(&self) -> Capabilities {
        Capabilities::NONE
    }

    /// Pull bytes for the layer above. Default: pass through.
    fn read(&mut self, dst: &mut [u8], lower: &mut Chain<'_>) -> (usize, Condition) {
        lower.read(dst)
    }

    /// Push bytes from the layer above. Default: pass through.
    fn write(&mut self, src: &[u8], lower: &mut Chain<'_>) -> (usize, Condition) {
        lower.write(src)
    }

    /// React to a lifecycle event.
    ///
    /// `Ok`/`Wait` forward the event to the next stream (unless the stream
    /// called `chain.swallow()`); `End`, `Close` or `Error` start the
    /// descriptor's closing path.
    fn event(&mut self, event: EventType, chain: &mut Chain<'_>) -> Condition {
        let _ = (event, chain);
        Condition::Ok
    }
}

/// Per-dispatch bookkeeping shared by every `Chain` view of one descriptor.
#[derive(Debug, Clone)]
pub struct ChainControl {
    interest: Interest,
    signals: EventSet,
    terminal: Option<Condition>,
    swallowed: bool,
    closing: bool,
    /// Set while a stream reads ahead; an orderly `End` is left to it
    defer_end: bool,
}

impl ChainControl {
    pub fn new(interest: Interest, closing: bool) -> Self {
        Self {
            interest,
            signals: EventSet::EMPTY,
            terminal: None,
            swallowed: false,
            closing,
            defer_end: false,
        }
    }

    #[inline]
    pub fn interest(&self) -> Interest {
        self.interest
    }

    /// Record a condition; only terminal ones are kept (the most severe).
    #[inline]
    pub fn observe(&mut self, cond: Condition) {
        if cond.is_terminal() {
            self.terminal = Some(match self.terminal {
                Some(prev) => prev.worst(cond),
                None => cond,
            });
        }
    }

    #[inline]
    pub fn terminal(&self) -> Option<Condition> {
        self.terminal
    }

    #[inline]
    fn observe_read(&mut self, cond: Condition) {
        if !(self.defer_end && cond == Condition::End) {
            self.observe(cond);
        }
    }

    #[inline]
    pub fn take_signals(&mut self) -> EventSet {
        self.signals.take()
    }

    /// Read and reset the swallow flag
    #[inline]
    pub fn take_swallowed(&mut self) -> bool {
        core::mem::replace(&mut self.swallowed, false)
    }
}

/// View of the chain below one stream, plus descriptor controls.
pub struct Chain<'a> {
    descriptor: DescriptorId,
    below: &'a mut [Box<dyn Stream>],
    endpoint: &'a mut (dyn Endpoint + 'static),
    control: &'a mut ChainControl,
}

impl<'a> Chain<'a> {
    pub fn new(
        descriptor: DescriptorId,
        below: &'a mut [Box<dyn Stream>],
        endpoint: &'a mut (dyn Endpoint + 'static),
        control: &'a mut ChainControl,
    ) -> Self {
        Self { descriptor, below, endpoint, control }
    }

    #[inline]
    pub fn descriptor_id(&self) -> DescriptorId {
        self.descriptor
    }

    /// Number of streams below this view
    #[inline]
    pub fn depth(&self) -> usize {
        self.below.len()
    }

    /// Read through the next stream down (or the endpoint).
    pub fn read(&mut self, dst: &mut [u8]) -> (usize, Condition) {
        let (n, cond) = match self.below.split_last_mut() {
            Some((stream, rest)) => {
                let mut lower = Chain {
                    descriptor: self.descriptor,
                    below: rest,
                    endpoint: &mut *self.endpoint,
                    control: &mut *self.control,
                };
                stream.read(dst, &mut lower)
            }
            None => self.endpoint.read(dst),
        };
        self.control.observe_read(cond);
        (n, cond)
    }

    /// `read` for streams that stage input: an `End` from below is only
    /// returned, not recorded on the descriptor. The caller reports it
    /// itself once the staged bytes have been consumed.
    pub fn read_ahead(&mut self, dst: &mut [u8]) -> (usize, Condition) {
        let prev = core::mem::replace(&mut self.control.defer_end, true);
        let result = self.read(dst);
        self.control.defer_end = prev;
        result
    }

    /// Write through the next stream down (or the endpoint).
    pub fn write(&mut self, src: &[u8]) -> (usize, Condition) {
        let (n, cond) = match self.below.split_last_mut() {
            Some((stream, rest)) => {
                let mut lower = Chain {
                    descriptor: self.descriptor,
                    below: rest,
                    endpoint: &mut *self.endpoint,
                    control: &mut *self.control,
                };
                stream.write(src, &mut lower)
            }
            None => self.endpoint.write(src),
        };
        self.control.observe(cond);
        (n, cond)
    }

    /// Write all of `src` unless the chain says `Wait` or worse.
    /// Returns bytes written and the last condition.
    pub fn write_all(&mut self, mut src: &[u8]) -> (usize, Condition) {
        let mut total = 0;
        while !src.is_empty() {
            let (n, cond) = self.write(src);
            total += n;
            src = &src[n..];
            if cond != Condition::Ok || n == 0 {
                return (total, if cond == Condition::Ok { Condition::Wait } else { cond });
            }
        }
        (total, Condition::Ok)
    }

    #[inline]
    pub fn interest(&self) -> Interest {
        self.control.interest
    }

    #[inline]
    pub fn set_interest(&mut self, interest: Interest) {
        self.control.interest = interest;
    }

    /// Toggle write readiness without touching read interest
    #[inline]
    pub fn want_write(&mut self, on: bool) {
        self.control.interest.writable = on;
    }

    /// Queue a follow-up event; the job cycles again after this dispatch.
    pub fn signal(&mut self, event: EventType) {
        if event == EventType::Closing {
            self.control.observe(Condition::Close);
        } else {
            self.control.signals.insert(event);
        }
    }

    /// Request an orderly close of the descriptor
    #[inline]
    pub fn close(&mut self) {
        self.control.observe(Condition::Close);
    }

    /// Stop the current event from reaching the streams above
    #[inline]
    pub fn swallow(&mut self) {
        self.control.swallowed = true;
    }

    /// Whether the descriptor is already tearing down
    #[inline]
    pub fn is_closing(&self) -> bool {
        self.control.closing
    }

    /// Most severe terminal condition seen so far in this dispatch
    #[inline]
    pub fn terminal(&self) -> Option<Condition> {
        self.control.terminal
    }
}
