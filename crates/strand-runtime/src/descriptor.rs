//! Descriptor: one endpoint plus its ordered stream chain.
//!
//! Streams are stored bottom-up (`streams[0]` sits on the endpoint). See
//! `strand_core::stream` for the direction rules.
//!
//! A descriptor is driven by exactly one thread at a time; the
//! multiplexer guarantees that by owning it inside a job and handing it to
//! a single worker per dispatch.

use strand_core::{
    Chain, ChainControl, Condition, DescriptorId, Endpoint, EventSet, EventType, Interest,
    Result, Stream, StrandError,
};

use std::fmt::Write as _;
use std::os::fd::RawFd;

/// Whether a descriptor survived a dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStatus {
    Open,
    Closed,
}

pub struct Descriptor {
    id: DescriptorId,
    endpoint: Box<dyn Endpoint>,
    streams: Vec<Box<dyn Stream>>,
    interest: Interest,
    signals: EventSet,
    /// No new streams, no application writes
    closing: bool,
    /// Closing notifications started (guards re-entry after a panic)
    tearing_down: bool,
    /// Chain dropped and endpoint released
    closed: bool,
}

impl Descriptor {
    pub fn new<E: Endpoint + 'static>(endpoint: E) -> Self {
        Self::from_boxed(Box::new(endpoint))
    }

    pub fn from_boxed(endpoint: Box<dyn Endpoint>) -> Self {
        Self {
            id: DescriptorId::next(),
            endpoint,
            streams: Vec::new(),
            interest: Interest::default(),
            signals: EventSet::EMPTY,
            closing: false,
            tearing_down: false,
            closed: false,
        }
    }

    #[inline]
    pub fn id(&self) -> DescriptorId {
        self.id
    }

    #[inline]
    pub fn is_closing(&self) -> bool {
        self.closing
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    #[inline]
    pub fn interest(&self) -> Interest {
        self.interest
    }

    pub fn set_interest(&mut self, interest: Interest) {
        self.interest = interest;
    }

    /// Handle the poller should watch
    #[inline]
    pub fn raw_fd(&self) -> Option<RawFd> {
        if self.closed {
            None
        } else {
            self.endpoint.raw_fd()
        }
    }

    pub fn endpoint_kind(&self) -> &'static str {
        self.endpoint.kind()
    }

    /// Number of streams in the chain
    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    pub fn stream_names(&self) -> Vec<&str> {
        self.streams.iter().map(|s| s.name()).collect()
    }

    /// Append a stream on top of the chain.
    pub fn add_stream<S: Stream + 'static>(&mut self, stream: S) -> Result<()> {
        self.add_boxed_stream(Box::new(stream))
    }

    pub fn add_boxed_stream(&mut self, stream: Box<dyn Stream>) -> Result<()> {
        if self.closing {
            return Err(StrandError::DescriptorClosing);
        }
        self.streams.push(stream);
        Ok(())
    }

    /// Builder-style `add_stream`
    pub fn with_stream<S: Stream + 'static>(mut self, stream: S) -> Result<Self> {
        self.add_stream(stream)?;
        Ok(self)
    }

    /// Application-level read: enters at the top of the chain.
    ///
    /// A terminal condition closes the descriptor, as in `dispatch`.
    pub fn read(&mut self, dst: &mut [u8]) -> (usize, Condition) {
        if self.closed {
            return (0, Condition::Close);
        }
        let mut control = ChainControl::new(self.interest, self.closing);
        let result = Chain::new(self.id, &mut self.streams, &mut *self.endpoint, &mut control).read(dst);
        self.settle(&mut control, "read");
        result
    }

    /// Application-level write: enters at the top of the chain.
    ///
    /// Refused with `(0, Close)` once the descriptor is closing.
    pub fn write(&mut self, src: &[u8]) -> (usize, Condition) {
        if self.closing {
            return (0, Condition::Close);
        }
        let mut control = ChainControl::new(self.interest, false);
        let result = Chain::new(self.id, &mut self.streams, &mut *self.endpoint, &mut control).write(src);
        self.settle(&mut control, "write");
        result
    }

    /// Deliver one event to the chain.
    ///
    /// `Closing` runs the full teardown. Any other event walks the streams
    /// first-added to last-added; a terminal condition from a stream (or
    /// observed through its chain view) stops the walk and tears the
    /// descriptor down.
    pub fn dispatch(&mut self, event: EventType) -> DispatchStatus {
        if self.closed {
            return DispatchStatus::Closed;
        }
        if event == EventType::Closing {
            self.close();
            return DispatchStatus::Closed;
        }

        let mut control = ChainControl::new(self.interest, self.closing);
        let mut failed: Option<(usize, Condition)> = None;

        for i in 0..self.streams.len() {
            let (below, rest) = self.streams.split_at_mut(i);
            let Some(stream) = rest.first_mut() else { break };
            let cond = {
                let mut chain = Chain::new(self.id, below, &mut *self.endpoint, &mut control);
                stream.event(event, &mut chain)
            };
            control.observe(cond);
            if let Some(terminal) = control.terminal() {
                failed = Some((i, terminal));
                break;
            }
            if control.take_swallowed() {
                tracing::trace!(descriptor = %self.id, stream = stream.name(), %event, "event swallowed");
                break;
            }
        }

        self.absorb(&mut control);

        match failed {
            None => DispatchStatus::Open,
            Some((index, cond)) => {
                let stream = self.streams.get(index).map(|s| s.name()).unwrap_or("?");
                if cond.is_error() {
                    tracing::warn!(descriptor = %self.id, stream, %event, "stream failed, closing descriptor");
                } else {
                    tracing::debug!(descriptor = %self.id, stream, %event, condition = %cond, "orderly close");
                }
                self.close();
                DispatchStatus::Closed
            }
        }
    }

    /// Tear the descriptor down: `Closing` to every stream, last-added
    /// first, then drop the chain (same order) and release the endpoint.
    /// Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closing = true;

        if !self.tearing_down {
            self.tearing_down = true;
            let mut control = ChainControl::new(self.interest, true);
            for i in (0..self.streams.len()).rev() {
                let (below, rest) = self.streams.split_at_mut(i);
                let Some(stream) = rest.first_mut() else { continue };
                let cond = {
                    let mut chain = Chain::new(self.id, below, &mut *self.endpoint, &mut control);
                    stream.event(EventType::Closing, &mut chain)
                };
                if cond.is_error() {
                    tracing::debug!(descriptor = %self.id, stream = stream.name(), "stream failed during close");
                }
            }
        }

        while let Some(stream) = self.streams.pop() {
            drop(stream);
        }
        self.endpoint.release();
        self.signals = EventSet::EMPTY;
        self.closed = true;
        tracing::debug!(descriptor = %self.id, kind = self.endpoint.kind(), "descriptor closed");
    }

    /// Events streams asked for during the last dispatch
    pub fn take_signals(&mut self) -> EventSet {
        self.signals.take()
    }

    /// "tcp: buffered[rw] > echo"
    pub fn chain_summary(&self) -> String {
        let mut out = String::from(self.endpoint.kind());
        out.push(':');
        for (i, stream) in self.streams.iter().enumerate() {
            out.push_str(if i == 0 { " " } else { " > " });
            out.push_str(stream.name());
            let caps = stream.capabilities();
            if caps.read_buffer || caps.write_buffer {
                let _ = write!(
                    out,
                    "[{}{}]",
                    if caps.read_buffer { "r" } else { "" },
                    if caps.write_buffer { "w" } else { "" }
                );
            }
        }
        out
    }

    fn absorb(&mut self, control: &mut ChainControl) {
        self.interest = control.interest();
        self.signals = self.signals.union(control.take_signals());
    }

    fn settle(&mut self, control: &mut ChainControl, op: &'static str) {
        self.absorb(control);
        let Some(cond) = control.terminal() else { return };
        if cond.is_error() {
            tracing::warn!(descriptor = %self.id, op, "i/o failed, closing descriptor");
        } else {
            tracing::debug!(descriptor = %self.id, op, condition = %cond, "orderly close");
        }
        self.close();
    }
}

impl Drop for Descriptor {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Descriptor")
            .field("id", &self.id)
            .field("chain", &self.chain_summary())
            .field("closing", &self.closing)
            .field("closed", &self.closed)
            .finish()
    }
}
