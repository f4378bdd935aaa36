//! Read-ahead and write-behind staging on two `Buffer`s.
//!
//! Sits directly on the endpoint in most chains. `Readable` fills the
//! input buffer until the endpoint says `Wait`; reads from above are
//! served from it, and an end of input is handed up only once they have
//! drained it. Writes from above are staged in the output buffer up to its
//! size and flushed as far as the endpoint allows; a full buffer answers
//! `Wait`. While bytes are pending the stream keeps write interest on and
//! finishes the flush on `Writable`. `Closing` makes a final best-effort
//! flush.

use strand_core::{Buffer, Capabilities, Chain, Condition, EventType, Stream};

pub struct BufferedStream {
    input: Buffer,
    output: Buffer,
    /// Endpoint reported `End` while reading ahead
    eof: bool,
}

impl BufferedStream {
    pub fn new(size: usize) -> Self {
        Self { input: Buffer::new(size), output: Buffer::new(size), eof: false }
    }

    /// Bytes read ahead and not yet consumed
    pub fn pending_input(&self) -> usize {
        self.input.used()
    }

    /// Bytes accepted and not yet written out
    pub fn pending_output(&self) -> usize {
        self.output.used()
    }

    fn fill(&mut self, lower: &mut Chain<'_>) -> Condition {
        if self.eof {
            return Condition::End;
        }
        loop {
            if self.input.free() == 0 {
                self.input.compact();
                if self.input.free() == 0 {
                    // Full: whoever is above has to drain first
                    return Condition::Ok;
                }
            }
            let (n, cond) = lower.read_ahead(self.input.tail());
            self.input.push(n);
            match cond {
                Condition::Ok if n > 0 => continue,
                Condition::Ok | Condition::Wait => return Condition::Wait,
                Condition::End => {
                    self.eof = true;
                    return Condition::End;
                }
                other => return other,
            }
        }
    }

    fn flush(&mut self, lower: &mut Chain<'_>) -> Condition {
        while !self.output.is_empty() {
            let (n, cond) = lower.write(self.output.head());
            self.output.pop(n);
            if cond != Condition::Ok {
                return cond;
            }
            if n == 0 {
                return Condition::Wait;
            }
        }
        Condition::Ok
    }
}

impl Stream for BufferedStream {
    fn name(&self) -> &str {
        "buffered"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::BOTH
    }

    fn read(&mut self, dst: &mut [u8], lower: &mut Chain<'_>) -> (usize, Condition) {
        let mut cond = Condition::Wait;
        if self.input.is_empty() {
            cond = self.fill(lower);
        }
        let n = self.input.drain_into(dst);
        if n > 0 {
            (n, Condition::Ok)
        } else if cond.is_terminal() {
            (0, cond)
        } else {
            (0, Condition::Wait)
        }
    }

    fn write(&mut self, src: &[u8], lower: &mut Chain<'_>) -> (usize, Condition) {
        let mut accepted = 0;
        loop {
            accepted += self.output.append(&src[accepted..]);
            let cond = self.flush(lower);
            if cond.is_terminal() {
                return (accepted, cond);
            }
            // Ok from flush means the buffer emptied, so another round fits
            if accepted == src.len() || cond != Condition::Ok || self.output.size() == 0 {
                break;
            }
        }
        lower.want_write(!self.output.is_empty());
        if accepted < src.len() {
            (accepted, Condition::Wait)
        } else {
            (accepted, Condition::Ok)
        }
    }

    fn event(&mut self, event: EventType, chain: &mut Chain<'_>) -> Condition {
        match event {
            EventType::Readable => {
                // Errors are already recorded on the chain; an end of input
                // waits until the streams above have read what came before it
                self.fill(chain);
                if self.eof && self.input.is_empty() {
                    return Condition::End;
                }
            }
            EventType::Writable => {
                if !self.flush(chain).is_terminal() {
                    chain.want_write(!self.output.is_empty());
                }
            }
            EventType::Closing => {
                let left = self.output.used();
                if left > 0 && self.flush(chain) != Condition::Ok {
                    tracing::debug!(
                        descriptor = %chain.descriptor_id(),
                        dropped = self.output.used(),
                        "unflushed output discarded on close"
                    );
                }
            }
            EventType::Opened => {}
        }
        Condition::Ok
    }
}
