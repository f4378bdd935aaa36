//! Pass-through stream that logs every event and byte count.

use strand_core::{Chain, Condition, EventType, Stream};

pub struct TraceStream {
    label: String,
    bytes_in: u64,
    bytes_out: u64,
}

impl TraceStream {
    pub fn new(label: impl Into<String>) -> Self {
        Self { label: label.into(), bytes_in: 0, bytes_out: 0 }
    }

    pub fn bytes_in(&self) -> u64 {
        self.bytes_in
    }

    pub fn bytes_out(&self) -> u64 {
        self.bytes_out
    }
}

impl Stream for TraceStream {
    fn name(&self) -> &str {
        &self.label
    }

    fn read(&mut self, dst: &mut [u8], lower: &mut Chain<'_>) -> (usize, Condition) {
        let (n, cond) = lower.read(dst);
        self.bytes_in += n as u64;
        tracing::trace!(descriptor = %lower.descriptor_id(), stream = %self.label, n, %cond, "read");
        (n, cond)
    }

    fn write(&mut self, src: &[u8], lower: &mut Chain<'_>) -> (usize, Condition) {
        let (n, cond) = lower.write(src);
        self.bytes_out += n as u64;
        tracing::trace!(descriptor = %lower.descriptor_id(), stream = %self.label, n, %cond, "write");
        (n, cond)
    }

    fn event(&mut self, event: EventType, chain: &mut Chain<'_>) -> Condition {
        tracing::trace!(
            descriptor = %chain.descriptor_id(),
            stream = %self.label,
            %event,
            bytes_in = self.bytes_in,
            bytes_out = self.bytes_out,
            "event"
        );
        Condition::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Descriptor;
    use crate::endpoint::MemoryEndpoint;

    #[test]
    fn test_counts_bytes_and_passes_through() {
        let (ep, peer) = MemoryEndpoint::new();
        let mut d = Descriptor::new(ep).with_stream(TraceStream::new("wire")).unwrap();
        peer.feed(b"abcd");
        let mut buf = [0u8; 8];
        assert_eq!(d.read(&mut buf), (4, Condition::Ok));
        assert_eq!(d.write(b"xy"), (2, Condition::Ok));
        assert_eq!(peer.output(), b"xy");
        assert_eq!(d.stream_names(), vec!["wire"]);
    }
}
