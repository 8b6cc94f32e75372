//! Fixed-capacity byte ring for one client's outbound stream.
//!
//! Owned by the server, one per connected client. `push` never blocks and
//! never grows the buffer — it reports how much free space remains so the
//! caller can decide whether a frame fits before writing any of it.

/// A bounded byte ring. `push`/`drain_into` never allocate past `capacity`.
pub struct OutboundRing {
    buf: Vec<u8>,
    capacity: usize,
    head: usize,
    len: usize,
}

impl OutboundRing {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity],
            capacity,
            head: 0,
            len: 0,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn free(&self) -> usize {
        self.capacity - self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Appends `bytes` to the ring. Caller must have already checked
    /// `free() >= bytes.len()`.
    ///
    /// # Panics
    ///
    /// Panics if `bytes` does not fit in the remaining free space.
    pub fn push(&mut self, bytes: &[u8]) {
        assert!(
            bytes.len() <= self.free(),
            "outbound ring overflow: {} > {}",
            bytes.len(),
            self.free()
        );
        let tail = (self.head + self.len) % self.capacity;
        let first = (self.capacity - tail).min(bytes.len());
        self.buf[tail..tail + first].copy_from_slice(&bytes[..first]);
        if first < bytes.len() {
            let rest = bytes.len() - first;
            self.buf[..rest].copy_from_slice(&bytes[first..]);
        }
        self.len += bytes.len();
    }

    /// Writes as much of the buffered data as `writer` accepts, removing
    /// exactly the bytes it reported written. Propagates `WouldBlock` (no
    /// bytes consumed) and any other I/O error up to the caller.
    pub fn drain_into<W: std::io::Write>(&mut self, writer: &mut W) -> std::io::Result<usize> {
        let mut total = 0;
        while self.len > 0 {
            let contiguous = self.capacity - self.head;
            let run = contiguous.min(self.len);
            match writer.write(&self.buf[self.head..self.head + run]) {
                Ok(0) => break,
                Ok(n) => {
                    self.head = (self.head + n) % self.capacity;
                    self.len -= n;
                    total += n;
                    if n < run {
                        break;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    if total == 0 {
                        return Err(e);
                    }
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    struct Sink(Vec<u8>);
    impl Write for Sink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn push_then_drain_preserves_bytes() {
        let mut ring = OutboundRing::new(8);
        ring.push(&[1, 2, 3]);
        ring.push(&[4, 5]);
        let mut sink = Sink(Vec::new());
        let n = ring.drain_into(&mut sink).unwrap();
        assert_eq!(n, 5);
        assert_eq!(sink.0, vec![1, 2, 3, 4, 5]);
        assert!(ring.is_empty());
    }

    #[test]
    fn wraps_around_capacity() {
        let mut ring = OutboundRing::new(4);
        ring.push(&[1, 2, 3]);
        let mut sink = Sink(Vec::new());
        ring.drain_into(&mut sink).unwrap();
        ring.push(&[4, 5, 6]);
        let mut sink2 = Sink(Vec::new());
        ring.drain_into(&mut sink2).unwrap();
        assert_eq!(sink2.0, vec![4, 5, 6]);
    }

    #[test]
    #[should_panic(expected = "outbound ring overflow")]
    fn push_past_capacity_panics() {
        let mut ring = OutboundRing::new(2);
        ring.push(&[1, 2, 3]);
    }
}
