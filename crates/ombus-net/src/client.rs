//! TCP client: connects, reassembles framed records, and tracks sequence
//! expectations. [`crate::reconnect::AutoReconnectClient`] wraps this with
//! exponential-backoff reconnection.

use crate::frame::FrameHeader;
use ombus_core::{
    classify_sequence, Delivery, Error, Record, RecordHeader, Result, FRAME_HEADER_LEN,
    SLOW_WARNING_TYPE,
};
use std::net::TcpStream;

/// Configuration for [`Client::connect`].
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    /// Size of the receive/reassembly buffer in bytes.
    pub recv_buf_size: usize,
    /// Reject (rather than silently accept) sequences below `expected_seq`.
    pub reject_reorder: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 0,
            recv_buf_size: 256 * 1024,
            reject_reorder: false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum State {
    WantHeader,
    WantPayload(FrameHeader),
}

/// A connected TCP client reassembling the framed record stream.
pub struct Client {
    stream: TcpStream,
    buf: Vec<u8>,
    start: usize,
    filled: usize,
    state: State,
    expected_seq: u64,
    reject_reorder: bool,
    last_wal_seq: u64,
    draining: bool,
}

impl Client {
    /// Performs a blocking connect, then switches the socket to
    /// non-blocking and disables Nagle's algorithm.
    pub fn connect(config: ClientConfig) -> Result<Self> {
        let stream = TcpStream::connect((config.host.as_str(), config.port))
            .map_err(|e| Error::TcpConnect(e.to_string()))?;
        stream
            .set_nonblocking(true)
            .map_err(|e| Error::TcpConnect(e.to_string()))?;
        let _ = stream.set_nodelay(true);

        Ok(Self {
            stream,
            buf: vec![0u8; config.recv_buf_size],
            start: 0,
            filled: 0,
            state: State::WantHeader,
            expected_seq: 0,
            reject_reorder: config.reject_reorder,
            last_wal_seq: 0,
            draining: false,
        })
    }

    /// Last `wal_seq` this client delivered (including slow-warning
    /// frames), or `0` if none yet.
    #[must_use]
    pub fn last_wal_seq(&self) -> u64 {
        self.last_wal_seq
    }

    /// Seeds `expected_seq` so a subsequent gap is detected against a
    /// sequence observed on a *previous* connection (used by
    /// [`crate::reconnect::AutoReconnectClient`] across reconnects).
    pub(crate) fn seed_expected_seq(&mut self, seq: u64) {
        self.expected_seq = seq;
    }

    fn compact(&mut self) {
        if self.start > 0 {
            self.buf.copy_within(self.start..self.filled, 0);
            self.filled -= self.start;
            self.start = 0;
        }
    }

    /// Tries to decode one frame out of the already-buffered bytes.
    /// `Ok(None)` means more bytes are needed. Slow-warning frames and
    /// bad magic surface as `Err`, consistent with the rest of the error
    /// taxonomy.
    fn try_decode(&mut self) -> Result<Option<(Delivery, Record<'_>)>> {
        loop {
            match self.state {
                State::WantHeader => {
                    if self.filled - self.start < FRAME_HEADER_LEN {
                        return Ok(None);
                    }
                    let mut hdr_bytes = [0u8; FRAME_HEADER_LEN];
                    hdr_bytes.copy_from_slice(&self.buf[self.start..self.start + FRAME_HEADER_LEN]);
                    let header = FrameHeader::decode(&hdr_bytes).ok_or(Error::TcpProtocol)?;
                    self.start += FRAME_HEADER_LEN;
                    self.state = State::WantPayload(header);
                }
                State::WantPayload(header) => {
                    let payload_len = header.payload_len as usize;
                    if self.filled - self.start < payload_len {
                        return Ok(None);
                    }
                    let payload_start = self.start;
                    self.start += payload_len;
                    self.state = State::WantHeader;

                    if header.record_type == SLOW_WARNING_TYPE && payload_len == 0 {
                        self.last_wal_seq = header.wal_seq;
                        return Err(Error::SlowWarning { seq: header.wal_seq });
                    }

                    let (delivery, next_expected) =
                        classify_sequence(self.expected_seq, header.wal_seq, self.reject_reorder);
                    self.expected_seq = next_expected;
                    self.last_wal_seq = header.wal_seq;

                    let payload = &self.buf[payload_start..payload_start + payload_len];
                    return Ok(Some((
                        delivery,
                        Record {
                            header: RecordHeader {
                                seq: header.wal_seq,
                                record_type: header.record_type,
                                payload_len: header.payload_len,
                            },
                            payload,
                        },
                    )));
                }
            }
        }
    }

    /// Non-blocking poll. Drains every already-buffered frame before
    /// surfacing a disconnect, so the caller sees every byte the server
    /// actually sent.
    pub fn poll(&mut self) -> Result<(Delivery, Record<'_>)> {
        use std::io::Read;

        if let Some(result) = self.try_decode()? {
            return Ok(result);
        }
        if self.draining {
            return Err(Error::TcpDisconnected);
        }

        loop {
            self.compact();
            if self.filled == self.buf.len() {
                return Err(Error::TcpRecv(
                    "receive buffer full without a complete frame".to_string(),
                ));
            }
            match self.stream.read(&mut self.buf[self.filled..]) {
                Ok(0) => {
                    self.draining = true;
                    return match self.try_decode()? {
                        Some(result) => Ok(result),
                        None => Err(Error::TcpDisconnected),
                    };
                }
                Ok(n) => {
                    self.filled += n;
                    if let Some(result) = self.try_decode()? {
                        return Ok(result);
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return Err(Error::Empty),
                Err(e) => return Err(Error::TcpRecv(e.to_string())),
            }
        }
    }
}
