//! 16-byte wire frame header shared by the server's encoder and the
//! client's reassembly state machine.
//!
//! ```text
//! offset  size  field
//!  0      4     magic = 0x4F4D5446 ("OMTF")
//!  4      1     type (record type, or 0xFE = slow-consumer warning)
//!  5      1     flags (reserved, 0)
//!  6      2     payload_len
//!  8      8     wal_seq
//! ```

use ombus_core::{FRAME_HEADER_LEN, TCP_FRAME_MAGIC};

/// A decoded (but not yet payload-bearing) frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub record_type: u8,
    pub payload_len: u16,
    pub wal_seq: u64,
}

impl FrameHeader {
    /// Encodes this header into the first [`FRAME_HEADER_LEN`] bytes of `out`.
    pub fn encode_into(self, out: &mut [u8; FRAME_HEADER_LEN]) {
        out[0..4].copy_from_slice(&TCP_FRAME_MAGIC.to_le_bytes());
        out[4] = self.record_type;
        out[5] = 0;
        out[6..8].copy_from_slice(&self.payload_len.to_le_bytes());
        out[8..16].copy_from_slice(&self.wal_seq.to_le_bytes());
    }

    /// Decodes a header from exactly [`FRAME_HEADER_LEN`] bytes.
    ///
    /// Returns `None` if `magic` doesn't match — callers surface this as
    /// `Error::TcpProtocol`, a fatal condition for the connection.
    #[must_use]
    pub fn decode(bytes: &[u8; FRAME_HEADER_LEN]) -> Option<Self> {
        let magic = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        if magic != TCP_FRAME_MAGIC {
            return None;
        }
        let record_type = bytes[4];
        let payload_len = u16::from_le_bytes(bytes[6..8].try_into().unwrap());
        let wal_seq = u64::from_le_bytes(bytes[8..16].try_into().unwrap());
        Some(Self {
            record_type,
            payload_len,
            wal_seq,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Frame header round-trip: any `(record_type, payload_len, wal_seq)`
        /// triple survives `encode_into`/`decode` unchanged.
        #[test]
        fn header_round_trips_for_any_fields(
            record_type in any::<u8>(),
            payload_len in any::<u16>(),
            wal_seq in any::<u64>(),
        ) {
            let header = FrameHeader { record_type, payload_len, wal_seq };
            let mut buf = [0u8; FRAME_HEADER_LEN];
            header.encode_into(&mut buf);
            prop_assert_eq!(FrameHeader::decode(&buf), Some(header));
        }
    }

    #[test]
    fn round_trips_fields() {
        let header = FrameHeader {
            record_type: 3,
            payload_len: 128,
            wal_seq: 987_654,
        };
        let mut buf = [0u8; FRAME_HEADER_LEN];
        header.encode_into(&mut buf);
        assert_eq!(FrameHeader::decode(&buf), Some(header));
    }

    #[test]
    fn rejects_bad_magic() {
        let mut buf = [0u8; FRAME_HEADER_LEN];
        buf[0] = 0xFF;
        assert_eq!(FrameHeader::decode(&buf), None);
    }
}
