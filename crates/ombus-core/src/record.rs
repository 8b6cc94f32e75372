/// Record type code reserved for the TCP slow-consumer warning frame.
///
/// Applications publishing records must not use this type; both the SHM
/// and TCP consumers treat it specially.
pub const SLOW_WARNING_TYPE: u8 = 0xFE;

/// Fixed fields shared by every record representation (slot header, wire
/// frame header, and the owned/borrowed in-memory views below).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    /// Monotonically increasing sequence chosen by the producer.
    pub seq: u64,
    /// Opaque application type tag. `SLOW_WARNING_TYPE` is reserved.
    pub record_type: u8,
    /// Length of the payload in bytes.
    pub payload_len: u16,
}

/// A record whose payload borrows from some backing buffer (a mapped SHM
/// slot, or a TCP client's reassembly window). Valid only as long as the
/// backing buffer isn't reused — see the zero-copy notes on each consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record<'a> {
    /// The record's fixed-size fields.
    pub header: RecordHeader,
    /// The payload bytes. `payload.len() == header.payload_len as usize`.
    pub payload: &'a [u8],
}

impl<'a> Record<'a> {
    /// Sequence number, shorthand for `self.header.seq`.
    #[inline]
    #[must_use]
    pub fn seq(&self) -> u64 {
        self.header.seq
    }

    /// Record type, shorthand for `self.header.record_type`.
    #[inline]
    #[must_use]
    pub fn record_type(&self) -> u8 {
        self.header.record_type
    }

    /// Copies this borrowed record into an owned, 'static record.
    #[must_use]
    pub fn to_owned(&self) -> OwnedRecord {
        OwnedRecord {
            header: self.header,
            payload: self.payload.to_vec(),
        }
    }
}

/// An owned record, used by non-zero-copy consumers and cross-thread
/// hand-off (the TCP server's per-client outbound buffer, batch collection
/// in the relay's caller-side tooling, and test fixtures).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedRecord {
    /// The record's fixed-size fields.
    pub header: RecordHeader,
    /// Owned payload bytes.
    pub payload: Vec<u8>,
}

impl OwnedRecord {
    /// Builds an owned record from its parts, computing `payload_len`.
    ///
    /// # Panics
    ///
    /// Panics if `payload.len()` does not fit in a `u16`.
    #[must_use]
    pub fn new(seq: u64, record_type: u8, payload: Vec<u8>) -> Self {
        let payload_len = u16::try_from(payload.len()).expect("payload too large for u16 length");
        Self {
            header: RecordHeader {
                seq,
                record_type,
                payload_len,
            },
            payload,
        }
    }

    /// Borrows this owned record as a [`Record`].
    #[must_use]
    pub fn as_record(&self) -> Record<'_> {
        Record {
            header: self.header,
            payload: &self.payload,
        }
    }
}
