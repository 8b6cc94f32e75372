use thiserror::Error;

/// Unified error taxonomy surfaced by both the SHM and TCP transports.
///
/// Errors fall into three classes (see the crate-level docs): recoverable at
/// the caller, fatal for the current handle, or a programmer error. The
/// variant doc comments note which class each belongs to.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// No record available right now; retry later. Class: recoverable.
    #[error("no record available")]
    Empty,

    /// Delivered sequence exceeds the expected next value. Class: recoverable.
    #[error("gap detected: expected {expected}, got {got}")]
    GapDetected {
        /// The sequence the consumer expected next.
        expected: u64,
        /// The sequence actually delivered.
        got: u64,
    },

    /// Payload CRC does not match the stored checksum. Class: fatal.
    #[error("crc mismatch for seq {seq}")]
    CrcMismatch {
        /// Sequence of the record whose CRC failed.
        seq: u64,
    },

    /// The producer restarted; the endpoint must be reopened. Class: fatal.
    #[error("producer epoch changed")]
    EpochChanged,

    /// SHM header magic does not match. Class: fatal.
    #[error("shm header magic mismatch")]
    MagicMismatch,

    /// SHM header version does not match. Class: fatal.
    #[error("shm header version mismatch: got {got}, want {want}")]
    VersionMismatch {
        /// Version found in the header.
        got: u32,
        /// Version this implementation supports.
        want: u32,
    },

    /// Payload exceeds `slot_size - 24`. Class: programmer error.
    #[error("record too large: {len} bytes exceeds max {max}")]
    RecordTooLarge {
        /// Length of the rejected payload.
        len: usize,
        /// Maximum payload length allowed by the slot size.
        max: usize,
    },

    /// Consumer index out of `[0, max_consumers)` at open time. Class: programmer error.
    #[error("consumer index {index} invalid for max_consumers {max}")]
    ConsumerIndexInvalid {
        /// The requested consumer index.
        index: u32,
        /// The stream's configured `max_consumers`.
        max: u32,
    },

    /// Capacity is not a power of two, or slot_size too small. Class: programmer error.
    #[error("invalid stream configuration: {reason}")]
    InvalidConfig {
        /// Human-readable reason the configuration was rejected.
        reason: &'static str,
    },

    /// A filesystem/mmap operation on the SHM backing file failed.
    #[error("shm io error: {0}")]
    ShmIo(String),

    /// TCP listener bind failed. Class: programmer error.
    #[error("tcp bind failed: {0}")]
    TcpBind(String),

    /// TCP connect failed. Class: recoverable (auto-reconnect retries it).
    #[error("tcp connect failed: {0}")]
    TcpConnect(String),

    /// A send on an established TCP connection failed.
    #[error("tcp send failed: {0}")]
    TcpSend(String),

    /// A recv on an established TCP connection failed.
    #[error("tcp recv failed: {0}")]
    TcpRecv(String),

    /// Remote closed the connection, orderly or otherwise. Class: fatal.
    #[error("tcp disconnected")]
    TcpDisconnected,

    /// Wire magic mismatch on a frame header. Class: fatal.
    #[error("tcp protocol error: bad frame magic")]
    TcpProtocol,

    /// Server already has `max_clients` connections. Class: programmer error.
    #[error("tcp server at max clients")]
    TcpMaxClients,

    /// Server warned this client that frames were or will be dropped for it.
    /// Class: recoverable.
    #[error("slow consumer warning at seq {seq}")]
    SlowWarning {
        /// Sequence carried by the warning frame.
        seq: u64,
    },

    /// Cursor file magic or CRC did not validate.
    #[error("cursor file invalid: {reason}")]
    CursorInvalid {
        /// Human-readable reason the cursor file was rejected.
        reason: &'static str,
    },
}

/// Convenience alias used throughout the ombus crates.
pub type Result<T> = std::result::Result<T, Error>;
