/// Feature bits stamped into the SHM header and agreed on by producer and consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StreamFlags(u32);

impl StreamFlags {
    /// Verify payload CRC on every poll.
    pub const CRC: Self = Self(1 << 0);
    /// Reject (rather than silently accept) sequences below `expected_seq`.
    pub const REJECT_REORDER: Self = Self(1 << 1);

    /// Empty flag set.
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Builds flags from a raw bit pattern (used when reading the SHM header).
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw bit pattern, for stamping into the SHM header.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// True if every bit set in `other` is also set in `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for StreamFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Configuration for creating a new stream (producer side).
///
/// Follows a `Config::default()` / named-preset pattern: a base config
/// plus ready-made presets for common tuning profiles (see
/// `low_latency_config` / `high_throughput_config`).
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StreamConfig {
    /// SHM object name, e.g. `/ombus-orders`.
    pub stream_name: String,
    /// Ring capacity in slots. Must be a power of two.
    pub capacity: u32,
    /// Bytes per slot, including the 24-byte header.
    pub slot_size: u32,
    /// Number of consumer tail-table entries to reserve.
    pub max_consumers: u32,
    /// CRC / reorder-rejection feature bits.
    pub flags: StreamFlags,
    /// Consumers idle longer than this are excluded from the live-tail scan.
    /// `0` disables staleness bypass (every consumer always counts).
    pub staleness_nanos: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            stream_name: String::new(),
            capacity: 4096,
            slot_size: 256,
            max_consumers: 8,
            flags: StreamFlags::empty(),
            staleness_nanos: 0,
        }
    }
}

/// Preset tuned for small, latency-sensitive payloads.
#[must_use]
pub fn low_latency_config(stream_name: impl Into<String>) -> StreamConfig {
    StreamConfig {
        stream_name: stream_name.into(),
        capacity: 1024,
        slot_size: 128,
        max_consumers: 4,
        ..StreamConfig::default()
    }
}

/// Preset tuned for larger payloads and many consumers.
#[must_use]
pub fn high_throughput_config(stream_name: impl Into<String>) -> StreamConfig {
    StreamConfig {
        stream_name: stream_name.into(),
        capacity: 65536,
        slot_size: 1024,
        max_consumers: 32,
        ..StreamConfig::default()
    }
}

impl StreamConfig {
    /// Index mask for wrapping a `head`/`tail` sequence into `[0, capacity)`.
    #[must_use]
    pub fn mask(&self) -> u64 {
        u64::from(self.capacity) - 1
    }

    /// Maximum payload length this configuration can hold in one slot.
    #[must_use]
    pub fn max_payload_len(&self) -> usize {
        self.slot_size as usize - ombus_core::SLOT_HEADER_LEN
    }
}

/// Configuration for attaching a consumer endpoint to an existing stream.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EndpointConfig {
    /// SHM object name to attach to. Must match the producer's `stream_name`.
    pub stream_name: String,
    /// This consumer's slot in the tail table, in `[0, max_consumers)`.
    pub consumer_index: u32,
    /// If false, `poll`/`poll_batch` copy the payload into an owned buffer
    /// instead of returning a pointer into the mapped region.
    pub zero_copy: bool,
}

impl EndpointConfig {
    /// Builds an endpoint config with zero-copy delivery enabled.
    #[must_use]
    pub fn new(stream_name: impl Into<String>, consumer_index: u32) -> Self {
        Self {
            stream_name: stream_name.into(),
            consumer_index,
            zero_copy: true,
        }
    }
}
