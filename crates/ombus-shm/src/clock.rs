use std::time::{SystemTime, UNIX_EPOCH};

/// Nanoseconds since the Unix epoch.
///
/// `std::time::Instant` is process-local and can't be compared across the
/// producer/consumer process boundary (nor survive a producer restart), so
/// timestamps that cross that boundary — `producer_epoch`, `last_poll_nanos`
/// — use wall-clock time instead.
#[must_use]
pub(crate) fn now_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_nanos() as u64
}
