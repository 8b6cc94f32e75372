//! Wall-clock and batch-size histograms for the relay loop.
//!
//! Follows the same atomic-counter metrics style as `ombus_net::ServerStats`,
//! extended with a log2-bucketed histogram since loop latency spans several
//! orders of magnitude (sub-microsecond busy spins up to multi-millisecond
//! sleeps).

use std::sync::atomic::{AtomicU64, Ordering};

const NANOS_BUCKETS: usize = 48;

/// Batch-size bins: `0, 1, 2..3, 4..7, 8..15, >=16`.
const BATCH_BINS: usize = 6;

/// Per-loop-iteration statistics for one relay instance.
#[derive(Debug)]
pub struct RelayStats {
    loop_nanos_hist: [AtomicU64; NANOS_BUCKETS],
    batch_size_hist: [AtomicU64; BATCH_BINS],
    total_loop_nanos: AtomicU64,
    total_records: AtomicU64,
    total_loops: AtomicU64,
}

/// A point-in-time, non-atomic copy of the running totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayTotals {
    pub total_loop_nanos: u64,
    pub total_records: u64,
    pub total_loops: u64,
}

impl Default for RelayStats {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayStats {
    #[must_use]
    pub fn new() -> Self {
        Self {
            loop_nanos_hist: std::array::from_fn(|_| AtomicU64::new(0)),
            batch_size_hist: std::array::from_fn(|_| AtomicU64::new(0)),
            total_loop_nanos: AtomicU64::new(0),
            total_records: AtomicU64::new(0),
            total_loops: AtomicU64::new(0),
        }
    }

    fn batch_bin(len: usize) -> usize {
        match len {
            0 => 0,
            1 => 1,
            2..=3 => 2,
            4..=7 => 3,
            8..=15 => 4,
            _ => 5,
        }
    }

    /// Records one loop iteration: its wall-clock duration and the number
    /// of records it forwarded (`0` for an empty poll).
    pub fn record_loop(&self, nanos: u64, batch_len: usize) {
        let bucket = if nanos == 0 {
            0
        } else {
            (63 - nanos.leading_zeros()) as usize
        }
        .min(NANOS_BUCKETS - 1);
        self.loop_nanos_hist[bucket].fetch_add(1, Ordering::Relaxed);
        self.batch_size_hist[Self::batch_bin(batch_len)].fetch_add(1, Ordering::Relaxed);
        self.total_loop_nanos.fetch_add(nanos, Ordering::Relaxed);
        self.total_records
            .fetch_add(batch_len as u64, Ordering::Relaxed);
        self.total_loops.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the lower bound (in nanoseconds) of the first histogram
    /// bucket whose cumulative count reaches `centile` (e.g. `99.0`).
    #[must_use]
    pub fn percentile_nanos(&self, centile: f64) -> u64 {
        let total: u64 = self
            .loop_nanos_hist
            .iter()
            .map(|b| b.load(Ordering::Relaxed))
            .sum();
        if total == 0 {
            return 0;
        }
        let target = ((centile / 100.0) * total as f64).ceil() as u64;
        let mut cumulative = 0u64;
        for (i, bucket) in self.loop_nanos_hist.iter().enumerate() {
            cumulative += bucket.load(Ordering::Relaxed);
            if cumulative >= target {
                return 1u64 << i;
            }
        }
        1u64 << (NANOS_BUCKETS - 1)
    }

    #[must_use]
    pub fn totals(&self) -> RelayTotals {
        RelayTotals {
            total_loop_nanos: self.total_loop_nanos.load(Ordering::Relaxed),
            total_records: self.total_records.load(Ordering::Relaxed),
            total_loops: self.total_loops.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_of_uniform_samples_is_monotonic() {
        let stats = RelayStats::new();
        for nanos in [100u64, 200, 400, 800, 1600, 3200, 6400] {
            stats.record_loop(nanos, 1);
        }
        let p50 = stats.percentile_nanos(50.0);
        let p99 = stats.percentile_nanos(99.0);
        assert!(p99 >= p50);
    }

    #[test]
    fn empty_histogram_percentile_is_zero() {
        let stats = RelayStats::new();
        assert_eq!(stats.percentile_nanos(99.0), 0);
    }

    #[test]
    fn totals_accumulate_across_loops() {
        let stats = RelayStats::new();
        stats.record_loop(100, 4);
        stats.record_loop(200, 0);
        let totals = stats.totals();
        assert_eq!(totals.total_loops, 2);
        assert_eq!(totals.total_records, 4);
        assert_eq!(totals.total_loop_nanos, 300);
    }
}
