//! Byte layout of the SHM object and raw accessors into the mapped region.
//!
//! The stream is one contiguous, page-aligned file: a 4096-byte header page,
//! a consumer tail table (`max_consumers` cache-line-sized entries), then the
//! slot array. All multi-byte fields are little-endian; on-disk layout must
//! match across producer and consumer processes regardless of platform.

use ombus_core::SLOT_HEADER_LEN;
use std::sync::atomic::{AtomicU32, AtomicU64};

/// Size of the header page in bytes.
pub const HEADER_PAGE_LEN: usize = 4096;
/// Size of one consumer tail-table entry in bytes (cache-line sized).
pub const TAIL_ENTRY_LEN: usize = 64;
/// Maximum length of a stream name, not counting the trailing NUL.
pub const STREAM_NAME_MAX: usize = 63;

const OFF_MAGIC: usize = 0;
const OFF_VERSION: usize = 4;
const OFF_SLOT_SIZE: usize = 8;
const OFF_CAPACITY: usize = 12;
const OFF_MAX_CONSUMERS: usize = 16;
const OFF_FLAGS: usize = 20;
const OFF_STALENESS_NANOS: usize = 24;
const OFF_HEAD: usize = 32;
const OFF_MIN_TAIL: usize = 40;
const OFF_PRODUCER_EPOCH: usize = 48;
const OFF_STREAM_NAME: usize = 56;

const OFF_TAIL: usize = 0;
const OFF_LAST_WAL_SEQ: usize = 8;
const OFF_LAST_POLL_NANOS: usize = 16;

/// Total byte size of the SHM object for a given stream configuration.
#[must_use]
pub fn object_len(capacity: u32, slot_size: u32, max_consumers: u32) -> usize {
    HEADER_PAGE_LEN
        + max_consumers as usize * TAIL_ENTRY_LEN
        + capacity as usize * slot_size as usize
}

/// Byte offset, from the start of the object, of the tail-table entry for `index`.
#[must_use]
pub fn tail_entry_offset(index: u32) -> usize {
    HEADER_PAGE_LEN + index as usize * TAIL_ENTRY_LEN
}

/// Byte offset, from the start of the object, of slot `ring_index`.
#[must_use]
pub fn slot_offset(ring_index: usize, slot_size: u32, max_consumers: u32) -> usize {
    HEADER_PAGE_LEN + max_consumers as usize * TAIL_ENTRY_LEN + ring_index * slot_size as usize
}

/// Raw view over the header page. Does not own the memory; `base` must stay
/// valid (and mapped) for the view's entire lifetime.
#[derive(Clone, Copy)]
pub struct HeaderView {
    base: *mut u8,
}

impl HeaderView {
    /// Wraps a pointer to the start of the mapped SHM object.
    ///
    /// # Safety
    ///
    /// `base` must point to at least `HEADER_PAGE_LEN` valid, mapped bytes
    /// that outlive this view.
    #[must_use]
    pub unsafe fn new(base: *mut u8) -> Self {
        Self { base }
    }

    unsafe fn u32_at(self, offset: usize) -> &'static AtomicU32 {
        &*self.base.add(offset).cast::<AtomicU32>()
    }

    unsafe fn u64_at(self, offset: usize) -> &'static AtomicU64 {
        &*self.base.add(offset).cast::<AtomicU64>()
    }

    /// The `magic` field. Read with `Relaxed`; written once at `create`.
    pub fn magic(self) -> &'static AtomicU32 {
        unsafe { self.u32_at(OFF_MAGIC) }
    }

    /// The `version` field. Read with `Relaxed`; written once at `create`.
    pub fn version(self) -> &'static AtomicU32 {
        unsafe { self.u32_at(OFF_VERSION) }
    }

    /// The `slot_size` field, fixed for the stream's lifetime.
    pub fn slot_size(self) -> &'static AtomicU32 {
        unsafe { self.u32_at(OFF_SLOT_SIZE) }
    }

    /// The `capacity` field, fixed for the stream's lifetime.
    pub fn capacity(self) -> &'static AtomicU32 {
        unsafe { self.u32_at(OFF_CAPACITY) }
    }

    /// The `max_consumers` field, fixed for the stream's lifetime.
    pub fn max_consumers(self) -> &'static AtomicU32 {
        unsafe { self.u32_at(OFF_MAX_CONSUMERS) }
    }

    /// The `flags` field, fixed for the stream's lifetime.
    pub fn flags(self) -> &'static AtomicU32 {
        unsafe { self.u32_at(OFF_FLAGS) }
    }

    /// The `staleness_nanos` field, fixed for the stream's lifetime.
    pub fn staleness_nanos(self) -> &'static AtomicU64 {
        unsafe { self.u64_at(OFF_STALENESS_NANOS) }
    }

    /// Producer-owned ring head; the next sequence to be published.
    pub fn head(self) -> &'static AtomicU64 {
        unsafe { self.u64_at(OFF_HEAD) }
    }

    /// Cached minimum consumer tail, refreshed by the live-tail scan.
    pub fn min_tail(self) -> &'static AtomicU64 {
        unsafe { self.u64_at(OFF_MIN_TAIL) }
    }

    /// Monotonic timestamp stamped once per producer instance.
    pub fn producer_epoch(self) -> &'static AtomicU64 {
        unsafe { self.u64_at(OFF_PRODUCER_EPOCH) }
    }

    /// Raw byte slice holding the NUL-terminated stream name (64 bytes).
    ///
    /// # Safety
    ///
    /// Caller must not hold this slice across a write to the same bytes.
    pub unsafe fn stream_name_bytes(self) -> &'static mut [u8] {
        std::slice::from_raw_parts_mut(self.base.add(OFF_STREAM_NAME), STREAM_NAME_MAX + 1)
    }
}

// Safety: HeaderView is a thin pointer wrapper over memory that is
// synchronized by the atomics it hands out; sharing the view across
// threads is the same as sharing `&AtomicU64` references.
unsafe impl Send for HeaderView {}
unsafe impl Sync for HeaderView {}

/// Raw view over one consumer's tail-table entry.
#[derive(Clone, Copy)]
pub struct TailEntryView {
    base: *mut u8,
}

impl TailEntryView {
    /// Wraps a pointer to the start of a tail-table entry.
    ///
    /// # Safety
    ///
    /// `base` must point to at least `TAIL_ENTRY_LEN` valid, mapped bytes
    /// that outlive this view.
    #[must_use]
    pub unsafe fn new(base: *mut u8) -> Self {
        Self { base }
    }

    /// This consumer's current read position, owned only by this consumer.
    pub fn tail(self) -> &'static AtomicU64 {
        unsafe { &*self.base.add(OFF_TAIL).cast::<AtomicU64>() }
    }

    /// Last `wal_seq` this consumer observed.
    pub fn last_wal_seq(self) -> &'static AtomicU64 {
        unsafe { &*self.base.add(OFF_LAST_WAL_SEQ).cast::<AtomicU64>() }
    }

    /// Monotonic-clock nanoseconds at the consumer's last poll.
    pub fn last_poll_nanos(self) -> &'static AtomicU64 {
        unsafe { &*self.base.add(OFF_LAST_POLL_NANOS).cast::<AtomicU64>() }
    }
}

unsafe impl Send for TailEntryView {}
unsafe impl Sync for TailEntryView {}

/// Raw view over one slot: header plus inline payload region.
#[derive(Clone, Copy)]
pub struct SlotView {
    base: *mut u8,
    slot_size: usize,
}

impl SlotView {
    /// Wraps a pointer to the start of a slot.
    ///
    /// # Safety
    ///
    /// `base` must point to at least `slot_size` valid, mapped bytes that
    /// outlive this view.
    #[must_use]
    pub unsafe fn new(base: *mut u8, slot_size: usize) -> Self {
        Self { base, slot_size }
    }

    /// The slot's synchronization tag. Producer release-stores `head + 1`
    /// here as the publish fence; consumers acquire-load it.
    pub fn slot_seq(self) -> &'static AtomicU64 {
        unsafe { &*self.base.cast::<AtomicU64>() }
    }

    /// Writes the non-atomic header fields ahead of the publish fence.
    ///
    /// # Safety
    ///
    /// Must only be called by the single producer, and only before the
    /// `slot_seq` release store that publishes this slot.
    pub unsafe fn write_header(self, wal_seq: u64, record_type: u8, payload_len: u16, crc32: u32) {
        self.base.add(8).cast::<u64>().write_unaligned(wal_seq);
        self.base.add(16).write(record_type);
        self.base.add(17).write(0);
        self.base
            .add(18)
            .cast::<u16>()
            .write_unaligned(payload_len);
        self.base.add(20).cast::<u32>().write_unaligned(crc32);
    }

    /// Reads the non-atomic header fields after observing the publish fence.
    ///
    /// # Safety
    ///
    /// Caller must have already acquire-loaded `slot_seq` and confirmed
    /// this slot is ready.
    pub unsafe fn read_header(self) -> (u64, u8, u16, u32) {
        let wal_seq = self.base.add(8).cast::<u64>().read_unaligned();
        let record_type = self.base.add(16).read();
        let payload_len = self.base.add(18).cast::<u16>().read_unaligned();
        let crc32 = self.base.add(20).cast::<u32>().read_unaligned();
        (wal_seq, record_type, payload_len, crc32)
    }

    /// Payload region, `slot_size - SLOT_HEADER_LEN` bytes.
    ///
    /// # Safety
    ///
    /// Same aliasing requirements as `write_header`/`read_header`: callers
    /// must respect the single-producer/many-reader protocol around the
    /// `slot_seq` fence.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn payload_mut(self) -> &'static mut [u8] {
        std::slice::from_raw_parts_mut(
            self.base.add(SLOT_HEADER_LEN),
            self.slot_size - SLOT_HEADER_LEN,
        )
    }

    /// Payload region for reading.
    ///
    /// # Safety
    ///
    /// Same requirements as `payload_mut`.
    pub unsafe fn payload(self) -> &'static [u8] {
        std::slice::from_raw_parts(
            self.base.add(SLOT_HEADER_LEN),
            self.slot_size - SLOT_HEADER_LEN,
        )
    }
}

unsafe impl Send for SlotView {}
unsafe impl Sync for SlotView {}
