use crate::backoff::BackpressureLoop;
use crate::clock::now_nanos;
use crate::config::{StreamConfig, StreamFlags};
use crate::invariants::debug_assert_backpressure_bound;
use crate::layout::{self, HeaderView, SlotView, TailEntryView};
use crate::shm_file;
use memmap2::MmapMut;
use ombus_core::{Error, Record, Result, SHM_HEADER_MAGIC, SHM_HEADER_VERSION};
use std::sync::atomic::Ordering;

/// Optional hook invoked exactly once per publish call that had to wait for
/// ring space, at the spin→yield transition.
pub type BackpressureCallback = Box<dyn FnMut() + Send>;

/// Owns and publishes to a shared-memory stream. Not `Clone`, and not
/// reentrant: one thread publishes at a time.
pub struct Producer {
    mmap: MmapMut,
    config: StreamConfig,
    backpressure_callback: Option<BackpressureCallback>,
}

fn validate_config(config: &StreamConfig) -> Result<()> {
    if !config.capacity.is_power_of_two() {
        return Err(Error::InvalidConfig {
            reason: "capacity must be a power of two",
        });
    }
    if (config.slot_size as usize) < ombus_core::SLOT_HEADER_LEN + 1 {
        return Err(Error::InvalidConfig {
            reason: "slot_size must be at least 25 bytes",
        });
    }
    if config.max_consumers == 0 {
        return Err(Error::InvalidConfig {
            reason: "max_consumers must be at least 1",
        });
    }
    if config.stream_name.len() > layout::STREAM_NAME_MAX {
        return Err(Error::InvalidConfig {
            reason: "stream_name exceeds 63 bytes",
        });
    }
    Ok(())
}

impl Producer {
    /// Opens or creates the stream's backing SHM object in place, truncates
    /// it to size, stamps the header with a fresh `producer_epoch`, and
    /// reinitializes the tail table and every slot's `slot_seq` to its ring
    /// index. Reusing the existing object (rather than unlinking and
    /// reallocating) means a consumer already mapped to it observes the new
    /// epoch on its next poll instead of being orphaned on a stale mapping.
    pub fn create(config: StreamConfig) -> Result<Self> {
        validate_config(&config)?;

        let len = layout::object_len(config.capacity, config.slot_size, config.max_consumers);
        let mut mmap = shm_file::create(&config.stream_name, len)?;
        let header = unsafe { HeaderView::new(mmap.as_mut_ptr()) };

        header.magic().store(SHM_HEADER_MAGIC, Ordering::Relaxed);
        header
            .version()
            .store(SHM_HEADER_VERSION, Ordering::Relaxed);
        header.slot_size().store(config.slot_size, Ordering::Relaxed);
        header.capacity().store(config.capacity, Ordering::Relaxed);
        header
            .max_consumers()
            .store(config.max_consumers, Ordering::Relaxed);
        header.flags().store(config.flags.bits(), Ordering::Relaxed);
        header
            .staleness_nanos()
            .store(config.staleness_nanos, Ordering::Relaxed);
        header.head().store(0, Ordering::Relaxed);
        header.min_tail().store(0, Ordering::Relaxed);
        header
            .producer_epoch()
            .store(now_nanos(), Ordering::Relaxed);

        let name_bytes = unsafe { header.stream_name_bytes() };
        name_bytes.fill(0);
        let name = config.stream_name.as_bytes();
        name_bytes[..name.len()].copy_from_slice(name);

        let base = mmap.as_mut_ptr();

        // `create()` reuses the existing SHM object in place (see its doc
        // comment) rather than unlinking and allocating a fresh one, so any
        // tail-table entries left by a previous producer incarnation must
        // be reset explicitly instead of relying on kernel zero-fill.
        for i in 0..config.max_consumers {
            let offset = layout::tail_entry_offset(i);
            let entry = unsafe { TailEntryView::new(base.add(offset)) };
            entry.tail().store(0, Ordering::Relaxed);
            entry.last_wal_seq().store(0, Ordering::Relaxed);
            entry.last_poll_nanos().store(0, Ordering::Relaxed);
        }

        for i in 0..config.capacity as usize {
            let offset = layout::slot_offset(i, config.slot_size, config.max_consumers);
            let slot = unsafe { SlotView::new(base.add(offset), config.slot_size as usize) };
            slot.slot_seq().store(i as u64, Ordering::Relaxed);
        }

        Ok(Self {
            mmap,
            config,
            backpressure_callback: None,
        })
    }

    /// Registers a callback fired (at most once per blocked publish) when
    /// the ring is full and every live consumer is genuinely behind.
    pub fn set_backpressure_callback(&mut self, callback: BackpressureCallback) {
        self.backpressure_callback = Some(callback);
    }

    fn header(&self) -> HeaderView {
        unsafe { HeaderView::new(self.mmap.as_ptr() as *mut u8) }
    }

    fn slot(&self, ring_index: usize) -> SlotView {
        let offset = layout::slot_offset(ring_index, self.config.slot_size, self.config.max_consumers);
        unsafe { SlotView::new(self.mmap.as_ptr().add(offset) as *mut u8, self.config.slot_size as usize) }
    }

    fn tail_entry(&self, index: u32) -> TailEntryView {
        let offset = layout::tail_entry_offset(index);
        unsafe { TailEntryView::new(self.mmap.as_ptr().add(offset) as *mut u8) }
    }

    fn live_tail_min(&self, head: u64) -> u64 {
        let staleness = self.config.staleness_nanos;
        let now = now_nanos();
        let mut min = u64::MAX;
        let mut counted = false;
        for i in 0..self.config.max_consumers {
            let entry = self.tail_entry(i);
            if staleness != 0 {
                let last_poll = entry.last_poll_nanos().load(Ordering::Relaxed);
                if last_poll == 0 || now.saturating_sub(last_poll) > staleness {
                    continue;
                }
            }
            let tail = entry.tail().load(Ordering::Acquire);
            min = min.min(tail);
            counted = true;
        }
        if counted {
            min
        } else {
            head
        }
    }

    /// Blocks (spin, then spin-with-refresh, then yield) until `head` has
    /// room, refreshing `min_tail` along the way.
    fn wait_for_space(&mut self, head: u64) {
        let capacity = u64::from(self.config.capacity);
        let mut backoff = BackpressureLoop::new();
        loop {
            let header = self.header();
            let min_tail = header.min_tail().load(Ordering::Relaxed);
            if head.wrapping_sub(min_tail) < capacity {
                return;
            }
            let fresh_min = self.live_tail_min(head);
            let header2 = self.header();
            let callback = &mut self.backpressure_callback;
            backoff.step(
                || header2.min_tail().store(fresh_min, Ordering::Release),
                || {
                    if let Some(cb) = callback {
                        cb();
                    }
                },
            );
        }
    }

    /// Writes one record into its slot and release-stores `slot_seq`, but
    /// does not advance the published `head` atomic. Used by both
    /// `publish` and `publish_batch` to amortize the head store.
    fn publish_one(&mut self, head: u64, seq: u64, record_type: u8, payload: &[u8]) -> Result<u64> {
        let max_payload = self.config.max_payload_len();
        if payload.len() > max_payload {
            return Err(Error::RecordTooLarge {
                len: payload.len(),
                max: max_payload,
            });
        }

        self.wait_for_space(head);

        let idx = (head & self.config.mask()) as usize;
        let slot = self.slot(idx);
        let crc32 = if self.config.flags.contains(StreamFlags::CRC) {
            ombus_core::checksum(payload)
        } else {
            0
        };
        unsafe {
            slot.payload_mut()[..payload.len()].copy_from_slice(payload);
            slot.write_header(seq, record_type, payload.len() as u16, crc32);
        }
        slot.slot_seq().store(head + 1, Ordering::Release);
        Ok(head + 1)
    }

    /// Publishes one record. Not reentrant; the caller must serialize calls
    /// from a single thread.
    pub fn publish(&mut self, seq: u64, record_type: u8, payload: &[u8]) -> Result<()> {
        let head = self.header().head().load(Ordering::Relaxed);
        let new_head = self.publish_one(head, seq, record_type, payload)?;
        debug_assert_backpressure_bound!(
            new_head,
            self.header().min_tail().load(Ordering::Relaxed),
            self.config.capacity
        );
        self.header().head().store(new_head, Ordering::Release);
        Ok(())
    }

    /// Publishes a batch of records with a single amortized `head` store.
    /// Backpressure is still checked per slot.
    pub fn publish_batch(&mut self, records: &[Record<'_>]) -> Result<usize> {
        let start_head = self.header().head().load(Ordering::Relaxed);
        let mut head = start_head;
        for rec in records {
            head = self.publish_one(head, rec.header.seq, rec.header.record_type, rec.payload)?;
        }
        if head != start_head {
            self.header().head().store(head, Ordering::Release);
        }
        Ok(records.len())
    }

    /// Unmaps the file and unlinks the SHM name. Existing consumer endpoints
    /// detect this through epoch/header checks at their next poll.
    pub fn destroy(self) {
        let name = self.config.stream_name.clone();
        drop(self.mmap);
        shm_file::unlink(&name);
    }

    /// The stream's configuration as supplied to `create`.
    #[must_use]
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Exposes the raw mapped base pointer for whitebox tests that need to
    /// poke at slot bytes directly (e.g. simulating payload corruption).
    #[cfg(test)]
    pub(crate) fn test_only_base_ptr(&self) -> *mut u8 {
        self.mmap.as_ptr() as *mut u8
    }
}
