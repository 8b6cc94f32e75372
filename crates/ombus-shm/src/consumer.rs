use crate::clock::now_nanos;
use crate::config::{EndpointConfig, StreamFlags};
use crate::invariants::{debug_assert_monotonic, debug_assert_slot_ready};
use crate::layout::{self, HeaderView, SlotView, TailEntryView};
use crate::shm_file;
use memmap2::MmapMut;
use ombus_core::{
    classify_sequence, Delivery, Error, Record, RecordHeader, Result, SHM_HEADER_MAGIC,
    SHM_HEADER_VERSION,
};
use std::sync::atomic::Ordering;

/// A consumer's attached view onto an existing stream.
///
/// One endpoint is used by one thread at a time.
pub struct Consumer {
    mmap: MmapMut,
    consumer_index: u32,
    capacity: u32,
    slot_size: u32,
    max_consumers: u32,
    crc_enabled: bool,
    reject_reorder: bool,
    zero_copy: bool,
    producer_epoch_snapshot: u64,
    expected_seq: u64,
    copy_buf: Vec<u8>,
}

impl Consumer {
    /// Attaches to an existing stream at `config.consumer_index`.
    pub fn open(config: EndpointConfig) -> Result<Self> {
        let mut mmap = shm_file::open(&config.stream_name)?;
        let header = unsafe { HeaderView::new(mmap.as_mut_ptr()) };

        let magic = header.magic().load(Ordering::Relaxed);
        if magic != SHM_HEADER_MAGIC {
            return Err(Error::MagicMismatch);
        }
        let version = header.version().load(Ordering::Relaxed);
        if version != SHM_HEADER_VERSION {
            return Err(Error::VersionMismatch {
                got: version,
                want: SHM_HEADER_VERSION,
            });
        }

        let max_consumers = header.max_consumers().load(Ordering::Relaxed);
        if config.consumer_index >= max_consumers {
            return Err(Error::ConsumerIndexInvalid {
                index: config.consumer_index,
                max: max_consumers,
            });
        }

        let capacity = header.capacity().load(Ordering::Relaxed);
        let slot_size = header.slot_size().load(Ordering::Relaxed);
        let flags = StreamFlags::from_bits(header.flags().load(Ordering::Relaxed));
        let producer_epoch_snapshot = header.producer_epoch().load(Ordering::Relaxed);

        let head_now = header.head().load(Ordering::Relaxed);
        let tail_entry = unsafe {
            TailEntryView::new(mmap.as_mut_ptr().add(layout::tail_entry_offset(config.consumer_index)))
        };
        tail_entry.tail().store(head_now, Ordering::Relaxed);
        tail_entry.last_wal_seq().store(0, Ordering::Relaxed);
        tail_entry.last_poll_nanos().store(0, Ordering::Relaxed);

        let copy_buf = if config.zero_copy {
            Vec::new()
        } else {
            vec![0u8; slot_size as usize - ombus_core::SLOT_HEADER_LEN]
        };

        Ok(Self {
            mmap,
            consumer_index: config.consumer_index,
            capacity,
            slot_size,
            max_consumers,
            crc_enabled: flags.contains(StreamFlags::CRC),
            reject_reorder: flags.contains(StreamFlags::REJECT_REORDER),
            zero_copy: config.zero_copy,
            producer_epoch_snapshot,
            expected_seq: 0,
            copy_buf,
        })
    }

    fn header(&self) -> HeaderView {
        unsafe { HeaderView::new(self.mmap.as_ptr() as *mut u8) }
    }

    fn mask(&self) -> u64 {
        u64::from(self.capacity) - 1
    }

    fn slot(&self, ring_index: usize) -> SlotView {
        let offset = layout::slot_offset(ring_index, self.slot_size, self.max_consumers);
        unsafe { SlotView::new(self.mmap.as_ptr().add(offset) as *mut u8, self.slot_size as usize) }
    }

    fn tail_entry(&self) -> TailEntryView {
        let offset = layout::tail_entry_offset(self.consumer_index);
        unsafe { TailEntryView::new(self.mmap.as_ptr().add(offset) as *mut u8) }
    }

    fn live_tail_min(&self) -> u64 {
        let header = self.header();
        let staleness = header.staleness_nanos().load(Ordering::Relaxed);
        let head = header.head().load(Ordering::Relaxed);
        let now = now_nanos();
        let mut min = u64::MAX;
        let mut counted = false;
        for i in 0..self.max_consumers {
            let offset = layout::tail_entry_offset(i);
            let entry = unsafe { TailEntryView::new(self.mmap.as_ptr().add(offset) as *mut u8) };
            if staleness != 0 {
                let last_poll = entry.last_poll_nanos().load(Ordering::Relaxed);
                if last_poll == 0 || now.saturating_sub(last_poll) > staleness {
                    continue;
                }
            }
            min = min.min(entry.tail().load(Ordering::Acquire));
            counted = true;
        }
        if counted {
            min
        } else {
            head
        }
    }

    fn maybe_refresh_min_tail(&self, old_tail: u64, new_tail: u64) {
        let header = self.header();
        let cached = header.min_tail().load(Ordering::Relaxed);
        if old_tail == cached || new_tail < cached {
            let fresh = self.live_tail_min();
            header.min_tail().store(fresh, Ordering::Release);
        }
    }

    /// Non-blocking poll of the next record. Gap/reorder classification
    /// travels alongside the delivered record rather than suppressing it.
    pub fn poll(&mut self) -> Result<(Delivery, Record<'_>)> {
        let header = self.header();
        let epoch = header.producer_epoch().load(Ordering::Relaxed);
        if epoch != self.producer_epoch_snapshot {
            return Err(Error::EpochChanged);
        }

        let tail_entry = self.tail_entry();
        let tail = tail_entry.tail().load(Ordering::Relaxed);
        let idx = (tail & self.mask()) as usize;
        let slot = self.slot(idx);

        let observed = slot.slot_seq().load(Ordering::Acquire);
        if observed != tail + 1 {
            return Err(Error::Empty);
        }
        debug_assert_slot_ready!(observed, tail + 1);

        let (wal_seq, record_type, payload_len, crc32) = unsafe { slot.read_header() };
        let payload_len = payload_len as usize;
        let src = unsafe { &slot.payload()[..payload_len] };

        if self.crc_enabled && !ombus_core::verify(src, crc32) {
            return Err(Error::CrcMismatch { seq: wal_seq });
        }

        let (delivery, next_expected) =
            classify_sequence(self.expected_seq, wal_seq, self.reject_reorder);
        self.expected_seq = next_expected;

        let new_tail = tail + 1;
        debug_assert_monotonic!("consumer tail", tail, new_tail);
        tail_entry.tail().store(new_tail, Ordering::Release);
        tail_entry.last_wal_seq().store(wal_seq, Ordering::Release);
        tail_entry
            .last_poll_nanos()
            .store(now_nanos(), Ordering::Relaxed);
        self.maybe_refresh_min_tail(tail, new_tail);

        let payload: &[u8] = if self.zero_copy {
            src
        } else {
            self.copy_buf[..payload_len].copy_from_slice(src);
            &self.copy_buf[..payload_len]
        };

        Ok((
            delivery,
            Record {
                header: RecordHeader {
                    seq: wal_seq,
                    record_type,
                    payload_len: payload_len as u16,
                },
                payload,
            },
        ))
    }

    /// Polls up to `max` consecutive ready records in one pass. Batch
    /// delivery is always zero-copy, even on an endpoint opened in copy
    /// mode. A CRC failure stops the batch at that record
    /// without delivering it: if earlier records in this call already
    /// succeeded, they're returned and the failure surfaces on the next
    /// call; if it's the first record, the error is returned directly.
    pub fn poll_batch(&mut self, max: usize) -> Result<Vec<(Delivery, Record<'_>)>> {
        let header = self.header();
        let epoch = header.producer_epoch().load(Ordering::Relaxed);
        if epoch != self.producer_epoch_snapshot {
            return Err(Error::EpochChanged);
        }

        let start_tail = self.tail_entry().tail().load(Ordering::Relaxed);
        let mut tail = start_tail;
        let mut last_wal_seq = None;
        let mut out = Vec::new();

        for _ in 0..max {
            let idx = (tail & self.mask()) as usize;
            let slot = self.slot(idx);
            let observed = slot.slot_seq().load(Ordering::Acquire);
            if observed != tail + 1 {
                break;
            }
            let (wal_seq, record_type, payload_len, crc32) = unsafe { slot.read_header() };
            let payload_len = payload_len as usize;
            let payload = unsafe { &slot.payload()[..payload_len] };
            if self.crc_enabled && !ombus_core::verify(payload, crc32) {
                if out.is_empty() {
                    return Err(Error::CrcMismatch { seq: wal_seq });
                }
                break;
            }

            let (delivery, next_expected) =
                classify_sequence(self.expected_seq, wal_seq, self.reject_reorder);
            self.expected_seq = next_expected;

            out.push((
                delivery,
                Record {
                    header: RecordHeader {
                        seq: wal_seq,
                        record_type,
                        payload_len: payload_len as u16,
                    },
                    payload,
                },
            ));
            last_wal_seq = Some(wal_seq);
            tail += 1;
        }

        if let Some(last_wal_seq) = last_wal_seq {
            let tail_entry = self.tail_entry();
            tail_entry.tail().store(tail, Ordering::Release);
            tail_entry
                .last_wal_seq()
                .store(last_wal_seq, Ordering::Release);
            tail_entry
                .last_poll_nanos()
                .store(now_nanos(), Ordering::Relaxed);
            self.maybe_refresh_min_tail(start_tail, tail);
        }

        Ok(out)
    }

    /// This consumer's index in the stream's tail table.
    #[must_use]
    pub fn consumer_index(&self) -> u32 {
        self.consumer_index
    }

    /// Last `wal_seq` this endpoint delivered, or `0` if none yet.
    #[must_use]
    pub fn last_wal_seq(&self) -> u64 {
        self.tail_entry().last_wal_seq().load(Ordering::Relaxed)
    }
}

// Close semantics are just `Drop`: unmap, never touch the SHM file itself.
