//! Shared record model, CRC codec, and error taxonomy for ombus.
//!
//! `ombus-shm` (the producer/consumer ring) and `ombus-net` (the TCP
//! broadcast transport) both encode and decode records against the types in
//! this crate, so the two transports never disagree about wire shape.

mod classify;
mod constants;
mod crc;
mod error;
mod record;

pub use classify::{classify_sequence, Delivery};
pub use constants::{
    CURSOR_LEN, CURSOR_MAGIC, FRAME_HEADER_LEN, SHM_HEADER_MAGIC, SHM_HEADER_VERSION,
    SLOT_HEADER_LEN, TCP_FRAME_MAGIC,
};
pub use crc::{checksum, verify};
pub use error::{Error, Result};
pub use record::{OwnedRecord, Record, RecordHeader, SLOW_WARNING_TYPE};
