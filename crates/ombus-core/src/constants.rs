//! Magic numbers and fixed byte lengths shared by the SHM slot header, the
//! TCP wire frame header, and the cursor file format. Keeping them in one
//! place means `ombus-shm` and `ombus-net` can never drift out of sync.

/// Magic value stamped in the SHM stream header page (`"OMBS"`, little-endian `u32`).
pub const SHM_HEADER_MAGIC: u32 = 0x5342_4D4F;

/// Wire format version for the SHM stream header.
pub const SHM_HEADER_VERSION: u32 = 1;

/// Magic value stamped in every TCP wire frame header (`"OMTF"`, little-endian `u32`).
pub const TCP_FRAME_MAGIC: u32 = 0x4F4D_5446;

/// Magic value stamped in the consumer cursor file (`"OMBC"`, little-endian `u32`).
pub const CURSOR_MAGIC: u32 = 0x4F4D_4243;

/// Length in bytes of one SHM slot header: `slot_seq(8) + wal_seq(8) +
/// type(1) + reserved(1) + payload_len(2) + crc32(4)`.
pub const SLOT_HEADER_LEN: usize = 24;

/// Length in bytes of one TCP wire frame header: `magic(4) + type(1) +
/// flags(1) + payload_len(2) + wal_seq(8)`.
pub const FRAME_HEADER_LEN: usize = 16;

/// Length in bytes of the consumer cursor file: `magic(4) + seq(8) + crc32(4)`.
pub const CURSOR_LEN: usize = 16;
