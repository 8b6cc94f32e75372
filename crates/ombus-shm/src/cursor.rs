//! Cursor file persistence, letting a restarted consumer resume at the
//! right `wal_seq` instead of re-reading the stream from its current live
//! tail.

use ombus_core::{Error, Result, CURSOR_LEN, CURSOR_MAGIC};
use std::io::{Read, Write};
use std::path::Path;

/// Writes a 16-byte cursor file: magic, little-endian `last_wal_seq`, and a
/// CRC over the sequence bytes.
pub fn save_cursor(path: impl AsRef<Path>, last_wal_seq: u64) -> Result<()> {
    let mut buf = [0u8; CURSOR_LEN];
    buf[0..4].copy_from_slice(&CURSOR_MAGIC.to_le_bytes());
    let seq_bytes = last_wal_seq.to_le_bytes();
    buf[4..12].copy_from_slice(&seq_bytes);
    let crc = ombus_core::checksum(&seq_bytes);
    buf[12..16].copy_from_slice(&crc.to_le_bytes());

    let mut file =
        std::fs::File::create(path).map_err(|e| Error::ShmIo(format!("cursor create: {e}")))?;
    file.write_all(&buf)
        .map_err(|e| Error::ShmIo(format!("cursor write: {e}")))
}

/// Reads back a cursor file written by `save_cursor`, refusing files with a
/// bad magic or CRC.
pub fn load_cursor(path: impl AsRef<Path>) -> Result<u64> {
    let mut file =
        std::fs::File::open(path).map_err(|e| Error::ShmIo(format!("cursor open: {e}")))?;
    let mut buf = [0u8; CURSOR_LEN];
    file.read_exact(&mut buf)
        .map_err(|e| Error::ShmIo(format!("cursor read: {e}")))?;

    let magic = u32::from_le_bytes(buf[0..4].try_into().unwrap());
    if magic != CURSOR_MAGIC {
        return Err(Error::CursorInvalid {
            reason: "bad magic",
        });
    }
    let seq_bytes: [u8; 8] = buf[4..12].try_into().unwrap();
    let crc = u32::from_le_bytes(buf[12..16].try_into().unwrap());
    if !ombus_core::verify(&seq_bytes, crc) {
        return Err(Error::CursorInvalid { reason: "bad crc" });
    }
    Ok(u64::from_le_bytes(seq_bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn round_trip_preserves_seq() {
        let file = NamedTempFile::new().unwrap();
        save_cursor(file.path(), 424242).unwrap();
        assert_eq!(load_cursor(file.path()).unwrap(), 424242);
    }

    #[test]
    fn bit_flip_is_refused() {
        let file = NamedTempFile::new().unwrap();
        save_cursor(file.path(), 100).unwrap();

        let mut bytes = std::fs::read(file.path()).unwrap();
        bytes[5] ^= 0x01;
        std::fs::write(file.path(), &bytes).unwrap();

        assert!(matches!(
            load_cursor(file.path()),
            Err(Error::CursorInvalid { .. })
        ));
    }
}
