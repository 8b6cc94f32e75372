//! POSIX shared-memory object creation/attachment via `libc::shm_open` plus
//! `memmap2`, following the usual `create_shm`/`open_shm` pattern for SHM
//! ring buffers, generalized to a configurable object size instead of one
//! compile-time constant.

use memmap2::{MmapMut, MmapOptions};
use ombus_core::Error;
use std::ffi::CString;
use std::fs::File;
use std::os::unix::io::FromRawFd;

fn shm_name(name: &str) -> Result<CString, Error> {
    CString::new(name).map_err(|e| Error::ShmIo(format!("invalid stream name {name:?}: {e}")))
}

/// Opens or creates the SHM object in place and truncates it to exactly
/// `len` bytes. Deliberately does *not* `shm_unlink` first: unlinking would
/// hand a fresh producer a new inode, orphaning any consumer already
/// mapped to the old one (that consumer would then map pages the producer
/// never touches again and could never observe a restart). Reusing the
/// existing object means a producer restart's epoch bump lands on the same
/// pages an already-open consumer is mapped to.
pub(crate) fn create(name: &str, len: usize) -> Result<MmapMut, Error> {
    let cname = shm_name(name)?;
    let fd = unsafe { libc::shm_open(cname.as_ptr(), libc::O_CREAT | libc::O_RDWR, 0o600) };
    if fd < 0 {
        return Err(Error::ShmIo(format!(
            "shm_open create {name}: {}",
            std::io::Error::last_os_error()
        )));
    }
    let file = unsafe { File::from_raw_fd(fd) };
    file.set_len(len as u64)
        .map_err(|e| Error::ShmIo(format!("ftruncate {name}: {e}")))?;
    unsafe { MmapOptions::new().len(len).map_mut(&file) }
        .map_err(|e| Error::ShmIo(format!("mmap {name}: {e}")))
}

/// Attaches to an existing SHM object, mapping its full current size.
pub(crate) fn open(name: &str) -> Result<MmapMut, Error> {
    let cname = shm_name(name)?;
    let fd = unsafe { libc::shm_open(cname.as_ptr(), libc::O_RDWR, 0o600) };
    if fd < 0 {
        return Err(Error::ShmIo(format!(
            "shm_open attach {name}: {}",
            std::io::Error::last_os_error()
        )));
    }
    let file = unsafe { File::from_raw_fd(fd) };
    let len = file
        .metadata()
        .map_err(|e| Error::ShmIo(format!("fstat {name}: {e}")))?
        .len() as usize;
    unsafe { MmapOptions::new().len(len).map_mut(&file) }
        .map_err(|e| Error::ShmIo(format!("mmap {name}: {e}")))
}

/// Removes the SHM name from the filesystem namespace. Mapped regions held
/// by other processes remain valid until they unmap.
pub(crate) fn unlink(name: &str) {
    if let Ok(cname) = shm_name(name) {
        unsafe {
            libc::shm_unlink(cname.as_ptr());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_open_sees_same_bytes() {
        let name = format!("/ombus-shm-file-test-{}", std::process::id());
        let _ = unlink(&name);

        {
            let mut mmap = create(&name, 4096).expect("create");
            mmap[0] = 0xAB;
        }

        let mmap = open(&name).expect("open");
        assert_eq!(mmap.len(), 4096);
        assert_eq!(mmap[0], 0xAB);

        unlink(&name);
    }
}
