//! Shared-memory pool (C1): anonymous shared buffers handed to the
//! compositor as `wl_buffer`-backed pixel storage.
//!
//! Grounded on the teacher's `create_shm_fd` (memfd_create with a shm_open
//! fallback) and on `original_source/main.c::open_shm_fd`'s candidate-name
//! search, which we follow here since the spec's implementation policy
//! (§4.1) describes that search explicitly rather than the teacher's
//! memfd-first strategy.

use std::fs::File;
use std::os::fd::{FromRawFd, RawFd};

use memmap2::MmapMut;
use nix::fcntl::OFlag;
use nix::sys::mman;
use nix::sys::stat::Mode;

use crate::error::{Result, WvncError};

const MAX_CANDIDATES: usize = 10_000;

/// A shared-memory region mapped read/write, ready to be wrapped in a
/// `wl_shm_pool`/`wl_buffer`. The raw descriptor is kept around (as a plain
/// `RawFd`, not an owned handle) purely to be passed by value into
/// `wl_shm.create_pool`; `file` is what actually keeps it open.
pub struct ShmBuffer {
    pub fd: RawFd,
    file: File,
    pub map: MmapMut,
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub size: usize,
}

/// Opens an anonymous POSIX shared-memory object, trying candidate names
/// `/wvnc-0` through `/wvnc-9999` until an exclusive create succeeds, then
/// unlinks the name immediately — only the descriptor is retained.
fn open_shm_fd() -> Result<RawFd> {
    for i in 0..MAX_CANDIDATES {
        let name = format!("/wvnc-{i}");
        match mman::shm_open(
            name.as_str(),
            OFlag::O_RDWR | OFlag::O_CREAT | OFlag::O_EXCL,
            Mode::S_IRUSR | Mode::S_IWUSR,
        ) {
            Ok(fd) => {
                let _ = mman::shm_unlink(name.as_str());
                return Ok(fd);
            }
            Err(nix::errno::Errno::EEXIST) => continue,
            Err(nix::errno::Errno::EINTR) => continue,
            Err(e) => return Err(WvncError::Shm(e)),
        }
    }
    Err(WvncError::ShmCreate)
}

/// Creates a new shared buffer of `stride * height` bytes and maps it.
pub fn create_shm_buffer(width: u32, height: u32, stride: u32) -> Result<ShmBuffer> {
    let fd = open_shm_fd()?;
    let size = stride as usize * height as usize;

    let file = unsafe { File::from_raw_fd(fd) };
    file.set_len(size as u64)?;

    let map = unsafe { MmapMut::map_mut(&file)? };

    Ok(ShmBuffer { fd, file, map, width, height, stride, size })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_and_maps_buffer_of_requested_size() {
        let buffer = create_shm_buffer(4, 3, 16).expect("shm buffer creation should succeed");
        assert_eq!(buffer.size, 48);
        assert_eq!(buffer.map.len(), 48);
    }

    #[test]
    fn mapped_memory_is_writable_and_persists_through_the_fd() {
        let mut buffer = create_shm_buffer(2, 2, 8).expect("shm buffer creation should succeed");
        buffer.map[0] = 0xAB;
        assert_eq!(buffer.map[0], 0xAB);
    }
}
