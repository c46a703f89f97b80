//! The host I/O layer's consumed interfaces (§6): a handle to an opened
//! block device, and the bounded pool of clone requests used to forward
//! remapped I/O onto it.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Mutex;

use crate::remapper::Op;
use crate::sector::{Sector, SECTOR_SIZE};

/// A handle to an opened block device: the base device the remapper
/// forwards onto. Implementations must be safe to call from many threads
/// concurrently (the data plane may dispatch requests in parallel).
pub trait BlockDevice: Send + Sync {
    /// Capacity of the device, in sectors.
    fn capacity(&self) -> Sector;

    /// Performs `op` at `sector`, reading into or writing from `payload`.
    fn submit(&self, op: Op, sector: Sector, payload: &mut [u8]) -> io::Result<()>;
}

/// A base device backed by a real file (or block special file) on disk.
pub struct FileBlockDevice {
    file: Mutex<File>,
    capacity: Sector,
    sector_size: u64,
}

impl FileBlockDevice {
    /// Opens `path` read-write and measures its capacity, in sectors of
    /// `sector_size` bytes, from its current length.
    pub fn open(path: &Path, sector_size: u64) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let capacity = file.metadata()?.len() / sector_size;
        Ok(Self {
            file: Mutex::new(file),
            capacity,
            sector_size,
        })
    }
}

impl BlockDevice for FileBlockDevice {
    fn capacity(&self) -> Sector {
        self.capacity
    }

    fn submit(&self, op: Op, sector: Sector, payload: &mut [u8]) -> io::Result<()> {
        let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
        file.seek(SeekFrom::Start(sector * self.sector_size))?;
        match op {
            Op::Read => file.read_exact(payload)?,
            Op::Write => file.write_all(payload)?,
            Op::Other => return Err(io::Error::new(io::ErrorKind::Unsupported, "unsupported op")),
        }
        Ok(())
    }
}

/// An in-memory base device, for tests that should not touch the
/// filesystem.
pub struct MemBlockDevice {
    data: Mutex<Vec<u8>>,
    capacity: Sector,
    sector_size: u64,
}

impl MemBlockDevice {
    pub fn new(capacity: Sector, sector_size: u64) -> Self {
        Self {
            data: Mutex::new(vec![0u8; (capacity * sector_size) as usize]),
            capacity,
            sector_size,
        }
    }
}

impl BlockDevice for MemBlockDevice {
    fn capacity(&self) -> Sector {
        self.capacity
    }

    fn submit(&self, op: Op, sector: Sector, payload: &mut [u8]) -> io::Result<()> {
        let mut data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        let start = (sector * self.sector_size) as usize;
        let end = start
            .checked_add(payload.len())
            .filter(|&end| end <= data.len())
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "sector range out of bounds"))?;
        match op {
            Op::Read => payload.copy_from_slice(&data[start..end]),
            Op::Write => data[start..end].copy_from_slice(payload),
            Op::Other => return Err(io::Error::new(io::ErrorKind::Unsupported, "unsupported op")),
        }
        Ok(())
    }
}

/// A bounded, process-wide pool of in-flight clone slots. `submit` acquires
/// a slot before forwarding a request and releases it on completion;
/// exhaustion surfaces as `Error::IoError` on the affected request rather
/// than blocking.
pub struct ClonePool {
    capacity: usize,
    in_use: Mutex<usize>,
}

impl ClonePool {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            in_use: Mutex::new(0),
        }
    }

    /// Attempts to acquire a clone slot. Returns `None` if the pool is
    /// exhausted.
    pub fn acquire(&self) -> Option<CloneGuard<'_>> {
        let mut in_use = self.in_use.lock().unwrap_or_else(|e| e.into_inner());
        if *in_use >= self.capacity {
            return None;
        }
        *in_use += 1;
        Some(CloneGuard { pool: self })
    }
}

/// Releases its clone slot back to the pool on drop.
pub struct CloneGuard<'a> {
    pool: &'a ClonePool,
}

impl Drop for CloneGuard<'_> {
    fn drop(&mut self) {
        let mut in_use = self.pool.in_use.lock().unwrap_or_else(|e| e.into_inner());
        *in_use -= 1;
    }
}
