//! # Region — shared mapping of the backing file
//!
//! A single fixed-length, read/write shared mapping of the backing file for
//! the ShoalKV storage engine. All record reads and all in-place edits
//! (tombstoning, gap reuse, chain links) go through this window; new record
//! bytes are appended through the file handle instead and become visible
//! here without remapping, because the mapping is `MAP_SHARED` over the same
//! file.
//!
//! The mapping length is a **virtual reservation**: it bounds every offset
//! the engine will ever produce but does not consume memory or disk until
//! the underlying pages are touched. The window is created once and never
//! grows or remaps.

use byteorder::{BigEndian, ByteOrder};
use memmap2::{MmapMut, MmapOptions};
use std::fs::File;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum RegionError {
    #[error("mapping length must be greater than zero")]
    ZeroLength,
    #[error("failed to map backing file: {0}")]
    Map(#[source] std::io::Error),
}

/// A fixed-length shared read/write mapping of the backing file at offset 0.
///
/// Callers must not hold a borrowed slice across an operation that could
/// write to the same range; the engine guarantees this by serialising all
/// access behind its reader/writer lock.
#[derive(Debug)]
pub struct Region {
    map: MmapMut,
}

impl Region {
    /// Maps `length` bytes of `file`, starting at offset 0.
    ///
    /// The file may be shorter than `length`; only addresses the engine has
    /// appended are ever dereferenced.
    pub fn map(file: &File, length: usize) -> Result<Self, RegionError> {
        if length == 0 {
            return Err(RegionError::ZeroLength);
        }
        // SAFETY: the mapping is private to this process and every access is
        // serialised by the engine lock, so no aliasing mutation can occur.
        let map = unsafe { MmapOptions::new().len(length).map_mut(file) }
            .map_err(RegionError::Map)?;
        debug!(length, "mapped backing file");
        Ok(Self { map })
    }

    /// Length of the mapped window in bytes.
    pub fn len(&self) -> u64 {
        self.map.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Borrows `len` bytes starting at `off`.
    pub fn slice(&self, off: u64, len: usize) -> &[u8] {
        let off = off as usize;
        &self.map[off..off + len]
    }

    /// Mutably borrows `len` bytes starting at `off`.
    pub fn slice_mut(&mut self, off: u64, len: usize) -> &mut [u8] {
        let off = off as usize;
        &mut self.map[off..off + len]
    }

    /// Copies `bytes` into the mapping at `off`.
    pub fn write(&mut self, off: u64, bytes: &[u8]) {
        self.slice_mut(off, bytes.len()).copy_from_slice(bytes);
    }

    /// Reads the big-endian `u64` at `off`.
    pub fn read_u64(&self, off: u64) -> u64 {
        BigEndian::read_u64(self.slice(off, 8))
    }

    /// Writes `v` as a big-endian `u64` at `off`.
    pub fn write_u64(&mut self, off: u64, v: u64) {
        BigEndian::write_u64(self.slice_mut(off, 8), v);
    }
}
