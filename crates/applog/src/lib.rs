//! # Applog — the append end of the backing file
//!
//! Owns the writing file handle and the authoritative `end_offset` for the
//! ShoalKV storage engine. Every *new* record reaches the file through
//! [`AppendLog::append`]; later in-place edits to those bytes go through the
//! shared mapping instead. Appending through the handle (rather than the
//! mapping) guarantees the bytes are on the file before the engine publishes
//! their offset to readers.
//!
//! `end_offset` is monotonically non-decreasing and advances only when the
//! full write succeeds.

use std::fs::File;
use std::io::{self, Seek, SeekFrom, Write};
use tracing::trace;

/// Append-only writer positioned at the end of the backing file.
#[derive(Debug)]
pub struct AppendLog {
    file: File,
    end: u64,
}

impl AppendLog {
    /// Takes ownership of the backing file handle and seeks it to
    /// end-of-file, so `end_offset` starts at the current file length.
    pub fn new(mut file: File) -> io::Result<Self> {
        let end = file.seek(SeekFrom::End(0))?;
        Ok(Self { file, end })
    }

    /// Writes `bytes` at the end of the file and returns the offset at which
    /// they start.
    ///
    /// Short writes are retried until the whole buffer lands (`write_all`).
    /// On error `end_offset` is left unchanged; any bytes the platform
    /// reported as written become unreferenced garbage.
    pub fn append(&mut self, bytes: &[u8]) -> io::Result<u64> {
        let off = self.end;
        self.file.write_all(bytes)?;
        self.file.flush()?;
        self.end += bytes.len() as u64;
        trace!(off, len = bytes.len(), "appended");
        Ok(off)
    }

    /// Offset one past the last successfully appended byte.
    pub fn end_offset(&self) -> u64 {
        self.end
    }
}
