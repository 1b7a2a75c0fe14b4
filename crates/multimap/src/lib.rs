//! # Multimap — mmap-backed key→multi-value store
//!
//! The engine crate of ShoalKV: an embedded, single-process store mapping
//! each key to an ordered multiset of short byte-string values, built for
//! read throughput near memory speed on corpora larger than RAM. The
//! authoritative state is one append-only backing file; reads and in-place
//! edits go through a fixed-length shared mapping ([`region`]), new record
//! bytes through the writing handle ([`applog`]).
//!
//! ## Record layout
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │ total     (u64 BE)  record length, self-inclusive│
//! │ klen      (u8)      key length, 1..=255          │
//! │ key       (klen B)                               │
//! ├─────────────────────────────────────────────────┤
//! │ VALUE SLOTS                                      │
//! │                                                  │
//! │ live:      vlen (u8, 1..=255) | payload          │
//! │ tombstone: one or more 0x00 bytes                │
//! ├─────────────────────────────────────────────────┤
//! │ self_end  (u64 BE)  offset past record, reserved │
//! │ next      (u64 BE)  successor record, 0 = tail   │
//! └─────────────────────────────────────────────────┘
//! ```
//!
//! A key's records form a forward-linked **chain**; the in-memory index
//! stores the head offset. Deletion tombstones slots in place, and a
//! later single-value add may reuse the freed gap — space is never
//! reclaimed any other way.
//!
//! ## Example
//! ```no_run
//! use multimap::{Options, Store};
//!
//! # fn main() -> Result<(), multimap::StoreError> {
//! let store = Store::open("followers.shoal", Options::default())?;
//! store.add("nick", &["alice", "alan", "bob"])?;
//! store.del_by_prefix("nick", &["al"]);
//! assert_eq!(store.get("nick"), vec![b"bob".to_vec()]);
//! # Ok(())
//! # }
//! ```

mod format;
mod store;

pub use format::{MAX_KEY_LEN, MAX_VALUE_LEN};
pub use store::{Options, Store, DEFAULT_LENGTH};

use region::RegionError;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing file could not be opened or created.
    #[error("failed to open backing file: {0}")]
    Open(#[source] io::Error),

    /// The platform mapping call failed or the configured length is
    /// unusable.
    #[error(transparent)]
    Mapping(#[from] RegionError),

    /// A value longer than 255 bytes was passed to add/update.
    #[error("value length {0} exceeds maximum of 255")]
    ValueTooLarge(usize),

    /// A zero-length value was passed to add/update; empty values are
    /// indistinguishable from tombstones on disk.
    #[error("empty values are not allowed")]
    EmptyValue,

    /// A key outside 1..=255 bytes was passed to add/update.
    #[error("key length {0} outside 1..=255")]
    InvalidKey(usize),

    /// A record would end past the mapping length. The mapping is a fixed
    /// reservation; nothing was appended.
    #[error("record would exceed the mapping length")]
    MappingExhausted,

    /// The backing file already holds data and recovery was not requested.
    #[error("backing file holds {0} bytes; open with recovery or use an empty file")]
    UnexpectedData(u64),

    /// The recovery scan hit a malformed record at the given offset.
    #[error("malformed record at offset {0}")]
    Corrupt(u64),

    /// An append to the backing file failed; the append position was not
    /// advanced.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}
