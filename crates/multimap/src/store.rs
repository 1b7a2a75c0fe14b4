use std::collections::{HashMap, HashSet};
use std::fs::OpenOptions;
use std::path::Path;

use applog::AppendLog;
use parking_lot::RwLock;
use region::Region;
use tracing::{debug, trace};

use crate::format::{self, RecordBuilder, MAX_KEY_LEN, MAX_VALUE_LEN, MIN_RECORD_TOTAL, TRAILER_BYTES};
use crate::StoreError;

/// Default mapping length: 64 GiB of virtual reservation.
pub const DEFAULT_LENGTH: u64 = 64 << 30;

/// Open-time options for a [`Store`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Options {
    /// Mapping length in bytes; 0 means [`DEFAULT_LENGTH`]. Must exceed any
    /// offset the store will ever produce — the mapping never grows.
    pub length: u64,
    /// Rebuild the index and append position from an existing backing file.
    /// Without this, opening a non-empty file is refused.
    pub recover: bool,
}

/// Index entry: the head record of a key's chain, or the negative-cache
/// sentinel installed by [`Store::exist`] on a miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IndexSlot {
    Head(u64),
    NotPresent,
}

/// An embedded key→multi-value store over one memory-mapped backing file.
///
/// Each key owns an ordered multiset of short byte-string values, stored as
/// a forward-linked chain of append-only records. Reads walk the chain
/// through the shared mapping; deletes tombstone slots in place; a
/// single-value add may reuse tombstoned space instead of appending.
///
/// A single reader/writer lock guards all state: [`get`](Store::get) takes
/// it shared, every other operation takes it exclusive. The store is
/// `Send + Sync` and intended to be shared behind an `Arc`.
#[derive(Debug)]
pub struct Store {
    inner: RwLock<StoreInner>,
}

#[derive(Debug)]
struct StoreInner {
    region: Region,
    log: AppendLog,
    index: HashMap<Vec<u8>, IndexSlot>,
}

impl Store {
    /// Opens (creating if needed) the backing file at `path` and maps it.
    ///
    /// By default the file must be empty: the index lives only in memory, so
    /// silently appending to leftover records would orphan them. Pass
    /// `options.recover` to instead rebuild the index and append position by
    /// scanning the file.
    ///
    /// # Errors
    ///
    /// [`StoreError::Open`] if the file cannot be opened or created,
    /// [`StoreError::Mapping`] if the mapping call fails,
    /// [`StoreError::UnexpectedData`] for a non-empty file without
    /// `recover`, and [`StoreError::Corrupt`] if the recovery scan does not
    /// land exactly on the end of the file.
    pub fn open<P: AsRef<Path>>(path: P, options: Options) -> Result<Self, StoreError> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path.as_ref())
            .map_err(StoreError::Open)?;
        let file_len = file.metadata().map_err(StoreError::Open)?.len();

        let length = if options.length == 0 {
            DEFAULT_LENGTH
        } else {
            options.length
        };
        if file_len > 0 && !options.recover {
            return Err(StoreError::UnexpectedData(file_len));
        }
        if file_len > length {
            return Err(StoreError::MappingExhausted);
        }

        let region = Region::map(&file, length as usize)?;
        let log = AppendLog::new(file).map_err(StoreError::Open)?;

        let mut inner = StoreInner {
            region,
            log,
            index: HashMap::new(),
        };
        if file_len > 0 {
            inner.rebuild_index(file_len)?;
        }
        debug!(
            end = inner.log.end_offset(),
            keys = inner.index.len(),
            "opened store"
        );
        Ok(Self {
            inner: RwLock::new(inner),
        })
    }

    /// Appends `values` to `key`'s chain, creating the chain if needed.
    ///
    /// An empty `values` slice is a no-op. A single-value add first tries to
    /// reuse a tombstoned gap somewhere in the chain; multi-value adds and
    /// adds without a usable gap append a new record and link it at the
    /// chain tail.
    ///
    /// All keys and values are validated before any byte is written, so an
    /// error leaves the store untouched.
    pub fn add<K, V>(&self, key: K, values: &[V]) -> Result<(), StoreError>
    where
        K: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        if values.is_empty() {
            return Ok(());
        }
        let key = key.as_ref();
        check_key(key)?;
        let values: Vec<&[u8]> = values.iter().map(|v| v.as_ref()).collect();
        for v in &values {
            check_value(v)?;
        }
        self.inner.write().add(key, &values)
    }

    /// Returns all live values of `key` in chain order, then intra-record
    /// insertion order. Unknown keys yield an empty vector.
    pub fn get<K: AsRef<[u8]>>(&self, key: K) -> Vec<Vec<u8>> {
        self.inner.read().get(key.as_ref())
    }

    /// Tombstones every slot whose value byte-equals an element of `values`,
    /// across the whole chain (duplicates included). Unknown keys and empty
    /// `values` are no-ops.
    pub fn del<K, V>(&self, key: K, values: &[V])
    where
        K: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        if values.is_empty() {
            return;
        }
        let set: HashSet<&[u8]> = values.iter().map(|v| v.as_ref()).collect();
        let mut inner = self.inner.write();
        let Some(head) = inner.head_of(key.as_ref()) else {
            return;
        };
        inner.tombstone_matching(head, |payload| set.contains(payload));
    }

    /// Tombstones every slot whose value starts with any of `prefixes`
    /// (byte-prefix, not code points). An empty prefix matches every value.
    /// Otherwise behaves like [`del`](Store::del).
    pub fn del_by_prefix<K, P>(&self, key: K, prefixes: &[P])
    where
        K: AsRef<[u8]>,
        P: AsRef<[u8]>,
    {
        if prefixes.is_empty() {
            return;
        }
        let prefixes: Vec<&[u8]> = prefixes.iter().map(|p| p.as_ref()).collect();
        let mut inner = self.inner.write();
        let Some(head) = inner.head_of(key.as_ref()) else {
            return;
        };
        inner.tombstone_matching(head, |payload| {
            prefixes.iter().any(|p| payload.starts_with(p))
        });
    }

    /// Replaces `key`'s values: tombstones every live slot, then adds
    /// `values`, all under one exclusive lock acquisition.
    ///
    /// The new values are validated before the old ones are tombstoned, so a
    /// validation error leaves the chain intact; an append error from the
    /// add phase leaves the chain cleared.
    pub fn update<K, V>(&self, key: K, values: &[V]) -> Result<(), StoreError>
    where
        K: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        let key = key.as_ref();
        check_key(key)?;
        let values: Vec<&[u8]> = values.iter().map(|v| v.as_ref()).collect();
        for v in &values {
            check_value(v)?;
        }
        let mut inner = self.inner.write();
        if let Some(head) = inner.head_of(key) {
            inner.tombstone_matching(head, |_| true);
        }
        if values.is_empty() {
            return Ok(());
        }
        inner.add(key, &values)
    }

    /// Returns `true` if `key` has a chain in the index.
    ///
    /// A miss installs the negative-cache sentinel, which is why this takes
    /// the exclusive lock; a repeated miss stays `false`. The sentinel is
    /// indistinguishable from absence for every other operation.
    pub fn exist<K: AsRef<[u8]>>(&self, key: K) -> bool {
        let key = key.as_ref();
        let mut inner = self.inner.write();
        match inner.index.get(key).copied() {
            Some(IndexSlot::Head(_)) => true,
            Some(IndexSlot::NotPresent) => false,
            None => {
                inner.index.insert(key.to_vec(), IndexSlot::NotPresent);
                false
            }
        }
    }
}

impl StoreInner {
    /// Head offset of `key`'s chain; the negative-cache sentinel reads as
    /// absent.
    fn head_of(&self, key: &[u8]) -> Option<u64> {
        match self.index.get(key) {
            Some(IndexSlot::Head(off)) => Some(*off),
            _ => None,
        }
    }

    /// `total` of the record at `off`.
    fn record_total(&self, off: u64) -> usize {
        format::total(self.region.slice(off, format::TOTAL_BYTES)) as usize
    }

    fn add(&mut self, key: &[u8], values: &[&[u8]]) -> Result<(), StoreError> {
        let Some(head) = self.head_of(key) else {
            let off = self.append_record(key, values)?;
            self.index.insert(key.to_vec(), IndexSlot::Head(off));
            return Ok(());
        };

        // Single-value fast path: reuse the first usable gap in the chain.
        if let [value] = values {
            if let Some((rec_off, start)) = self.find_chain_gap(head, value.len()) {
                let slot = self.region.slice_mut(rec_off + start as u64, 1 + value.len());
                slot[0] = value.len() as u8;
                slot[1..].copy_from_slice(value);
                trace!(record = rec_off, at = start, len = value.len(), "reused gap");
                return Ok(());
            }
        }

        let tail = self.tail_of(head);
        let off = self.append_record(key, values)?;
        let tail_total = self.record_total(tail) as u64;
        self.region.write_u64(tail + tail_total - 8, off);
        trace!(from = tail, to = off, "extended chain");
        Ok(())
    }

    fn get(&self, key: &[u8]) -> Vec<Vec<u8>> {
        let Some(mut off) = self.head_of(key) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        loop {
            let total = self.record_total(off);
            let rec = self.region.slice(off, total);
            for (_, payload) in format::slots(rec) {
                out.push(payload.to_vec());
            }
            let next = format::next(rec);
            if next == 0 {
                return out;
            }
            off = next;
        }
    }

    /// Builds and appends a record holding `key` and `values`, returning its
    /// offset. Nothing is appended if the record would end past the mapping.
    fn append_record(&mut self, key: &[u8], values: &[&[u8]]) -> Result<u64, StoreError> {
        let at = self.log.end_offset();
        let mut builder = RecordBuilder::new(key);
        for v in values {
            builder.push_value(v);
        }
        let buf = builder.finish(at);
        if at + buf.len() as u64 > self.region.len() {
            return Err(StoreError::MappingExhausted);
        }
        let off = self.log.append(&buf)?;
        trace!(off, len = buf.len(), "appended record");
        Ok(off)
    }

    /// First record in the chain offering a gap usable for a payload of
    /// `len` bytes, as `(record_offset, gap_start_within_record)`.
    fn find_chain_gap(&self, head: u64, len: usize) -> Option<(u64, usize)> {
        let mut off = head;
        loop {
            let total = self.record_total(off);
            let rec = self.region.slice(off, total);
            if let Some((start, _)) = format::find_gap(rec, len) {
                return Some((off, start));
            }
            let next = format::next(rec);
            if next == 0 {
                return None;
            }
            off = next;
        }
    }

    /// Offset of the chain's tail record (the unique record whose `next` is
    /// zero). Links only ever point forward, so this terminates.
    fn tail_of(&self, head: u64) -> u64 {
        let mut off = head;
        loop {
            let total = self.record_total(off);
            let next = format::next(self.region.slice(off, total));
            if next == 0 {
                return off;
            }
            off = next;
        }
    }

    /// Zeroes the length byte and payload of every live slot in the chain
    /// whose payload satisfies `matches`. Chain structure is untouched.
    fn tombstone_matching(&mut self, head: u64, matches: impl Fn(&[u8]) -> bool) {
        let mut off = head;
        loop {
            let total = self.record_total(off);
            let rec = self.region.slice_mut(off, total);
            let (start, end) = format::value_area(rec);
            let mut i = start;
            while i < end {
                let vlen = rec[i] as usize;
                if vlen == 0 {
                    i += 1;
                    continue;
                }
                if matches(&rec[i + 1..i + 1 + vlen]) {
                    for b in &mut rec[i..=i + vlen] {
                        *b = 0;
                    }
                }
                i += vlen + 1;
            }
            let next = format::next(rec);
            if next == 0 {
                return;
            }
            off = next;
        }
    }

    /// One forward pass over `[0, file_len)`: the first record seen for each
    /// key becomes the chain head (heads always precede their successors,
    /// because chains grow by append).
    fn rebuild_index(&mut self, file_len: u64) -> Result<(), StoreError> {
        let mut off = 0u64;
        while off < file_len {
            if file_len - off < MIN_RECORD_TOTAL {
                return Err(StoreError::Corrupt(off));
            }
            let total = self.record_total(off) as u64;
            if total < MIN_RECORD_TOTAL || total > file_len - off {
                return Err(StoreError::Corrupt(off));
            }
            let rec = self.region.slice(off, total as usize);
            let klen = rec[format::TOTAL_BYTES] as usize;
            if klen == 0 || format::TOTAL_BYTES + 1 + klen > total as usize - TRAILER_BYTES {
                return Err(StoreError::Corrupt(off));
            }
            let key = format::key(rec);
            if !self.index.contains_key(key) {
                self.index.insert(key.to_vec(), IndexSlot::Head(off));
            }
            off += total;
        }
        debug!(keys = self.index.len(), scanned = file_len, "rebuilt index");
        Ok(())
    }
}

fn check_key(key: &[u8]) -> Result<(), StoreError> {
    if key.is_empty() || key.len() > MAX_KEY_LEN {
        return Err(StoreError::InvalidKey(key.len()));
    }
    Ok(())
}

fn check_value(value: &[u8]) -> Result<(), StoreError> {
    if value.is_empty() {
        return Err(StoreError::EmptyValue);
    }
    if value.len() > MAX_VALUE_LEN {
        return Err(StoreError::ValueTooLarge(value.len()));
    }
    Ok(())
}
