//! Record layout constants and byte-level helpers.
//!
//! A record is one physical chunk of the backing file:
//!
//! ```text
//! [total: u64 BE][klen: u8][key][value slots...][self_end: u64 BE][next: u64 BE]
//! ```
//!
//! A value slot is either **live** — `vlen: u8` (1..=255) followed by exactly
//! `vlen` payload bytes — or a run of `0x00` tombstone bytes. Because a live
//! slot's length byte is never zero, a zero at a slot boundary always means
//! the slot has been tombstoned.

use byteorder::{BigEndian, ByteOrder};

/// Maximum key length; one length byte precedes the key.
pub const MAX_KEY_LEN: usize = 255;
/// Maximum value payload length; one length byte precedes each value.
pub const MAX_VALUE_LEN: usize = 255;

/// Width of the leading `total` field.
pub const TOTAL_BYTES: usize = 8;
/// Width of the trailer: `self_end` then `next`, 8 bytes each.
pub const TRAILER_BYTES: usize = 16;

/// Smallest well-formed record: `total`, a 1-byte key, one 1-byte value, and
/// the trailer.
pub const MIN_RECORD_TOTAL: u64 = (TOTAL_BYTES + 1 + 1 + 2 + TRAILER_BYTES) as u64;

/// Initial capacity of the record assembly buffer.
const SCRATCH_CAPACITY: usize = 1 << 10;

/// Assembles a new record in a scratch buffer.
///
/// The header (key length and key bytes) is laid down at construction,
/// values are packed one by one, and [`finish`](RecordBuilder::finish)
/// closes the record with its `total` and trailer once the append position
/// is known.
#[derive(Debug)]
pub struct RecordBuilder {
    buf: Vec<u8>,
}

impl RecordBuilder {
    /// Starts a record for `key`. The key must already be validated to
    /// 1..=[`MAX_KEY_LEN`] bytes.
    pub fn new(key: &[u8]) -> Self {
        let mut buf = Vec::with_capacity(SCRATCH_CAPACITY);
        buf.extend_from_slice(&[0u8; TOTAL_BYTES]);
        buf.push(key.len() as u8);
        buf.extend_from_slice(key);
        Self { buf }
    }

    /// Packs one live slot. The value must already be validated to
    /// 1..=[`MAX_VALUE_LEN`] bytes.
    pub fn push_value(&mut self, value: &[u8]) {
        self.buf.push(value.len() as u8);
        self.buf.extend_from_slice(value);
    }

    /// Closes the record for appending at offset `at`: fills `total`, writes
    /// `self_end = at + total`, and leaves `next` zero (tail record).
    pub fn finish(mut self, at: u64) -> Vec<u8> {
        let total = (self.buf.len() + TRAILER_BYTES) as u64;
        BigEndian::write_u64(&mut self.buf[..TOTAL_BYTES], total);

        let mut trailer = [0u8; TRAILER_BYTES];
        BigEndian::write_u64(&mut trailer[..8], at + total);
        self.buf.extend_from_slice(&trailer);
        self.buf
    }
}

/// Reads the `total` field of the record in `rec`.
pub fn total(rec: &[u8]) -> u64 {
    BigEndian::read_u64(&rec[..TOTAL_BYTES])
}

/// Borrows the key bytes of the record in `rec`.
pub fn key(rec: &[u8]) -> &[u8] {
    let klen = rec[TOTAL_BYTES] as usize;
    &rec[TOTAL_BYTES + 1..TOTAL_BYTES + 1 + klen]
}

/// Reads the `next` link of the record in `rec` (0 for the chain tail).
pub fn next(rec: &[u8]) -> u64 {
    BigEndian::read_u64(&rec[rec.len() - 8..])
}

/// `[start, end)` of the value slot area within the record: from the byte
/// after the key to the start of the trailer.
pub fn value_area(rec: &[u8]) -> (usize, usize) {
    let klen = rec[TOTAL_BYTES] as usize;
    (TOTAL_BYTES + 1 + klen, rec.len() - TRAILER_BYTES)
}

/// Iterates the live slots of a record, skipping tombstone runs.
///
/// Yields `(pos, payload)` where `pos` is the offset of the slot's length
/// byte within the record.
pub fn slots(rec: &[u8]) -> Slots<'_> {
    let (pos, end) = value_area(rec);
    Slots { rec, pos, end }
}

#[derive(Debug)]
pub struct Slots<'a> {
    rec: &'a [u8],
    pos: usize,
    end: usize,
}

impl<'a> Iterator for Slots<'a> {
    type Item = (usize, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        while self.pos < self.end {
            let vlen = self.rec[self.pos] as usize;
            if vlen == 0 {
                self.pos += 1;
                continue;
            }
            let at = self.pos;
            self.pos += vlen + 1;
            return Some((at, &self.rec[at + 1..at + 1 + vlen]));
        }
        None
    }
}

/// Finds the first gap in `rec` usable for a payload of `len` bytes.
///
/// A gap is a maximal run of `0x00` bytes in the value area; it is usable
/// when the payload is **strictly** shorter than the run, which reserves at
/// least one residual tombstone byte so the following slot's length byte
/// stays unambiguous. Returns the `[start, end)` range of the chosen gap
/// within the record.
pub fn find_gap(rec: &[u8], len: usize) -> Option<(usize, usize)> {
    let (start, end) = value_area(rec);
    let mut i = start;
    while i < end {
        let vlen = rec[i] as usize;
        if vlen != 0 {
            i += vlen + 1;
            continue;
        }
        let gap_start = i;
        while i < end && rec[i] == 0 {
            i += 1;
        }
        if len < i - gap_start {
            return Some((gap_start, i));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(key: &[u8], values: &[&[u8]], at: u64) -> Vec<u8> {
        let mut b = RecordBuilder::new(key);
        for v in values {
            b.push_value(v);
        }
        b.finish(at)
    }

    // -------------------- Builder layout --------------------

    #[test]
    fn builder_produces_exact_bytes() {
        let rec = record(b"u", &[b"a", b"b", b"c"], 0);

        // total(8) + klen(1) + key(1) + 3*(1+1) + trailer(16) = 32
        assert_eq!(rec.len(), 32);
        assert_eq!(
            rec,
            vec![
                0, 0, 0, 0, 0, 0, 0, 32, // total
                1, b'u', // klen, key
                1, b'a', 1, b'b', 1, b'c', // slots
                0, 0, 0, 0, 0, 0, 0, 32, // self_end = at + total
                0, 0, 0, 0, 0, 0, 0, 0, // next
            ]
        );
    }

    #[test]
    fn builder_accounts_for_append_position() {
        let rec = record(b"k", &[b"v"], 100);
        assert_eq!(total(&rec), rec.len() as u64);
        // self_end sits just before next
        let self_end = BigEndian::read_u64(&rec[rec.len() - 16..rec.len() - 8]);
        assert_eq!(self_end, 100 + rec.len() as u64);
        assert_eq!(next(&rec), 0);
    }

    #[test]
    fn accessors_agree_with_layout() {
        let rec = record(b"nick", &[b"alice", b"bob"], 0);
        assert_eq!(key(&rec), b"nick");
        let (start, end) = value_area(&rec);
        assert_eq!(start, TOTAL_BYTES + 1 + 4);
        assert_eq!(end, rec.len() - TRAILER_BYTES);
    }

    // -------------------- Slot iteration --------------------

    #[test]
    fn slots_walk_in_insertion_order() {
        let rec = record(b"u", &[b"aa", b"b", b"ccc"], 0);
        let payloads: Vec<&[u8]> = slots(&rec).map(|(_, p)| p).collect();
        assert_eq!(
            payloads,
            vec![b"aa".as_slice(), b"b".as_slice(), b"ccc".as_slice()]
        );
    }

    #[test]
    fn slots_skip_tombstone_runs() {
        let mut rec = record(b"u", &[b"aa", b"b", b"ccc"], 0);
        // Tombstone the middle slot ("b": length byte + 1 payload byte).
        let (start, _) = value_area(&rec);
        let b_pos = start + 3;
        rec[b_pos] = 0;
        rec[b_pos + 1] = 0;

        let payloads: Vec<&[u8]> = slots(&rec).map(|(_, p)| p).collect();
        assert_eq!(payloads, vec![b"aa".as_slice(), b"ccc".as_slice()]);
    }

    #[test]
    fn slots_of_fully_tombstoned_record_are_empty() {
        let mut rec = record(b"u", &[b"aa", b"b"], 0);
        let (start, end) = value_area(&rec);
        for b in &mut rec[start..end] {
            *b = 0;
        }
        assert_eq!(slots(&rec).count(), 0);
    }

    // -------------------- Gap discovery --------------------

    #[test]
    fn no_gap_in_fresh_record() {
        let rec = record(b"u", &[b"a", b"b"], 0);
        assert_eq!(find_gap(&rec, 1), None);
    }

    #[test]
    fn gap_between_live_slots() {
        let mut rec = record(b"u", &[b"a", b"bb", b"c"], 0);
        let (start, _) = value_area(&rec);
        // Kill "bb": 3 tombstone bytes at start+2.
        for b in &mut rec[start + 2..start + 5] {
            *b = 0;
        }

        assert_eq!(find_gap(&rec, 2), Some((start + 2, start + 5)));
    }

    #[test]
    fn fit_rule_is_strict() {
        let mut rec = record(b"u", &[b"a", b"bb", b"c"], 0);
        let (start, _) = value_area(&rec);
        for b in &mut rec[start + 2..start + 5] {
            *b = 0;
        }

        // Gap length is 3: payload of 3 must not fit, payload of 2 must.
        assert_eq!(find_gap(&rec, 3), None);
        assert!(find_gap(&rec, 2).is_some());
    }

    #[test]
    fn gap_running_to_trailer_ends_at_value_area() {
        let mut rec = record(b"u", &[b"a", b"bb"], 0);
        let (start, end) = value_area(&rec);
        // Kill the final slot; the gap extends to the trailer.
        for b in &mut rec[start + 2..end] {
            *b = 0;
        }

        assert_eq!(find_gap(&rec, 1), Some((start + 2, end)));
    }

    #[test]
    fn first_usable_gap_wins_over_later_ones() {
        let mut rec = record(b"u", &[b"a", b"bb", b"c", b"dddd"], 0);
        let (start, _) = value_area(&rec);
        // Two gaps: 3 bytes where "bb" was, 5 bytes where "dddd" was.
        for b in &mut rec[start + 2..start + 5] {
            *b = 0;
        }
        for b in &mut rec[start + 7..start + 12] {
            *b = 0;
        }

        // A 2-byte payload fits the first gap.
        assert_eq!(find_gap(&rec, 2), Some((start + 2, start + 5)));
        // A 4-byte payload skips it and lands in the second.
        assert_eq!(find_gap(&rec, 4), Some((start + 7, start + 12)));
    }

    #[test]
    fn gap_before_first_live_slot() {
        let mut rec = record(b"u", &[b"x", b"y"], 0);
        let (start, _) = value_area(&rec);
        // Kill "x": [0, 0, 1, 'y'] — a 2-byte gap at the head of the area.
        rec[start] = 0;
        rec[start + 1] = 0;

        assert_eq!(find_gap(&rec, 1), Some((start, start + 2)));
        assert_eq!(find_gap(&rec, 2), None);
    }
}
