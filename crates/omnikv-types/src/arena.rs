//! Caller-owned output arena.
//!
//! Every batched call writes its outputs into an arena supplied by the
//! caller: a byte tape for concatenated values plus integer lanes for
//! lengths, offsets, keys, and per-request counts. Views returned to the
//! caller borrow the arena; they stay valid until the next call that
//! reuses it. Offsets are integer handles into the tape rather than raw
//! pointers, so a view can be re-derived cheaply and safely.
//!
//! The arena is single-owner: sharing one across threads is a data race by
//! contract, which Rust's borrow rules enforce structurally here.

use crate::options::Options;
use crate::{Key, ValueLen};

/// Reusable output memory for batched calls.
#[derive(Debug, Default)]
pub struct Arena {
    tape: Vec<u8>,
    lengths: Vec<ValueLen>,
    offsets: Vec<u32>,
    keys: Vec<Key>,
    counts: Vec<u32>,
}

impl Arena {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-size the byte tape.
    #[must_use]
    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            tape: Vec::with_capacity(bytes),
            ..Self::default()
        }
    }

    /// Prepare the arena for a new call. Prior contents are discarded unless
    /// the caller asked to retain them via
    /// [`Options::DONT_DISCARD_MEMORY`].
    pub fn begin(&mut self, options: Options) {
        if !options.contains(Options::DONT_DISCARD_MEMORY) {
            self.tape.clear();
            self.lengths.clear();
            self.offsets.clear();
            self.keys.clear();
            self.counts.clear();
        }
    }

    /// Bytes currently on the tape (across retained calls).
    #[must_use]
    pub fn tape_len(&self) -> usize {
        self.tape.len()
    }

    /// Start building a read result.
    pub fn build_read(&mut self) -> ReadBuilder<'_> {
        let len_start = self.lengths.len();
        let off_start = self.offsets.len();
        let tape_start = self.tape.len();
        ReadBuilder {
            arena: self,
            len_start,
            off_start,
            tape_start,
        }
    }

    /// Start building a scan (or sample) result.
    pub fn build_scan(&mut self) -> ScanBuilder<'_> {
        let key_start = self.keys.len();
        let count_start = self.counts.len();
        ScanBuilder {
            arena: self,
            key_start,
            count_start,
        }
    }

    /// Start building a measure result.
    pub fn build_measure(&mut self) -> MeasureBuilder<'_> {
        let len_start = self.lengths.len();
        MeasureBuilder {
            arena: self,
            len_start,
        }
    }
}

// ---------------------------------------------------------------------------
// Read output
// ---------------------------------------------------------------------------

/// Incrementally fills one read call's lengths and value tape.
pub struct ReadBuilder<'a> {
    arena: &'a mut Arena,
    len_start: usize,
    off_start: usize,
    tape_start: usize,
}

impl<'a> ReadBuilder<'a> {
    /// Record a missing key: sentinel length, zero tape bytes.
    pub fn push_missing(&mut self) {
        let off = (self.arena.tape.len() - self.tape_start) as u32;
        self.arena.lengths.push(ValueLen::MISSING);
        self.arena.offsets.push(off);
    }

    /// Append one present value (possibly empty) to the tape.
    pub fn push_value(&mut self, bytes: &[u8]) {
        let off = (self.arena.tape.len() - self.tape_start) as u32;
        self.arena.tape.extend_from_slice(bytes);
        self.arena.lengths.push(ValueLen::new(bytes.len() as u32));
        self.arena.offsets.push(off);
    }

    /// Finish and hand back a view over everything pushed so far.
    #[must_use]
    pub fn finish(self) -> ReadView<'a> {
        let arena = self.arena;
        ReadView {
            lengths: &arena.lengths[self.len_start..],
            offsets: &arena.offsets[self.off_start..],
            tape: &arena.tape[self.tape_start..],
        }
    }
}

/// Result of one batched read: a length per requested place and the
/// concatenated value tape. `value(i)` is `None` exactly when the key was
/// absent; empty values come back as `Some(&[])`.
#[derive(Debug, Clone, Copy)]
pub struct ReadView<'a> {
    lengths: &'a [ValueLen],
    offsets: &'a [u32],
    tape: &'a [u8],
}

impl<'a> ReadView<'a> {
    #[must_use]
    pub const fn lengths(&self) -> &'a [ValueLen] {
        self.lengths
    }

    #[must_use]
    pub const fn tape(&self) -> &'a [u8] {
        self.tape
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.lengths.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.lengths.is_empty()
    }

    /// The value stored at request `i`, if any.
    #[must_use]
    pub fn value(&self, i: usize) -> Option<&'a [u8]> {
        let len = *self.lengths.get(i)?;
        if len.is_missing() {
            return None;
        }
        let off = *self.offsets.get(i)? as usize;
        self.tape.get(off..off + len.get() as usize)
    }

    /// Iterate `(length, optional value)` pairs in request order.
    pub fn iter(&self) -> impl Iterator<Item = Option<&'a [u8]>> + '_ {
        (0..self.len()).map(move |i| self.value(i))
    }
}

// ---------------------------------------------------------------------------
// Scan / sample output
// ---------------------------------------------------------------------------

/// Incrementally fills per-request key runs.
pub struct ScanBuilder<'a> {
    arena: &'a mut Arena,
    key_start: usize,
    count_start: usize,
}

impl<'a> ScanBuilder<'a> {
    /// Append the keys of the next request.
    pub fn push_request<I: IntoIterator<Item = Key>>(&mut self, keys: I) {
        let before = self.arena.keys.len();
        self.arena.keys.extend(keys);
        let run = (self.arena.keys.len() - before) as u32;
        self.arena.counts.push(run);
    }

    #[must_use]
    pub fn finish(self) -> ScanView<'a> {
        let arena = self.arena;
        ScanView {
            counts: &arena.counts[self.count_start..],
            keys: &arena.keys[self.key_start..],
        }
    }
}

/// Result of one batched scan (or sample): per-request key runs laid end to
/// end, with a count per request.
#[derive(Debug, Clone, Copy)]
pub struct ScanView<'a> {
    counts: &'a [u32],
    keys: &'a [Key],
}

impl<'a> ScanView<'a> {
    #[must_use]
    pub const fn requests(&self) -> usize {
        self.counts.len()
    }

    #[must_use]
    pub const fn counts(&self) -> &'a [u32] {
        self.counts
    }

    /// All keys across every request, concatenated.
    #[must_use]
    pub const fn all_keys(&self) -> &'a [Key] {
        self.keys
    }

    /// The keys found for request `i`.
    #[must_use]
    pub fn keys_for(&self, i: usize) -> &'a [Key] {
        if i >= self.counts.len() {
            return &[];
        }
        let start: usize = self.counts[..i].iter().map(|&c| c as usize).sum();
        let run = self.counts[i] as usize;
        &self.keys[start..start + run]
    }
}

/// Samples share the scan output shape: key runs per request.
pub type SampleView<'a> = ScanView<'a>;

// ---------------------------------------------------------------------------
// Measure output
// ---------------------------------------------------------------------------

/// Incrementally fills per-key sizes.
pub struct MeasureBuilder<'a> {
    arena: &'a mut Arena,
    len_start: usize,
}

impl<'a> MeasureBuilder<'a> {
    pub fn push(&mut self, size: ValueLen) {
        self.arena.lengths.push(size);
    }

    #[must_use]
    pub fn finish(self) -> MeasureView<'a> {
        let arena = self.arena;
        MeasureView {
            lengths: &arena.lengths[self.len_start..],
        }
    }
}

/// Result of one measure call: per-key stored sizes, sentinel for absent.
#[derive(Debug, Clone, Copy)]
pub struct MeasureView<'a> {
    lengths: &'a [ValueLen],
}

impl<'a> MeasureView<'a> {
    #[must_use]
    pub const fn sizes(&self) -> &'a [ValueLen] {
        self.lengths
    }

    #[must_use]
    pub fn present(&self, i: usize) -> bool {
        self.lengths.get(i).is_some_and(|len| !len.is_missing())
    }
}
