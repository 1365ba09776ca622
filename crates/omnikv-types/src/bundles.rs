//! Structure-of-Arrays argument bundles.
//!
//! Batched entry points take their arguments as parallel strided columns;
//! a bundle groups the columns of one logical argument and materialises a
//! record per index on demand, without allocating. Absent columns resolve
//! to the operation's defaults: the default collection, the minimum key for
//! scan lower bounds, the unlabeled edge id, the "any" role.

use crate::strided::{Fields, Strided};
use crate::{CollectionId, Key};

// ---------------------------------------------------------------------------
// Places
// ---------------------------------------------------------------------------

/// One addressed location: `(collection, key, optional field)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Place<'a> {
    pub collection: CollectionId,
    pub key: Key,
    pub field: Option<&'a str>,
}

impl Place<'_> {
    #[inline]
    #[must_use]
    pub const fn collection_key(&self) -> (CollectionId, Key) {
        (self.collection, self.key)
    }
}

/// The `places` bundle of a batched read/write/measure call.
#[derive(Debug, Clone, Copy)]
pub struct PlacesArg<'a> {
    pub collections: Strided<'a, CollectionId>,
    pub keys: Strided<'a, Key>,
    pub fields: Fields<'a>,
    pub count: usize,
}

impl<'a> PlacesArg<'a> {
    /// A batch over a dense key slice in a single collection.
    #[must_use]
    pub fn for_keys(collection: &'a CollectionId, keys: &'a [Key]) -> Self {
        Self {
            collections: Strided::Single(collection),
            keys: Strided::Slice(keys),
            fields: Fields::None,
            count: keys.len(),
        }
    }

    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.count
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Materialise the record at `i`. Returns `None` past the end or when
    /// the required key column is absent.
    #[must_use]
    pub fn get(&self, i: usize) -> Option<Place<'a>> {
        if i >= self.count {
            return None;
        }
        let key = self.keys.get(i)?;
        Some(Place {
            collection: self.collections.get_or(i, CollectionId::DEFAULT),
            key,
            field: self.fields.get(i),
        })
    }

    /// Whether the whole batch addresses one collection.
    #[must_use]
    pub fn same_collection(&self) -> bool {
        self.collections.same_elements(self.count)
    }

    /// Iterate the materialised records.
    pub fn iter(&self) -> impl Iterator<Item = Place<'a>> + '_ {
        (0..self.count).filter_map(move |i| self.get(i))
    }
}

// ---------------------------------------------------------------------------
// Contents
// ---------------------------------------------------------------------------

/// Where the payload bytes of a `contents` bundle live.
#[derive(Debug, Clone, Copy, Default)]
pub enum Payloads<'a> {
    /// No payloads at all: the write is a batched delete.
    #[default]
    None,
    /// One shared tape; offsets index into it.
    Tape(&'a [u8]),
    /// One optional buffer per index; `None` marks that index deleted.
    Slices(&'a [Option<&'a [u8]>]),
}

/// The `contents` bundle of a batched write.
///
/// Payload lengths are probed in a fixed order: an explicit `lengths`
/// column wins; otherwise an offsets column of size `count + 1` is treated
/// as Arrow-style fenceposts; otherwise each payload is scanned for the
/// terminator byte.
#[derive(Debug, Clone, Copy)]
pub struct ContentsArg<'a> {
    /// Optional presence bitmap, one bit per index, LSB-first per byte.
    /// A cleared bit marks the index deleted regardless of payload bytes.
    pub presences: Option<&'a [u8]>,
    pub offsets: Strided<'a, u32>,
    pub lengths: Strided<'a, u32>,
    pub payloads: Payloads<'a>,
    pub count: usize,
    /// Terminator byte for the delimiter encoding. NUL unless overridden.
    pub separator: u8,
}

impl<'a> ContentsArg<'a> {
    /// A batch of dense per-item buffers, nothing deleted.
    #[must_use]
    pub fn for_slices(items: &'a [Option<&'a [u8]>]) -> Self {
        Self {
            presences: None,
            offsets: Strided::None,
            lengths: Strided::None,
            payloads: Payloads::Slices(items),
            count: items.len(),
            separator: 0,
        }
    }

    /// A batch that deletes every addressed place.
    #[must_use]
    pub const fn erase(count: usize) -> Self {
        Self {
            presences: None,
            offsets: Strided::None,
            lengths: Strided::None,
            payloads: Payloads::None,
            count,
            separator: 0,
        }
    }

    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.count
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Whether every payload is absent, i.e. the write removes all places.
    #[inline]
    #[must_use]
    pub const fn is_erase(&self) -> bool {
        matches!(self.payloads, Payloads::None)
    }

    /// Arrow layout: one shared buffer addressed purely through fenceposts.
    #[must_use]
    pub fn is_arrow(&self) -> bool {
        matches!(self.payloads, Payloads::Tape(_))
            && !self.offsets.is_absent()
            && self.lengths.is_absent()
    }

    fn present(&self, i: usize) -> bool {
        match self.presences {
            None => true,
            Some(bits) => {
                let byte = bits.get(i / 8).copied().unwrap_or(0);
                byte & (1 << (i % 8)) != 0
            }
        }
    }

    /// Payload at `i`: `Some(bytes)` to store (possibly empty), `None` to
    /// delete.
    #[must_use]
    pub fn get(&self, i: usize) -> Option<&'a [u8]> {
        if i >= self.count || !self.present(i) {
            return None;
        }
        let buffer = match self.payloads {
            Payloads::None => return None,
            Payloads::Tape(tape) => tape,
            Payloads::Slices(items) => items.get(i).copied().flatten()?,
        };
        let off = self.offsets.get_or(i, 0) as usize;
        let len = if let Some(len) = self.lengths.get(i) {
            len as usize
        } else if let Some(next) = self.offsets.get(i + 1) {
            (next as usize).saturating_sub(off)
        } else {
            let rest = buffer.get(off..)?;
            rest.iter().position(|&b| b == self.separator)?
        };
        buffer.get(off..off + len)
    }

    /// Whether consecutive payloads occupy adjacent memory, allowing engines
    /// to treat the whole batch as one contiguous slab.
    #[must_use]
    pub fn is_continuous(&self) -> bool {
        let mut prev: Option<&[u8]> = None;
        for i in 0..self.count {
            let Some(value) = self.get(i) else {
                return false;
            };
            if let Some(last) = prev {
                if last.as_ptr() as usize + last.len() != value.as_ptr() as usize {
                    return false;
                }
            }
            prev = Some(value);
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Scans
// ---------------------------------------------------------------------------

/// One paginated range request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scan {
    pub collection: CollectionId,
    pub min_key: Key,
    pub limit: u32,
}

/// The bundle of a batched scan. Limits are mandatory; the validation layer
/// rejects unbounded scans before any engine sees them.
#[derive(Debug, Clone, Copy)]
pub struct ScansArg<'a> {
    pub collections: Strided<'a, CollectionId>,
    pub min_keys: Strided<'a, Key>,
    pub limits: Strided<'a, u32>,
    pub count: usize,
}

impl<'a> ScansArg<'a> {
    /// One scan request.
    #[must_use]
    pub fn single(collection: &'a CollectionId, min_key: &'a Key, limit: &'a u32) -> Self {
        Self {
            collections: Strided::Single(collection),
            min_keys: Strided::Single(min_key),
            limits: Strided::Single(limit),
            count: 1,
        }
    }

    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.count
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[must_use]
    pub fn get(&self, i: usize) -> Option<Scan> {
        if i >= self.count {
            return None;
        }
        Some(Scan {
            collection: self.collections.get_or(i, CollectionId::DEFAULT),
            min_key: self.min_keys.get_or(i, Key::MIN),
            limit: self.limits.get(i)?,
        })
    }

    #[must_use]
    pub fn same_collection(&self) -> bool {
        self.collections.same_elements(self.count)
    }

    pub fn iter(&self) -> impl Iterator<Item = Scan> + '_ {
        (0..self.count).filter_map(move |i| self.get(i))
    }
}

// ---------------------------------------------------------------------------
// Edges
// ---------------------------------------------------------------------------

/// A directed edge triple. The id defaults to [`Key::UNKNOWN`], meaning
/// "unlabeled".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Edge {
    pub source: Key,
    pub target: Key,
    pub id: Key,
}

impl Edge {
    #[must_use]
    pub const fn new(source: Key, target: Key, id: Key) -> Self {
        Self { source, target, id }
    }

    /// An edge with the unlabeled id sentinel.
    #[must_use]
    pub const fn unlabeled(source: Key, target: Key) -> Self {
        Self {
            source,
            target,
            id: Key::UNKNOWN,
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_loop(&self) -> bool {
        self.source.get() == self.target.get()
    }
}

/// The bundle of a batched edge upsert/remove: three parallel key columns.
#[derive(Debug, Clone, Copy)]
pub struct EdgesArg<'a> {
    pub sources: Strided<'a, Key>,
    pub targets: Strided<'a, Key>,
    pub ids: Strided<'a, Key>,
    pub count: usize,
}

impl<'a> EdgesArg<'a> {
    /// Dense source/target slices with no ids (all edges unlabeled).
    #[must_use]
    pub fn from_pairs(sources: &'a [Key], targets: &'a [Key]) -> Self {
        Self {
            sources: Strided::Slice(sources),
            targets: Strided::Slice(targets),
            ids: Strided::None,
            count: sources.len().min(targets.len()),
        }
    }

    /// Dense source/target/id slices.
    #[must_use]
    pub fn from_triples(sources: &'a [Key], targets: &'a [Key], ids: &'a [Key]) -> Self {
        Self {
            sources: Strided::Slice(sources),
            targets: Strided::Slice(targets),
            ids: Strided::Slice(ids),
            count: sources.len().min(targets.len()).min(ids.len()),
        }
    }

    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.count
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[must_use]
    pub fn get(&self, i: usize) -> Option<Edge> {
        if i >= self.count {
            return None;
        }
        Some(Edge {
            source: self.sources.get(i)?,
            target: self.targets.get(i)?,
            id: self.ids.get_or(i, Key::UNKNOWN),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = Edge> + '_ {
        (0..self.count).filter_map(move |i| self.get(i))
    }
}
