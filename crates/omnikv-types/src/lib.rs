//! Foundation types for OmniKV.
//!
//! This crate defines the vocabulary shared by every engine and modality:
//! key/collection/sequence newtypes with their reserved sentinels, the
//! per-call option flags, the engine configuration object, the strided-view
//! and SoA-bundle machinery for batched arguments, and the caller-owned
//! output arena.

pub mod arena;
pub mod bundles;
pub mod config;
pub mod options;
pub mod strided;

pub use arena::{Arena, MeasureView, ReadView, SampleView, ScanView};
pub use bundles::{
    ContentsArg, Edge, EdgesArg, Place, PlacesArg, Payloads, Scan, ScansArg,
};
pub use config::{ConfigError, EngineKind, StoreConfig, TEST_PATH_ENV_VAR};
pub use options::Options;
pub use strided::{Element, Fields, Strided};

use std::fmt;

/// A key in any collection: a fixed-width signed 64-bit integer.
///
/// Ordering is numeric, not lexicographic. [`Key::UNKNOWN`] is reserved and
/// must never be stored.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct Key(i64);

impl Key {
    /// Reserved sentinel meaning "unknown / missing key".
    pub const UNKNOWN: Self = Self(i64::MAX);
    /// Smallest representable key; the default lower bound for scans.
    pub const MIN: Self = Self(i64::MIN);

    #[inline]
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn get(self) -> i64 {
        self.0
    }

    /// Whether this is the reserved "unknown" sentinel.
    #[inline]
    pub const fn is_unknown(self) -> bool {
        self.0 == i64::MAX
    }

    /// The next key up, if any. Used by scans to resume after a boundary.
    #[inline]
    pub const fn checked_next(self) -> Option<Self> {
        match self.0.checked_add(1) {
            Some(raw) => Some(Self(raw)),
            None => None,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Key {
    fn from(raw: i64) -> Self {
        Self(raw)
    }
}

/// Identifier of a named collection within one engine.
///
/// The unnamed default collection is always [`CollectionId::DEFAULT`] and
/// always exists.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct CollectionId(u64);

impl CollectionId {
    /// The unnamed default collection.
    pub const DEFAULT: Self = Self(0);

    #[inline]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn get(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn is_default(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_default() {
            f.write_str("main")
        } else {
            write!(f, "col#{}", self.0)
        }
    }
}

/// Byte length of a stored value.
///
/// The payload domain is `[0, u32::MAX - 1]`; [`ValueLen::MISSING`] is the
/// reserved sentinel returned when a read misses. A present empty value has
/// length 0 and is distinguishable from a missing one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct ValueLen(u32);

impl ValueLen {
    /// Sentinel for "no value stored under this key".
    pub const MISSING: Self = Self(u32::MAX);
    /// Largest storable payload length.
    pub const MAX_PAYLOAD: u32 = u32::MAX - 1;
    pub const ZERO: Self = Self(0);

    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn get(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn is_missing(self) -> bool {
        self.0 == u32::MAX
    }
}

impl fmt::Display for ValueLen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_missing() {
            f.write_str("missing")
        } else {
            write!(f, "{}B", self.0)
        }
    }
}

/// Monotonically increasing commit ordinal, assigned at commit time.
///
/// Strictly increasing across the engine's lifetime; per-engine, never
/// process-wide.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct SequenceNumber(u64);

impl SequenceNumber {
    pub const ZERO: Self = Self(0);

    #[inline]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn get(self) -> u64 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seq#{}", self.0)
    }
}

/// Per-handle reuse counter: bumped every time a transaction handle is reset.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct TxnGeneration(u64);

impl TxnGeneration {
    pub const FIRST: Self = Self(0);

    #[inline]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn get(self) -> u64 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

/// A frozen view of the committed state at transaction begin time.
///
/// Visibility is a single comparison: an entry written at sequence `s` is
/// visible iff `s <= snapshot.high`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Snapshot {
    pub high: SequenceNumber,
}

impl Snapshot {
    #[inline]
    pub const fn new(high: SequenceNumber) -> Self {
        Self { high }
    }

    /// Whether a commit at `seq` is inside this snapshot.
    #[inline]
    pub const fn sees(self, seq: SequenceNumber) -> bool {
        seq.get() <= self.high.get()
    }
}

/// A vertex's position in an edge, as a two-bit role mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[repr(transparent)]
pub struct Role(u8);

impl Role {
    /// The vertex is the edge's source.
    pub const SOURCE: Self = Self(1);
    /// The vertex is the edge's target.
    pub const TARGET: Self = Self(2);
    /// Either endpoint.
    pub const ANY: Self = Self(3);

    #[inline]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & 3)
    }

    #[inline]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Whether `other`'s bits are all present in `self`.
    #[inline]
    pub const fn matches(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// The role seen from the opposite endpoint.
    #[inline]
    #[must_use]
    pub const fn flipped(self) -> Self {
        match self.0 {
            1 => Self(2),
            2 => Self(1),
            other => Self(other),
        }
    }

    /// OR two role masks together.
    #[inline]
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            1 => f.write_str("source"),
            2 => f.write_str("target"),
            3 => f.write_str("any"),
            _ => write!(f, "role({})", self.0),
        }
    }
}
