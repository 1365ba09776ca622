//! Per-call option flags.
//!
//! A single bitmask travels with every batched call. Each operation accepts
//! only a subset of the flags; the validation layer rejects anything outside
//! the per-operation allowance before the engine is reached.

use std::fmt;
use std::ops::BitOr;

/// Bitmask of per-call options.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[repr(transparent)]
pub struct Options(u32);

impl Options {
    pub const NONE: Self = Self(0);
    /// Skip read-set recording: the transaction becomes a weak snapshot
    /// batch with no conflict detection on reads.
    pub const TRANSACTION_DONT_WATCH: Self = Self(1);
    /// Keep prior arena contents valid; outputs append instead of replacing.
    pub const DONT_DISCARD_MEMORY: Self = Self(1 << 1);
    /// Permit returning a shared read-only view instead of a copy.
    pub const READ_SHARED_MEMORY: Self = Self(1 << 2);
    /// Flush to durable storage after the write commits.
    pub const WRITE_FLUSH: Self = Self(1 << 3);
    /// Hint that the scan is large; engines may prefetch.
    pub const SCAN_BULK: Self = Self(1 << 4);

    /// Flags permitted on `write`.
    pub const ALLOWED_WRITE: Self = Self(
        Self::TRANSACTION_DONT_WATCH.0 | Self::DONT_DISCARD_MEMORY.0 | Self::WRITE_FLUSH.0,
    );
    /// Flags permitted on `read` and `measure`.
    pub const ALLOWED_READ: Self = Self(
        Self::TRANSACTION_DONT_WATCH.0 | Self::DONT_DISCARD_MEMORY.0 | Self::READ_SHARED_MEMORY.0,
    );
    /// Flags permitted on `scan` and `sample`.
    pub const ALLOWED_SCAN: Self = Self(
        Self::TRANSACTION_DONT_WATCH.0
            | Self::DONT_DISCARD_MEMORY.0
            | Self::READ_SHARED_MEMORY.0
            | Self::SCAN_BULK.0,
    );
    /// Flags permitted on `txn_begin`.
    pub const ALLOWED_TXN_BEGIN: Self = Self(Self::TRANSACTION_DONT_WATCH.0);
    /// Flags permitted on `txn_commit`.
    pub const ALLOWED_TXN_COMMIT: Self = Self(Self::WRITE_FLUSH.0);

    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether no flags outside `allowed` are set.
    #[inline]
    #[must_use]
    pub const fn is_subset_of(self, allowed: Self) -> bool {
        self.0 & !allowed.0 == 0
    }
}

impl BitOr for Options {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return f.write_str("Options(none)");
        }
        let mut names = Vec::new();
        if self.contains(Self::TRANSACTION_DONT_WATCH) {
            names.push("dont_watch");
        }
        if self.contains(Self::DONT_DISCARD_MEMORY) {
            names.push("dont_discard_memory");
        }
        if self.contains(Self::READ_SHARED_MEMORY) {
            names.push("read_shared_memory");
        }
        if self.contains(Self::WRITE_FLUSH) {
            names.push("write_flush");
        }
        if self.contains(Self::SCAN_BULK) {
            names.push("scan_bulk");
        }
        write!(f, "Options({})", names.join("|"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subset_checks() {
        assert!(Options::NONE.is_subset_of(Options::ALLOWED_WRITE));
        assert!(Options::WRITE_FLUSH.is_subset_of(Options::ALLOWED_WRITE));
        assert!(!Options::SCAN_BULK.is_subset_of(Options::ALLOWED_WRITE));
        assert!(Options::SCAN_BULK.is_subset_of(Options::ALLOWED_SCAN));
        assert!(!Options::WRITE_FLUSH.is_subset_of(Options::ALLOWED_READ));
    }

    #[test]
    fn union_and_contains() {
        let opts = Options::WRITE_FLUSH | Options::TRANSACTION_DONT_WATCH;
        assert!(opts.contains(Options::WRITE_FLUSH));
        assert!(opts.contains(Options::TRANSACTION_DONT_WATCH));
        assert!(!opts.contains(Options::SCAN_BULK));
    }

    #[test]
    fn debug_names() {
        let opts = Options::WRITE_FLUSH | Options::SCAN_BULK;
        let rendered = format!("{opts:?}");
        assert!(rendered.contains("write_flush"));
        assert!(rendered.contains("scan_bulk"));
        assert_eq!(format!("{:?}", Options::NONE), "Options(none)");
    }
}
