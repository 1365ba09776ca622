//! The uniform engine contract.
//!
//! Every backend implements exactly this trait; modalities and the public
//! facade speak only through it. Engines live behind a single
//! `Arc<dyn Engine>`; capability negotiation is a bitmask so callers can
//! probe for transactions or named collections before relying on them.

use std::any::Any;

use omnikv_error::Result;
use omnikv_types::{
    Arena, CollectionId, ContentsArg, MeasureView, Options, PlacesArg, ReadView, SampleView,
    ScanView, ScansArg, SequenceNumber, TxnGeneration,
};

/// Capability bits an engine may advertise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct Capabilities(u32);

impl Capabilities {
    pub const NONE: Self = Self(0);
    /// Snapshot-isolated transactions with optimistic concurrency.
    pub const TRANSACTIONS: Self = Self(1);
    /// Named collections beyond the default one.
    pub const NAMED_COLLECTIONS: Self = Self(1 << 1);
    /// Committed data survives close/open of the same directory.
    pub const PERSISTENCE: Self = Self(1 << 2);

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

    #[inline]
    #[must_use]
    pub const fn with(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

/// A transaction handle as the engine sees it.
///
/// Handles are single-owner: the engine never shares one across threads,
/// and the contract forbids concurrent use. Identity is the triple
/// (engine, generation, sequence); the sequence is assigned at commit and
/// `None` before.
pub trait EngineTransaction: Send + std::fmt::Debug {
    /// Reuse counter, bumped by every reset.
    fn generation(&self) -> TxnGeneration;

    /// Commit ordinal, present only after a successful commit.
    fn sequence(&self) -> Option<SequenceNumber>;

    /// Downcast support for the owning engine.
    fn as_any(&self) -> &dyn Any;

    /// Downcast support for the owning engine.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// The uniform contract every backend implements.
///
/// Engines that lack a capability must answer with the specific error kind
/// (`unimplemented` for transactions or named collections) rather than
/// silently degrading. All methods are callable from any thread; the
/// transaction handle and arena passed in are single-owner.
pub trait Engine: Send + Sync {
    /// Short engine name used in logs and error messages.
    fn name(&self) -> &'static str;

    /// What this engine can do.
    fn capabilities(&self) -> Capabilities;

    /// Write a batch of places. Atomic within the call; participates in
    /// `txn` if provided (writes are buffered until commit).
    fn write(
        &self,
        txn: Option<&mut dyn EngineTransaction>,
        places: &PlacesArg<'_>,
        contents: &ContentsArg<'_>,
        options: Options,
    ) -> Result<()>;

    /// Read a batch of places into the arena. Missing keys yield the length
    /// sentinel and no tape bytes.
    fn read<'a>(
        &self,
        txn: Option<&mut dyn EngineTransaction>,
        places: &PlacesArg<'_>,
        options: Options,
        arena: &'a mut Arena,
    ) -> Result<ReadView<'a>>;

    /// Run a batch of paginated range scans. Keys come back in ascending
    /// numeric order, capped per request at its limit.
    fn scan<'a>(
        &self,
        txn: Option<&mut dyn EngineTransaction>,
        scans: &ScansArg<'_>,
        options: Options,
        arena: &'a mut Arena,
    ) -> Result<ScanView<'a>>;

    /// Sample up to `limit` distinct keys from a collection. The
    /// distribution is unspecified but must not be degenerate.
    fn sample<'a>(
        &self,
        collection: CollectionId,
        limit: u32,
        options: Options,
        arena: &'a mut Arena,
    ) -> Result<SampleView<'a>>;

    /// Report stored sizes and presence for a batch of places.
    fn measure<'a>(
        &self,
        txn: Option<&mut dyn EngineTransaction>,
        places: &PlacesArg<'_>,
        options: Options,
        arena: &'a mut Arena,
    ) -> Result<MeasureView<'a>>;

    /// Find or create the collection with `name`.
    fn collection_open(&self, name: &str) -> Result<CollectionId>;

    /// Drop a collection and every key in it. Outstanding handles become
    /// stale; further use is a usage error.
    fn collection_drop(&self, collection: CollectionId) -> Result<()>;

    /// List named collections as `(id, name)` pairs.
    fn collection_list(&self) -> Result<Vec<(CollectionId, String)>>;

    /// Remove every key from one collection, or from all of them.
    fn clear(&self, collection: Option<CollectionId>) -> Result<()>;

    /// Begin a transaction. The handle is reusable via
    /// [`Engine::txn_reset`] and freed by dropping it.
    fn txn_begin(&self, options: Options) -> Result<Box<dyn EngineTransaction>>;

    /// Commit, returning the assigned sequence number. A conflict is a
    /// normal outcome; the handle is poisoned until reset.
    fn txn_commit(
        &self,
        txn: &mut dyn EngineTransaction,
        options: Options,
    ) -> Result<SequenceNumber>;

    /// Discard buffered state and re-snapshot, advancing the generation.
    fn txn_reset(&self, txn: &mut dyn EngineTransaction) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_bits_compose() {
        let caps = Capabilities::TRANSACTIONS.with(Capabilities::NAMED_COLLECTIONS);
        assert!(caps.contains(Capabilities::TRANSACTIONS));
        assert!(caps.contains(Capabilities::NAMED_COLLECTIONS));
        assert!(!caps.contains(Capabilities::PERSISTENCE));
        assert!(Capabilities::NONE.contains(Capabilities::NONE));
    }
}
