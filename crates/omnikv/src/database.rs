//! Database handle and transaction wrapper.
//!
//! A [`Database`] owns one engine behind an `Arc<dyn Engine>` and hands
//! out collection and graph views over it. The engine is selected by the
//! config's `engine` key; an empty config string opens the in-memory
//! default.

use std::sync::Arc;

use omnikv_core::{Capabilities, Engine, EngineTransaction};
use omnikv_error::{Result, StoreError};
use omnikv_graph::{GraphCollection, GraphOptions};
use omnikv_lsm::LsmEngine;
use omnikv_mem::MemEngine;
use omnikv_ordered::OrderedEngine;
use omnikv_types::{
    Arena, CollectionId, ContentsArg, EngineKind, Key, Options, PlacesArg, SequenceNumber,
    StoreConfig, TxnGeneration,
};

use crate::blobs::BlobsCollection;

/// A handle to one open store.
#[derive(Clone)]
pub struct Database {
    engine: Arc<dyn Engine>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

impl Database {
    /// Open a store from a JSON config string (see [`StoreConfig`]).
    ///
    /// # Errors
    ///
    /// `args_wrong` for unusable configs, engine errors otherwise.
    pub fn open(config: &str) -> Result<Self> {
        let config = StoreConfig::parse(config).map_err(|e| StoreError::BadConfig {
            detail: e.to_string(),
        })?;
        let directory = config.effective_directory();
        let engine: Arc<dyn Engine> = match config.engine {
            EngineKind::Mem => Arc::new(MemEngine::new()),
            EngineKind::Ordered => {
                let dir = directory.ok_or(StoreError::args(
                    "the ordered engine requires a directory",
                ))?;
                Arc::new(OrderedEngine::open(&dir.join("store.redb"))?)
            }
            EngineKind::Lsm => {
                let dir = directory
                    .ok_or(StoreError::args("the lsm engine requires a directory"))?;
                Arc::new(LsmEngine::open(&dir)?)
            }
        };
        tracing::info!(engine = engine.name(), "database opened");
        Ok(Self { engine })
    }

    /// Open the in-memory default engine.
    ///
    /// # Errors
    ///
    /// Never fails in practice; kept fallible for interface symmetry.
    pub fn open_in_memory() -> Result<Self> {
        Self::open("")
    }

    /// Wrap an already-constructed engine.
    #[must_use]
    pub fn from_engine(engine: Arc<dyn Engine>) -> Self {
        Self { engine }
    }

    /// The engine behind this handle.
    #[must_use]
    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    /// Capability bitmask of the backing engine.
    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        self.engine.capabilities()
    }

    /// Whether the engine supports snapshot-isolated transactions.
    #[must_use]
    pub fn supports_transactions(&self) -> bool {
        self.capabilities().contains(Capabilities::TRANSACTIONS)
    }

    /// The unnamed default collection.
    #[must_use]
    pub fn main(&self) -> BlobsCollection {
        BlobsCollection::new(Arc::clone(&self.engine), CollectionId::DEFAULT)
    }

    /// Find or create a named collection.
    ///
    /// # Errors
    ///
    /// `args_wrong` for the empty name, `unimplemented` on engines without
    /// named collections.
    pub fn collection(&self, name: &str) -> Result<BlobsCollection> {
        let id = self.engine.collection_open(name)?;
        Ok(BlobsCollection::new(Arc::clone(&self.engine), id))
    }

    /// Drop a named collection and everything in it.
    ///
    /// # Errors
    ///
    /// `missing_collection` for stale handles.
    pub fn drop_collection(&self, collection: CollectionId) -> Result<()> {
        self.engine.collection_drop(collection)
    }

    /// `(id, name)` pairs of the live named collections.
    ///
    /// # Errors
    ///
    /// Engine errors only.
    pub fn collections(&self) -> Result<Vec<(CollectionId, String)>> {
        self.engine.collection_list()
    }

    /// Open a graph over a named index collection.
    ///
    /// # Errors
    ///
    /// Engine errors on collection opening.
    pub fn graph(&self, index_name: &str, options: GraphOptions) -> Result<GraphCollection> {
        GraphCollection::open(Arc::clone(&self.engine), index_name, options)
    }

    /// Begin a transaction.
    ///
    /// # Errors
    ///
    /// `unimplemented` on engines without transactions.
    pub fn transact(&self) -> Result<Transaction<'_>> {
        self.transact_with(Options::NONE)
    }

    /// Begin a transaction with options (e.g. dont-watch).
    ///
    /// # Errors
    ///
    /// `unimplemented` on engines without transactions, `args_wrong` for
    /// disallowed options.
    pub fn transact_with(&self, options: Options) -> Result<Transaction<'_>> {
        let inner = self.engine.txn_begin(options)?;
        Ok(Transaction {
            db: self,
            inner,
            arena: Arena::new(),
        })
    }

    /// Remove every key from every collection.
    ///
    /// # Errors
    ///
    /// Engine errors only.
    pub fn clear(&self) -> Result<()> {
        self.engine.clear(None)
    }
}

/// A transaction with single-place convenience operations.
///
/// Single-owner; reads and buffered writes go through the engine's batched
/// API with this handle attached.
pub struct Transaction<'db> {
    db: &'db Database,
    inner: Box<dyn EngineTransaction>,
    arena: Arena,
}

impl Transaction<'_> {
    /// Reuse counter of the underlying handle.
    #[must_use]
    pub fn generation(&self) -> TxnGeneration {
        self.inner.generation()
    }

    /// The sequence assigned by the last successful commit.
    #[must_use]
    pub fn sequence(&self) -> Option<SequenceNumber> {
        self.inner.sequence()
    }

    /// Raw access for batched calls against this transaction.
    pub fn handle(&mut self) -> &mut dyn EngineTransaction {
        self.inner.as_mut()
    }

    /// Buffer a single write.
    ///
    /// # Errors
    ///
    /// Validation and engine errors.
    pub fn set(&mut self, collection: CollectionId, key: Key, value: &[u8]) -> Result<()> {
        let keys = [key];
        let places = PlacesArg::for_keys(&collection, &keys);
        let items: [Option<&[u8]>; 1] = [Some(value)];
        self.db.engine.write(
            Some(self.inner.as_mut()),
            &places,
            &ContentsArg::for_slices(&items),
            Options::NONE,
        )
    }

    /// Buffer a single delete.
    ///
    /// # Errors
    ///
    /// Validation and engine errors.
    pub fn erase(&mut self, collection: CollectionId, key: Key) -> Result<()> {
        let keys = [key];
        let places = PlacesArg::for_keys(&collection, &keys);
        self.db.engine.write(
            Some(self.inner.as_mut()),
            &places,
            &ContentsArg::erase(1),
            Options::NONE,
        )
    }

    /// Read one place through the transaction (read-your-writes).
    ///
    /// # Errors
    ///
    /// Validation and engine errors.
    pub fn get(&mut self, collection: CollectionId, key: Key) -> Result<Option<Vec<u8>>> {
        let keys = [key];
        let places = PlacesArg::for_keys(&collection, &keys);
        let view = self.db.engine.read(
            Some(self.inner.as_mut()),
            &places,
            Options::NONE,
            &mut self.arena,
        )?;
        Ok(view.value(0).map(<[u8]>::to_vec))
    }

    /// Commit and return the assigned sequence number.
    ///
    /// # Errors
    ///
    /// `conflict` when a watched key changed; reset and retry.
    pub fn sequenced_commit(&mut self) -> Result<SequenceNumber> {
        self.commit_with(Options::NONE)
    }

    /// Commit with options (e.g. write-flush).
    ///
    /// # Errors
    ///
    /// `conflict` when a watched key changed; reset and retry.
    pub fn commit_with(&mut self, options: Options) -> Result<SequenceNumber> {
        self.db.engine.txn_commit(self.inner.as_mut(), options)
    }

    /// Discard buffered state and re-snapshot for reuse.
    ///
    /// # Errors
    ///
    /// Engine errors only.
    pub fn reset(&mut self) -> Result<()> {
        self.db.engine.txn_reset(self.inner.as_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_selects_engine_from_config() {
        let db = Database::open_in_memory().expect("open");
        assert_eq!(db.engine().name(), "mem");
        assert!(db.supports_transactions());

        let dir = tempfile::tempdir().expect("tempdir");
        let config = format!(
            r#"{{"version": "1.0", "directory": "{}", "engine": "ordered"}}"#,
            dir.path().display()
        );
        let db = Database::open(&config).expect("open ordered");
        assert_eq!(db.engine().name(), "ordered");
        assert!(!db.supports_transactions());
    }

    #[test]
    fn bad_configs_are_args_wrong() {
        let err = Database::open("{").expect_err("malformed");
        assert_eq!(err.kind(), omnikv_error::ErrorKind::ArgsWrong);

        let err = Database::open(r#"{"version": "1.0"}"#).expect_err("missing directory");
        assert_eq!(err.kind(), omnikv_error::ErrorKind::ArgsWrong);
    }

    #[test]
    fn transaction_wrapper_roundtrip() {
        let db = Database::open_in_memory().expect("open");
        let mut txn = db.transact().expect("begin");
        txn.set(CollectionId::DEFAULT, Key::new(1), b"one").expect("set");
        assert_eq!(
            txn.get(CollectionId::DEFAULT, Key::new(1)).expect("get"),
            Some(b"one".to_vec())
        );
        let seq = txn.sequenced_commit().expect("commit");
        assert_eq!(txn.sequence(), Some(seq));

        assert_eq!(
            db.main().get(Key::new(1)).expect("get"),
            Some(b"one".to_vec())
        );
    }
}
