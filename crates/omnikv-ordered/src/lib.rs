//! Embedded ordered engine backed by redb.
//!
//! Collections map to redb tables keyed by `i64`, which redb orders
//! numerically, so scans come back in key order with no re-sorting. Every
//! batched write runs in one redb write transaction and is therefore
//! atomic. Store-level transactions are not supported by this backend; the
//! engine answers with the capability error instead of degrading.

use std::path::Path;

use redb::{Database, TableDefinition, TableError, TableHandle};

use omnikv_core::validate::{validate_read, validate_sample, validate_scan, validate_write};
use omnikv_core::{Capabilities, CollectionRegistry, Engine, EngineTransaction, Poison};
use omnikv_error::{Result, StoreError};
use omnikv_types::{
    Arena, CollectionId, ContentsArg, Key, MeasureView, Options, Place, PlacesArg, ReadView,
    SampleView, ScanView, ScansArg, SequenceNumber, ValueLen,
};

/// Prefix for collection-backing tables, keeping them apart from any
/// bookkeeping tables a later version may add.
const TABLE_PREFIX: &str = "c:";
/// Table backing the unnamed default collection.
const MAIN_TABLE: &str = "c:";

fn table_name(registry: &CollectionRegistry, collection: CollectionId) -> Result<String> {
    if collection.is_default() {
        return Ok(MAIN_TABLE.to_owned());
    }
    registry.check_live(collection)?;
    let name = registry
        .name_of(collection)
        .ok_or(StoreError::StaleCollection {
            id: collection.get(),
        })?;
    Ok(format!("{TABLE_PREFIX}{name}"))
}

fn map_backend<E: std::fmt::Display>(error: E) -> StoreError {
    let rendered = error.to_string();
    if rendered.contains("Corrupted") || rendered.contains("corrupted") {
        StoreError::corruption(rendered)
    } else {
        StoreError::backend(rendered)
    }
}

/// Embedded ordered engine.
pub struct OrderedEngine {
    db: Database,
    registry: CollectionRegistry,
    poison: Poison,
}

impl OrderedEngine {
    /// Open (or create) the database at `path`. Idempotent for the same
    /// directory.
    ///
    /// # Errors
    ///
    /// `io`/`corruption` when the backing file cannot be used.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path).map_err(map_backend)?;
        let registry = CollectionRegistry::new();

        // Named collections persist as their tables; rebuild the registry.
        let read = db.begin_read().map_err(map_backend)?;
        for table in read.list_tables().map_err(map_backend)? {
            let name = table.name().to_owned();
            if let Some(stripped) = name.strip_prefix(TABLE_PREFIX) {
                if !stripped.is_empty() {
                    registry.open(stripped)?;
                }
            }
        }
        drop(read);

        tracing::info!(path = %path.display(), "ordered engine opened");
        Ok(Self {
            db,
            registry,
            poison: Poison::new(),
        })
    }

    fn reject_txn(&self, txn: Option<&mut dyn EngineTransaction>) -> Result<()> {
        if txn.is_some() {
            return Err(StoreError::unsupported("ordered", "transactions"));
        }
        Ok(())
    }

    fn plan_places<'p>(&self, places: &PlacesArg<'p>) -> Result<Vec<(Place<'p>, String)>> {
        let mut plan = Vec::with_capacity(places.count);
        for i in 0..places.count {
            let place = places
                .get(i)
                .ok_or(StoreError::args("key column shorter than batch count"))?;
            let table = table_name(&self.registry, place.collection)?;
            plan.push((place, table));
        }
        Ok(plan)
    }

    fn write_inner(
        &self,
        places: &PlacesArg<'_>,
        contents: &ContentsArg<'_>,
        options: Options,
    ) -> Result<()> {
        let plan = self.plan_places(places)?;
        let txn = self.db.begin_write().map_err(map_backend)?;
        {
            for (i, (place, table)) in plan.iter().enumerate() {
                let def: TableDefinition<'_, i64, &[u8]> = TableDefinition::new(table);
                let mut table = txn.open_table(def).map_err(map_backend)?;
                match contents.get(i) {
                    Some(bytes) => {
                        if bytes.len() as u64 > u64::from(ValueLen::MAX_PAYLOAD) {
                            return Err(StoreError::args(
                                "value exceeds the representable length",
                            ));
                        }
                        table
                            .insert(place.key.get(), bytes)
                            .map_err(map_backend)?;
                    }
                    None => {
                        table.remove(place.key.get()).map_err(map_backend)?;
                    }
                }
            }
        }
        txn.commit().map_err(map_backend)?;
        if options.contains(Options::WRITE_FLUSH) {
            // redb commits are durable by default; nothing extra to flush.
        }
        Ok(())
    }

    /// Run `body` over the table backing `table_name`, treating a table
    /// that does not exist yet as empty.
    fn with_table<T>(
        &self,
        name: &str,
        empty: impl FnOnce() -> T,
        body: impl FnOnce(redb::ReadOnlyTable<i64, &'static [u8]>) -> Result<T>,
    ) -> Result<T> {
        let read = self.db.begin_read().map_err(map_backend)?;
        let def: TableDefinition<'_, i64, &[u8]> = TableDefinition::new(name);
        match read.open_table(def) {
            Ok(table) => body(table),
            Err(TableError::TableDoesNotExist(_)) => Ok(empty()),
            Err(other) => Err(map_backend(other)),
        }
    }
}

impl Engine for OrderedEngine {
    fn name(&self) -> &'static str {
        "ordered"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::NAMED_COLLECTIONS.with(Capabilities::PERSISTENCE)
    }

    fn write(
        &self,
        txn: Option<&mut dyn EngineTransaction>,
        places: &PlacesArg<'_>,
        contents: &ContentsArg<'_>,
        options: Options,
    ) -> Result<()> {
        self.poison.check()?;
        validate_write(places, contents, options)?;
        self.reject_txn(txn)?;
        if places.count == 0 {
            return Ok(());
        }
        self.poison.guard(self.write_inner(places, contents, options))
    }

    fn read<'a>(
        &self,
        txn: Option<&mut dyn EngineTransaction>,
        places: &PlacesArg<'_>,
        options: Options,
        arena: &'a mut Arena,
    ) -> Result<ReadView<'a>> {
        self.poison.check()?;
        validate_read(places, options)?;
        self.reject_txn(txn)?;
        let plan = self.plan_places(places)?;
        arena.begin(options);

        let mut out = arena.build_read();
        for (place, table) in plan {
            let found = self.with_table(
                &table,
                || None,
                |table| {
                    Ok(table
                        .get(place.key.get())
                        .map_err(map_backend)?
                        .map(|guard| guard.value().to_vec()))
                },
            );
            match self.poison.guard(found)? {
                Some(bytes) => out.push_value(&bytes),
                None => out.push_missing(),
            }
        }
        Ok(out.finish())
    }

    fn scan<'a>(
        &self,
        txn: Option<&mut dyn EngineTransaction>,
        scans: &ScansArg<'_>,
        options: Options,
        arena: &'a mut Arena,
    ) -> Result<ScanView<'a>> {
        self.poison.check()?;
        validate_scan(scans, options)?;
        self.reject_txn(txn)?;

        let mut plan = Vec::with_capacity(scans.count);
        for i in 0..scans.count {
            let scan = scans
                .get(i)
                .ok_or(StoreError::args("limit column shorter than batch count"))?;
            let table = table_name(&self.registry, scan.collection)?;
            plan.push((scan, table));
        }
        arena.begin(options);

        let mut out = arena.build_scan();
        for (scan, table) in plan {
            let keys = self.with_table(
                &table,
                Vec::new,
                |table| {
                    let mut keys = Vec::with_capacity(scan.limit as usize);
                    for entry in table.range(scan.min_key.get()..).map_err(map_backend)? {
                        if keys.len() >= scan.limit as usize {
                            break;
                        }
                        let (key, _) = entry.map_err(map_backend)?;
                        keys.push(Key::new(key.value()));
                    }
                    Ok(keys)
                },
            );
            out.push_request(self.poison.guard(keys)?);
        }
        Ok(out.finish())
    }

    fn sample<'a>(
        &self,
        collection: CollectionId,
        limit: u32,
        options: Options,
        arena: &'a mut Arena,
    ) -> Result<SampleView<'a>> {
        use rand::Rng;

        self.poison.check()?;
        validate_sample(options)?;
        let table = table_name(&self.registry, collection)?;
        arena.begin(options);

        let picked = self.with_table(
            &table,
            Vec::new,
            |table| {
                let limit = limit as usize;
                let mut rng = rand::thread_rng();
                let mut picked: Vec<Key> = Vec::new();
                for (i, entry) in table.range(i64::MIN..).map_err(map_backend)?.enumerate() {
                    let (key, _) = entry.map_err(map_backend)?;
                    let key = Key::new(key.value());
                    if picked.len() < limit {
                        picked.push(key);
                    } else {
                        let j = rng.gen_range(0..=i);
                        if j < limit {
                            picked[j] = key;
                        }
                    }
                }
                picked.sort_unstable();
                Ok(picked)
            },
        );
        let mut out = arena.build_scan();
        out.push_request(self.poison.guard(picked)?);
        Ok(out.finish())
    }

    fn measure<'a>(
        &self,
        txn: Option<&mut dyn EngineTransaction>,
        places: &PlacesArg<'_>,
        options: Options,
        arena: &'a mut Arena,
    ) -> Result<MeasureView<'a>> {
        self.poison.check()?;
        validate_read(places, options)?;
        self.reject_txn(txn)?;
        let plan = self.plan_places(places)?;
        arena.begin(options);

        let mut out = arena.build_measure();
        for (place, table) in plan {
            let size = self.with_table(
                &table,
                || ValueLen::MISSING,
                |table| {
                    Ok(table
                        .get(place.key.get())
                        .map_err(map_backend)?
                        .map_or(ValueLen::MISSING, |guard| {
                            ValueLen::new(guard.value().len() as u32)
                        }))
                },
            );
            out.push(self.poison.guard(size)?);
        }
        Ok(out.finish())
    }

    fn collection_open(&self, name: &str) -> Result<CollectionId> {
        self.poison.check()?;
        let id = self.registry.open(name)?;
        // Create the backing table eagerly so reopen can rediscover it.
        let table = format!("{TABLE_PREFIX}{name}");
        let result = (|| {
            let txn = self.db.begin_write().map_err(map_backend)?;
            {
                let def: TableDefinition<'_, i64, &[u8]> = TableDefinition::new(&table);
                txn.open_table(def).map_err(map_backend)?;
            }
            txn.commit().map_err(map_backend)
        })();
        self.poison.guard(result)?;
        Ok(id)
    }

    fn collection_drop(&self, collection: CollectionId) -> Result<()> {
        self.poison.check()?;
        let name = self.registry.drop_collection(collection)?;
        let table = format!("{TABLE_PREFIX}{name}");
        let result = (|| {
            let txn = self.db.begin_write().map_err(map_backend)?;
            let def: TableDefinition<'_, i64, &[u8]> = TableDefinition::new(&table);
            txn.delete_table(def).map_err(map_backend)?;
            txn.commit().map_err(map_backend)
        })();
        self.poison.guard(result)
    }

    fn collection_list(&self) -> Result<Vec<(CollectionId, String)>> {
        self.poison.check()?;
        Ok(self.registry.list())
    }

    fn clear(&self, collection: Option<CollectionId>) -> Result<()> {
        self.poison.check()?;
        let targets: Vec<String> = match collection {
            Some(id) => vec![table_name(&self.registry, id)?],
            None => {
                let mut names = vec![MAIN_TABLE.to_owned()];
                for (id, _) in self.registry.list() {
                    names.push(table_name(&self.registry, id)?);
                }
                names
            }
        };
        let result = (|| {
            let txn = self.db.begin_write().map_err(map_backend)?;
            for name in &targets {
                let def: TableDefinition<'_, i64, &[u8]> = TableDefinition::new(name);
                match txn.delete_table(def) {
                    Ok(_) => {}
                    Err(TableError::TableDoesNotExist(_)) => {}
                    Err(other) => return Err(map_backend(other)),
                }
            }
            txn.commit().map_err(map_backend)
        })();
        self.poison.guard(result)
    }

    fn txn_begin(&self, _options: Options) -> Result<Box<dyn EngineTransaction>> {
        Err(StoreError::unsupported("ordered", "transactions"))
    }

    fn txn_commit(
        &self,
        _txn: &mut dyn EngineTransaction,
        _options: Options,
    ) -> Result<SequenceNumber> {
        Err(StoreError::unsupported("ordered", "transactions"))
    }

    fn txn_reset(&self, _txn: &mut dyn EngineTransaction) -> Result<()> {
        Err(StoreError::unsupported("ordered", "transactions"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use omnikv_error::ErrorKind;

    fn open_temp() -> (tempfile::TempDir, OrderedEngine) {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = OrderedEngine::open(&dir.path().join("store.redb")).expect("open");
        (dir, engine)
    }

    fn write_batch(engine: &OrderedEngine, collection: CollectionId, items: &[(i64, &[u8])]) {
        let keys: Vec<Key> = items.iter().map(|&(k, _)| Key::new(k)).collect();
        let values: Vec<Option<&[u8]>> = items.iter().map(|&(_, v)| Some(v)).collect();
        let places = PlacesArg::for_keys(&collection, &keys);
        let contents = ContentsArg::for_slices(&values);
        engine
            .write(None, &places, &contents, Options::NONE)
            .expect("write");
    }

    #[test]
    fn roundtrip_and_missing() {
        let (_dir, engine) = open_temp();
        write_batch(&engine, CollectionId::DEFAULT, &[(42, b"hey")]);

        let keys = [Key::new(42), Key::new(43)];
        let places = PlacesArg::for_keys(&CollectionId::DEFAULT, &keys);
        let mut arena = Arena::new();
        let view = engine
            .read(None, &places, Options::NONE, &mut arena)
            .expect("read");
        assert_eq!(view.value(0), Some(&b"hey"[..]));
        assert_eq!(view.value(1), None);
        assert!(view.lengths()[1].is_missing());
    }

    #[test]
    fn scan_is_numeric_order() {
        let (_dir, engine) = open_temp();
        // Negative keys order below positive ones numerically.
        write_batch(
            &engine,
            CollectionId::DEFAULT,
            &[(10, b"a"), (-5, b"b"), (3, b"c")],
        );

        let collection = CollectionId::DEFAULT;
        let min = Key::MIN;
        let limit = 10_u32;
        let scans = ScansArg::single(&collection, &min, &limit);
        let mut arena = Arena::new();
        let view = engine
            .scan(None, &scans, Options::NONE, &mut arena)
            .expect("scan");
        assert_eq!(
            view.keys_for(0),
            &[Key::new(-5), Key::new(3), Key::new(10)]
        );
    }

    #[test]
    fn transactions_answer_unimplemented() {
        let (_dir, engine) = open_temp();
        let err = engine.txn_begin(Options::NONE).expect_err("no transactions");
        assert_eq!(err.kind(), ErrorKind::Unimplemented);
    }

    #[test]
    fn collections_persist_across_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("store.redb");
        {
            let engine = OrderedEngine::open(&path).expect("open");
            let id = engine.collection_open("graph").expect("create");
            write_batch(&engine, id, &[(1, b"adj")]);
        }
        {
            let engine = OrderedEngine::open(&path).expect("reopen");
            let listed = engine.collection_list().expect("list");
            assert_eq!(listed.len(), 1);
            assert_eq!(listed[0].1, "graph");

            let id = engine.collection_open("graph").expect("reopen collection");
            let keys = [Key::new(1)];
            let places = PlacesArg::for_keys(&id, &keys);
            let mut arena = Arena::new();
            let view = engine
                .read(None, &places, Options::NONE, &mut arena)
                .expect("read");
            assert_eq!(view.value(0), Some(&b"adj"[..]));
        }
    }

    #[test]
    fn drop_is_recursive_over_keys() {
        let (_dir, engine) = open_temp();
        let id = engine.collection_open("doomed").expect("create");
        write_batch(&engine, id, &[(1, b"x"), (2, b"y")]);
        engine.collection_drop(id).expect("drop");

        let keys = [Key::new(1)];
        let places = PlacesArg::for_keys(&id, &keys);
        let mut arena = Arena::new();
        let err = engine
            .read(None, &places, Options::NONE, &mut arena)
            .expect_err("stale handle");
        assert_eq!(err.kind(), ErrorKind::MissingCollection);

        // Recreating the name starts empty.
        let reborn = engine.collection_open("doomed").expect("recreate");
        let places = PlacesArg::for_keys(&reborn, &keys);
        let mut arena = Arena::new();
        let view = engine
            .read(None, &places, Options::NONE, &mut arena)
            .expect("read");
        assert_eq!(view.value(0), None);
    }

    #[test]
    fn measure_and_sample() {
        let (_dir, engine) = open_temp();
        write_batch(&engine, CollectionId::DEFAULT, &[(1, b"abc"), (2, b"")]);

        let keys = [Key::new(1), Key::new(2), Key::new(9)];
        let places = PlacesArg::for_keys(&CollectionId::DEFAULT, &keys);
        let mut arena = Arena::new();
        let view = engine
            .measure(None, &places, Options::NONE, &mut arena)
            .expect("measure");
        assert_eq!(view.sizes()[0], ValueLen::new(3));
        assert_eq!(view.sizes()[1], ValueLen::ZERO);
        assert!(view.sizes()[2].is_missing());

        let mut arena = Arena::new();
        let view = engine
            .sample(CollectionId::DEFAULT, 1, Options::NONE, &mut arena)
            .expect("sample");
        assert_eq!(view.keys_for(0).len(), 1);
    }
}
