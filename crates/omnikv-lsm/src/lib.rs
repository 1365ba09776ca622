//! Embedded log-structured merge engine backed by fjall.
//!
//! Collections map to keyspace partitions. fjall compares keys as raw
//! bytes, so keys are stored sign-flipped big-endian: the backend's
//! lexicographic order then equals numeric key order and scans need no
//! re-sorting. Batched writes go through one fjall batch and are atomic.
//! Store-level transactions are not supported by this backend.

use std::path::Path;

use fjall::{Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use parking_lot::RwLock;
use std::collections::HashMap;

use omnikv_core::validate::{validate_read, validate_sample, validate_scan, validate_write};
use omnikv_core::{Capabilities, CollectionRegistry, Engine, EngineTransaction, Poison};
use omnikv_error::{Result, StoreError};
use omnikv_types::{
    Arena, CollectionId, ContentsArg, Key, MeasureView, Options, Place, PlacesArg, ReadView,
    SampleView, ScanView, ScansArg, SequenceNumber, ValueLen,
};

/// Partition backing the unnamed default collection.
const MAIN_PARTITION: &str = "main";
/// Prefix for named-collection partitions.
const PARTITION_PREFIX: &str = "c_";

/// Order-preserving key encoding: flipping the sign bit makes the
/// big-endian byte order of an `i64` equal its numeric order.
#[must_use]
pub fn encode_key(key: Key) -> [u8; 8] {
    ((key.get() as u64) ^ (1 << 63)).to_be_bytes()
}

/// Inverse of [`encode_key`].
#[must_use]
pub fn decode_key(bytes: &[u8]) -> Key {
    let mut buf = [0_u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    Key::new((u64::from_be_bytes(buf) ^ (1 << 63)) as i64)
}

fn map_backend(error: &fjall::Error) -> StoreError {
    let rendered = error.to_string();
    if rendered.to_ascii_lowercase().contains("corrupt") {
        StoreError::corruption(rendered)
    } else {
        StoreError::backend(rendered)
    }
}

/// Embedded log-structured merge engine.
pub struct LsmEngine {
    keyspace: Keyspace,
    registry: CollectionRegistry,
    partitions: RwLock<HashMap<CollectionId, PartitionHandle>>,
    poison: Poison,
}

impl LsmEngine {
    /// Open (or create) the keyspace at `path`. Idempotent for the same
    /// directory.
    ///
    /// # Errors
    ///
    /// `io`/`corruption` when the backing directory cannot be used.
    pub fn open(path: &Path) -> Result<Self> {
        let keyspace = fjall::Config::new(path)
            .open()
            .map_err(|e| map_backend(&e))?;
        let registry = CollectionRegistry::new();
        let mut partitions = HashMap::new();

        let main = keyspace
            .open_partition(MAIN_PARTITION, PartitionCreateOptions::default())
            .map_err(|e| map_backend(&e))?;
        partitions.insert(CollectionId::DEFAULT, main);

        // Named collections persist as their partitions; rebuild the registry.
        for name in keyspace.list_partitions() {
            if let Some(stripped) = name.strip_prefix(PARTITION_PREFIX) {
                let id = registry.open(stripped)?;
                let handle = keyspace
                    .open_partition(&name, PartitionCreateOptions::default())
                    .map_err(|e| map_backend(&e))?;
                partitions.insert(id, handle);
            }
        }

        tracing::info!(path = %path.display(), "lsm engine opened");
        Ok(Self {
            keyspace,
            registry,
            partitions: RwLock::new(partitions),
            poison: Poison::new(),
        })
    }

    fn reject_txn(&self, txn: Option<&mut dyn EngineTransaction>) -> Result<()> {
        if txn.is_some() {
            return Err(StoreError::unsupported("lsm", "transactions"));
        }
        Ok(())
    }

    fn partition(&self, collection: CollectionId) -> Result<PartitionHandle> {
        self.registry.check_live(collection)?;
        self.partitions
            .read()
            .get(&collection)
            .cloned()
            .ok_or(StoreError::StaleCollection {
                id: collection.get(),
            })
    }

    fn plan_places<'p>(
        &self,
        places: &PlacesArg<'p>,
    ) -> Result<Vec<(Place<'p>, PartitionHandle)>> {
        let mut plan = Vec::with_capacity(places.count);
        for i in 0..places.count {
            let place = places
                .get(i)
                .ok_or(StoreError::args("key column shorter than batch count"))?;
            let partition = self.partition(place.collection)?;
            plan.push((place, partition));
        }
        Ok(plan)
    }
}

impl Engine for LsmEngine {
    fn name(&self) -> &'static str {
        "lsm"
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
        let plan = self.plan_places(places)?;

        let result = (|| {
            let mut batch = self.keyspace.batch();
            for (i, (place, partition)) in plan.iter().enumerate() {
                match contents.get(i) {
                    Some(bytes) => {
                        if bytes.len() as u64 > u64::from(ValueLen::MAX_PAYLOAD) {
                            return Err(StoreError::args(
                                "value exceeds the representable length",
                            ));
                        }
                        batch.insert(partition, encode_key(place.key), bytes);
                    }
                    None => batch.remove(partition, encode_key(place.key)),
                }
            }
            batch.commit().map_err(|e| map_backend(&e))?;
            if options.contains(Options::WRITE_FLUSH) {
                self.keyspace
                    .persist(PersistMode::SyncAll)
                    .map_err(|e| map_backend(&e))?;
            }
            Ok(())
        })();
        self.poison.guard(result)
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
        for (place, partition) in plan {
            let found = partition
                .get(encode_key(place.key))
                .map_err(|e| map_backend(&e));
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
            let partition = self.partition(scan.collection)?;
            plan.push((scan, partition));
        }
        arena.begin(options);

        let mut out = arena.build_scan();
        for (scan, partition) in plan {
            let keys = (|| {
                let mut keys = Vec::with_capacity(scan.limit as usize);
                for entry in partition.range(encode_key(scan.min_key)..) {
                    if keys.len() >= scan.limit as usize {
                        break;
                    }
                    let (key, _) = entry.map_err(|e| map_backend(&e))?;
                    keys.push(decode_key(&key));
                }
                Ok(keys)
            })();
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
        let partition = self.partition(collection)?;
        arena.begin(options);

        let picked = (|| {
            let limit = limit as usize;
            let mut rng = rand::thread_rng();
            let mut picked: Vec<Key> = Vec::new();
            for (i, entry) in partition.keys().enumerate() {
                let key = entry.map_err(|e| map_backend(&e))?;
                let key = decode_key(&key);
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
        })();
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
        for (place, partition) in plan {
            let found = partition
                .get(encode_key(place.key))
                .map_err(|e| map_backend(&e));
            let size = self
                .poison
                .guard(found)?
                .map_or(ValueLen::MISSING, |bytes| ValueLen::new(bytes.len() as u32));
            out.push(size);
        }
        Ok(out.finish())
    }

    fn collection_open(&self, name: &str) -> Result<CollectionId> {
        self.poison.check()?;
        let id = self.registry.open(name)?;
        if self.partitions.read().contains_key(&id) {
            return Ok(id);
        }
        let handle = self
            .keyspace
            .open_partition(
                &format!("{PARTITION_PREFIX}{name}"),
                PartitionCreateOptions::default(),
            )
            .map_err(|e| map_backend(&e));
        let handle = self.poison.guard(handle)?;
        self.partitions.write().insert(id, handle);
        Ok(id)
    }

    fn collection_drop(&self, collection: CollectionId) -> Result<()> {
        self.poison.check()?;
        let _name = self.registry.drop_collection(collection)?;
        let Some(handle) = self.partitions.write().remove(&collection) else {
            return Ok(());
        };
        let result = self
            .keyspace
            .delete_partition(handle)
            .map_err(|e| map_backend(&e));
        self.poison.guard(result)
    }

    fn collection_list(&self) -> Result<Vec<(CollectionId, String)>> {
        self.poison.check()?;
        Ok(self.registry.list())
    }

    fn clear(&self, collection: Option<CollectionId>) -> Result<()> {
        self.poison.check()?;
        let targets: Vec<CollectionId> = match collection {
            Some(id) => {
                self.registry.check_live(id)?;
                vec![id]
            }
            None => self.registry.live_ids(),
        };

        // fjall has no partition truncate; drop and recreate each one.
        for id in targets {
            let name = if id.is_default() {
                MAIN_PARTITION.to_owned()
            } else {
                let Some(name) = self.registry.name_of(id) else {
                    continue;
                };
                format!("{PARTITION_PREFIX}{name}")
            };
            let result = (|| {
                let handle = {
                    let mut partitions = self.partitions.write();
                    partitions.remove(&id)
                };
                if let Some(handle) = handle {
                    self.keyspace
                        .delete_partition(handle)
                        .map_err(|e| map_backend(&e))?;
                }
                let reborn = self
                    .keyspace
                    .open_partition(&name, PartitionCreateOptions::default())
                    .map_err(|e| map_backend(&e))?;
                self.partitions.write().insert(id, reborn);
                Ok(())
            })();
            self.poison.guard(result)?;
        }
        Ok(())
    }

    fn txn_begin(&self, _options: Options) -> Result<Box<dyn EngineTransaction>> {
        Err(StoreError::unsupported("lsm", "transactions"))
    }

    fn txn_commit(
        &self,
        _txn: &mut dyn EngineTransaction,
        _options: Options,
    ) -> Result<SequenceNumber> {
        Err(StoreError::unsupported("lsm", "transactions"))
    }

    fn txn_reset(&self, _txn: &mut dyn EngineTransaction) -> Result<()> {
        Err(StoreError::unsupported("lsm", "transactions"))
    }
}
