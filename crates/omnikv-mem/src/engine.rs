//! The in-memory engine.
//!
//! Shared state is a versioned store behind a reader-writer lock plus a
//! global commit lock that serialises sequence assignment. Non-transactional
//! batches take the commit lock too, so every write in the engine's life is
//! ordered by one monotonic clock.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use rand::Rng;

use omnikv_core::validate::{
    validate_read, validate_sample, validate_scan, validate_txn_begin, validate_txn_commit,
    validate_write,
};
use omnikv_core::{Capabilities, CollectionRegistry, Engine, EngineTransaction};
use omnikv_error::{Result, StoreError};
use omnikv_types::{
    Arena, CollectionId, ContentsArg, Key, MeasureView, Options, Place, PlacesArg, ReadView,
    SampleView, ScanView, ScansArg, SequenceNumber, Snapshot, ValueLen,
};

use crate::store::StoreData;
use crate::txn::{MemTransaction, SnapshotTracker, TxnState};

/// In-memory transactional engine.
pub struct MemEngine {
    data: RwLock<StoreData>,
    registry: CollectionRegistry,
    /// Serialises sequence assignment and application across transactional
    /// and plain batches.
    commit_lock: Mutex<()>,
    /// Highest sequence issued so far.
    last_seq: AtomicU64,
    tracker: Arc<SnapshotTracker>,
}

impl MemEngine {
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: RwLock::new(StoreData::new()),
            registry: CollectionRegistry::new(),
            commit_lock: Mutex::new(()),
            last_seq: AtomicU64::new(0),
            tracker: Arc::new(SnapshotTracker::new()),
        }
    }

    /// Highest sequence number issued so far.
    #[must_use]
    pub fn last_sequence(&self) -> SequenceNumber {
        SequenceNumber::new(self.last_seq.load(Ordering::Acquire))
    }

    fn current_snapshot(&self) -> Snapshot {
        Snapshot::new(self.last_sequence())
    }

    fn downcast<'t>(
        &self,
        txn: &'t mut dyn EngineTransaction,
    ) -> Result<&'t mut MemTransaction> {
        txn.as_any_mut()
            .downcast_mut::<MemTransaction>()
            .ok_or(StoreError::ForeignTransaction)
    }

    fn ensure_active(txn: &MemTransaction) -> Result<()> {
        match txn.state {
            TxnState::Active => Ok(()),
            TxnState::Committed => Err(StoreError::args(
                "transaction already committed; reset before reuse",
            )),
            TxnState::Poisoned => Err(StoreError::TxnPoisoned),
        }
    }

    /// Resolve the whole batch up front so a failure leaves no side effects.
    fn plan_places<'p>(&self, places: &PlacesArg<'p>) -> Result<Vec<Place<'p>>> {
        let mut plan = Vec::with_capacity(places.count);
        for i in 0..places.count {
            let place = places
                .get(i)
                .ok_or(StoreError::args("key column shorter than batch count"))?;
            self.registry.check_live(place.collection)?;
            plan.push(place);
        }
        Ok(plan)
    }
}

impl Default for MemEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for MemEngine {
    fn name(&self) -> &'static str {
        "mem"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::TRANSACTIONS.with(Capabilities::NAMED_COLLECTIONS)
    }

    fn write(
        &self,
        txn: Option<&mut dyn EngineTransaction>,
        places: &PlacesArg<'_>,
        contents: &ContentsArg<'_>,
        options: Options,
    ) -> Result<()> {
        validate_write(places, contents, options)?;
        if places.count == 0 {
            return Ok(());
        }

        let plan = self.plan_places(places)?;
        let mut payloads = Vec::with_capacity(plan.len());
        for i in 0..plan.len() {
            let payload = contents.get(i);
            if let Some(bytes) = payload {
                if bytes.len() as u64 > u64::from(ValueLen::MAX_PAYLOAD) {
                    return Err(StoreError::args("value exceeds the representable length"));
                }
            }
            payloads.push(payload.map(<[u8]>::to_vec));
        }

        if let Some(handle) = txn {
            let txn = self.downcast(handle)?;
            Self::ensure_active(txn)?;
            for (place, payload) in plan.into_iter().zip(payloads) {
                txn.write_set
                    .insert((place.collection, place.key), payload);
            }
            return Ok(());
        }

        // Plain batch: one sequence for the whole call, applied atomically.
        let _commit = self.commit_lock.lock();
        let prev = self.last_sequence();
        let seq = prev.next();
        let horizon = self.tracker.horizon(prev);
        {
            let mut data = self.data.write();
            for (place, payload) in plan.into_iter().zip(payloads) {
                data.apply(place.collection, place.key, payload, seq, horizon);
            }
            self.last_seq.store(seq.get(), Ordering::Release);
        }
        tracing::trace!(seq = %seq, count = places.count, "plain batch applied");
        Ok(())
    }

    fn read<'a>(
        &self,
        txn: Option<&mut dyn EngineTransaction>,
        places: &PlacesArg<'_>,
        options: Options,
        arena: &'a mut Arena,
    ) -> Result<ReadView<'a>> {
        validate_read(places, options)?;
        let plan = self.plan_places(places)?;
        arena.begin(options);

        match txn {
            Some(handle) => {
                let txn = self.downcast(handle)?;
                Self::ensure_active(txn)?;
                let snapshot = txn.snapshot;
                let watch = txn.watch && !options.contains(Options::TRANSACTION_DONT_WATCH);
                let data = self.data.read();
                let mut out = arena.build_read();
                for place in plan {
                    // Read-your-writes: the buffer masks the snapshot.
                    let buffered = txn
                        .buffered(place.collection, place.key)
                        .map(|value| value.map(<[u8]>::to_vec));
                    match buffered {
                        Some(Some(bytes)) => out.push_value(&bytes),
                        Some(None) => out.push_missing(),
                        None => {
                            match data.get(place.collection, place.key, snapshot) {
                                Some(bytes) => out.push_value(bytes),
                                None => out.push_missing(),
                            }
                            if watch {
                                txn.watch_key(place.collection, place.key);
                            }
                        }
                    }
                }
                Ok(out.finish())
            }
            None => {
                let snapshot = self.current_snapshot();
                let data = self.data.read();
                let mut out = arena.build_read();
                for place in plan {
                    match data.get(place.collection, place.key, snapshot) {
                        Some(bytes) => out.push_value(bytes),
                        None => out.push_missing(),
                    }
                }
                Ok(out.finish())
            }
        }
    }

    fn scan<'a>(
        &self,
        txn: Option<&mut dyn EngineTransaction>,
        scans: &ScansArg<'_>,
        options: Options,
        arena: &'a mut Arena,
    ) -> Result<ScanView<'a>> {
        validate_scan(scans, options)?;
        let mut plan = Vec::with_capacity(scans.count);
        for i in 0..scans.count {
            let scan = scans
                .get(i)
                .ok_or(StoreError::args("limit column shorter than batch count"))?;
            self.registry.check_live(scan.collection)?;
            plan.push(scan);
        }
        arena.begin(options);

        let txn = match txn {
            Some(handle) => {
                let txn = self.downcast(handle)?;
                Self::ensure_active(txn)?;
                Some(&*txn)
            }
            None => None,
        };
        let snapshot = txn.map_or_else(|| self.current_snapshot(), |t| t.snapshot);

        let data = self.data.read();
        let mut out = arena.build_scan();
        for scan in plan {
            let limit = scan.limit as usize;
            let Some(txn) = txn else {
                out.push_request(data.range_keys(scan.collection, scan.min_key, limit, snapshot));
                continue;
            };

            // Overlay the transaction's buffer: buffered deletes mask
            // committed keys, buffered inserts surface alongside them.
            let buffered = txn.buffered_range(scan.collection, scan.min_key);
            let masked = buffered.values().filter(|present| !**present).count();
            let committed =
                data.range_keys(scan.collection, scan.min_key, limit + masked, snapshot);

            let mut merged = Vec::with_capacity(limit);
            let mut inserts = buffered
                .iter()
                .filter(|(_, present)| **present)
                .map(|(&key, _)| key)
                .peekable();
            for key in committed {
                while let Some(&pending) = inserts.peek() {
                    if pending < key {
                        merged.push(pending);
                        inserts.next();
                    } else {
                        break;
                    }
                }
                match buffered.get(&key).copied() {
                    Some(false) => {}         // buffered delete
                    Some(true) => {
                        // Buffered overwrite of a committed key: emit once.
                        if inserts.peek() == Some(&key) {
                            inserts.next();
                        }
                        merged.push(key);
                    }
                    None => merged.push(key),
                }
                if merged.len() >= limit {
                    break;
                }
            }
            while merged.len() < limit {
                let Some(pending) = inserts.next() else { break };
                merged.push(pending);
            }
            merged.truncate(limit);
            out.push_request(merged);
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
        validate_sample(options)?;
        self.registry.check_live(collection)?;
        arena.begin(options);

        let snapshot = self.current_snapshot();
        let all = {
            let data = self.data.read();
            data.range_keys(collection, Key::MIN, usize::MAX, snapshot)
        };

        // Reservoir sampling without replacement.
        let limit = limit as usize;
        let mut rng = rand::thread_rng();
        let mut picked: Vec<Key> = Vec::with_capacity(limit.min(all.len()));
        for (i, key) in all.into_iter().enumerate() {
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

        let mut out = arena.build_scan();
        out.push_request(picked);
        Ok(out.finish())
    }

    fn measure<'a>(
        &self,
        txn: Option<&mut dyn EngineTransaction>,
        places: &PlacesArg<'_>,
        options: Options,
        arena: &'a mut Arena,
    ) -> Result<MeasureView<'a>> {
        validate_read(places, options)?;
        let plan = self.plan_places(places)?;
        arena.begin(options);

        let txn = match txn {
            Some(handle) => {
                let txn = self.downcast(handle)?;
                Self::ensure_active(txn)?;
                Some(&*txn)
            }
            None => None,
        };
        let snapshot = txn.map_or_else(|| self.current_snapshot(), |t| t.snapshot);

        let data = self.data.read();
        let mut out = arena.build_measure();
        for place in plan {
            let stored = match txn.and_then(|t| t.buffered(place.collection, place.key)) {
                Some(buffered) => buffered,
                None => data.get(place.collection, place.key, snapshot),
            };
            out.push(stored.map_or(ValueLen::MISSING, |bytes| ValueLen::new(bytes.len() as u32)));
        }
        Ok(out.finish())
    }

    fn collection_open(&self, name: &str) -> Result<CollectionId> {
        let id = self.registry.open(name)?;
        self.data.write().add_collection(id);
        Ok(id)
    }

    fn collection_drop(&self, collection: CollectionId) -> Result<()> {
        let name = self.registry.drop_collection(collection)?;
        self.data.write().remove_collection(collection);
        tracing::debug!(collection = %collection, name = %name, "collection dropped");
        Ok(())
    }

    fn collection_list(&self) -> Result<Vec<(CollectionId, String)>> {
        Ok(self.registry.list())
    }

    fn clear(&self, collection: Option<CollectionId>) -> Result<()> {
        if let Some(id) = collection {
            self.registry.check_live(id)?;
        }
        let _commit = self.commit_lock.lock();
        self.data.write().clear(collection);
        Ok(())
    }

    fn txn_begin(&self, options: Options) -> Result<Box<dyn EngineTransaction>> {
        validate_txn_begin(options)?;
        let snapshot = self.current_snapshot();
        let watch = !options.contains(Options::TRANSACTION_DONT_WATCH);
        tracing::debug!(snapshot = %snapshot.high, watch, "transaction begun");
        Ok(Box::new(MemTransaction::begin(
            snapshot,
            watch,
            Arc::clone(&self.tracker),
        )))
    }

    fn txn_commit(
        &self,
        txn: &mut dyn EngineTransaction,
        options: Options,
    ) -> Result<SequenceNumber> {
        validate_txn_commit(options)?;
        let txn = self.downcast(txn)?;
        Self::ensure_active(txn)?;

        let _commit = self.commit_lock.lock();

        // First committer wins: any commit past our snapshot that touched a
        // watched key aborts this transaction.
        {
            let data = self.data.read();
            for &(collection, key) in &txn.read_set {
                let newest = data.newest_seq_of(collection, key);
                if newest > txn.snapshot.high {
                    txn.state = TxnState::Poisoned;
                    tracing::debug!(
                        collection = %collection,
                        key = %key,
                        newest = %newest,
                        snapshot = %txn.snapshot.high,
                        "commit conflict"
                    );
                    return Err(StoreError::Conflict {
                        collection: collection.get(),
                        key: key.get(),
                        snapshot: txn.snapshot.high.get(),
                    });
                }
            }
        }

        let prev = self.last_sequence();
        let seq = prev.next();
        let horizon = self.tracker.horizon(prev);
        {
            let mut data = self.data.write();
            for ((collection, key), payload) in txn.write_set.drain() {
                data.apply(collection, key, payload, seq, horizon);
            }
            self.last_seq.store(seq.get(), Ordering::Release);
        }
        txn.state = TxnState::Committed;
        txn.sequence = Some(seq);
        tracing::debug!(seq = %seq, "transaction committed");
        Ok(seq)
    }

    fn txn_reset(&self, txn: &mut dyn EngineTransaction) -> Result<()> {
        let txn = self.downcast(txn)?;
        txn.reset_to(self.current_snapshot());
        Ok(())
    }
}
