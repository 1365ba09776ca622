//! Transaction handles and snapshot tracking.
//!
//! A handle buffers writes, records the keys it read, and carries the
//! snapshot it was begun against. Handles are reusable: `reset` discards
//! both sets and advances the generation counter so the identity
//! (engine, generation, sequence) never repeats. The snapshot tracker
//! counts which snapshots are still held by live handles; its minimum is
//! the version-pruning horizon.

use std::any::Any;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;

use omnikv_core::EngineTransaction;
use omnikv_types::{CollectionId, Key, SequenceNumber, Snapshot, TxnGeneration};

/// Counts live snapshots so the store knows how far back versions must be
/// kept.
#[derive(Debug, Default)]
pub struct SnapshotTracker {
    active: Mutex<BTreeMap<u64, usize>>,
}

impl SnapshotTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, snapshot: Snapshot) {
        *self.active.lock().entry(snapshot.high.get()).or_insert(0) += 1;
    }

    pub fn unregister(&self, snapshot: Snapshot) {
        let mut active = self.active.lock();
        if let Some(count) = active.get_mut(&snapshot.high.get()) {
            *count -= 1;
            if *count == 0 {
                active.remove(&snapshot.high.get());
            }
        }
    }

    /// The oldest snapshot still held, or `current` when none are live.
    #[must_use]
    pub fn horizon(&self, current: SequenceNumber) -> SequenceNumber {
        self.active
            .lock()
            .keys()
            .next()
            .map_or(current, |&low| SequenceNumber::new(low.min(current.get())))
    }
}

/// Lifecycle state of a transaction handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    /// Accepting reads and buffered writes.
    Active,
    /// Commit succeeded; reset before reuse.
    Committed,
    /// Commit failed with a conflict; reset before reuse.
    Poisoned,
}

/// A reusable transaction handle of the in-memory engine.
#[derive(Debug)]
pub struct MemTransaction {
    pub(crate) snapshot: Snapshot,
    pub(crate) generation: TxnGeneration,
    pub(crate) sequence: Option<SequenceNumber>,
    pub(crate) state: TxnState,
    /// Whether reads are recorded into the read-set by default. Begun with
    /// the dont-watch option, the handle becomes a weak snapshot batch.
    pub(crate) watch: bool,
    pub(crate) read_set: HashSet<(CollectionId, Key)>,
    pub(crate) write_set: HashMap<(CollectionId, Key), Option<Vec<u8>>>,
    tracker: Arc<SnapshotTracker>,
}

impl MemTransaction {
    pub(crate) fn begin(snapshot: Snapshot, watch: bool, tracker: Arc<SnapshotTracker>) -> Self {
        tracker.register(snapshot);
        Self {
            snapshot,
            generation: TxnGeneration::FIRST,
            sequence: None,
            state: TxnState::Active,
            watch,
            read_set: HashSet::new(),
            write_set: HashMap::new(),
            tracker,
        }
    }

    /// Buffered write for `key`, if any. `Some(None)` is a buffered delete.
    #[must_use]
    pub(crate) fn buffered(&self, collection: CollectionId, key: Key) -> Option<Option<&[u8]>> {
        self.write_set
            .get(&(collection, key))
            .map(|value| value.as_deref())
    }

    pub(crate) fn watch_key(&mut self, collection: CollectionId, key: Key) {
        self.read_set.insert((collection, key));
    }

    /// Discard buffered state, advance the generation, and move to a fresh
    /// snapshot.
    pub(crate) fn reset_to(&mut self, snapshot: Snapshot) {
        self.tracker.unregister(self.snapshot);
        self.tracker.register(snapshot);
        self.snapshot = snapshot;
        self.generation = self.generation.next();
        self.sequence = None;
        self.state = TxnState::Active;
        self.read_set.clear();
        self.write_set.clear();
    }

    /// Buffered keys of `collection` at or above `min_key`, in key order,
    /// with their presence after the buffer is applied.
    #[must_use]
    pub(crate) fn buffered_range(
        &self,
        collection: CollectionId,
        min_key: Key,
    ) -> BTreeMap<Key, bool> {
        self.write_set
            .iter()
            .filter(|(&(col, key), _)| col == collection && key >= min_key)
            .map(|(&(_, key), value)| (key, value.is_some()))
            .collect()
    }
}

impl EngineTransaction for MemTransaction {
    fn generation(&self) -> TxnGeneration {
        self.generation
    }

    fn sequence(&self) -> Option<SequenceNumber> {
        self.sequence
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl Drop for MemTransaction {
    fn drop(&mut self) {
        self.tracker.unregister(self.snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(n: u64) -> Snapshot {
        Snapshot::new(SequenceNumber::new(n))
    }

    #[test]
    fn tracker_horizon_is_lowest_live_snapshot() {
        let tracker = SnapshotTracker::new();
        let current = SequenceNumber::new(10);
        assert_eq!(tracker.horizon(current), current);

        tracker.register(snap(3));
        tracker.register(snap(7));
        assert_eq!(tracker.horizon(current), SequenceNumber::new(3));

        tracker.unregister(snap(3));
        assert_eq!(tracker.horizon(current), SequenceNumber::new(7));

        tracker.unregister(snap(7));
        assert_eq!(tracker.horizon(current), current);
    }

    #[test]
    fn duplicate_snapshots_are_refcounted() {
        let tracker = SnapshotTracker::new();
        tracker.register(snap(5));
        tracker.register(snap(5));
        tracker.unregister(snap(5));
        assert_eq!(
            tracker.horizon(SequenceNumber::new(9)),
            SequenceNumber::new(5)
        );
        tracker.unregister(snap(5));
        assert_eq!(
            tracker.horizon(SequenceNumber::new(9)),
            SequenceNumber::new(9)
        );
    }

    #[test]
    fn reset_advances_generation_and_clears_state() {
        let tracker = Arc::new(SnapshotTracker::new());
        let mut txn = MemTransaction::begin(snap(1), true, Arc::clone(&tracker));
        txn.watch_key(CollectionId::DEFAULT, Key::new(1));
        txn.write_set
            .insert((CollectionId::DEFAULT, Key::new(2)), Some(vec![1]));
        txn.state = TxnState::Poisoned;

        let before = txn.generation;
        txn.reset_to(snap(4));
        assert_eq!(txn.generation, before.next());
        assert_eq!(txn.state, TxnState::Active);
        assert!(txn.read_set.is_empty());
        assert!(txn.write_set.is_empty());
        assert_eq!(txn.snapshot, snap(4));
        assert_eq!(txn.sequence, None);
    }

    #[test]
    fn dropping_a_handle_releases_its_snapshot() {
        let tracker = Arc::new(SnapshotTracker::new());
        {
            let _txn = MemTransaction::begin(snap(2), true, Arc::clone(&tracker));
            assert_eq!(
                tracker.horizon(SequenceNumber::new(8)),
                SequenceNumber::new(2)
            );
        }
        assert_eq!(
            tracker.horizon(SequenceNumber::new(8)),
            SequenceNumber::new(8)
        );
    }

    #[test]
    fn buffered_range_reports_presence() {
        let tracker = Arc::new(SnapshotTracker::new());
        let mut txn = MemTransaction::begin(snap(0), true, tracker);
        txn.write_set
            .insert((CollectionId::DEFAULT, Key::new(5)), Some(vec![1]));
        txn.write_set
            .insert((CollectionId::DEFAULT, Key::new(7)), None);
        txn.write_set
            .insert((CollectionId::new(9), Key::new(6)), Some(vec![2]));

        let range = txn.buffered_range(CollectionId::DEFAULT, Key::new(6));
        assert_eq!(range.len(), 1);
        assert_eq!(range.get(&Key::new(7)), Some(&false));
    }
}
