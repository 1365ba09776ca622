//! Versioned in-memory key store.
//!
//! Each key holds a short chain of versions, newest first, every version
//! stamped with the sequence of the commit that produced it. Deletes are
//! tombstone versions so a later snapshot can still prove "this key changed
//! after you began". Chains are pruned against the lowest snapshot any live
//! transaction still holds.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::ops::Bound;

use smallvec::SmallVec;

use omnikv_types::{CollectionId, Key, SequenceNumber, Snapshot};

/// One committed version of a value. `None` is a tombstone.
#[derive(Debug, Clone)]
pub struct Version {
    pub seq: SequenceNumber,
    pub value: Option<Vec<u8>>,
}

/// Versions of one key, newest first. Two inline slots cover the common
/// case of one live version plus one being superseded.
pub type VersionChain = SmallVec<[Version; 2]>;

/// Resolve the value visible at `snapshot`, if the chain has one.
///
/// Returns `None` when no version is old enough; `Some(None)` when the
/// visible version is a tombstone.
#[must_use]
pub fn visible<'a>(chain: &'a VersionChain, snapshot: Snapshot) -> Option<Option<&'a [u8]>> {
    chain
        .iter()
        .find(|v| snapshot.sees(v.seq))
        .map(|v| v.value.as_deref())
}

/// Sequence stamp of the newest version in the chain.
#[must_use]
pub fn newest_seq(chain: &VersionChain) -> SequenceNumber {
    chain.first().map_or(SequenceNumber::ZERO, |v| v.seq)
}

/// All collections' data. The outer map is keyed by collection id; every
/// live collection (including the default) has an entry.
#[derive(Debug, Default)]
pub struct StoreData {
    collections: HashMap<CollectionId, BTreeMap<Key, VersionChain>>,
}

impl StoreData {
    #[must_use]
    pub fn new() -> Self {
        let mut data = Self::default();
        data.collections.insert(CollectionId::DEFAULT, BTreeMap::new());
        data
    }

    pub fn add_collection(&mut self, id: CollectionId) {
        self.collections.entry(id).or_default();
    }

    pub fn remove_collection(&mut self, id: CollectionId) {
        self.collections.remove(&id);
    }

    #[must_use]
    pub fn collection(&self, id: CollectionId) -> Option<&BTreeMap<Key, VersionChain>> {
        self.collections.get(&id)
    }

    /// Look up the value of `key` visible at `snapshot`.
    #[must_use]
    pub fn get(&self, id: CollectionId, key: Key, snapshot: Snapshot) -> Option<&[u8]> {
        let chain = self.collections.get(&id)?.get(&key)?;
        visible(chain, snapshot).flatten()
    }

    /// Sequence of the newest committed version of `key`, or zero when the
    /// key has never been written.
    #[must_use]
    pub fn newest_seq_of(&self, id: CollectionId, key: Key) -> SequenceNumber {
        self.collections
            .get(&id)
            .and_then(|map| map.get(&key))
            .map_or(SequenceNumber::ZERO, newest_seq)
    }

    /// Apply one committed write, pruning versions no live snapshot needs.
    ///
    /// Every version at or above `horizon` is kept, plus the newest one
    /// below it (the version a reader at the horizon still resolves to).
    pub fn apply(
        &mut self,
        id: CollectionId,
        key: Key,
        value: Option<Vec<u8>>,
        seq: SequenceNumber,
        horizon: SequenceNumber,
    ) {
        let chain = self
            .collections
            .entry(id)
            .or_default()
            .entry(key)
            .or_default();
        chain.insert(0, Version { seq, value });
        prune(chain, horizon);
    }

    /// Visible keys in `[min_key, ..)`, ascending, tombstones skipped,
    /// capped at `limit`.
    pub fn range_keys(
        &self,
        id: CollectionId,
        min_key: Key,
        limit: usize,
        snapshot: Snapshot,
    ) -> Vec<Key> {
        let Some(map) = self.collections.get(&id) else {
            return Vec::new();
        };
        map.range((Bound::Included(min_key), Bound::Unbounded))
            .filter(|(_, chain)| matches!(visible(chain, snapshot), Some(Some(_))))
            .take(limit)
            .map(|(&key, _)| key)
            .collect()
    }

    /// Count of keys visible at `snapshot`.
    #[must_use]
    pub fn visible_len(&self, id: CollectionId, snapshot: Snapshot) -> usize {
        self.collections.get(&id).map_or(0, |map| {
            map.values()
                .filter(|chain| matches!(visible(chain, snapshot), Some(Some(_))))
                .count()
        })
    }

    /// Physically erase every key of one collection, or of all of them.
    pub fn clear(&mut self, id: Option<CollectionId>) {
        match id {
            Some(id) => {
                if let Some(map) = self.collections.get_mut(&id) {
                    map.clear();
                }
            }
            None => {
                for map in self.collections.values_mut() {
                    map.clear();
                }
            }
        }
    }
}

/// Drop chain versions below `horizon`, keeping the newest one at or below
/// it so readers exactly at the horizon still resolve.
fn prune(chain: &mut VersionChain, horizon: SequenceNumber) {
    let Some(keep_until) = chain.iter().position(|v| v.seq.get() <= horizon.get()) else {
        return;
    };
    chain.truncate(keep_until + 1);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(n: u64) -> SequenceNumber {
        SequenceNumber::new(n)
    }

    fn snap(n: u64) -> Snapshot {
        Snapshot::new(seq(n))
    }

    #[test]
    fn visibility_walks_the_chain() {
        let mut chain = VersionChain::new();
        chain.insert(
            0,
            Version {
                seq: seq(1),
                value: Some(b"old".to_vec()),
            },
        );
        chain.insert(
            0,
            Version {
                seq: seq(3),
                value: Some(b"new".to_vec()),
            },
        );

        assert_eq!(visible(&chain, snap(0)), None);
        assert_eq!(visible(&chain, snap(1)), Some(Some(&b"old"[..])));
        assert_eq!(visible(&chain, snap(2)), Some(Some(&b"old"[..])));
        assert_eq!(visible(&chain, snap(3)), Some(Some(&b"new"[..])));
        assert_eq!(newest_seq(&chain), seq(3));
    }

    #[test]
    fn tombstones_stay_visible_for_conflict_detection() {
        let mut data = StoreData::new();
        data.apply(CollectionId::DEFAULT, Key::new(1), Some(b"v".to_vec()), seq(1), seq(0));
        data.apply(CollectionId::DEFAULT, Key::new(1), None, seq(2), seq(0));

        assert_eq!(data.get(CollectionId::DEFAULT, Key::new(1), snap(1)), Some(&b"v"[..]));
        assert_eq!(data.get(CollectionId::DEFAULT, Key::new(1), snap(2)), None);
        assert_eq!(data.newest_seq_of(CollectionId::DEFAULT, Key::new(1)), seq(2));
    }

    #[test]
    fn pruning_respects_the_horizon() {
        let mut data = StoreData::new();
        let key = Key::new(9);
        for n in 1..=4_u64 {
            data.apply(
                CollectionId::DEFAULT,
                key,
                Some(vec![n as u8]),
                seq(n),
                seq(3),
            );
        }
        let chain = data
            .collection(CollectionId::DEFAULT)
            .and_then(|map| map.get(&key))
            .expect("chain exists");
        // Version 4 (above horizon) and version 3 (newest at horizon) stay;
        // 1 and 2 are unreachable by any live snapshot.
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].seq, seq(4));
        assert_eq!(chain[1].seq, seq(3));
    }

    #[test]
    fn range_skips_tombstones_and_honours_limit() {
        let mut data = StoreData::new();
        for n in 1..=5_i64 {
            data.apply(
                CollectionId::DEFAULT,
                Key::new(n),
                Some(vec![1]),
                seq(1),
                seq(0),
            );
        }
        data.apply(CollectionId::DEFAULT, Key::new(3), None, seq(2), seq(0));

        let keys = data.range_keys(CollectionId::DEFAULT, Key::MIN, 10, snap(2));
        assert_eq!(
            keys,
            vec![Key::new(1), Key::new(2), Key::new(4), Key::new(5)]
        );

        let keys = data.range_keys(CollectionId::DEFAULT, Key::new(2), 2, snap(2));
        assert_eq!(keys, vec![Key::new(2), Key::new(4)]);

        // An older snapshot still sees key 3.
        let keys = data.range_keys(CollectionId::DEFAULT, Key::new(3), 1, snap(1));
        assert_eq!(keys, vec![Key::new(3)]);
    }
}
