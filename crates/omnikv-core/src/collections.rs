//! Collection bookkeeping shared by engines.
//!
//! Collections are flat named keyspaces. The registry assigns ids, keeps
//! the name/id maps consistent, and remembers dropped ids so stale handles
//! surface as usage errors instead of silently resolving to fresh
//! collections. Creation and drop serialise on the registry lock; reads
//! and writes in other collections never take it.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;

use omnikv_error::{Result, StoreError};
use omnikv_types::CollectionId;

use crate::validate::validate_collection_name;

#[derive(Debug, Default)]
struct RegistryInner {
    by_name: HashMap<String, CollectionId>,
    names: HashMap<CollectionId, String>,
    dropped: HashSet<CollectionId>,
    next_id: u64,
}

/// Name/id bookkeeping for one engine's collections.
#[derive(Debug)]
pub struct CollectionRegistry {
    inner: RwLock<RegistryInner>,
}

impl CollectionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner {
                next_id: 1,
                ..RegistryInner::default()
            }),
        }
    }

    /// Find or create the collection named `name`.
    ///
    /// # Errors
    ///
    /// `args_wrong` for the reserved empty name.
    pub fn open(&self, name: &str) -> Result<CollectionId> {
        validate_collection_name(name)?;
        let mut inner = self.inner.write();
        if let Some(&id) = inner.by_name.get(name) {
            return Ok(id);
        }
        let id = CollectionId::new(inner.next_id);
        inner.next_id += 1;
        inner.by_name.insert(name.to_owned(), id);
        inner.names.insert(id, name.to_owned());
        tracing::debug!(collection = %id, name, "collection created");
        Ok(id)
    }

    /// Forget a collection, returning its name so the engine can drop the
    /// backing keyspace.
    ///
    /// # Errors
    ///
    /// `args_wrong` when asked to drop the default collection (clear it
    /// instead), `missing_collection` for ids never issued or already
    /// dropped.
    pub fn drop_collection(&self, id: CollectionId) -> Result<String> {
        if id.is_default() {
            return Err(StoreError::args(
                "the default collection cannot be dropped, only cleared",
            ));
        }
        let mut inner = self.inner.write();
        let Some(name) = inner.names.remove(&id) else {
            return Err(StoreError::StaleCollection { id: id.get() });
        };
        inner.by_name.remove(&name);
        inner.dropped.insert(id);
        tracing::debug!(collection = %id, name = %name, "collection dropped");
        Ok(name)
    }

    /// `(id, name)` pairs of every live named collection.
    #[must_use]
    pub fn list(&self) -> Vec<(CollectionId, String)> {
        let inner = self.inner.read();
        let mut all: Vec<_> = inner
            .names
            .iter()
            .map(|(&id, name)| (id, name.clone()))
            .collect();
        all.sort_by_key(|(id, _)| *id);
        all
    }

    /// The name behind a live id.
    #[must_use]
    pub fn name_of(&self, id: CollectionId) -> Option<String> {
        self.inner.read().names.get(&id).cloned()
    }

    /// Check that `id` refers to a live collection (the default always is).
    ///
    /// # Errors
    ///
    /// `missing_collection` for dropped or never-issued ids.
    pub fn check_live(&self, id: CollectionId) -> Result<()> {
        if id.is_default() {
            return Ok(());
        }
        let inner = self.inner.read();
        if inner.names.contains_key(&id) {
            Ok(())
        } else {
            Err(StoreError::StaleCollection { id: id.get() })
        }
    }

    /// Ids of every live collection, default first.
    #[must_use]
    pub fn live_ids(&self) -> Vec<CollectionId> {
        let inner = self.inner.read();
        let mut ids = vec![CollectionId::DEFAULT];
        ids.extend(inner.names.keys().copied());
        ids.sort();
        ids
    }
}

impl Default for CollectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use omnikv_error::ErrorKind;

    #[test]
    fn open_is_find_or_create() {
        let registry = CollectionRegistry::new();
        let a = registry.open("graph").expect("create");
        let b = registry.open("graph").expect("find");
        assert_eq!(a, b);
        let c = registry.open("blobs").expect("create another");
        assert_ne!(a, c);
    }

    #[test]
    fn empty_name_is_reserved() {
        let registry = CollectionRegistry::new();
        assert!(registry.open("").is_err());
    }

    #[test]
    fn dropped_handles_go_stale() {
        let registry = CollectionRegistry::new();
        let id = registry.open("doomed").expect("create");
        assert!(registry.check_live(id).is_ok());

        let name = registry.drop_collection(id).expect("drop");
        assert_eq!(name, "doomed");
        let err = registry.check_live(id).expect_err("stale");
        assert_eq!(err.kind(), ErrorKind::MissingCollection);

        // Same id cannot be dropped twice.
        assert!(registry.drop_collection(id).is_err());

        // Re-opening the name mints a fresh id.
        let reborn = registry.open("doomed").expect("recreate");
        assert_ne!(reborn, id);
    }

    #[test]
    fn default_collection_always_live() {
        let registry = CollectionRegistry::new();
        assert!(registry.check_live(CollectionId::DEFAULT).is_ok());
        assert!(registry.drop_collection(CollectionId::DEFAULT).is_err());
        assert_eq!(registry.live_ids()[0], CollectionId::DEFAULT);
    }

    #[test]
    fn list_is_sorted_and_live_only() {
        let registry = CollectionRegistry::new();
        let a = registry.open("a").expect("a");
        let b = registry.open("b").expect("b");
        registry.drop_collection(a).expect("drop a");
        let listed = registry.list();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0], (b, "b".to_owned()));
    }
}
