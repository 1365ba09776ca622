//! BLOB modality: the ergonomic single-place layer.
//!
//! Values move through unchanged; every helper here is a thin batch of
//! size one (or a paginated loop) over the engine's batched API, so the
//! semantics are exactly those of the underlying contract.

use std::sync::Arc;

use omnikv_core::Engine;
use omnikv_error::Result;
use omnikv_types::{
    Arena, CollectionId, ContentsArg, Key, Options, PlacesArg, ScansArg, ValueLen,
};

/// Page size used by whole-collection iteration helpers.
const SCAN_PAGE: u32 = 1024;

/// One collection of opaque byte values.
#[derive(Clone)]
pub struct BlobsCollection {
    engine: Arc<dyn Engine>,
    collection: CollectionId,
}

impl BlobsCollection {
    #[must_use]
    pub fn new(engine: Arc<dyn Engine>, collection: CollectionId) -> Self {
        Self { engine, collection }
    }

    #[must_use]
    pub const fn id(&self) -> CollectionId {
        self.collection
    }

    /// Store `value` under `key`.
    ///
    /// # Errors
    ///
    /// Validation and engine errors.
    pub fn set(&self, key: Key, value: &[u8]) -> Result<()> {
        let keys = [key];
        let places = PlacesArg::for_keys(&self.collection, &keys);
        let items: [Option<&[u8]>; 1] = [Some(value)];
        self.engine
            .write(None, &places, &ContentsArg::for_slices(&items), Options::NONE)
    }

    /// Store a batch of key/value pairs in one atomic call.
    ///
    /// # Errors
    ///
    /// Validation and engine errors.
    pub fn set_many(&self, items: &[(Key, &[u8])]) -> Result<()> {
        let keys: Vec<Key> = items.iter().map(|&(key, _)| key).collect();
        let values: Vec<Option<&[u8]>> = items.iter().map(|&(_, value)| Some(value)).collect();
        let places = PlacesArg::for_keys(&self.collection, &keys);
        self.engine
            .write(None, &places, &ContentsArg::for_slices(&values), Options::NONE)
    }

    /// Fetch the value under `key`, if any.
    ///
    /// # Errors
    ///
    /// Validation and engine errors.
    pub fn get(&self, key: Key) -> Result<Option<Vec<u8>>> {
        let keys = [key];
        let places = PlacesArg::for_keys(&self.collection, &keys);
        let mut arena = Arena::new();
        let view = self.engine.read(None, &places, Options::NONE, &mut arena)?;
        Ok(view.value(0).map(<[u8]>::to_vec))
    }

    /// Fetch a batch of values in request order.
    ///
    /// # Errors
    ///
    /// Validation and engine errors.
    pub fn get_many(&self, keys: &[Key]) -> Result<Vec<Option<Vec<u8>>>> {
        let places = PlacesArg::for_keys(&self.collection, keys);
        let mut arena = Arena::new();
        let view = self.engine.read(None, &places, Options::NONE, &mut arena)?;
        Ok(view.iter().map(|value| value.map(<[u8]>::to_vec)).collect())
    }

    /// Delete the value under `key` (a no-op when absent).
    ///
    /// # Errors
    ///
    /// Validation and engine errors.
    pub fn erase(&self, key: Key) -> Result<()> {
        let keys = [key];
        let places = PlacesArg::for_keys(&self.collection, &keys);
        self.engine
            .write(None, &places, &ContentsArg::erase(1), Options::NONE)
    }

    /// Stored size of `key`, or `None` when absent. Length zero means an
    /// empty value is present.
    ///
    /// # Errors
    ///
    /// Validation and engine errors.
    pub fn len_of(&self, key: Key) -> Result<Option<u32>> {
        let keys = [key];
        let places = PlacesArg::for_keys(&self.collection, &keys);
        let mut arena = Arena::new();
        let view = self.engine.measure(None, &places, Options::NONE, &mut arena)?;
        let size = view.sizes()[0];
        Ok(if size.is_missing() { None } else { Some(size.get()) })
    }

    /// Keys at or above `min_key`, ascending, at most `limit`.
    ///
    /// # Errors
    ///
    /// Validation and engine errors.
    pub fn keys(&self, min_key: Key, limit: u32) -> Result<Vec<Key>> {
        let scans = ScansArg::single(&self.collection, &min_key, &limit);
        let mut arena = Arena::new();
        let view = self.engine.scan(None, &scans, Options::NONE, &mut arena)?;
        Ok(view.keys_for(0).to_vec())
    }

    /// Every key in the collection, via paginated scans.
    ///
    /// # Errors
    ///
    /// Validation and engine errors.
    pub fn all_keys(&self) -> Result<Vec<Key>> {
        let mut all = Vec::new();
        let mut min_key = Key::MIN;
        loop {
            let page = self.keys(min_key, SCAN_PAGE)?;
            let page_len = page.len();
            let last = page.last().copied();
            all.extend(page);
            if page_len < SCAN_PAGE as usize {
                return Ok(all);
            }
            match last.and_then(Key::checked_next) {
                Some(next) => min_key = next,
                None => return Ok(all),
            }
        }
    }

    /// Every `(key, value)` pair, via paginated scans and batched reads.
    ///
    /// # Errors
    ///
    /// Validation and engine errors.
    pub fn items(&self) -> Result<Vec<(Key, Vec<u8>)>> {
        let keys = self.all_keys()?;
        let values = self.get_many(&keys)?;
        Ok(keys
            .into_iter()
            .zip(values)
            .filter_map(|(key, value)| value.map(|v| (key, v)))
            .collect())
    }

    /// Up to `limit` randomly sampled keys.
    ///
    /// # Errors
    ///
    /// Validation and engine errors.
    pub fn sample(&self, limit: u32) -> Result<Vec<Key>> {
        let mut arena = Arena::new();
        let view = self
            .engine
            .sample(self.collection, limit, Options::NONE, &mut arena)?;
        Ok(view.keys_for(0).to_vec())
    }

    /// Remove every key in this collection.
    ///
    /// # Errors
    ///
    /// Engine errors only.
    pub fn clear(&self) -> Result<()> {
        self.engine.clear(Some(self.collection))
    }

    /// Sizes and presence for a batch of keys.
    ///
    /// # Errors
    ///
    /// Validation and engine errors.
    pub fn measure_many(&self, keys: &[Key]) -> Result<Vec<ValueLen>> {
        let places = PlacesArg::for_keys(&self.collection, keys);
        let mut arena = Arena::new();
        let view = self.engine.measure(None, &places, Options::NONE, &mut arena)?;
        Ok(view.sizes().to_vec())
    }
}
