//! Flat C ABI surface.
//!
//! Every function takes out-parameters for results plus an `error`
//! out-parameter. On success `*error` is set to null; on failure it points
//! at a null-terminated UTF-8 rendering of the error, owned by the
//! database handle and valid until the next call on that handle. Batched
//! functions take Structure-of-Arrays arguments as
//! `(pointer, stride_in_bytes, count)` triples: a null pointer means the
//! column is absent, stride 0 broadcasts element zero.

#![warn(unsafe_op_in_unsafe_fn)]
#![allow(
    unsafe_code,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss
)]

use std::ffi::{CStr, CString, c_char};
use std::sync::{LazyLock, Mutex};

use omnikv::{Database, Options};
use omnikv_core::EngineTransaction;
use omnikv_error::StoreError;
use omnikv_types::{
    Arena, CollectionId, ContentsArg, Element, Fields, Key, PlacesArg, ScansArg, Strided,
};

// ── Constants mirrored into the C header ────────────────────────────

/// Reserved key sentinel: never stored, means "unknown".
pub const OMNIKV_KEY_UNKNOWN: i64 = i64::MAX;
/// Length sentinel returned for missing values.
pub const OMNIKV_LENGTH_MISSING: u32 = u32::MAX;
/// The unnamed default collection.
pub const OMNIKV_COLLECTION_MAIN: u64 = 0;

pub const OMNIKV_OPTION_TRANSACTION_DONT_WATCH: u32 = 1;
pub const OMNIKV_OPTION_DONT_DISCARD_MEMORY: u32 = 1 << 1;
pub const OMNIKV_OPTION_READ_SHARED_MEMORY: u32 = 1 << 2;
pub const OMNIKV_OPTION_WRITE_FLUSH: u32 = 1 << 3;
pub const OMNIKV_OPTION_SCAN_BULK: u32 = 1 << 4;

/// Error slot for failures before any database handle exists (bad configs
/// on open). Valid until the next failing open.
static OPEN_ERROR: LazyLock<Mutex<CString>> =
    LazyLock::new(|| Mutex::new(CString::new("not an error").expect("static")));

fn set_open_error(err: &StoreError) -> *const c_char {
    let rendered = err.to_string().replace('\0', " ");
    let cstring = CString::new(rendered)
        .unwrap_or_else(|_| CString::new("unknown: error rendering failed").expect("static"));
    let mut guard = OPEN_ERROR.lock().expect("open error slot");
    *guard = cstring;
    guard.as_ptr()
}

// ── Opaque handle types ─────────────────────────────────────────────

/// Opaque database handle.
pub struct OmniKvDatabase {
    db: Database,
    last_error: Mutex<CString>,
}

impl OmniKvDatabase {
    fn new(db: Database) -> Self {
        Self {
            db,
            last_error: Mutex::new(CString::new("not an error").expect("static")),
        }
    }

    fn set_error(&self, err: &StoreError) -> *const c_char {
        let rendered = err.to_string().replace('\0', " ");
        let cstring = CString::new(rendered).unwrap_or_else(|_| {
            CString::new("unknown: error rendering failed").expect("static")
        });
        let mut guard = self.last_error.lock().expect("error slot");
        *guard = cstring;
        guard.as_ptr()
    }
}

/// Opaque transaction handle. Single-owner; must not be used from two
/// threads at once.
pub struct OmniKvTxn {
    inner: Box<dyn EngineTransaction>,
}

/// Opaque output arena. Single-owner.
pub struct OmniKvArena {
    inner: Arena,
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a strided view from a raw C column.
///
/// Safety: when `ptr` is non-null it must stay readable for
/// `(count - 1) * stride + width` bytes for the duration of the call.
unsafe fn column<'a, T: Element>(ptr: *const u8, stride: usize, count: usize) -> Strided<'a, T> {
    if ptr.is_null() || count == 0 {
        return Strided::None;
    }
    let span = if stride == 0 {
        T::WIDTH
    } else {
        (count - 1) * stride + T::WIDTH
    };
    Strided::Bytes {
        data: unsafe { std::slice::from_raw_parts(ptr, span) },
        stride,
    }
}

unsafe fn report(
    db: &OmniKvDatabase,
    error: *mut *const c_char,
    result: Result<(), StoreError>,
) {
    if error.is_null() {
        return;
    }
    unsafe {
        match result {
            Ok(()) => *error = std::ptr::null(),
            Err(err) => *error = db.set_error(&err),
        }
    }
}

unsafe fn txn_handle<'a>(txn: *mut OmniKvTxn) -> Option<&'a mut dyn EngineTransaction> {
    if txn.is_null() {
        None
    } else {
        Some(unsafe { (*txn).inner.as_mut() })
    }
}

/// Reassemble the `contents` bundle from raw C columns.
///
/// Safety: the value pointers and addressing columns must describe
/// readable memory for the duration of the call.
#[allow(clippy::too_many_arguments)]
unsafe fn contents_bundle(
    presences: *const u8,
    offsets: *const u8,
    offsets_stride: usize,
    lengths: *const u8,
    lengths_stride: usize,
    values: *const *const u8,
    values_stride: usize,
    count: usize,
) -> Result<Vec<Option<Vec<u8>>>, StoreError> {
    unsafe {
        if values.is_null() {
            return Ok(vec![None; count]);
        }
        // Arrow-style fenceposts carry one extra element; with explicit
        // lengths the offsets column has exactly `count`.
        let offsets_elems = if lengths.is_null() { count + 1 } else { count };
        let offsets: Strided<'_, u32> = column(offsets, offsets_stride, offsets_elems);
        let lengths: Strided<'_, u32> = column(lengths, lengths_stride, count);
        let presences = if presences.is_null() {
            None
        } else {
            Some(std::slice::from_raw_parts(presences, count.div_ceil(8)))
        };

        let mut items = Vec::with_capacity(count);
        for i in 0..count {
            if let Some(bits) = presences {
                if bits[i / 8] & (1 << (i % 8)) == 0 {
                    items.push(None);
                    continue;
                }
            }
            let ptr = if values_stride == 0 {
                *values
            } else {
                *values.byte_add(i * values_stride)
            };
            if ptr.is_null() {
                items.push(None);
                continue;
            }
            let off = offsets.get(i).unwrap_or(0) as usize;
            let len = if let Some(len) = lengths.get(i) {
                len as usize
            } else if let Some(next) = offsets.get(i + 1) {
                (next as usize).saturating_sub(off)
            } else {
                // Delimiter encoding: scan for the NUL terminator.
                let mut len = 0_usize;
                while *ptr.byte_add(off + len) != 0 {
                    len += 1;
                }
                len
            };
            items.push(Some(
                std::slice::from_raw_parts(ptr.byte_add(off), len).to_vec(),
            ));
        }
        Ok(items)
    }
}

// ── Database lifecycle ──────────────────────────────────────────────

/// Open a store from a JSON config string (null or empty for in-memory).
///
/// # Safety
/// `config` must be null or a valid null-terminated string. `db_out` must
/// be a valid pointer. `error`, if non-null, receives a borrowed error
/// string.
#[no_mangle]
pub unsafe extern "C" fn omnikv_open(
    config: *const c_char,
    db_out: *mut *mut OmniKvDatabase,
    error: *mut *const c_char,
) {
    unsafe {
        if !error.is_null() {
            *error = std::ptr::null();
        }
        if db_out.is_null() {
            return;
        }
        *db_out = std::ptr::null_mut();

        let config = if config.is_null() {
            String::new()
        } else {
            match CStr::from_ptr(config).to_str() {
                Ok(s) => s.to_owned(),
                Err(_) => {
                    // No handle yet to own the message; use a static.
                    if !error.is_null() {
                        *error = c"args_wrong: config is not valid UTF-8".as_ptr();
                    }
                    return;
                }
            }
        };

        tracing::info!(target: "omnikv.capi", "omnikv_open");
        match Database::open(&config) {
            Ok(db) => {
                *db_out = Box::into_raw(Box::new(OmniKvDatabase::new(db)));
            }
            Err(err) => {
                if !error.is_null() {
                    *error = set_open_error(&err);
                }
            }
        }
    }
}

/// Close a database handle.
///
/// # Safety
/// `db` must come from [`omnikv_open`] and must not be used afterwards.
#[no_mangle]
pub unsafe extern "C" fn omnikv_free(db: *mut OmniKvDatabase) {
    if !db.is_null() {
        tracing::info!(target: "omnikv.capi", "omnikv_free");
        drop(unsafe { Box::from_raw(db) });
    }
}

// ── Batched operations ──────────────────────────────────────────────

/// Batched write (upserts and deletes).
///
/// # Safety
/// All columns must describe readable memory for `keys_count` elements at
/// their strides; `db` must be a live handle; `txn`, if non-null, must be
/// a live transaction of the same database.
#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn omnikv_write(
    db: *mut OmniKvDatabase,
    txn: *mut OmniKvTxn,
    collections: *const u64,
    collections_stride: usize,
    keys: *const i64,
    keys_count: usize,
    keys_stride: usize,
    presences: *const u8,
    offsets: *const u32,
    offsets_stride: usize,
    lengths: *const u32,
    lengths_stride: usize,
    values: *const *const u8,
    values_stride: usize,
    options: u32,
    error: *mut *const c_char,
) {
    unsafe {
        let db = &*db;
        let result = (|| {
            let items = contents_bundle(
                presences,
                offsets.cast(),
                offsets_stride,
                lengths.cast(),
                lengths_stride,
                values,
                values_stride,
                keys_count,
            )?;
            let borrowed: Vec<Option<&[u8]>> =
                items.iter().map(|item| item.as_deref()).collect();
            let places = PlacesArg {
                collections: column(collections.cast(), collections_stride, keys_count),
                keys: column(keys.cast(), keys_stride, keys_count),
                fields: Fields::None,
                count: keys_count,
            };
            let contents = ContentsArg::for_slices(&borrowed);
            db.db.engine().write(
                txn_handle(txn),
                &places,
                &contents,
                Options::from_bits(options),
            )
        })();
        report(db, error, result);
    }
}

/// Batched read. Outputs borrow the arena: `found_lengths` holds one
/// length per place (`OMNIKV_LENGTH_MISSING` for absent keys) and
/// `found_values` points at the concatenated value tape; offsets are the
/// running sum of the non-missing lengths.
///
/// # Safety
/// As for [`omnikv_write`]; `arena` must be a live arena owned by this
/// caller.
#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn omnikv_read(
    db: *mut OmniKvDatabase,
    txn: *mut OmniKvTxn,
    collections: *const u64,
    collections_stride: usize,
    keys: *const i64,
    keys_count: usize,
    keys_stride: usize,
    options: u32,
    found_lengths: *mut *const u32,
    found_values: *mut *const u8,
    arena: *mut OmniKvArena,
    error: *mut *const c_char,
) {
    unsafe {
        let db = &*db;
        let result = (|| {
            if arena.is_null() {
                return Err(StoreError::args("an output arena is required"));
            }
            let places = PlacesArg {
                collections: column(collections.cast(), collections_stride, keys_count),
                keys: column(keys.cast(), keys_stride, keys_count),
                fields: Fields::None,
                count: keys_count,
            };
            let view = db.db.engine().read(
                txn_handle(txn),
                &places,
                Options::from_bits(options),
                &mut (*arena).inner,
            )?;
            if !found_lengths.is_null() {
                *found_lengths = view.lengths().as_ptr().cast();
            }
            if !found_values.is_null() {
                *found_values = view.tape().as_ptr();
            }
            Ok(())
        })();
        report(db, error, result);
    }
}

/// Batched paginated scan. `found_counts` holds one count per request and
/// `found_keys` the concatenated ascending key runs.
///
/// # Safety
/// As for [`omnikv_read`].
#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn omnikv_scan(
    db: *mut OmniKvDatabase,
    txn: *mut OmniKvTxn,
    collections: *const u64,
    collections_stride: usize,
    min_keys: *const i64,
    scans_count: usize,
    min_keys_stride: usize,
    limits: *const u32,
    limits_stride: usize,
    options: u32,
    found_counts: *mut *const u32,
    found_keys: *mut *const i64,
    arena: *mut OmniKvArena,
    error: *mut *const c_char,
) {
    unsafe {
        let db = &*db;
        let result = (|| {
            if arena.is_null() {
                return Err(StoreError::args("an output arena is required"));
            }
            let scans = ScansArg {
                collections: column(collections.cast(), collections_stride, scans_count),
                min_keys: column(min_keys.cast(), min_keys_stride, scans_count),
                limits: column(limits.cast(), limits_stride, scans_count),
                count: scans_count,
            };
            let view = db.db.engine().scan(
                txn_handle(txn),
                &scans,
                Options::from_bits(options),
                &mut (*arena).inner,
            )?;
            if !found_counts.is_null() {
                *found_counts = view.counts().as_ptr();
            }
            if !found_keys.is_null() {
                *found_keys = view.all_keys().as_ptr().cast();
            }
            Ok(())
        })();
        report(db, error, result);
    }
}

/// Random sample of up to `limit` distinct keys from one collection.
///
/// # Safety
/// As for [`omnikv_read`].
#[no_mangle]
pub unsafe extern "C" fn omnikv_sample(
    db: *mut OmniKvDatabase,
    collection: u64,
    limit: u32,
    options: u32,
    found_count: *mut u32,
    found_keys: *mut *const i64,
    arena: *mut OmniKvArena,
    error: *mut *const c_char,
) {
    unsafe {
        let db = &*db;
        let result = (|| {
            if arena.is_null() {
                return Err(StoreError::args("an output arena is required"));
            }
            let view = db.db.engine().sample(
                CollectionId::new(collection),
                limit,
                Options::from_bits(options),
                &mut (*arena).inner,
            )?;
            if !found_count.is_null() {
                *found_count = view.keys_for(0).len() as u32;
            }
            if !found_keys.is_null() {
                *found_keys = view.all_keys().as_ptr().cast();
            }
            Ok(())
        })();
        report(db, error, result);
    }
}

/// Per-key stored sizes; `OMNIKV_LENGTH_MISSING` marks absent keys.
///
/// # Safety
/// As for [`omnikv_read`].
#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn omnikv_measure(
    db: *mut OmniKvDatabase,
    txn: *mut OmniKvTxn,
    collections: *const u64,
    collections_stride: usize,
    keys: *const i64,
    keys_count: usize,
    keys_stride: usize,
    options: u32,
    found_lengths: *mut *const u32,
    arena: *mut OmniKvArena,
    error: *mut *const c_char,
) {
    unsafe {
        let db = &*db;
        let result = (|| {
            if arena.is_null() {
                return Err(StoreError::args("an output arena is required"));
            }
            let places = PlacesArg {
                collections: column(collections.cast(), collections_stride, keys_count),
                keys: column(keys.cast(), keys_stride, keys_count),
                fields: Fields::None,
                count: keys_count,
            };
            let view = db.db.engine().measure(
                txn_handle(txn),
                &places,
                Options::from_bits(options),
                &mut (*arena).inner,
            )?;
            if !found_lengths.is_null() {
                *found_lengths = view.sizes().as_ptr().cast();
            }
            Ok(())
        })();
        report(db, error, result);
    }
}

// ── Collections ─────────────────────────────────────────────────────

/// Find or create a named collection.
///
/// # Safety
/// `name` must be a valid null-terminated string; out-pointers valid.
#[no_mangle]
pub unsafe extern "C" fn omnikv_collection_open(
    db: *mut OmniKvDatabase,
    name: *const c_char,
    collection_out: *mut u64,
    error: *mut *const c_char,
) {
    unsafe {
        let db = &*db;
        let result = (|| {
            if name.is_null() {
                return Err(StoreError::args("collection name is required"));
            }
            let name = CStr::from_ptr(name)
                .to_str()
                .map_err(|_| StoreError::args("collection name is not valid UTF-8"))?;
            let id = db.db.engine().collection_open(name)?;
            if !collection_out.is_null() {
                *collection_out = id.get();
            }
            Ok(())
        })();
        report(db, error, result);
    }
}

/// Drop a collection and every key in it.
///
/// # Safety
/// `db` must be a live handle.
#[no_mangle]
pub unsafe extern "C" fn omnikv_collection_drop(
    db: *mut OmniKvDatabase,
    collection: u64,
    error: *mut *const c_char,
) {
    unsafe {
        let db = &*db;
        let result = db.db.engine().collection_drop(CollectionId::new(collection));
        report(db, error, result);
    }
}

/// List named collections: ids into the arena's key lane, names as a
/// NUL-separated run on the value tape.
///
/// # Safety
/// As for [`omnikv_read`].
#[no_mangle]
pub unsafe extern "C" fn omnikv_collection_list(
    db: *mut OmniKvDatabase,
    count_out: *mut u64,
    ids_out: *mut *const i64,
    names_out: *mut *const u8,
    arena: *mut OmniKvArena,
    error: *mut *const c_char,
) {
    unsafe {
        let db = &*db;
        let result = (|| {
            if arena.is_null() {
                return Err(StoreError::args("an output arena is required"));
            }
            let listed = db.db.engine().collection_list()?;
            let arena = &mut (*arena).inner;
            arena.begin(Options::NONE);

            let mut ids = arena.build_scan();
            ids.push_request(listed.iter().map(|(id, _)| Key::new(id.get() as i64)));
            let ids_view = ids.finish();
            if !ids_out.is_null() {
                *ids_out = ids_view.all_keys().as_ptr().cast();
            }

            let mut names = arena.build_read();
            for (_, name) in &listed {
                let mut bytes = name.clone().into_bytes();
                bytes.push(0);
                names.push_value(&bytes);
            }
            let names_view = names.finish();
            if !names_out.is_null() {
                *names_out = names_view.tape().as_ptr();
            }
            if !count_out.is_null() {
                *count_out = listed.len() as u64;
            }
            Ok(())
        })();
        report(db, error, result);
    }
}

/// Remove every key from `collection`.
///
/// # Safety
/// `db` must be a live handle.
#[no_mangle]
pub unsafe extern "C" fn omnikv_clear(
    db: *mut OmniKvDatabase,
    collection: u64,
    error: *mut *const c_char,
) {
    unsafe {
        let db = &*db;
        let result = db.db.engine().clear(Some(CollectionId::new(collection)));
        report(db, error, result);
    }
}

/// Remove every key from every collection.
///
/// # Safety
/// `db` must be a live handle.
#[no_mangle]
pub unsafe extern "C" fn omnikv_clear_all(db: *mut OmniKvDatabase, error: *mut *const c_char) {
    unsafe {
        let db = &*db;
        let result = db.db.engine().clear(None);
        report(db, error, result);
    }
}

// ── Transactions ────────────────────────────────────────────────────

/// Begin a transaction.
///
/// # Safety
/// `db` must be a live handle; `txn_out` a valid pointer.
#[no_mangle]
pub unsafe extern "C" fn omnikv_txn_begin(
    db: *mut OmniKvDatabase,
    options: u32,
    txn_out: *mut *mut OmniKvTxn,
    error: *mut *const c_char,
) {
    unsafe {
        let db = &*db;
        let result = (|| {
            if txn_out.is_null() {
                return Err(StoreError::args("a transaction out-pointer is required"));
            }
            let inner = db.db.engine().txn_begin(Options::from_bits(options))?;
            *txn_out = Box::into_raw(Box::new(OmniKvTxn { inner }));
            Ok(())
        })();
        report(db, error, result);
    }
}

/// Commit; `sequence_out` receives the assigned commit ordinal. A
/// conflict is a normal outcome: reset the handle and retry.
///
/// # Safety
/// `db` and `txn` must be live handles of the same database.
#[no_mangle]
pub unsafe extern "C" fn omnikv_txn_commit(
    db: *mut OmniKvDatabase,
    txn: *mut OmniKvTxn,
    options: u32,
    sequence_out: *mut u64,
    error: *mut *const c_char,
) {
    unsafe {
        let db = &*db;
        let result = (|| {
            if txn.is_null() {
                return Err(StoreError::args("a transaction handle is required"));
            }
            let seq = db
                .db
                .engine()
                .txn_commit((*txn).inner.as_mut(), Options::from_bits(options))?;
            if !sequence_out.is_null() {
                *sequence_out = seq.get();
            }
            Ok(())
        })();
        report(db, error, result);
    }
}

/// Discard buffered state and re-snapshot the handle for reuse.
///
/// # Safety
/// `db` and `txn` must be live handles of the same database.
#[no_mangle]
pub unsafe extern "C" fn omnikv_txn_reset(
    db: *mut OmniKvDatabase,
    txn: *mut OmniKvTxn,
    error: *mut *const c_char,
) {
    unsafe {
        let db = &*db;
        let result = (|| {
            if txn.is_null() {
                return Err(StoreError::args("a transaction handle is required"));
            }
            db.db.engine().txn_reset((*txn).inner.as_mut())
        })();
        report(db, error, result);
    }
}

/// Free a transaction handle; pending writes are dropped.
///
/// # Safety
/// `txn` must come from [`omnikv_txn_begin`] and must not be used after.
#[no_mangle]
pub unsafe extern "C" fn omnikv_txn_free(txn: *mut OmniKvTxn) {
    if !txn.is_null() {
        drop(unsafe { Box::from_raw(txn) });
    }
}

// ── Arena ───────────────────────────────────────────────────────────

/// Allocate an output arena.
#[no_mangle]
pub extern "C" fn omnikv_arena_new() -> *mut OmniKvArena {
    Box::into_raw(Box::new(OmniKvArena {
        inner: Arena::new(),
    }))
}

/// Free an arena; all borrowed outputs become invalid.
///
/// # Safety
/// `arena` must come from [`omnikv_arena_new`] and must not be used after.
#[no_mangle]
pub unsafe extern "C" fn omnikv_arena_free(arena: *mut OmniKvArena) {
    if !arena.is_null() {
        drop(unsafe { Box::from_raw(arena) });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    unsafe fn must_open() -> *mut OmniKvDatabase {
        let mut db = std::ptr::null_mut();
        let mut error = std::ptr::null();
        unsafe {
            omnikv_open(std::ptr::null(), &mut db, &mut error);
        }
        assert!(error.is_null());
        assert!(!db.is_null());
        db
    }

    #[test]
    fn open_write_read_roundtrip() {
        unsafe {
            let db = must_open();
            let arena = omnikv_arena_new();
            let mut error = std::ptr::null();

            let keys = [42_i64, 43];
            let payload = b"hey";
            let value_ptrs = [payload.as_ptr()];
            let lengths = [3_u32];
            omnikv_write(
                db,
                std::ptr::null_mut(),
                std::ptr::null(),
                0,
                keys.as_ptr(),
                1,
                8,
                std::ptr::null(),
                std::ptr::null(),
                0,
                lengths.as_ptr(),
                4,
                value_ptrs.as_ptr(),
                0,
                0,
                &mut error,
            );
            assert!(error.is_null());

            let mut found_lengths = std::ptr::null();
            let mut found_values = std::ptr::null();
            omnikv_read(
                db,
                std::ptr::null_mut(),
                std::ptr::null(),
                0,
                keys.as_ptr(),
                2,
                8,
                0,
                &mut found_lengths,
                &mut found_values,
                arena,
                &mut error,
            );
            assert!(error.is_null());

            let lengths = std::slice::from_raw_parts(found_lengths, 2);
            assert_eq!(lengths[0], 3);
            assert_eq!(lengths[1], OMNIKV_LENGTH_MISSING);
            let tape = std::slice::from_raw_parts(found_values, 3);
            assert_eq!(tape, b"hey");

            omnikv_arena_free(arena);
            omnikv_free(db);
        }
    }

    #[test]
    fn scan_returns_ordered_keys() {
        unsafe {
            let db = must_open();
            let arena = omnikv_arena_new();
            let mut error = std::ptr::null();

            let keys = [3_i64, 1, 2];
            let a = b"a".as_ptr();
            let b = b"b".as_ptr();
            let c = b"c".as_ptr();
            let value_ptrs = [a, b, c];
            let lengths = [1_u32, 1, 1];
            omnikv_write(
                db,
                std::ptr::null_mut(),
                std::ptr::null(),
                0,
                keys.as_ptr(),
                3,
                8,
                std::ptr::null(),
                std::ptr::null(),
                0,
                lengths.as_ptr(),
                4,
                value_ptrs.as_ptr(),
                std::mem::size_of::<*const u8>(),
                0,
                &mut error,
            );
            assert!(error.is_null());

            let min_keys = [0_i64];
            let limits = [10_u32];
            let mut found_counts = std::ptr::null();
            let mut found_keys = std::ptr::null();
            omnikv_scan(
                db,
                std::ptr::null_mut(),
                std::ptr::null(),
                0,
                min_keys.as_ptr(),
                1,
                8,
                limits.as_ptr(),
                4,
                0,
                &mut found_counts,
                &mut found_keys,
                arena,
                &mut error,
            );
            assert!(error.is_null());

            assert_eq!(*found_counts, 3);
            let found = std::slice::from_raw_parts(found_keys, 3);
            assert_eq!(found, &[1, 2, 3]);

            omnikv_arena_free(arena);
            omnikv_free(db);
        }
    }

    #[test]
    fn transaction_conflict_surfaces_kind_in_error_string() {
        unsafe {
            let db = must_open();
            let mut error = std::ptr::null();

            let mut t1 = std::ptr::null_mut();
            let mut t2 = std::ptr::null_mut();
            omnikv_txn_begin(db, 0, &mut t1, &mut error);
            assert!(error.is_null());
            omnikv_txn_begin(db, 0, &mut t2, &mut error);
            assert!(error.is_null());

            let keys = [7_i64];
            let x = b"x".as_ptr();
            let values = [x];
            let lengths = [1_u32];

            // T2 watches key 7 by reading it.
            let arena = omnikv_arena_new();
            let mut found_lengths = std::ptr::null();
            let mut found_values = std::ptr::null();
            omnikv_read(
                db,
                t2,
                std::ptr::null(),
                0,
                keys.as_ptr(),
                1,
                8,
                0,
                &mut found_lengths,
                &mut found_values,
                arena,
                &mut error,
            );
            assert!(error.is_null());
            assert_eq!(*found_lengths, OMNIKV_LENGTH_MISSING);

            // T1 writes the same key and commits first.
            omnikv_write(
                db,
                t1,
                std::ptr::null(),
                0,
                keys.as_ptr(),
                1,
                8,
                std::ptr::null(),
                std::ptr::null(),
                0,
                lengths.as_ptr(),
                4,
                values.as_ptr(),
                0,
                0,
                &mut error,
            );
            assert!(error.is_null());
            let mut s1 = 0_u64;
            omnikv_txn_commit(db, t1, 0, &mut s1, &mut error);
            assert!(error.is_null());
            assert!(s1 > 0);

            // T2's commit conflicts; the kind identifier is in the string.
            omnikv_write(
                db,
                t2,
                std::ptr::null(),
                0,
                keys.as_ptr(),
                1,
                8,
                std::ptr::null(),
                std::ptr::null(),
                0,
                lengths.as_ptr(),
                4,
                values.as_ptr(),
                0,
                0,
                &mut error,
            );
            assert!(error.is_null());
            let mut s2 = 0_u64;
            omnikv_txn_commit(db, t2, 0, &mut s2, &mut error);
            assert!(!error.is_null());
            let message = CStr::from_ptr(error).to_str().expect("utf-8");
            assert!(message.starts_with("conflict"), "got: {message}");

            // Reset and retry.
            omnikv_txn_reset(db, t2, &mut error);
            assert!(error.is_null());
            omnikv_write(
                db,
                t2,
                std::ptr::null(),
                0,
                keys.as_ptr(),
                1,
                8,
                std::ptr::null(),
                std::ptr::null(),
                0,
                lengths.as_ptr(),
                4,
                values.as_ptr(),
                0,
                0,
                &mut error,
            );
            assert!(error.is_null());
            omnikv_txn_commit(db, t2, 0, &mut s2, &mut error);
            assert!(error.is_null());
            assert!(s2 > s1);

            omnikv_txn_free(t1);
            omnikv_txn_free(t2);
            omnikv_arena_free(arena);
            omnikv_free(db);
        }
    }

    #[test]
    fn collection_lifecycle_via_abi() {
        unsafe {
            let db = must_open();
            let arena = omnikv_arena_new();
            let mut error = std::ptr::null();

            let name = c"graph";
            let mut id = 0_u64;
            omnikv_collection_open(db, name.as_ptr(), &mut id, &mut error);
            assert!(error.is_null());
            assert_ne!(id, OMNIKV_COLLECTION_MAIN);

            let mut count = 0_u64;
            let mut ids = std::ptr::null();
            let mut names = std::ptr::null();
            omnikv_collection_list(db, &mut count, &mut ids, &mut names, arena, &mut error);
            assert!(error.is_null());
            assert_eq!(count, 1);
            assert_eq!(*ids, id as i64);
            let listed = CStr::from_ptr(names.cast()).to_str().expect("utf-8");
            assert_eq!(listed, "graph");

            omnikv_collection_drop(db, id, &mut error);
            assert!(error.is_null());

            // Using the stale id is a usage error.
            omnikv_clear(db, id, &mut error);
            assert!(!error.is_null());
            let message = CStr::from_ptr(error).to_str().expect("utf-8");
            assert!(message.starts_with("missing_collection"), "got: {message}");

            omnikv_arena_free(arena);
            omnikv_free(db);
        }
    }
}
