//! Stateless preflight validation.
//!
//! Every entry point runs the matching check before the engine is touched:
//! option flags must be a subset of the operation's allowance, required
//! columns must be present, scan limits are mandatory, and the reserved
//! key sentinel may never be written. Failures are `args_wrong` and have
//! no side effects.

use omnikv_error::{Result, StoreError};
use omnikv_types::{ContentsArg, Key, Options, PlacesArg, ScansArg};

/// Preflight for a batched write.
///
/// # Errors
///
/// `args_wrong` when options fall outside the write allowance, the key
/// column is absent, a batched delete carries addressing columns, or any
/// key is the reserved sentinel.
pub fn validate_write(
    places: &PlacesArg<'_>,
    contents: &ContentsArg<'_>,
    options: Options,
) -> Result<()> {
    if !options.is_subset_of(Options::ALLOWED_WRITE) {
        return Err(StoreError::args("invalid options for write"));
    }
    if places.count > 0 && places.keys.is_absent() {
        return Err(StoreError::args("no keys were provided"));
    }
    if contents.is_erase() && (!contents.lengths.is_absent() || !contents.offsets.is_absent()) {
        return Err(StoreError::args(
            "batched delete cannot address payload columns",
        ));
    }
    for place in places.iter() {
        if place.key == Key::UNKNOWN {
            return Err(StoreError::args("the reserved key sentinel cannot be stored"));
        }
    }
    Ok(())
}

/// Preflight for a batched read or measure.
///
/// # Errors
///
/// `args_wrong` on disallowed options or an absent key column.
pub fn validate_read(places: &PlacesArg<'_>, options: Options) -> Result<()> {
    if !options.is_subset_of(Options::ALLOWED_READ) {
        return Err(StoreError::args("invalid options for read"));
    }
    if places.count > 0 && places.keys.is_absent() {
        return Err(StoreError::args("no keys were provided"));
    }
    Ok(())
}

/// Preflight for a batched scan.
///
/// # Errors
///
/// `args_wrong` on disallowed options or a missing limit column —
/// unbounded scans are rejected; paginate instead.
pub fn validate_scan(scans: &ScansArg<'_>, options: Options) -> Result<()> {
    if !options.is_subset_of(Options::ALLOWED_SCAN) {
        return Err(StoreError::args("invalid options for scan"));
    }
    if scans.count > 0 && scans.limits.is_absent() {
        return Err(StoreError::args("full scans aren't supported - paginate"));
    }
    Ok(())
}

/// Preflight for a sample call (scan option allowance applies).
///
/// # Errors
///
/// `args_wrong` on disallowed options.
pub fn validate_sample(options: Options) -> Result<()> {
    if !options.is_subset_of(Options::ALLOWED_SCAN) {
        return Err(StoreError::args("invalid options for sample"));
    }
    Ok(())
}

/// Preflight for transaction begin.
///
/// # Errors
///
/// `args_wrong` on disallowed options.
pub fn validate_txn_begin(options: Options) -> Result<()> {
    if !options.is_subset_of(Options::ALLOWED_TXN_BEGIN) {
        return Err(StoreError::args("invalid options for transaction begin"));
    }
    Ok(())
}

/// Preflight for transaction commit.
///
/// # Errors
///
/// `args_wrong` on disallowed options.
pub fn validate_txn_commit(options: Options) -> Result<()> {
    if !options.is_subset_of(Options::ALLOWED_TXN_COMMIT) {
        return Err(StoreError::args("invalid options for transaction commit"));
    }
    Ok(())
}

/// Preflight for a collection name: non-empty UTF-8, unique per engine
/// (uniqueness is the registry's job; emptiness is rejected here because
/// the empty name is the default collection).
///
/// # Errors
///
/// `args_wrong` for the empty name.
pub fn validate_collection_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(StoreError::args(
            "the empty name is reserved for the default collection",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use omnikv_error::ErrorKind;
    use omnikv_types::{Fields, Payloads, Strided};

    fn places_of<'a>(keys: &'a [Key]) -> PlacesArg<'a> {
        PlacesArg {
            collections: Strided::None,
            keys: Strided::Slice(keys),
            fields: Fields::None,
            count: keys.len(),
        }
    }

    #[test]
    fn write_rejects_foreign_options() {
        let keys = [Key::new(1)];
        let items: [Option<&[u8]>; 1] = [Some(b"v")];
        let err = validate_write(
            &places_of(&keys),
            &ContentsArg::for_slices(&items),
            Options::SCAN_BULK,
        )
        .expect_err("scan_bulk is not a write option");
        assert_eq!(err.kind(), ErrorKind::ArgsWrong);
    }

    #[test]
    fn write_requires_keys() {
        let places = PlacesArg {
            collections: Strided::None,
            keys: Strided::None,
            fields: Fields::None,
            count: 2,
        };
        let items: [Option<&[u8]>; 2] = [Some(b"a"), Some(b"b")];
        assert!(validate_write(&places, &ContentsArg::for_slices(&items), Options::NONE).is_err());
    }

    #[test]
    fn write_rejects_sentinel_key() {
        let keys = [Key::UNKNOWN];
        let items: [Option<&[u8]>; 1] = [Some(b"v")];
        assert!(
            validate_write(&places_of(&keys), &ContentsArg::for_slices(&items), Options::NONE)
                .is_err()
        );
    }

    #[test]
    fn erase_cannot_address_payload_columns() {
        let keys = [Key::new(1)];
        let lengths = [1_u32];
        let contents = ContentsArg {
            presences: None,
            offsets: Strided::None,
            lengths: Strided::Slice(&lengths),
            payloads: Payloads::None,
            count: 1,
            separator: 0,
        };
        assert!(validate_write(&places_of(&keys), &contents, Options::NONE).is_err());
    }

    #[test]
    fn empty_batches_pass() {
        let places = PlacesArg {
            collections: Strided::None,
            keys: Strided::None,
            fields: Fields::None,
            count: 0,
        };
        assert!(validate_read(&places, Options::NONE).is_ok());
        assert!(validate_write(&places, &ContentsArg::erase(0), Options::NONE).is_ok());
    }

    #[test]
    fn scan_requires_limits() {
        let scans = ScansArg {
            collections: Strided::None,
            min_keys: Strided::None,
            limits: Strided::None,
            count: 1,
        };
        let err = validate_scan(&scans, Options::NONE).expect_err("limits are mandatory");
        assert_eq!(err.kind(), ErrorKind::ArgsWrong);

        let limits = [5_u32];
        let scans = ScansArg {
            collections: Strided::None,
            min_keys: Strided::None,
            limits: Strided::Slice(&limits),
            count: 1,
        };
        assert!(validate_scan(&scans, Options::SCAN_BULK).is_ok());
    }

    #[test]
    fn txn_option_allowances() {
        assert!(validate_txn_begin(Options::TRANSACTION_DONT_WATCH).is_ok());
        assert!(validate_txn_begin(Options::WRITE_FLUSH).is_err());
        assert!(validate_txn_commit(Options::WRITE_FLUSH).is_ok());
        assert!(validate_txn_commit(Options::TRANSACTION_DONT_WATCH).is_err());
    }

    #[test]
    fn collection_name_rules() {
        assert!(validate_collection_name("graph").is_ok());
        assert!(validate_collection_name("").is_err());
    }
}
