//! Primary error type for OmniKV operations.
//!
//! Every failure carries one of a small set of stable kind identifiers so
//! callers (including the C ABI, which only sees strings) can dispatch on
//! the kind without parsing prose. Structured variants hold the details a
//! caller can act on.

use thiserror::Error;

/// Stable error kinds. The identifier strings are part of the public
/// contract and appear verbatim in rendered error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Validation failure; no side effects occurred.
    ArgsWrong,
    /// The referenced collection does not exist (or was dropped).
    MissingCollection,
    /// The transaction could not commit due to a concurrent write.
    Conflict,
    /// The operation requires a transaction and none was provided.
    TransactionRequired,
    /// The engine does not support this capability.
    Unimplemented,
    /// Arena growth or allocation failed.
    OutOfMemory,
    /// Underlying storage I/O error.
    Io,
    /// The engine detected invalid on-disk state.
    Corruption,
    /// Anything else.
    Unknown,
}

impl ErrorKind {
    /// The stable identifier carried in error strings.
    #[must_use]
    pub const fn identifier(self) -> &'static str {
        match self {
            Self::ArgsWrong => "args_wrong",
            Self::MissingCollection => "missing_collection",
            Self::Conflict => "conflict",
            Self::TransactionRequired => "transaction_required",
            Self::Unimplemented => "unimplemented",
            Self::OutOfMemory => "out_of_memory",
            Self::Io => "io",
            Self::Corruption => "corruption",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.identifier())
    }
}

/// Primary error type for store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    // === Validation ===
    /// A batched call failed preflight validation.
    #[error("args_wrong: {detail}")]
    ArgsWrong { detail: &'static str },

    /// A config string could not be used.
    #[error("args_wrong: bad config: {detail}")]
    BadConfig { detail: String },

    // === Collections ===
    /// Named collection not found.
    #[error("missing_collection: no collection named '{name}'")]
    MissingCollectionName { name: String },

    /// Collection handle refers to a dropped or foreign collection.
    #[error("missing_collection: stale collection handle {id}")]
    StaleCollection { id: u64 },

    // === Transactions ===
    /// First-committer-wins violation: a watched key changed after the
    /// transaction's snapshot.
    #[error("conflict: key {key} in collection {collection} changed after sequence {snapshot}")]
    Conflict {
        collection: u64,
        key: i64,
        snapshot: u64,
    },

    /// The transaction handle is poisoned by a failed commit; reset it.
    #[error("conflict: transaction must be reset after a failed commit")]
    TxnPoisoned,

    /// The operation needs a transaction.
    #[error("transaction_required: {operation} must run inside a transaction")]
    TransactionRequired { operation: &'static str },

    /// A transaction handle from another engine was supplied.
    #[error("args_wrong: transaction handle belongs to a different engine")]
    ForeignTransaction,

    // === Capabilities ===
    /// The engine does not implement the capability.
    #[error("unimplemented: {capability} is not supported by the {engine} engine")]
    Unsupported {
        engine: &'static str,
        capability: &'static str,
    },

    // === Resources ===
    /// Allocation failed or a value exceeded the representable length.
    #[error("out_of_memory: {detail}")]
    OutOfMemory { detail: &'static str },

    /// Storage I/O failed.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// Backend-reported I/O failure without an `io::Error` payload.
    #[error("io: {detail}")]
    Backend { detail: String },

    /// The engine found invalid persisted state.
    #[error("corruption: {detail}")]
    Corruption { detail: String },

    // === Other ===
    /// Uncategorised failure.
    #[error("unknown: {detail}")]
    Unknown { detail: String },
}

impl StoreError {
    /// Map this error to its stable kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::ArgsWrong { .. } | Self::BadConfig { .. } | Self::ForeignTransaction => {
                ErrorKind::ArgsWrong
            }
            Self::MissingCollectionName { .. } | Self::StaleCollection { .. } => {
                ErrorKind::MissingCollection
            }
            Self::Conflict { .. } | Self::TxnPoisoned => ErrorKind::Conflict,
            Self::TransactionRequired { .. } => ErrorKind::TransactionRequired,
            Self::Unsupported { .. } => ErrorKind::Unimplemented,
            Self::OutOfMemory { .. } => ErrorKind::OutOfMemory,
            Self::Io(_) | Self::Backend { .. } => ErrorKind::Io,
            Self::Corruption { .. } => ErrorKind::Corruption,
            Self::Unknown { .. } => ErrorKind::Unknown,
        }
    }

    /// Whether retrying (after a reset, for conflicts) may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self.kind(), ErrorKind::Conflict)
    }

    /// Whether this error poisons the engine handle.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self.kind(), ErrorKind::Io | ErrorKind::Corruption)
    }

    /// Create a validation error.
    #[must_use]
    pub const fn args(detail: &'static str) -> Self {
        Self::ArgsWrong { detail }
    }

    /// Create an unsupported-capability error.
    #[must_use]
    pub const fn unsupported(engine: &'static str, capability: &'static str) -> Self {
        Self::Unsupported { engine, capability }
    }

    /// Create a backend I/O error from a backend's own error rendering.
    pub fn backend(detail: impl Into<String>) -> Self {
        Self::Backend {
            detail: detail.into(),
        }
    }

    /// Create a corruption error.
    pub fn corruption(detail: impl Into<String>) -> Self {
        Self::Corruption {
            detail: detail.into(),
        }
    }

    /// Create an uncategorised error.
    pub fn unknown(detail: impl Into<String>) -> Self {
        Self::Unknown {
            detail: detail.into(),
        }
    }
}

/// Duplicate an error for the poison latch. `StoreError` holds
/// `std::io::Error` so it cannot be `Clone`; the latch re-renders instead.
#[must_use]
pub fn replay(error: &StoreError) -> StoreError {
    let rendered = error.to_string();
    let detail = rendered
        .strip_prefix(error.kind().identifier())
        .and_then(|rest| rest.strip_prefix(": "))
        .unwrap_or(&rendered)
        .to_owned();
    match error.kind() {
        ErrorKind::Io => StoreError::Backend { detail },
        ErrorKind::Corruption => StoreError::Corruption { detail },
        _ => StoreError::Unknown { detail },
    }
}

/// Result type alias using [`StoreError`].
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_identifiers_are_stable() {
        assert_eq!(ErrorKind::ArgsWrong.identifier(), "args_wrong");
        assert_eq!(ErrorKind::MissingCollection.identifier(), "missing_collection");
        assert_eq!(ErrorKind::Conflict.identifier(), "conflict");
        assert_eq!(
            ErrorKind::TransactionRequired.identifier(),
            "transaction_required"
        );
        assert_eq!(ErrorKind::Unimplemented.identifier(), "unimplemented");
        assert_eq!(ErrorKind::OutOfMemory.identifier(), "out_of_memory");
        assert_eq!(ErrorKind::Io.identifier(), "io");
        assert_eq!(ErrorKind::Corruption.identifier(), "corruption");
        assert_eq!(ErrorKind::Unknown.identifier(), "unknown");
    }

    #[test]
    fn display_carries_identifier() {
        let err = StoreError::args("no keys were provided");
        assert_eq!(err.to_string(), "args_wrong: no keys were provided");

        let err = StoreError::Conflict {
            collection: 0,
            key: 7,
            snapshot: 3,
        };
        assert!(err.to_string().starts_with("conflict:"));

        let err = StoreError::unsupported("ordered", "transactions");
        assert_eq!(
            err.to_string(),
            "unimplemented: transactions is not supported by the ordered engine"
        );
    }

    #[test]
    fn conflicts_are_transient_not_fatal() {
        let err = StoreError::Conflict {
            collection: 0,
            key: 1,
            snapshot: 0,
        };
        assert!(err.is_transient());
        assert!(!err.is_fatal());
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn io_and_corruption_are_fatal() {
        let err: StoreError = std::io::Error::new(std::io::ErrorKind::Other, "disk gone").into();
        assert!(err.is_fatal());
        assert_eq!(err.kind(), ErrorKind::Io);

        let err = StoreError::corruption("bad page");
        assert!(err.is_fatal());
        assert!(!err.is_transient());
    }

    #[test]
    fn replay_preserves_kind_for_fatal_errors() {
        let original = StoreError::corruption("torn record");
        let replayed = replay(&original);
        assert_eq!(replayed.kind(), ErrorKind::Corruption);
        assert!(replayed.to_string().contains("torn record"));

        let original: StoreError =
            std::io::Error::new(std::io::ErrorKind::Other, "short write").into();
        assert_eq!(replay(&original).kind(), ErrorKind::Io);
    }

    #[test]
    fn poisoned_txn_is_conflict_kind() {
        assert_eq!(StoreError::TxnPoisoned.kind(), ErrorKind::Conflict);
        assert!(StoreError::TxnPoisoned.is_transient());
    }
}
