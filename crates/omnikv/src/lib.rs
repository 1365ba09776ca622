//! Public API facade for OmniKV.
//!
//! One batched, transactional key-value contract; several engines behind
//! it; BLOB and graph modalities on top. [`Database`] opens an engine from
//! a JSON config, [`BlobsCollection`] is the ergonomic single-place layer
//! over the batched API, and graphs come from [`Database::graph`].

pub mod blobs;
pub mod database;

pub use blobs::BlobsCollection;
pub use database::{Database, Transaction};

pub use omnikv_core::{Capabilities, Engine, EngineTransaction};
pub use omnikv_error::{ErrorKind, Result, StoreError};
pub use omnikv_graph::{AdjEntry, AdjRecord, GraphCollection, GraphOptions};
pub use omnikv_types::{
    Arena, CollectionId, ContentsArg, Edge, EdgesArg, EngineKind, Fields, Key, Options, Place,
    PlacesArg, Payloads, ReadView, Role, Scan, ScanView, ScansArg, SequenceNumber, Snapshot,
    StoreConfig, Strided, TEST_PATH_ENV_VAR, TxnGeneration, ValueLen,
};
