//! In-memory transactional engine.
//!
//! Entries are kept in per-collection ordered maps as short version chains
//! stamped with the commit sequence that produced them. Transactions take a
//! snapshot of the commit clock at begin, buffer writes, and validate their
//! read-set under a global commit lock: first committer wins, later
//! committers observe a `conflict` and retry after a reset.

pub mod engine;
pub mod store;
pub mod txn;

pub use engine::MemEngine;
pub use txn::MemTransaction;
