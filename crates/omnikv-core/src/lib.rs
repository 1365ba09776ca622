//! Engine contract and shared runtime pieces.
//!
//! Everything an engine must provide lives behind the [`Engine`] trait: the
//! batched key-value operations, collection management, and the transaction
//! protocol. The validation layer performs the stateless preflight every
//! entry point runs before touching an engine, and the poison latch turns
//! fatal backend errors into a sticky handle state.

pub mod collections;
pub mod engine;
pub mod poison;
pub mod validate;

pub use collections::CollectionRegistry;
pub use engine::{Capabilities, Engine, EngineTransaction};
pub use poison::Poison;
