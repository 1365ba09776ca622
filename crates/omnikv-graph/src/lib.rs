//! Graph modality.
//!
//! Rebuilds edge-list semantics on top of the raw key-value substrate: a
//! vertex's value in the index collection is its adjacency record, and
//! every edge is referenced from both endpoint records. Directed and
//! undirected graphs, parallel edges, and self-loops are all expressible;
//! the shape flags are supplied when the graph is opened.

pub mod graph;
pub mod record;

pub use graph::{GraphCollection, GraphOptions};
pub use record::{AdjEntry, AdjRecord};
