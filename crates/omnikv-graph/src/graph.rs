//! Graph operations over the key-value substrate.
//!
//! A graph is stored entirely in regular collections: the index collection
//! holds one adjacency record per vertex; optional collections hold vertex
//! and edge attribute blobs. Edge mutations read both endpoint records,
//! rewrite them, and commit inside one engine transaction so the symmetry
//! invariant (every edge is referenced by both endpoints) survives
//! concurrent writers. A commit conflict is retried with a fresh snapshot.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use omnikv_core::{Capabilities, Engine, EngineTransaction};
use omnikv_error::{ErrorKind, Result, StoreError};
use omnikv_types::{
    Arena, CollectionId, ContentsArg, Edge, EdgesArg, Key, Options, PlacesArg, Role,
};

use crate::record::{AdjEntry, AdjRecord};

/// How many commit conflicts a single edge batch absorbs before giving up
/// and surfacing the conflict to the caller.
const MAX_COMMIT_RETRIES: usize = 64;

/// Shape flags of a graph. Not persisted; supplied when the graph is
/// opened, the way the original bindings take them on the constructor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GraphOptions {
    /// Directed edges keep source/target roles apart; undirected edges
    /// record both roles on each endpoint.
    pub directed: bool,
    /// Allow parallel edges between the same endpoints.
    pub multi: bool,
    /// Allow self-loops.
    pub loops: bool,
}

/// A graph layered over one engine.
pub struct GraphCollection {
    engine: Arc<dyn Engine>,
    index: CollectionId,
    vertex_attrs: Option<CollectionId>,
    edge_attrs: Option<CollectionId>,
    options: GraphOptions,
}

enum EdgeOp {
    Upsert,
    Remove,
}

impl GraphCollection {
    /// Open a graph over `index_name` (empty for the default collection).
    ///
    /// # Errors
    ///
    /// Whatever the engine reports for collection opening.
    pub fn open(engine: Arc<dyn Engine>, index_name: &str, options: GraphOptions) -> Result<Self> {
        let index = if index_name.is_empty() {
            CollectionId::DEFAULT
        } else {
            engine.collection_open(index_name)?
        };
        Ok(Self {
            engine,
            index,
            vertex_attrs: None,
            edge_attrs: None,
            options,
        })
    }

    /// Attach attribute collections for vertices and edges.
    ///
    /// # Errors
    ///
    /// Whatever the engine reports for collection opening.
    pub fn with_attributes(
        mut self,
        vertex_attrs: Option<&str>,
        edge_attrs: Option<&str>,
    ) -> Result<Self> {
        if let Some(name) = vertex_attrs {
            self.vertex_attrs = Some(self.engine.collection_open(name)?);
        }
        if let Some(name) = edge_attrs {
            self.edge_attrs = Some(self.engine.collection_open(name)?);
        }
        Ok(self)
    }

    #[must_use]
    pub const fn is_directed(&self) -> bool {
        self.options.directed
    }

    #[must_use]
    pub const fn is_multi(&self) -> bool {
        self.options.multi
    }

    #[must_use]
    pub const fn allows_loops(&self) -> bool {
        self.options.loops
    }

    #[must_use]
    pub const fn index_collection(&self) -> CollectionId {
        self.index
    }

    // -- reads ------------------------------------------------------------

    /// Whether the graph knows `vertex` (i.e. an adjacency record exists).
    pub fn contains(&self, vertex: Key) -> Result<bool> {
        let keys = [vertex];
        let places = PlacesArg::for_keys(&self.index, &keys);
        let mut arena = Arena::new();
        let view = self.engine.measure(None, &places, Options::NONE, &mut arena)?;
        Ok(view.present(0))
    }

    /// Count of edges incident to `vertex` whose role intersects `filter`.
    pub fn degree(&self, vertex: Key, filter: Role) -> Result<u32> {
        Ok(self.degrees(&[vertex], filter)?[0])
    }

    /// Batched degrees with one underlying read.
    pub fn degrees(&self, vertices: &[Key], filter: Role) -> Result<Vec<u32>> {
        let records = self.read_records(None, vertices)?;
        Ok(vertices
            .iter()
            .map(|v| records.get(v).map_or(0, |r| r.degree(filter)))
            .collect())
    }

    /// Incoming and outgoing neighbors of `vertex`. May contain duplicates
    /// when several edges reach the same vertex.
    pub fn neighbors(&self, vertex: Key) -> Result<Vec<Key>> {
        self.neighbors_filtered(vertex, Role::ANY)
    }

    /// Vertices this vertex points at.
    pub fn successors(&self, vertex: Key) -> Result<Vec<Key>> {
        self.neighbors_filtered(vertex, Role::SOURCE)
    }

    /// Vertices pointing at this vertex.
    pub fn predecessors(&self, vertex: Key) -> Result<Vec<Key>> {
        self.neighbors_filtered(vertex, Role::TARGET)
    }

    fn neighbors_filtered(&self, vertex: Key, filter: Role) -> Result<Vec<Key>> {
        let records = self.read_records(None, &[vertex])?;
        Ok(records.get(&vertex).map_or_else(Vec::new, |r| r.neighbors(filter)))
    }

    /// Every edge between `u` and `v`, oriented as stored.
    pub fn edges_between(&self, u: Key, v: Key) -> Result<Vec<Edge>> {
        let records = self.read_records(None, &[u])?;
        let Some(record) = records.get(&u) else {
            return Ok(Vec::new());
        };
        Ok(record
            .entries_towards(v)
            .into_iter()
            .map(|entry| {
                if entry.role.matches(Role::SOURCE) {
                    Edge::new(u, v, entry.edge)
                } else {
                    Edge::new(v, u, entry.edge)
                }
            })
            .collect())
    }

    /// The adjacency entries of `vertex`, as stored.
    pub fn adjacency(&self, vertex: Key) -> Result<Vec<AdjEntry>> {
        let records = self.read_records(None, &[vertex])?;
        Ok(records
            .get(&vertex)
            .map_or_else(Vec::new, |r| r.entries().to_vec()))
    }

    /// Edges reachable from `start` within `hops` frontier expansions.
    /// Each expansion is one batched read; ties at the final frontier are
    /// included.
    pub fn subgraph(&self, start: Key, hops: usize) -> Result<Vec<Edge>> {
        let mut visited: HashSet<Key> = HashSet::from([start]);
        let mut frontier = vec![start];
        let mut seen: HashSet<(i64, i64, i64)> = HashSet::new();
        let mut edges = Vec::new();

        for _ in 0..hops {
            if frontier.is_empty() {
                break;
            }
            let records = self.read_records(None, &frontier)?;
            let mut next = Vec::new();
            for vertex in frontier.drain(..) {
                let Some(record) = records.get(&vertex) else {
                    continue;
                };
                for entry in record.entries() {
                    if entry.role.matches(Role::SOURCE) {
                        self.collect_edge(
                            Edge::new(vertex, entry.neighbor, entry.edge),
                            &mut seen,
                            &mut edges,
                        );
                    }
                    if entry.role.matches(Role::TARGET) {
                        self.collect_edge(
                            Edge::new(entry.neighbor, vertex, entry.edge),
                            &mut seen,
                            &mut edges,
                        );
                    }
                    if visited.insert(entry.neighbor) {
                        next.push(entry.neighbor);
                    }
                }
            }
            frontier = next;
        }
        Ok(edges)
    }

    fn collect_edge(
        &self,
        edge: Edge,
        seen: &mut HashSet<(i64, i64, i64)>,
        edges: &mut Vec<Edge>,
    ) {
        let signature = if self.options.directed {
            (edge.source.get(), edge.target.get(), edge.id.get())
        } else {
            // Undirected records carry both roles; canonicalise so the
            // same edge is not reported once per direction.
            let (lo, hi) = if edge.source.get() <= edge.target.get() {
                (edge.source.get(), edge.target.get())
            } else {
                (edge.target.get(), edge.source.get())
            };
            (lo, hi, edge.id.get())
        };
        if seen.insert(signature) {
            edges.push(edge);
        }
    }

    // -- writes -----------------------------------------------------------

    /// Insert a batch of edges. Re-upserting an existing edge is a no-op.
    pub fn upsert_edges(&self, edges: &EdgesArg<'_>) -> Result<()> {
        self.apply(edges, &EdgeOp::Upsert)
    }

    /// Insert one edge.
    pub fn upsert_edge(&self, edge: Edge) -> Result<()> {
        let sources = [edge.source];
        let targets = [edge.target];
        let ids = [edge.id];
        self.upsert_edges(&EdgesArg::from_triples(&sources, &targets, &ids))
    }

    /// Remove a batch of edges. Unlabeled ids remove every edge between
    /// the endpoints; removing an absent edge is a success no-op.
    pub fn remove_edges(&self, edges: &EdgesArg<'_>) -> Result<()> {
        self.apply(edges, &EdgeOp::Remove)
    }

    /// Remove one edge.
    pub fn remove_edge(&self, edge: Edge) -> Result<()> {
        let sources = [edge.source];
        let targets = [edge.target];
        let ids = [edge.id];
        self.remove_edges(&EdgesArg::from_triples(&sources, &targets, &ids))
    }

    /// Drop every vertex and edge, and any attached attribute collections.
    pub fn clear(&self) -> Result<()> {
        self.engine.clear(Some(self.index))?;
        if let Some(attrs) = self.vertex_attrs {
            self.engine.clear(Some(attrs))?;
        }
        if let Some(attrs) = self.edge_attrs {
            self.engine.clear(Some(attrs))?;
        }
        Ok(())
    }

    fn apply(&self, edges: &EdgesArg<'_>, op: &EdgeOp) -> Result<()> {
        if edges.is_empty() {
            return Ok(());
        }
        if !self
            .engine
            .capabilities()
            .contains(Capabilities::TRANSACTIONS)
        {
            // Symmetry cannot be preserved without a transaction.
            return Err(StoreError::unsupported(self.engine.name(), "transactions"));
        }

        let vertices: Vec<Key> = edges
            .iter()
            .flat_map(|edge| [edge.source, edge.target])
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut attempts = 0;
        loop {
            let mut txn = self.engine.txn_begin(Options::NONE)?;

            let places = PlacesArg::for_keys(&self.index, &vertices);
            let mut arena = Arena::with_capacity(vertices.len() * 64);
            let view = self
                .engine
                .read(Some(txn.as_mut()), &places, Options::NONE, &mut arena)?;
            let originals: Vec<Option<&[u8]>> =
                (0..vertices.len()).map(|i| view.value(i)).collect();
            let mut records: HashMap<Key, AdjRecord> = HashMap::with_capacity(vertices.len());
            for (i, &vertex) in vertices.iter().enumerate() {
                let record = match originals[i] {
                    Some(bytes) => AdjRecord::decode(bytes)?,
                    None => AdjRecord::new(),
                };
                records.insert(vertex, record);
            }

            for edge in edges.iter() {
                match op {
                    EdgeOp::Upsert => self.upsert_into(&mut records, edge)?,
                    EdgeOp::Remove => {
                        if let Some(record) = records.get_mut(&edge.source) {
                            record.remove(edge.target, edge.id);
                        }
                        if let Some(record) = records.get_mut(&edge.target) {
                            record.remove(edge.source, edge.id);
                        }
                    }
                }
            }

            // Write back only the records that actually changed: removing
            // an absent edge stays a pure no-op and touches nothing.
            let mut changed_keys = Vec::new();
            let mut changed_values = Vec::new();
            for (i, &vertex) in vertices.iter().enumerate() {
                let record = &records[&vertex];
                let encoded = record.encode();
                let unchanged = match originals[i] {
                    Some(bytes) => bytes == encoded.as_slice(),
                    None => record.is_empty(),
                };
                if !unchanged {
                    changed_keys.push(vertex);
                    changed_values.push(encoded);
                }
            }
            if changed_keys.is_empty() {
                return Ok(());
            }

            let values: Vec<Option<&[u8]>> = changed_values
                .iter()
                .map(|bytes| Some(bytes.as_slice()))
                .collect();
            let places = PlacesArg::for_keys(&self.index, &changed_keys);
            self.engine.write(
                Some(txn.as_mut()),
                &places,
                &ContentsArg::for_slices(&values),
                Options::NONE,
            )?;

            match self.engine.txn_commit(txn.as_mut(), Options::NONE) {
                Ok(seq) => {
                    tracing::trace!(seq = %seq, edges = edges.len(), "edge batch committed");
                    return Ok(());
                }
                Err(err) if err.kind() == ErrorKind::Conflict => {
                    attempts += 1;
                    if attempts >= MAX_COMMIT_RETRIES {
                        return Err(err);
                    }
                    tracing::debug!(attempts, "edge batch conflicted, retrying");
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn upsert_into(&self, records: &mut HashMap<Key, AdjRecord>, edge: Edge) -> Result<()> {
        if edge.is_loop() && !self.options.loops {
            return Err(StoreError::args("self-loops are disabled for this graph"));
        }

        let (role_source, role_target) = if self.options.directed {
            (Role::SOURCE, Role::TARGET)
        } else {
            (Role::ANY, Role::ANY)
        };

        if !self.options.multi {
            let existing = records
                .get(&edge.source)
                .map_or_else(Vec::new, |r| r.entries_towards(edge.target));
            // The exact same edge is an idempotent no-op; a different edge
            // between the same endpoints violates the no-multi rule.
            if existing.iter().any(|entry| entry.edge != edge.id) {
                return Err(StoreError::args(
                    "parallel edges are disabled for this graph",
                ));
            }
        }

        records
            .entry(edge.source)
            .or_default()
            .insert(AdjEntry::new(edge.target, edge.id, role_source));
        records
            .entry(edge.target)
            .or_default()
            .insert(AdjEntry::new(edge.source, edge.id, role_target));
        Ok(())
    }

    fn read_records(
        &self,
        txn: Option<&mut dyn EngineTransaction>,
        vertices: &[Key],
    ) -> Result<HashMap<Key, AdjRecord>> {
        let places = PlacesArg::for_keys(&self.index, vertices);
        let mut arena = Arena::with_capacity(vertices.len() * 64);
        let view = self.engine.read(txn, &places, Options::NONE, &mut arena)?;
        let mut records = HashMap::with_capacity(vertices.len());
        for (i, &vertex) in vertices.iter().enumerate() {
            let record = match view.value(i) {
                Some(bytes) => AdjRecord::decode(bytes)?,
                None => AdjRecord::new(),
            };
            records.insert(vertex, record);
        }
        Ok(records)
    }
}
