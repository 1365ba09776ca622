//! Adjacency record codec.
//!
//! The value stored under a vertex key is its adjacency record: a
//! count-prefixed list of `(neighbor, edge_id, role)` entries, kept sorted
//! by `(neighbor, edge_id)` so lookups are logarithmic and merges stable.
//! The role is a two-bit mask; inserting an entry that already exists ORs
//! the roles together, which is what makes undirected edges and repeated
//! upserts idempotent.
//!
//! Wire format, little-endian: `u32` entry count, then per entry
//! `i64 neighbor | i64 edge_id | u8 role`.

use omnikv_error::{Result, StoreError};
use omnikv_types::{Key, Role};

/// Encoded size of one entry.
const ENTRY_SIZE: usize = 8 + 8 + 1;

/// One incident edge as seen from a vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdjEntry {
    pub neighbor: Key,
    pub edge: Key,
    pub role: Role,
}

impl AdjEntry {
    #[must_use]
    pub const fn new(neighbor: Key, edge: Key, role: Role) -> Self {
        Self {
            neighbor,
            edge,
            role,
        }
    }

    fn sort_key(&self) -> (i64, i64) {
        (self.neighbor.get(), self.edge.get())
    }
}

/// A decoded adjacency record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdjRecord {
    entries: Vec<AdjEntry>,
}

impl AdjRecord {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn entries(&self) -> &[AdjEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Decode a record from its stored bytes.
    ///
    /// # Errors
    ///
    /// `corruption` on truncated input or an unsorted entry list.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 4 {
            return Err(StoreError::corruption("adjacency record shorter than header"));
        }
        let mut head = [0_u8; 4];
        head.copy_from_slice(&bytes[..4]);
        let count = u32::from_le_bytes(head) as usize;
        if bytes.len() != 4 + count * ENTRY_SIZE {
            return Err(StoreError::corruption(format!(
                "adjacency record length {} does not match {count} entries",
                bytes.len()
            )));
        }
        let mut entries = Vec::with_capacity(count);
        for chunk in bytes[4..].chunks_exact(ENTRY_SIZE) {
            let mut neighbor = [0_u8; 8];
            neighbor.copy_from_slice(&chunk[..8]);
            let mut edge = [0_u8; 8];
            edge.copy_from_slice(&chunk[8..16]);
            entries.push(AdjEntry {
                neighbor: Key::new(i64::from_le_bytes(neighbor)),
                edge: Key::new(i64::from_le_bytes(edge)),
                role: Role::from_bits(chunk[16]),
            });
        }
        if entries.windows(2).any(|w| w[0].sort_key() >= w[1].sort_key()) {
            return Err(StoreError::corruption("adjacency record is not sorted"));
        }
        Ok(Self { entries })
    }

    /// Encode to the stored byte form.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(4 + self.entries.len() * ENTRY_SIZE);
        bytes.extend_from_slice(&(self.entries.len() as u32).to_le_bytes());
        for entry in &self.entries {
            bytes.extend_from_slice(&entry.neighbor.get().to_le_bytes());
            bytes.extend_from_slice(&entry.edge.get().to_le_bytes());
            bytes.push(entry.role.bits());
        }
        bytes
    }

    /// Insert an entry, ORing roles when `(neighbor, edge)` already exists.
    /// Returns whether the record changed.
    pub fn insert(&mut self, entry: AdjEntry) -> bool {
        match self
            .entries
            .binary_search_by_key(&entry.sort_key(), AdjEntry::sort_key)
        {
            Ok(i) => {
                let merged = self.entries[i].role.union(entry.role);
                if merged == self.entries[i].role {
                    false
                } else {
                    self.entries[i].role = merged;
                    true
                }
            }
            Err(i) => {
                self.entries.insert(i, entry);
                true
            }
        }
    }

    /// Remove entries towards `neighbor`. With a concrete `edge` only the
    /// matching entry goes; with the unlabeled sentinel every entry towards
    /// that neighbor goes. Returns how many entries were removed.
    pub fn remove(&mut self, neighbor: Key, edge: Key) -> usize {
        let before = self.entries.len();
        if edge == Key::UNKNOWN {
            self.entries.retain(|entry| entry.neighbor != neighbor);
        } else {
            if let Ok(i) = self
                .entries
                .binary_search_by_key(&(neighbor.get(), edge.get()), AdjEntry::sort_key)
            {
                self.entries.remove(i);
            }
        }
        before - self.entries.len()
    }

    /// Whether any entry points at `neighbor`.
    #[must_use]
    pub fn has_neighbor(&self, neighbor: Key) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.neighbor == neighbor)
    }

    /// Entries towards `neighbor`, any edge id.
    #[must_use]
    pub fn entries_towards(&self, neighbor: Key) -> Vec<AdjEntry> {
        self.entries
            .iter()
            .copied()
            .filter(|entry| entry.neighbor == neighbor)
            .collect()
    }

    /// Count of entries whose role intersects `filter`.
    #[must_use]
    pub fn degree(&self, filter: Role) -> u32 {
        self.entries
            .iter()
            .filter(|entry| entry.role.matches(filter))
            .count() as u32
    }

    /// Neighbor keys of entries whose role intersects `filter`, in record
    /// order. May contain duplicates when several edges reach the same
    /// vertex.
    #[must_use]
    pub fn neighbors(&self, filter: Role) -> Vec<Key> {
        self.entries
            .iter()
            .filter(|entry| entry.role.matches(filter))
            .map(|entry| entry.neighbor)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(n: i64, e: i64, role: Role) -> AdjEntry {
        AdjEntry::new(Key::new(n), Key::new(e), role)
    }

    #[test]
    fn roundtrip_preserves_order() {
        let mut record = AdjRecord::new();
        record.insert(entry(5, 1, Role::SOURCE));
        record.insert(entry(2, 9, Role::TARGET));
        record.insert(entry(2, 3, Role::SOURCE));

        let decoded = AdjRecord::decode(&record.encode()).expect("decode");
        assert_eq!(decoded, record);
        let keys: Vec<(i64, i64)> = decoded
            .entries()
            .iter()
            .map(|e| (e.neighbor.get(), e.edge.get()))
            .collect();
        assert_eq!(keys, vec![(2, 3), (2, 9), (5, 1)]);
    }

    #[test]
    fn empty_record_roundtrip() {
        let record = AdjRecord::new();
        let bytes = record.encode();
        assert_eq!(bytes.len(), 4);
        assert!(AdjRecord::decode(&bytes).expect("decode").is_empty());
    }

    #[test]
    fn insert_is_idempotent_via_role_or() {
        let mut record = AdjRecord::new();
        assert!(record.insert(entry(2, 100, Role::SOURCE)));
        assert!(!record.insert(entry(2, 100, Role::SOURCE)));
        assert_eq!(record.len(), 1);

        // A second role on the same (neighbor, edge) merges.
        assert!(record.insert(entry(2, 100, Role::TARGET)));
        assert_eq!(record.len(), 1);
        assert_eq!(record.entries()[0].role, Role::ANY);
    }

    #[test]
    fn remove_specific_vs_all() {
        let mut record = AdjRecord::new();
        record.insert(entry(2, 100, Role::SOURCE));
        record.insert(entry(2, 101, Role::SOURCE));
        record.insert(entry(3, 100, Role::TARGET));

        assert_eq!(record.remove(Key::new(2), Key::new(100)), 1);
        assert_eq!(record.len(), 2);

        // Unlabeled removal takes every remaining edge towards 2.
        record.insert(entry(2, 100, Role::SOURCE));
        assert_eq!(record.remove(Key::new(2), Key::UNKNOWN), 2);
        assert_eq!(record.len(), 1);

        // Removing an absent edge is a no-op.
        assert_eq!(record.remove(Key::new(9), Key::UNKNOWN), 0);
    }

    #[test]
    fn degree_and_neighbors_filter_by_role() {
        let mut record = AdjRecord::new();
        record.insert(entry(2, 1, Role::SOURCE));
        record.insert(entry(3, 2, Role::TARGET));
        record.insert(entry(4, 3, Role::ANY));

        assert_eq!(record.degree(Role::ANY), 3);
        assert_eq!(record.degree(Role::SOURCE), 2);
        assert_eq!(record.degree(Role::TARGET), 2);
        assert_eq!(record.neighbors(Role::SOURCE), vec![Key::new(2), Key::new(4)]);
        assert_eq!(record.neighbors(Role::TARGET), vec![Key::new(3), Key::new(4)]);
    }

    #[test]
    fn corrupt_records_are_rejected() {
        assert!(AdjRecord::decode(&[1, 2]).is_err());

        let mut record = AdjRecord::new();
        record.insert(entry(1, 1, Role::SOURCE));
        let mut bytes = record.encode();
        bytes.pop();
        assert!(AdjRecord::decode(&bytes).is_err());

        // Unsorted payloads are invalid on disk.
        let mut unsorted = Vec::new();
        unsorted.extend_from_slice(&2_u32.to_le_bytes());
        for &(n, e) in &[(5_i64, 0_i64), (1, 0)] {
            unsorted.extend_from_slice(&n.to_le_bytes());
            unsorted.extend_from_slice(&e.to_le_bytes());
            unsorted.push(1);
        }
        assert!(AdjRecord::decode(&unsorted).is_err());
    }
}
