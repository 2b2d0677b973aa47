//! Fixed-capacity node pages.
//!
//! A node is the content of one page: up to `capacity` entries plus a count.
//! Leaf nodes hold row ids and are kept sorted by row id so deletes can
//! binary search; branch nodes hold child page pointers.

use crate::bounds::Bounds;

use super::rtree_config::page_size_for;
use super::rtree_constants::{ENTRY_SIZE, NODE_HEADER_SIZE};
use super::rtree_types::{Entry, NodePointer, PageKind, RowId, SpatialError, SpatialResult};

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    capacity: usize,
    entries: Vec<Entry>,
}

impl Node {
    /// A zeroed page with room for `capacity` entries
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Vec::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn entry(&self, idx: usize) -> Entry {
        self.entries[idx]
    }

    pub fn set(&mut self, idx: usize, entry: Entry) {
        self.entries[idx] = entry;
    }

    pub fn push(&mut self, entry: Entry) {
        debug_assert!(
            self.entries.len() < self.capacity,
            "push into a full node ({} entries)",
            self.capacity
        );
        self.entries.push(entry);
    }

    /// Inserts a leaf entry at its row id position.
    pub fn insert_by_row_id(&mut self, entry: Entry) {
        let row_id = entry.pointer.as_row_id().unwrap_or_default();
        let at = self
            .entries
            .partition_point(|e| e.pointer.as_row_id().unwrap_or_default() <= row_id);
        debug_assert!(self.entries.len() < self.capacity);
        self.entries.insert(at, entry);
    }

    /// O(1) removal; the last entry takes the freed slot.
    pub fn swap_remove(&mut self, idx: usize) -> Entry {
        self.entries.swap_remove(idx)
    }

    /// Order-preserving removal.
    pub fn compact_remove(&mut self, idx: usize) -> Entry {
        self.entries.remove(idx)
    }

    /// Moves every entry out, leaving the node empty.
    pub fn take_entries(&mut self) -> Vec<Entry> {
        let mut taken = Vec::with_capacity(self.capacity);
        taken.append(&mut self.entries);
        taken
    }

    /// Replaces the content with `entries`.
    pub fn fill(&mut self, entries: &[Entry]) {
        debug_assert!(entries.len() <= self.capacity);
        self.entries.clear();
        self.entries.extend_from_slice(entries);
    }

    pub fn sort_by_x_min(&mut self) {
        self.entries
            .sort_by(|a, b| a.bounds.min.x.total_cmp(&b.bounds.min.x));
    }

    pub fn sort_by_row_id(&mut self) {
        self.entries
            .sort_by_key(|e| e.pointer.as_row_id().unwrap_or_default());
    }

    /// Binary search for a row id in a leaf.
    pub fn find_row_id(&self, row_id: RowId) -> Option<usize> {
        self.entries
            .binary_search_by_key(&row_id, |e| e.pointer.as_row_id().unwrap_or_default())
            .ok()
    }

    /// Union of all entry bounds, the default box when empty.
    pub fn bounds(&self) -> Bounds {
        let mut result = Bounds::default();
        for entry in &self.entries {
            result.union(&entry.bounds);
        }
        result
    }

    /// Structural checks run after mutations in debug builds.
    pub fn verify(&self, kind: PageKind) {
        if cfg!(debug_assertions) {
            assert!(self.entries.len() <= self.capacity, "node over capacity");
            match kind {
                PageKind::Leaf => {
                    assert!(
                        self.entries
                            .iter()
                            .all(|e| matches!(e.pointer, NodePointer::RowId(_))),
                        "leaf holds a non row id entry"
                    );
                    assert!(
                        self.entries.windows(2).all(|w| {
                            w[0].pointer.as_row_id() <= w[1].pointer.as_row_id()
                        }),
                        "leaf is not sorted by row id"
                    );
                }
                PageKind::Branch => {
                    assert!(
                        self.entries
                            .iter()
                            .all(|e| matches!(e.pointer, NodePointer::Page(_))),
                        "branch holds a non page entry"
                    );
                }
            }
        }
    }

    /// Encodes the node into a page buffer of `page_size_for(capacity)`
    /// bytes: count, CRC32 of the entry region, then `capacity` slots with
    /// unused slots zeroed.
    pub fn encode_page(&self, buf: &mut [u8]) -> SpatialResult<()> {
        let page_size = page_size_for(self.capacity);
        if buf.len() != page_size {
            return Err(SpatialError::Serialization(format!(
                "page buffer is {} bytes, expected {}",
                buf.len(),
                page_size
            )));
        }
        buf.fill(0);
        for (slot, entry) in self.entries.iter().enumerate() {
            let at = NODE_HEADER_SIZE + slot * ENTRY_SIZE;
            entry.encode(&mut buf[at..at + ENTRY_SIZE]);
        }
        let checksum = crc32fast::hash(&buf[NODE_HEADER_SIZE..]);
        buf[0..4].copy_from_slice(&(self.entries.len() as u32).to_le_bytes());
        buf[4..8].copy_from_slice(&checksum.to_le_bytes());
        Ok(())
    }

    pub fn decode_page(buf: &[u8], capacity: usize) -> SpatialResult<Self> {
        let page_size = page_size_for(capacity);
        if buf.len() != page_size {
            return Err(SpatialError::Corrupted(format!(
                "page is {} bytes, expected {}",
                buf.len(),
                page_size
            )));
        }
        let count = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        let stored = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
        let computed = crc32fast::hash(&buf[NODE_HEADER_SIZE..]);
        if stored != computed {
            log::warn!(
                "Page checksum mismatch (expected: {:x}, got: {:x})",
                computed,
                stored
            );
            return Err(SpatialError::Corrupted(format!(
                "checksum mismatch (expected: {:x}, got: {:x})",
                computed, stored
            )));
        }
        if count > capacity {
            return Err(SpatialError::Corrupted(format!(
                "entry count {} exceeds capacity {}",
                count, capacity
            )));
        }

        let mut node = Node::new(capacity);
        for slot in 0..count {
            let at = NODE_HEADER_SIZE + slot * ENTRY_SIZE;
            let entry = Entry::decode(&buf[at..at + ENTRY_SIZE])?;
            if !entry.is_set() {
                return Err(SpatialError::Corrupted(format!(
                    "unset entry in occupied slot {}",
                    slot
                )));
            }
            node.entries.push(entry);
        }
        Ok(node)
    }
}
