//! Page allocation interface used by the tree engine.
//!
//! The engine never owns node memory directly. It asks a [`PageStore`] for
//! zeroed pages, dereferences them by handle for in-place mutation, and hands
//! them back when a subtree is dropped. A tree uses two stores, one for leaf
//! pages and one for branch pages.

use serde::{Deserialize, Serialize};

use super::rtree_config::page_size_for;
use super::rtree_node::Node;
use super::rtree_types::{PageHandle, PageStoreStats, SpatialError, SpatialResult};

/// Allocator bookkeeping persisted with the index metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocatorState {
    /// Handles below this value have been handed out at least once
    pub next_page: u64,
    /// Handles released and available for reuse
    pub free_pages: Vec<u64>,
}

pub trait PageStore {
    /// Entries per page
    fn capacity(&self) -> usize;

    /// Hands out an empty page.
    fn allocate(&mut self) -> SpatialResult<PageHandle>;

    /// Returns a page to the store. Freeing an unallocated handle is an
    /// integrity error.
    fn free(&mut self, handle: PageHandle) -> SpatialResult<()>;

    fn node(&mut self, handle: PageHandle) -> SpatialResult<&Node>;

    fn node_mut(&mut self, handle: PageHandle) -> SpatialResult<&mut Node>;

    fn allocator_state(&self) -> AllocatorState;

    /// Reinstates allocator bookkeeping captured by [`allocator_state`].
    ///
    /// [`allocator_state`]: PageStore::allocator_state
    fn restore(&mut self, state: &AllocatorState) -> SpatialResult<()>;

    /// Number of live (allocated, not freed) pages
    fn page_count(&self) -> u64;

    /// Bytes of node pages currently held in memory
    fn in_memory_size(&self) -> usize;

    /// Makes every change durable. A no-op for volatile stores.
    fn flush(&mut self) -> SpatialResult<()> {
        Ok(())
    }

    fn stats(&self) -> PageStoreStats {
        PageStoreStats::default()
    }
}

/// Volatile page store: a slab of nodes plus a free list.
#[derive(Debug)]
pub struct MemoryPageStore {
    capacity: usize,
    pages: Vec<Option<Node>>,
    free_pages: Vec<u64>,
}

impl MemoryPageStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            pages: Vec::new(),
            free_pages: Vec::new(),
        }
    }

    fn slot(&self, handle: PageHandle) -> SpatialResult<usize> {
        let idx = handle.get() as usize;
        match self.pages.get(idx) {
            Some(Some(_)) => Ok(idx),
            _ => Err(SpatialError::Integrity(format!(
                "dangling page handle {}",
                handle.get()
            ))),
        }
    }
}

impl PageStore for MemoryPageStore {
    fn capacity(&self) -> usize {
        self.capacity
    }

    fn allocate(&mut self) -> SpatialResult<PageHandle> {
        if let Some(idx) = self.free_pages.pop() {
            self.pages[idx as usize] = Some(Node::new(self.capacity));
            return PageHandle::new(idx);
        }
        let handle = PageHandle::new(self.pages.len() as u64)?;
        self.pages.push(Some(Node::new(self.capacity)));
        Ok(handle)
    }

    fn free(&mut self, handle: PageHandle) -> SpatialResult<()> {
        let idx = self.slot(handle)?;
        self.pages[idx] = None;
        self.free_pages.push(handle.get());
        Ok(())
    }

    fn node(&mut self, handle: PageHandle) -> SpatialResult<&Node> {
        let idx = self.slot(handle)?;
        self.pages[idx]
            .as_ref()
            .ok_or_else(|| SpatialError::Integrity(format!("dangling page handle {}", idx)))
    }

    fn node_mut(&mut self, handle: PageHandle) -> SpatialResult<&mut Node> {
        let idx = self.slot(handle)?;
        self.pages[idx]
            .as_mut()
            .ok_or_else(|| SpatialError::Integrity(format!("dangling page handle {}", idx)))
    }

    fn allocator_state(&self) -> AllocatorState {
        AllocatorState {
            next_page: self.pages.len() as u64,
            free_pages: self.free_pages.clone(),
        }
    }

    fn restore(&mut self, state: &AllocatorState) -> SpatialResult<()> {
        if state.next_page as usize > self.pages.len() {
            return Err(SpatialError::Integrity(format!(
                "allocator state references {} pages but the store holds {}",
                state.next_page,
                self.pages.len()
            )));
        }
        self.pages.truncate(state.next_page as usize);
        for &idx in &state.free_pages {
            match self.pages.get_mut(idx as usize) {
                Some(slot) => *slot = None,
                None => {
                    return Err(SpatialError::Integrity(format!(
                        "free page {} is beyond the allocated range",
                        idx
                    )))
                }
            }
        }
        self.free_pages = state.free_pages.clone();
        Ok(())
    }

    fn page_count(&self) -> u64 {
        (self.pages.len() - self.free_pages.len()) as u64
    }

    fn in_memory_size(&self) -> usize {
        self.page_count() as usize * page_size_for(self.capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounds::Bounds;
    use crate::rtree::rtree_types::Entry;

    #[test]
    fn test_allocate_returns_empty_pages() {
        let mut store = MemoryPageStore::new(4);
        let a = store.allocate().unwrap();
        let b = store.allocate().unwrap();
        assert_ne!(a, b);
        assert!(store.node(a).unwrap().is_empty());
        assert_eq!(store.node(b).unwrap().capacity(), 4);
        assert_eq!(store.page_count(), 2);
    }

    #[test]
    fn test_free_and_reuse() {
        let mut store = MemoryPageStore::new(4);
        let a = store.allocate().unwrap();
        store
            .node_mut(a)
            .unwrap()
            .push(Entry::row(Bounds::new(0.0, 0.0, 1.0, 1.0), 1));
        store.free(a).unwrap();
        assert_eq!(store.page_count(), 0);

        let b = store.allocate().unwrap();
        assert_eq!(a, b);
        assert!(store.node(b).unwrap().is_empty(), "reused page must be zeroed");
    }

    #[test]
    fn test_double_free_is_integrity_error() {
        let mut store = MemoryPageStore::new(4);
        let a = store.allocate().unwrap();
        store.free(a).unwrap();
        assert!(matches!(store.free(a), Err(SpatialError::Integrity(_))));
        assert!(store.node(a).is_err());
    }

    #[test]
    fn test_allocator_state_restore() {
        let mut store = MemoryPageStore::new(4);
        let a = store.allocate().unwrap();
        let _b = store.allocate().unwrap();
        store.free(a).unwrap();
        let state = store.allocator_state();
        assert_eq!(state.next_page, 2);
        assert_eq!(state.free_pages, vec![a.get()]);

        let _c = store.allocate().unwrap();
        let _d = store.allocate().unwrap();
        store.restore(&state).unwrap();
        assert_eq!(store.page_count(), 1);
        assert_eq!(store.allocator_state(), state);
    }

    #[test]
    fn test_in_memory_size() {
        let mut store = MemoryPageStore::new(4);
        assert_eq!(store.in_memory_size(), 0);
        let a = store.allocate().unwrap();
        let b = store.allocate().unwrap();
        assert_eq!(store.in_memory_size(), 2 * page_size_for(4));

        store.free(a).unwrap();
        assert_eq!(store.in_memory_size(), page_size_for(4));
        store.free(b).unwrap();
        assert_eq!(store.page_count(), 0);
        assert_eq!(store.in_memory_size(), 0);
    }
}
