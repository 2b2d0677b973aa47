//! LRU cache for decoded R-Tree pages.
//!
//! File-backed page stores keep recently used nodes decoded in memory.
//! Pages are loaded only when first accessed; dirty pages are handed back
//! to the caller on eviction so they can be written out.

use std::num::NonZeroUsize;

use lru::LruCache;

use super::rtree_node::Node;

/// A cached page with its data and dirty flag
pub struct CachedPage {
    pub node: Node,
    pub dirty: bool,
}

/// A page pushed out of the cache
pub struct EvictedPage {
    pub page_id: u64,
    pub node: Node,
    pub dirty: bool,
}

pub struct PageCache {
    pages: LruCache<u64, CachedPage>,
}

impl PageCache {
    /// Create a new page cache holding at most `max_pages` pages
    pub fn new(max_pages: usize) -> Self {
        let max_pages = NonZeroUsize::new(max_pages.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            pages: LruCache::new(max_pages),
        }
    }

    pub fn get(&mut self, page_id: u64) -> Option<&Node> {
        self.pages.get(&page_id).map(|cached| &cached.node)
    }

    /// Get a mutable reference to a page, marking it dirty
    pub fn get_mut(&mut self, page_id: u64) -> Option<&mut Node> {
        let cached = self.pages.get_mut(&page_id)?;
        cached.dirty = true;
        Some(&mut cached.node)
    }

    /// Inserts a page, returning the least recently used page if the cache
    /// was full.
    pub fn insert(&mut self, page_id: u64, node: Node, dirty: bool) -> Option<EvictedPage> {
        match self.pages.push(page_id, CachedPage { node, dirty }) {
            Some((evicted_id, cached)) if evicted_id != page_id => Some(EvictedPage {
                page_id: evicted_id,
                node: cached.node,
                dirty: cached.dirty,
            }),
            _ => None,
        }
    }

    pub fn remove(&mut self, page_id: u64) -> Option<CachedPage> {
        self.pages.pop(&page_id)
    }

    /// Ids of all dirty pages, for flushing
    pub fn dirty_pages(&self) -> Vec<u64> {
        self.pages
            .iter()
            .filter(|(_, cached)| cached.dirty)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Looks at a page without touching LRU order.
    pub fn peek(&self, page_id: u64) -> Option<&CachedPage> {
        self.pages.peek(&page_id)
    }

    pub fn mark_clean(&mut self, page_id: u64) {
        if let Some(cached) = self.pages.peek_mut(&page_id) {
            cached.dirty = false;
        }
    }

    pub fn contains(&self, page_id: u64) -> bool {
        self.pages.contains(&page_id)
    }

    pub fn clear(&mut self) {
        self.pages.clear();
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_cache_new() {
        let cache = PageCache::new(10);
        assert_eq!(cache.len(), 0);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_page_cache_insert_and_get() {
        let mut cache = PageCache::new(10);
        assert!(cache.insert(1, Node::new(4), false).is_none());
        assert!(cache.contains(1));
        assert!(cache.get(1).is_some());
        assert!(cache.get(2).is_none());
    }

    #[test]
    fn test_page_cache_get_mut_marks_dirty() {
        let mut cache = PageCache::new(10);
        cache.insert(1, Node::new(4), false);
        assert!(cache.dirty_pages().is_empty());
        assert!(cache.get_mut(1).is_some());
        assert_eq!(cache.dirty_pages(), vec![1]);
        cache.mark_clean(1);
        assert!(cache.dirty_pages().is_empty());
    }

    #[test]
    fn test_page_cache_evicts_least_recent() {
        let mut cache = PageCache::new(2);
        cache.insert(1, Node::new(4), true);
        cache.insert(2, Node::new(4), false);
        // touch 1 so 2 becomes the oldest
        cache.get(1);
        let evicted = cache.insert(3, Node::new(4), false).unwrap();
        assert_eq!(evicted.page_id, 2);
        assert!(!evicted.dirty);

        let evicted = cache.insert(4, Node::new(4), false).unwrap();
        assert_eq!(evicted.page_id, 1);
        assert!(evicted.dirty);
    }

    #[test]
    fn test_page_cache_reinsert_same_id_is_not_eviction() {
        let mut cache = PageCache::new(1);
        cache.insert(1, Node::new(4), true);
        assert!(cache.insert(1, Node::new(4), false).is_none());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_page_cache_remove() {
        let mut cache = PageCache::new(10);
        cache.insert(1, Node::new(4), true);
        let removed = cache.remove(1).unwrap();
        assert!(removed.dirty);
        assert!(!cache.contains(1));
        cache.insert(2, Node::new(4), true);
        cache.clear();
        assert!(cache.is_empty());
    }
}
