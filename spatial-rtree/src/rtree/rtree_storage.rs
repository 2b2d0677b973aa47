//! File-backed page store.
//!
//! Each page pool lives in its own file: a fixed header followed by
//! fixed-size node pages. Pages are read one at a time on demand through an
//! LRU cache of decoded nodes. [`PageStore::flush`] is the only point at
//! which pages referenced by the previously flushed state are overwritten.

use std::collections::{HashMap, HashSet};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::page_store::{AllocatorState, PageStore};
use super::rtree_cache::PageCache;
use super::rtree_config::page_size_for;
use super::rtree_constants::{
    DEFAULT_CACHE_PAGES, FILE_HEADER_SIZE, MAGIC, MAX_ALLOWED_NODE_CAPACITY,
    MIN_ALLOWED_NODE_CAPACITY, VERSION,
};
use super::rtree_node::Node;
use super::rtree_types::{PageHandle, PageStoreStats, SpatialError, SpatialResult};

// ============================================================================
// File Header
// ============================================================================

/// Header stored in the first bytes of a page file
#[derive(Debug, Clone, PartialEq)]
pub struct FileHeader {
    pub magic: u32,
    pub version: u32,
    pub page_size: u32,
    pub capacity: u32,
    pub next_page: u64,
}

impl FileHeader {
    pub fn new(capacity: usize) -> Self {
        Self {
            magic: MAGIC,
            version: VERSION,
            page_size: page_size_for(capacity) as u32,
            capacity: capacity as u32,
            next_page: 0,
        }
    }

    pub fn validate(&self) -> SpatialResult<()> {
        if self.magic != MAGIC {
            return Err(SpatialError::Corrupted(
                "Invalid file format (bad magic)".into(),
            ));
        }
        if self.version != VERSION {
            return Err(SpatialError::Corrupted(format!(
                "Unsupported file format version {}",
                self.version
            )));
        }
        let capacity = self.capacity as usize;
        if !(MIN_ALLOWED_NODE_CAPACITY..=MAX_ALLOWED_NODE_CAPACITY).contains(&capacity)
            || self.page_size as usize != page_size_for(capacity)
        {
            return Err(SpatialError::Corrupted(format!(
                "Inconsistent page geometry: capacity {}, page size {}",
                self.capacity, self.page_size
            )));
        }
        Ok(())
    }

    fn encode(&self) -> [u8; FILE_HEADER_SIZE] {
        let mut buf = [0u8; FILE_HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.magic.to_le_bytes());
        buf[4..8].copy_from_slice(&self.version.to_le_bytes());
        buf[8..12].copy_from_slice(&self.page_size.to_le_bytes());
        buf[12..16].copy_from_slice(&self.capacity.to_le_bytes());
        buf[16..24].copy_from_slice(&self.next_page.to_le_bytes());
        buf
    }

    fn decode(buf: &[u8; FILE_HEADER_SIZE]) -> Self {
        let u32_at = |at: usize| u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);
        let mut next_page = [0u8; 8];
        next_page.copy_from_slice(&buf[16..24]);
        Self {
            magic: u32_at(0),
            version: u32_at(4),
            page_size: u32_at(8),
            capacity: u32_at(12),
            next_page: u64::from_le_bytes(next_page),
        }
    }
}

// ============================================================================
// Storage
// ============================================================================

/// Reads and writes individual pages of a page file. Each `read_page` call
/// is exactly one seek and one read.
pub struct Storage {
    file: File,
    path: PathBuf,
    capacity: usize,
    page_size: usize,
}

impl Storage {
    /// Create a new page file, truncating any existing one
    pub fn create(path: &Path, capacity: usize) -> SpatialResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        let mut storage = Self {
            file,
            path: path.to_path_buf(),
            capacity,
            page_size: page_size_for(capacity),
        };
        storage.write_header(&FileHeader::new(capacity))?;
        Ok(storage)
    }

    /// Open an existing page file, returning it with its header
    pub fn open(path: &Path) -> SpatialResult<(Self, FileHeader)> {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;

        let mut buf = [0u8; FILE_HEADER_SIZE];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut buf)?;
        let header = FileHeader::decode(&buf);
        header.validate()?;

        let capacity = header.capacity as usize;
        Ok((
            Self {
                file,
                path: path.to_path_buf(),
                capacity,
                page_size: page_size_for(capacity),
            },
            header,
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_header(&mut self, header: &FileHeader) -> SpatialResult<()> {
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&header.encode())?;
        Ok(())
    }

    fn offset(&self, page_id: u64) -> u64 {
        FILE_HEADER_SIZE as u64 + page_id * self.page_size as u64
    }

    pub fn read_page(&mut self, page_id: u64) -> SpatialResult<Node> {
        let offset = self.offset(page_id);
        self.file.seek(SeekFrom::Start(offset))?;
        let mut buffer = vec![0u8; self.page_size];
        self.file.read_exact(&mut buffer)?;
        Node::decode_page(&buffer, self.capacity)
            .map_err(|e| SpatialError::Corrupted(format!("page {}: {}", page_id, e)))
    }

    pub fn write_page(&mut self, page_id: u64, node: &Node) -> SpatialResult<()> {
        let mut buffer = vec![0u8; self.page_size];
        node.encode_page(&mut buffer)?;
        let offset = self.offset(page_id);
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(&buffer)?;
        Ok(())
    }

    /// Sync file to disk
    pub fn sync(&mut self) -> SpatialResult<()> {
        self.file.sync_all()?;
        Ok(())
    }
}

// ============================================================================
// File Page Store
// ============================================================================

/// Page store persisting nodes in a page file.
///
/// Nothing reaches disk that the last flush's allocator state still relies
/// on: pages live at that point are never rewritten in place until the next
/// [`PageStore::flush`], and pages freed since then are only handed out
/// again after it. Dirty pages in that set which fall out of the cache are
/// held in `pinned` instead of being written back. Changes that are never
/// flushed are simply lost.
pub struct FilePageStore {
    storage: Storage,
    cache: PageCache,
    pinned: HashMap<u64, Node>,
    next_page: u64,
    free_pages: Vec<u64>,
    /// Freed since the last flush, reusable after the next one
    pending_free: Vec<u64>,
    free_set: HashSet<u64>,
    durable_next_page: u64,
    durable_free: HashSet<u64>,
    stats: PageStoreStats,
}

impl FilePageStore {
    /// Create an empty page file for nodes of `capacity` entries.
    pub fn create(path: impl AsRef<Path>, capacity: usize) -> SpatialResult<Self> {
        Self::create_with_cache_size(path, capacity, DEFAULT_CACHE_PAGES)
    }

    pub fn create_with_cache_size(
        path: impl AsRef<Path>,
        capacity: usize,
        cache_pages: usize,
    ) -> SpatialResult<Self> {
        let mut storage = Storage::create(path.as_ref(), capacity)?;
        storage.sync()?;
        log::debug!("Created page file at {:?}", path.as_ref());
        Ok(Self::with_storage(storage, cache_pages, 0))
    }

    /// Open an existing page file.
    ///
    /// Only the header is read. Free pages are known after the owning index
    /// restores its allocator state.
    pub fn open(path: impl AsRef<Path>) -> SpatialResult<Self> {
        Self::open_with_cache_size(path, DEFAULT_CACHE_PAGES)
    }

    pub fn open_with_cache_size(path: impl AsRef<Path>, cache_pages: usize) -> SpatialResult<Self> {
        let (storage, header) = Storage::open(path.as_ref())?;
        log::debug!(
            "Opened page file at {:?} ({} pages)",
            path.as_ref(),
            header.next_page
        );
        Ok(Self::with_storage(storage, cache_pages, header.next_page))
    }

    fn with_storage(storage: Storage, cache_pages: usize, next_page: u64) -> Self {
        Self {
            storage,
            cache: PageCache::new(cache_pages),
            pinned: HashMap::new(),
            next_page,
            free_pages: Vec::new(),
            pending_free: Vec::new(),
            free_set: HashSet::new(),
            durable_next_page: next_page,
            durable_free: HashSet::new(),
            stats: PageStoreStats::default(),
        }
    }

    pub fn path(&self) -> &Path {
        self.storage.path()
    }

    /// Pages modified since the last flush that had to leave the cache
    pub fn pinned_pages(&self) -> usize {
        self.pinned.len()
    }

    fn check_live(&self, handle: PageHandle) -> SpatialResult<u64> {
        let page_id = handle.get();
        if page_id >= self.next_page || self.free_set.contains(&page_id) {
            return Err(SpatialError::Integrity(format!(
                "dangling page handle {}",
                page_id
            )));
        }
        Ok(page_id)
    }

    /// Whether the last flushed state references this page.
    fn is_durable(&self, page_id: u64) -> bool {
        page_id < self.durable_next_page && !self.durable_free.contains(&page_id)
    }

    /// Makes sure the page is cached, loading it from disk on a miss.
    fn load(&mut self, page_id: u64) -> SpatialResult<()> {
        if self.cache.contains(page_id) {
            self.stats.cache_hits += 1;
            return Ok(());
        }
        self.stats.cache_misses += 1;
        if let Some(node) = self.pinned.remove(&page_id) {
            return self.cache_node(page_id, node, true);
        }
        self.stats.disk_reads += 1;
        let node = self.storage.read_page(page_id)?;
        self.cache_node(page_id, node, false)
    }

    /// Adds a node to the cache. An evicted dirty page is written out, or
    /// pinned when the flushed state still references its slot.
    fn cache_node(&mut self, page_id: u64, node: Node, dirty: bool) -> SpatialResult<()> {
        if let Some(evicted) = self.cache.insert(page_id, node, dirty) {
            if !evicted.dirty {
                return Ok(());
            }
            if self.is_durable(evicted.page_id) {
                self.pinned.insert(evicted.page_id, evicted.node);
            } else {
                self.storage.write_page(evicted.page_id, &evicted.node)?;
                self.stats.disk_writes += 1;
            }
        }
        Ok(())
    }

    fn missing(page_id: u64) -> SpatialError {
        SpatialError::Integrity(format!("page {} vanished from the cache", page_id))
    }
}

impl PageStore for FilePageStore {
    fn capacity(&self) -> usize {
        self.storage.capacity
    }

    fn allocate(&mut self) -> SpatialResult<PageHandle> {
        let page_id = match self.free_pages.pop() {
            Some(page_id) => {
                self.free_set.remove(&page_id);
                page_id
            }
            None => {
                let page_id = self.next_page;
                self.next_page += 1;
                page_id
            }
        };
        let handle = PageHandle::new(page_id)?;
        let capacity = self.storage.capacity;
        self.cache_node(page_id, Node::new(capacity), true)?;
        Ok(handle)
    }

    fn free(&mut self, handle: PageHandle) -> SpatialResult<()> {
        let page_id = self.check_live(handle)?;
        self.cache.remove(page_id);
        self.pinned.remove(&page_id);
        if self.is_durable(page_id) {
            self.pending_free.push(page_id);
        } else {
            self.free_pages.push(page_id);
        }
        self.free_set.insert(page_id);
        Ok(())
    }

    fn node(&mut self, handle: PageHandle) -> SpatialResult<&Node> {
        let page_id = self.check_live(handle)?;
        self.load(page_id)?;
        self.cache.get(page_id).ok_or_else(|| Self::missing(page_id))
    }

    fn node_mut(&mut self, handle: PageHandle) -> SpatialResult<&mut Node> {
        let page_id = self.check_live(handle)?;
        self.load(page_id)?;
        self.cache
            .get_mut(page_id)
            .ok_or_else(|| Self::missing(page_id))
    }

    fn allocator_state(&self) -> AllocatorState {
        let mut free_pages = self.free_pages.clone();
        free_pages.extend_from_slice(&self.pending_free);
        AllocatorState {
            next_page: self.next_page,
            free_pages,
        }
    }

    /// Returns to a flushed allocator state, discarding unflushed pages.
    fn restore(&mut self, state: &AllocatorState) -> SpatialResult<()> {
        if let Some(bad) = state.free_pages.iter().find(|p| **p >= state.next_page) {
            return Err(SpatialError::Integrity(format!(
                "free page {} is beyond the allocated range {}",
                bad, state.next_page
            )));
        }
        self.cache.clear();
        self.pinned.clear();
        self.next_page = state.next_page;
        self.free_pages = state.free_pages.clone();
        self.pending_free.clear();
        self.free_set = state.free_pages.iter().copied().collect();
        self.durable_next_page = state.next_page;
        self.durable_free = self.free_set.clone();
        Ok(())
    }

    fn page_count(&self) -> u64 {
        self.next_page - self.free_set.len() as u64
    }

    fn in_memory_size(&self) -> usize {
        (self.cache.len() + self.pinned.len()) * self.storage.page_size
    }

    fn flush(&mut self) -> SpatialResult<()> {
        let mut pinned: Vec<u64> = self.pinned.keys().copied().collect();
        pinned.sort_unstable();
        for page_id in pinned {
            if let Some(node) = self.pinned.get(&page_id) {
                self.storage.write_page(page_id, node)?;
                self.stats.disk_writes += 1;
            }
            self.pinned.remove(&page_id);
        }
        for page_id in self.cache.dirty_pages() {
            if let Some(cached) = self.cache.peek(page_id) {
                self.storage.write_page(page_id, &cached.node)?;
                self.stats.disk_writes += 1;
            }
            self.cache.mark_clean(page_id);
        }

        let mut header = FileHeader::new(self.storage.capacity);
        header.next_page = self.next_page;
        self.storage.write_header(&header)?;
        self.storage.sync()?;

        self.free_pages.append(&mut self.pending_free);
        self.durable_next_page = self.next_page;
        self.durable_free = self.free_set.clone();
        Ok(())
    }

    fn stats(&self) -> PageStoreStats {
        PageStoreStats {
            cached_pages: self.cache.len() as u64,
            ..self.stats.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounds::Bounds;
    use crate::rtree::rtree_types::Entry;
    use tempfile::tempdir;

    fn row(id: i64) -> Entry {
        let x = id as f32;
        Entry::row(Bounds::new(x, x, x + 1.0, x + 1.0), id)
    }

    #[test]
    fn test_storage_create() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("leaf.pages");
        let _store = FilePageStore::create(&path, 8).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_storage_page_write_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("leaf.pages");
        let mut storage = Storage::create(&path, 4).unwrap();

        let mut node = Node::new(4);
        node.push(row(1));
        storage.write_page(0, &node).unwrap();
        storage.write_page(3, &Node::new(4)).unwrap();

        assert_eq!(storage.read_page(0).unwrap(), node);
        assert!(storage.read_page(3).unwrap().is_empty());
    }

    #[test]
    fn test_open_rejects_bad_magic() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("junk.pages");
        std::fs::write(&path, vec![0xAB; FILE_HEADER_SIZE]).unwrap();
        let result = FilePageStore::open(&path);
        assert!(matches!(result, Err(SpatialError::Corrupted(_))));
    }

    #[test]
    fn test_pages_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("leaf.pages");

        let (handle, state) = {
            let mut store = FilePageStore::create(&path, 4).unwrap();
            let handle = store.allocate().unwrap();
            store.node_mut(handle).unwrap().push(row(7));
            store.flush().unwrap();
            (handle, store.allocator_state())
        };

        let mut store = FilePageStore::open(&path).unwrap();
        store.restore(&state).unwrap();
        assert_eq!(store.capacity(), 4);
        assert_eq!(store.stats().cached_pages, 0, "open must not preload pages");
        let node = store.node(handle).unwrap();
        assert_eq!(node.entries(), &[row(7)]);
        assert_eq!(store.stats().disk_reads, 1);
    }

    #[test]
    fn test_eviction_writes_dirty_pages() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("leaf.pages");
        let mut store = FilePageStore::create_with_cache_size(&path, 4, 2).unwrap();

        let handles: Vec<_> = (0..5).map(|_| store.allocate().unwrap()).collect();
        for (i, handle) in handles.iter().enumerate() {
            store.node_mut(*handle).unwrap().push(row(i as i64));
        }
        assert!(store.stats().cached_pages <= 2);
        assert!(store.stats().disk_writes > 0);

        for (i, handle) in handles.iter().enumerate() {
            assert_eq!(store.node(*handle).unwrap().entries(), &[row(i as i64)]);
        }
        assert!(store.stats().cache_misses > 0);
    }

    #[test]
    fn test_free_list_reuse_and_double_free() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("branch.pages");
        let mut store = FilePageStore::create(&path, 4).unwrap();

        let a = store.allocate().unwrap();
        let _b = store.allocate().unwrap();
        store.free(a).unwrap();
        assert_eq!(store.page_count(), 1);
        assert!(matches!(store.free(a), Err(SpatialError::Integrity(_))));
        assert!(store.node(a).is_err());

        let c = store.allocate().unwrap();
        assert_eq!(a, c);
        assert!(store.node(c).unwrap().is_empty());
    }

    #[test]
    fn test_flushed_pages_are_not_overwritten_before_flush() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("leaf.pages");
        let mut store = FilePageStore::create_with_cache_size(&path, 4, 2).unwrap();

        let handles: Vec<_> = (0..3).map(|_| store.allocate().unwrap()).collect();
        for (i, handle) in handles.iter().enumerate() {
            store.node_mut(*handle).unwrap().push(row(i as i64));
        }
        store.flush().unwrap();
        let state = store.allocator_state();
        let flushed = std::fs::read(&path).unwrap();
        let writes = store.stats().disk_writes;

        for (i, handle) in handles.iter().enumerate() {
            store.node_mut(*handle).unwrap().push(row(10 + i as i64));
        }
        assert!(store.pinned_pages() > 0);
        assert_eq!(store.stats().disk_writes, writes);
        assert_eq!(std::fs::read(&path).unwrap(), flushed);
        for (i, handle) in handles.iter().enumerate() {
            assert_eq!(
                store.node(*handle).unwrap().entries(),
                &[row(i as i64), row(10 + i as i64)]
            );
        }

        // a reopen without another flush sees the flushed pages
        let mut reopened = FilePageStore::open(&path).unwrap();
        reopened.restore(&state).unwrap();
        assert_eq!(reopened.node(handles[2]).unwrap().entries(), &[row(2)]);

        store.flush().unwrap();
        assert_eq!(store.pinned_pages(), 0);
        let mut reopened = FilePageStore::open(&path).unwrap();
        reopened.restore(&store.allocator_state()).unwrap();
        assert_eq!(
            reopened.node(handles[2]).unwrap().entries(),
            &[row(2), row(12)]
        );
    }

    #[test]
    fn test_freed_flushed_page_is_reused_after_flush() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("branch.pages");
        let mut store = FilePageStore::create(&path, 4).unwrap();

        let a = store.allocate().unwrap();
        let _b = store.allocate().unwrap();
        store.flush().unwrap();

        store.free(a).unwrap();
        assert!(store.node(a).is_err());
        let c = store.allocate().unwrap();
        assert_ne!(a, c);
        assert_eq!(store.page_count(), 2);
        assert_eq!(store.allocator_state().free_pages, vec![a.get()]);

        store.flush().unwrap();
        let d = store.allocate().unwrap();
        assert_eq!(a, d);
        assert!(store.node(d).unwrap().is_empty());
    }

    #[test]
    fn test_restore_rejects_out_of_range_free_page() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("leaf.pages");
        let mut store = FilePageStore::create(&path, 4).unwrap();
        let state = AllocatorState {
            next_page: 2,
            free_pages: vec![5],
        };
        assert!(store.restore(&state).is_err());
    }

    #[test]
    fn test_checksum_verification_on_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("leaf.pages");
        {
            let mut storage = Storage::create(&path, 4).unwrap();
            let mut node = Node::new(4);
            node.push(row(1));
            storage.write_page(0, &node).unwrap();
            storage.sync().unwrap();
        }

        let mut bytes = std::fs::read(&path).unwrap();
        bytes[FILE_HEADER_SIZE + 20] ^= 0x55;
        std::fs::write(&path, bytes).unwrap();

        let (mut storage, _) = Storage::open(&path).unwrap();
        assert!(matches!(
            storage.read_page(0),
            Err(SpatialError::Corrupted(_))
        ));
    }
}
