//! Lock-protected handle to an [`RTree`] for use across threads.

use std::path::Path;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::bounds::Bounds;
use crate::spatial_index::SpatialIndex;

use super::page_store::PageStore;
use super::rtree_impl::RTree;
use super::rtree_types::{RowId, SpatialResult};

/// Cloneable handle that serializes every call through one mutex.
///
/// ```
/// use spatial_rtree::{Bounds, RTree, RTreeConfig, SharedRTree, SpatialIndex};
///
/// let index = SharedRTree::new(RTree::in_memory(RTreeConfig::default()).unwrap());
/// index.add(&Bounds::new(0.0, 0.0, 10.0, 10.0), 1).unwrap();
/// let hits = index
///     .find_intersecting_keys(&Bounds::new(5.0, 5.0, 15.0, 15.0))
///     .unwrap();
/// assert_eq!(hits, vec![1]);
/// ```
pub struct SharedRTree<S: PageStore> {
    inner: Arc<Mutex<RTree<S>>>,
}

impl<S: PageStore> Clone for SharedRTree<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: PageStore> SharedRTree<S> {
    pub fn new(tree: RTree<S>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(tree)),
        }
    }

    /// Exclusive access to the tree for operations outside
    /// [`SpatialIndex`], such as scans and diagnostics.
    pub fn lock(&self) -> MutexGuard<'_, RTree<S>> {
        self.inner.lock()
    }

    pub fn checkpoint(&self, path: impl AsRef<Path>) -> SpatialResult<()> {
        self.inner.lock().checkpoint(path)
    }
}

impl<S: PageStore + Send> SpatialIndex for SharedRTree<S> {
    fn add(&self, key: &Bounds, row_id: RowId) -> SpatialResult<()> {
        self.inner.lock().insert(*key, row_id)
    }

    fn remove(&self, key: &Bounds, row_id: RowId) -> SpatialResult<bool> {
        self.inner.lock().delete(*key, row_id)
    }

    fn find_intersecting_keys(&self, key: &Bounds) -> SpatialResult<Vec<RowId>> {
        self.inner.lock().query(key)
    }

    fn find_contained_keys(&self, key: &Bounds) -> SpatialResult<Vec<RowId>> {
        self.inner.lock().find_contained(key)
    }

    fn size(&self) -> u64 {
        self.inner.lock().len()
    }

    fn clear(&self) -> SpatialResult<()> {
        self.inner.lock().reset()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtree::page_store::MemoryPageStore;
    use crate::rtree::rtree_config::RTreeConfig;
    use crate::rtree::rtree_storage::FilePageStore;
    use std::thread;
    use tempfile::tempdir;

    fn shared(max: usize) -> SharedRTree<MemoryPageStore> {
        SharedRTree::new(RTree::in_memory(RTreeConfig::new(max)).unwrap())
    }

    #[test]
    fn test_add_find_remove() {
        let index = shared(4);
        index.add(&Bounds::new(0.0, 0.0, 10.0, 10.0), 1).unwrap();
        index.add(&Bounds::new(20.0, 20.0, 30.0, 30.0), 2).unwrap();
        assert_eq!(index.size(), 2);

        let query = Bounds::new(5.0, 5.0, 25.0, 25.0);
        let mut hits = index.find_intersecting_keys(&query).unwrap();
        hits.sort_unstable();
        assert_eq!(hits, vec![1, 2]);
        assert!(index.find_contained_keys(&query).unwrap().is_empty());

        assert!(index.remove(&Bounds::new(0.0, 0.0, 10.0, 10.0), 1).unwrap());
        assert!(!index.remove(&Bounds::new(0.0, 0.0, 10.0, 10.0), 1).unwrap());
        assert_eq!(index.find_intersecting_keys(&query).unwrap(), vec![2]);
    }

    #[test]
    fn test_clear() {
        let index = shared(4);
        for id in 0..20 {
            let x = id as f32;
            index.add(&Bounds::new(x, x, x + 1.0, x + 1.0), id).unwrap();
        }
        index.clear().unwrap();
        assert_eq!(index.size(), 0);
        assert!(index.lock().is_empty());
    }

    #[test]
    fn test_concurrent_writers() {
        let index = shared(8);
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let index = index.clone();
                thread::spawn(move || {
                    for i in 0..250 {
                        let id = t * 1000 + i;
                        let x = (id % 97) as f32;
                        let y = (id / 97) as f32;
                        index.add(&Bounds::new(x, y, x + 1.0, y + 1.0), id).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(index.size(), 1000);
        let report = index.lock().check_integrity().unwrap();
        assert!(report.is_valid, "{:?}", report.errors);
    }

    #[test]
    fn test_shared_file_checkpoint() {
        let dir = tempdir().unwrap();
        {
            let tree = RTree::create_in_dir(dir.path(), RTreeConfig::new(8)).unwrap();
            let index: SharedRTree<FilePageStore> = SharedRTree::new(tree);
            index.add(&Bounds::new(1.0, 1.0, 2.0, 2.0), 42).unwrap();
            index.checkpoint(dir.path().join("index.meta")).unwrap();
        }
        let mut tree = RTree::open_dir(dir.path()).unwrap();
        assert_eq!(tree.query(&Bounds::new(0.0, 0.0, 5.0, 5.0)).unwrap(), vec![42]);
    }

    #[test]
    fn test_trait_object() {
        let index: Box<dyn SpatialIndex> = Box::new(shared(4));
        index.add(&Bounds::new(0.0, 0.0, 1.0, 1.0), 9).unwrap();
        assert_eq!(index.size(), 1);
    }
}
