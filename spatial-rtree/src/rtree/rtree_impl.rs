//! RTree implementation.

use std::fs;
use std::path::Path;

use crate::bounds::Bounds;

use super::page_store::{MemoryPageStore, PageStore};
use super::persistence::{IndexMetadata, IntegrityReport};
use super::rtree_config::RTreeConfig;
use super::rtree_constants::{
    BRANCH_PAGES_FILE, DEFAULT_SCAN_BATCH, LEAF_PAGES_FILE, MAGIC, METADATA_FILE, VERSION,
};
use super::rtree_node::Node;
use super::rtree_scanner::{RTreeScanner, ScanAction};
use super::rtree_split::split_entries;
use super::rtree_storage::FilePageStore;
use super::rtree_types::{
    DumpRow, Entry, NodePointer, PageKind, PageRef, RTreeStats, RowId, SpatialError,
    SpatialResult, MAX_ROW_ID, MIN_ROW_ID,
};

/// A paged 2D R-Tree over two page pools.
///
/// All operations take `&mut self`: the tree exclusively borrows its page
/// stores for the duration of each call, and callers serialize access
/// (see [`SharedRTree`](crate::SharedRTree)).
pub struct RTree<S: PageStore> {
    config: RTreeConfig,
    root: Entry,
    entry_count: u64,
    branch_pages: S,
    leaf_pages: S,
}

#[derive(Debug, Clone, Copy, Default)]
struct InsertResult {
    /// The target leaf was full; nothing was inserted
    split: bool,
    /// The entry's bounds had to grow to cover the new entry
    grown: bool,
}

#[derive(Debug, Clone, Copy, Default)]
struct DeleteResult {
    found: bool,
    shrunk: bool,
    /// The node dropped below the minimum fill and must be detached
    remove: bool,
}

impl DeleteResult {
    const REMOVED: DeleteResult = DeleteResult {
        found: true,
        shrunk: true,
        remove: true,
    };
}

/// Cursor of a range query, created by [`RTree::init_scan`].
///
/// The state is only valid while the tree is not modified.
#[derive(Debug, Clone)]
pub struct IndexScanState {
    query: Bounds,
    scanner: RTreeScanner,
}

impl IndexScanState {
    pub fn query(&self) -> &Bounds {
        &self.query
    }

    pub fn is_exhausted(&self) -> bool {
        self.scanner.is_exhausted()
    }
}

impl RTree<MemoryPageStore> {
    /// Creates an empty tree on volatile page stores.
    pub fn in_memory(config: RTreeConfig) -> SpatialResult<Self> {
        let capacity = config.max_node_capacity;
        Self::create(
            config,
            MemoryPageStore::new(capacity),
            MemoryPageStore::new(capacity),
        )
    }
}

impl RTree<FilePageStore> {
    /// Creates an empty tree persisted under `dir` (page files plus metadata).
    pub fn create_in_dir(dir: impl AsRef<Path>, config: RTreeConfig) -> SpatialResult<Self> {
        config.validate()?;
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let branch_pages =
            FilePageStore::create(dir.join(BRANCH_PAGES_FILE), config.max_node_capacity)?;
        let leaf_pages =
            FilePageStore::create(dir.join(LEAF_PAGES_FILE), config.max_node_capacity)?;
        let mut tree = Self::create(config, branch_pages, leaf_pages)?;
        tree.checkpoint(dir.join(METADATA_FILE))?;
        Ok(tree)
    }

    /// Reopens a tree from its last checkpoint under `dir`.
    ///
    /// No node pages are read; only the metadata and page file headers.
    pub fn open_dir(dir: impl AsRef<Path>) -> SpatialResult<Self> {
        let dir = dir.as_ref();
        log::debug!("Opening existing spatial index at {:?}", dir);
        let metadata = IndexMetadata::read_from(dir.join(METADATA_FILE))?;
        let branch_pages = FilePageStore::open(dir.join(BRANCH_PAGES_FILE))?;
        let leaf_pages = FilePageStore::open(dir.join(LEAF_PAGES_FILE))?;
        Self::load(&metadata, branch_pages, leaf_pages)
    }
}

impl<S: PageStore> RTree<S> {
    /// Creates an empty tree drawing pages from the given stores.
    pub fn create(config: RTreeConfig, branch_pages: S, leaf_pages: S) -> SpatialResult<Self> {
        config.validate()?;
        check_store_capacity(&config, &branch_pages, "branch")?;
        check_store_capacity(&config, &leaf_pages, "leaf")?;
        log::debug!(
            "Created R-Tree index (max_node_capacity {}, min_node_capacity {})",
            config.max_node_capacity,
            config.min_node_capacity
        );

        Ok(Self {
            config,
            root: Entry::default(),
            entry_count: 0,
            branch_pages,
            leaf_pages,
        })
    }

    /// Reattaches a tree to its page stores using checkpointed metadata.
    pub fn load(
        metadata: &IndexMetadata,
        mut branch_pages: S,
        mut leaf_pages: S,
    ) -> SpatialResult<Self> {
        metadata.validate()?;
        let config = RTreeConfig::new(metadata.max_node_capacity as usize)
            .with_min_node_capacity(metadata.min_node_capacity as usize);
        config.validate()?;
        check_store_capacity(&config, &branch_pages, "branch")?;
        check_store_capacity(&config, &leaf_pages, "leaf")?;

        branch_pages.restore(&metadata.branch_allocator)?;
        leaf_pages.restore(&metadata.leaf_allocator)?;

        let pointer = NodePointer::from_raw(metadata.root)?;
        if let NodePointer::RowId(row_id) = pointer {
            return Err(SpatialError::Integrity(format!(
                "root pointer addresses row {} instead of a page",
                row_id
            )));
        }

        let mut tree = Self {
            config,
            root: Entry::new(pointer, Bounds::default()),
            entry_count: metadata.entry_count,
            branch_pages,
            leaf_pages,
        };
        if let NodePointer::Page(page) = pointer {
            tree.root.bounds = tree.node(page)?.bounds();
        }

        log::debug!(
            "Loaded R-Tree index with {} entries (root {:?})",
            tree.entry_count,
            tree.root.pointer
        );
        Ok(tree)
    }

    /// Captures the metadata needed by [`RTree::load`].
    pub fn serialize(&self) -> IndexMetadata {
        IndexMetadata {
            magic: MAGIC,
            version: VERSION,
            root: self.root.pointer.to_raw(),
            max_node_capacity: self.config.max_node_capacity as u64,
            min_node_capacity: self.config.min_node_capacity as u64,
            entry_count: self.entry_count,
            branch_allocator: self.branch_pages.allocator_state(),
            leaf_allocator: self.leaf_pages.allocator_state(),
        }
    }

    /// Flushes both page stores and writes the metadata to `path`.
    pub fn checkpoint(&mut self, path: impl AsRef<Path>) -> SpatialResult<()> {
        self.flush()?;
        self.serialize().write_to(path.as_ref())?;
        log::debug!(
            "Checkpointed R-Tree index ({} entries) to {:?}",
            self.entry_count,
            path.as_ref()
        );
        Ok(())
    }

    pub fn flush(&mut self) -> SpatialResult<()> {
        self.branch_pages.flush()?;
        self.leaf_pages.flush()
    }

    pub fn config(&self) -> &RTreeConfig {
        &self.config
    }

    pub fn root(&self) -> &Entry {
        &self.root
    }

    /// Number of rows in the index
    pub fn len(&self) -> u64 {
        self.entry_count
    }

    pub fn is_empty(&self) -> bool {
        !self.root.is_set()
    }

    pub fn in_memory_size(&self) -> usize {
        self.branch_pages.in_memory_size() + self.leaf_pages.in_memory_size()
    }

    pub fn branch_pages(&self) -> &S {
        &self.branch_pages
    }

    pub fn leaf_pages(&self) -> &S {
        &self.leaf_pages
    }

    // ------------------------------------------------------------------------
    // Page access
    // ------------------------------------------------------------------------

    fn pages(&mut self, kind: PageKind) -> &mut S {
        match kind {
            PageKind::Leaf => &mut self.leaf_pages,
            PageKind::Branch => &mut self.branch_pages,
        }
    }

    pub fn node(&mut self, page: PageRef) -> SpatialResult<&Node> {
        self.pages(page.kind).node(page.handle)
    }

    pub fn node_mut(&mut self, page: PageRef) -> SpatialResult<&mut Node> {
        self.pages(page.kind).node_mut(page.handle)
    }

    /// Resolves a pointer to its node. Row ids and unset pointers are
    /// integrity errors.
    pub fn dereference(&mut self, pointer: &NodePointer) -> SpatialResult<&Node> {
        let page = pointer.expect_page()?;
        self.node(page)
    }

    /// Allocates an empty page of the given kind.
    pub fn new_page(&mut self, kind: PageKind) -> SpatialResult<PageRef> {
        let handle = self.pages(kind).allocate()?;
        Ok(PageRef::new(kind, handle))
    }

    /// Frees the page subtree behind `pointer`, children first. Row ids and
    /// unset pointers are ignored.
    pub fn free(&mut self, pointer: NodePointer) -> SpatialResult<()> {
        let NodePointer::Page(page) = pointer else {
            return Ok(());
        };
        if !page.is_leaf() {
            let children = self.node_mut(page)?.take_entries();
            for child in children {
                self.free(child.pointer)?;
            }
        }
        self.pages(page.kind).free(page.handle)
    }

    /// Frees every reachable page and leaves the tree empty.
    pub fn reset(&mut self) -> SpatialResult<()> {
        let root = std::mem::take(&mut self.root);
        self.entry_count = 0;
        self.free(root.pointer)
    }

    /// Installs a root built outside the insert path (bulk loading).
    pub(crate) fn install_root(&mut self, root: Entry, entry_count: u64) -> SpatialResult<()> {
        if self.root.is_set() {
            return Err(SpatialError::InvalidOperation(
                "cannot install a root into a non-empty tree".into(),
            ));
        }
        self.root = root;
        self.entry_count = entry_count;
        Ok(())
    }

    /// Merging two indexes is not implemented.
    pub fn merge(&mut self, _other: &mut RTree<S>) -> SpatialResult<()> {
        Err(SpatialError::Unsupported("merging R-Tree indexes".into()))
    }

    // ------------------------------------------------------------------------
    // Insert
    // ------------------------------------------------------------------------

    /// Adds a row with its bounding box.
    pub fn insert(&mut self, bounds: Bounds, row_id: RowId) -> SpatialResult<()> {
        check_row(&bounds, row_id)?;
        self.root_insert(Entry::row(bounds, row_id))?;
        self.entry_count += 1;
        Ok(())
    }

    fn root_insert(&mut self, new_entry: Entry) -> SpatialResult<()> {
        if !self.root.is_set() {
            let page = self.new_page(PageKind::Leaf)?;
            self.node_mut(page)?.push(new_entry);
            self.root = Entry::new(NodePointer::Page(page), new_entry.bounds);
            return Ok(());
        }

        let mut root = self.root;
        let result = self.node_insert(&mut root, &new_entry)?;
        if result.split {
            // grow the tree: the old root and its split sibling become the
            // two children of a new branch root
            let branch = self.new_page(PageKind::Branch)?;
            let mut old_root = root;
            let sibling = self.split_node(&mut old_root)?;
            let node = self.node_mut(branch)?;
            node.push(old_root);
            node.push(sibling);
            node.sort_by_x_min();
            self.root = Entry::new(NodePointer::Page(branch), root.bounds);
            log::trace!("R-Tree root split, new root {:?}", branch);
            return self.root_insert(new_entry);
        }

        if result.grown {
            root.bounds.union(&new_entry.bounds);
        }
        self.root = root;
        Ok(())
    }

    fn node_insert(&mut self, entry: &mut Entry, new_entry: &Entry) -> SpatialResult<InsertResult> {
        let page = entry.pointer.expect_page()?;
        let max = self.config.max_node_capacity;

        if page.is_leaf() {
            let node = self.node_mut(page)?;
            if node.len() >= max {
                return Ok(InsertResult {
                    split: true,
                    grown: false,
                });
            }
            node.insert_by_row_id(*new_entry);
            node.verify(PageKind::Leaf);
            return Ok(InsertResult {
                split: false,
                grown: !entry.bounds.contains(&new_entry.bounds),
            });
        }

        let node = self.node(page)?;
        let idx = pick_subtree(node, new_entry)?;
        let mut target = node.entry(idx);

        let result = self.node_insert(&mut target, new_entry)?;
        if result.split {
            if self.node(page)?.len() >= max {
                // no room for a sibling here, split further up
                return Ok(result);
            }
            let sibling = self.split_node(&mut target)?;
            let node = self.node_mut(page)?;
            node.set(idx, target);
            node.push(sibling);
            node.sort_by_x_min();
            return self.node_insert(entry, new_entry);
        }

        if result.grown {
            target.bounds.union(&new_entry.bounds);
            self.node_mut(page)?.set(idx, target);
            return Ok(InsertResult {
                split: false,
                grown: !entry.bounds.contains(&new_entry.bounds),
            });
        }

        Ok(InsertResult::default())
    }

    /// Splits the full node behind `entry`. The node keeps one half and
    /// `entry.bounds` is narrowed to it; the returned entry points at a new
    /// sibling page holding the other half.
    fn split_node(&mut self, entry: &mut Entry) -> SpatialResult<Entry> {
        let page = entry.pointer.expect_page()?;
        // an empty half would leave a page without bounds
        let min_fill = self.config.min_node_capacity.max(1);

        let entries = self.node(page)?.entries().to_vec();
        debug_assert_eq!(entries.len(), self.config.max_node_capacity);
        let [left, right] = split_entries(&entries, &entry.bounds, min_fill);

        let sibling = self.new_page(page.kind)?;
        let mut halves = [Bounds::default(); 2];
        for (half, (target, half_entries)) in [(page, &left), (sibling, &right)].into_iter().enumerate() {
            let node = self.node_mut(target)?;
            node.fill(half_entries);
            if target.is_leaf() {
                node.sort_by_row_id();
            } else {
                node.sort_by_x_min();
            }
            node.verify(target.kind);
            halves[half] = node.bounds();
        }

        log::trace!(
            "Split {:?} into {} + {} entries",
            page,
            left.len(),
            right.len()
        );
        entry.bounds = halves[0];
        Ok(Entry::new(NodePointer::Page(sibling), halves[1]))
    }

    // ------------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------------

    /// Removes the row `row_id` found under `bounds`. Returns false, leaving
    /// the tree untouched, when no such row is indexed.
    pub fn delete(&mut self, bounds: Bounds, row_id: RowId) -> SpatialResult<bool> {
        if !self.root.is_set() {
            return Ok(false);
        }

        let target = Entry::row(bounds, row_id);
        let mut orphans = Vec::new();
        let mut root = self.root;
        let result = self.node_delete(&mut root, &target, row_id, &mut orphans)?;
        if !result.found {
            return Ok(false);
        }
        self.entry_count = self.entry_count.saturating_sub(1);

        if result.remove {
            self.free(root.pointer)?;
            self.root = Entry::default();
            if !orphans.is_empty() {
                let leaf = self.new_page(PageKind::Leaf)?;
                self.root = Entry::new(NodePointer::Page(leaf), Bounds::default());
            }
            log::trace!("R-Tree root collapsed, re-inserting {} orphans", orphans.len());
        } else {
            self.root = root;
        }

        for orphan in orphans {
            self.reinsert(orphan)?;
        }
        Ok(true)
    }

    fn node_delete(
        &mut self,
        entry: &mut Entry,
        target: &Entry,
        row_id: RowId,
        orphans: &mut Vec<Entry>,
    ) -> SpatialResult<DeleteResult> {
        if !entry.bounds.intersects(&target.bounds) {
            return Ok(DeleteResult::default());
        }
        let page = entry.pointer.expect_page()?;
        let min = self.config.min_node_capacity;

        if page.is_leaf() {
            let node = self.node_mut(page)?;
            let Some(idx) = node.find_row_id(row_id) else {
                return Ok(DeleteResult::default());
            };
            node.compact_remove(idx);
            if node.is_empty() || node.len() < min {
                orphans.extend(node.take_entries());
                return Ok(DeleteResult::REMOVED);
            }
            node.verify(PageKind::Leaf);
            let bounds = node.bounds();
            let shrunk = bounds != entry.bounds;
            entry.bounds = bounds;
            return Ok(DeleteResult {
                found: true,
                shrunk,
                remove: false,
            });
        }

        let count = self.node(page)?.len();
        for idx in 0..count {
            let mut child = self.node(page)?.entry(idx);
            let result = self.node_delete(&mut child, target, row_id, orphans)?;
            if !result.found {
                continue;
            }

            if result.remove {
                self.node_mut(page)?.swap_remove(idx);
                // the child has already handed its entries to `orphans`
                self.free(child.pointer)?;
                let node = self.node_mut(page)?;
                if node.is_empty() || node.len() < min {
                    orphans.extend(node.take_entries());
                    return Ok(DeleteResult::REMOVED);
                }
            } else {
                self.node_mut(page)?.set(idx, child);
                if !result.shrunk {
                    return Ok(DeleteResult {
                        found: true,
                        shrunk: false,
                        remove: false,
                    });
                }
            }

            let bounds = self.node(page)?.bounds();
            let shrunk = bounds != entry.bounds;
            entry.bounds = bounds;
            return Ok(DeleteResult {
                found: true,
                shrunk,
                remove: false,
            });
        }

        Ok(DeleteResult::default())
    }

    /// Re-inserts a detached entry. Orphaned pages are unpacked down to
    /// their rows and freed on the way.
    fn reinsert(&mut self, orphan: Entry) -> SpatialResult<()> {
        match orphan.pointer {
            NodePointer::RowId(_) => self.root_insert(orphan),
            NodePointer::Page(page) => {
                let children = self.node_mut(page)?.take_entries();
                self.pages(page.kind).free(page.handle)?;
                for child in children {
                    self.reinsert(child)?;
                }
                Ok(())
            }
            NodePointer::Unset => Err(SpatialError::Integrity(
                "orphaned entry has an unset pointer".into(),
            )),
        }
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// Starts a range query for rows whose bounds intersect `query`.
    pub fn init_scan(&self, query: Bounds) -> IndexScanState {
        IndexScanState {
            query,
            scanner: RTreeScanner::new(&self.root),
        }
    }

    /// Writes the next matching row ids into `output` and returns how many
    /// were written. A return value below `output.len()` means the query is
    /// exhausted.
    pub fn scan(&mut self, state: &mut IndexScanState, output: &mut [RowId]) -> SpatialResult<usize> {
        let capacity = output.len();
        if capacity == 0 {
            return Ok(0);
        }

        let query = state.query;
        let mut written = 0;
        state.scanner.scan(self, |entry, _| match entry.pointer {
            NodePointer::RowId(row_id) => {
                if entry.bounds.intersects(&query) {
                    output[written] = row_id;
                    written += 1;
                    if written == capacity {
                        return ScanAction::Yield;
                    }
                }
                ScanAction::Continue
            }
            _ if entry.bounds.intersects(&query) => ScanAction::Continue,
            _ => ScanAction::Skip,
        })?;
        Ok(written)
    }

    /// All row ids whose bounds intersect `query`.
    pub fn query(&mut self, query: &Bounds) -> SpatialResult<Vec<RowId>> {
        let mut state = self.init_scan(*query);
        let mut buffer = vec![0; DEFAULT_SCAN_BATCH];
        let mut results = Vec::new();
        loop {
            let written = self.scan(&mut state, &mut buffer)?;
            results.extend_from_slice(&buffer[..written]);
            if written < buffer.len() {
                return Ok(results);
            }
        }
    }

    /// All row ids whose bounds lie entirely inside `query`.
    pub fn find_contained(&mut self, query: &Bounds) -> SpatialResult<Vec<RowId>> {
        let mut results = Vec::new();
        let mut scanner = RTreeScanner::new(&self.root);
        scanner.scan(self, |entry, _| match entry.pointer {
            NodePointer::RowId(row_id) => {
                if query.contains(&entry.bounds) {
                    results.push(row_id);
                }
                ScanAction::Continue
            }
            _ if entry.bounds.intersects(query) => ScanAction::Continue,
            _ => ScanAction::Skip,
        })?;
        Ok(results)
    }

    // ------------------------------------------------------------------------
    // Diagnostics
    // ------------------------------------------------------------------------

    /// Every entry of the tree in depth-first order with its level.
    pub fn dump(&mut self) -> SpatialResult<Vec<DumpRow>> {
        let mut rows = Vec::new();
        let mut scanner = RTreeScanner::new(&self.root);
        scanner.scan(self, |entry, level| {
            rows.push(DumpRow {
                level,
                bounds: entry.bounds,
                row_id: entry.pointer.as_row_id(),
            });
            ScanAction::Continue
        })?;
        Ok(rows)
    }

    pub fn stats(&mut self) -> SpatialResult<RTreeStats> {
        let mut stats = RTreeStats {
            in_memory_size: self.in_memory_size(),
            ..RTreeStats::default()
        };
        let NodePointer::Page(root) = self.root.pointer else {
            return Ok(stats);
        };
        match root.kind {
            PageKind::Leaf => stats.leaf_pages += 1,
            PageKind::Branch => stats.branch_pages += 1,
        }

        let mut max_depth = 0;
        let mut scanner = RTreeScanner::new(&self.root);
        scanner.scan(self, |entry, depth| {
            max_depth = max_depth.max(depth);
            match entry.pointer {
                NodePointer::RowId(_) => stats.entry_count += 1,
                NodePointer::Page(page) if page.is_leaf() => stats.leaf_pages += 1,
                NodePointer::Page(_) => stats.branch_pages += 1,
                NodePointer::Unset => {}
            }
            ScanAction::Continue
        })?;
        stats.height = max_depth as u32 + 1;
        Ok(stats)
    }

    /// Walks the whole tree checking containment, fill, ordering, pointer
    /// tags and that every leaf sits at the same depth.
    pub fn check_integrity(&mut self) -> SpatialResult<IntegrityReport> {
        let mut report = IntegrityReport::new();
        match self.root.pointer {
            NodePointer::Unset => {}
            NodePointer::RowId(row_id) => {
                report.fail(format!("root points at row {}", row_id));
            }
            NodePointer::Page(_) => {
                let mut leaf_depth = None;
                let root = self.root;
                self.check_subtree(&root, 0, &mut leaf_depth, &mut report)?;
            }
        }
        if report.entries_checked != self.entry_count {
            report.fail(format!(
                "tree holds {} rows but the entry count is {}",
                report.entries_checked, self.entry_count
            ));
        }
        Ok(report)
    }

    fn check_subtree(
        &mut self,
        entry: &Entry,
        depth: usize,
        leaf_depth: &mut Option<usize>,
        report: &mut IntegrityReport,
    ) -> SpatialResult<()> {
        let Some(page) = entry.pointer.as_page() else {
            report.fail(format!("branch entry at depth {} is not a page", depth));
            return Ok(());
        };
        let entries = match self.node(page) {
            Ok(node) => node.entries().to_vec(),
            Err(e) => {
                report.fail(format!("page {:?}: {}", page, e));
                return Ok(());
            }
        };
        report.pages_checked += 1;

        let is_root = depth == 0;
        if entries.len() > self.config.max_node_capacity {
            report.fail(format!("page {:?} holds {} entries", page, entries.len()));
        }
        if !is_root && entries.len() < self.config.min_node_capacity.max(1) {
            report.fail(format!(
                "page {:?} is under-full with {} entries",
                page,
                entries.len()
            ));
        }
        for child in &entries {
            if !entry.bounds.contains(&child.bounds) {
                report.fail(format!(
                    "page {:?}: child {} escapes parent bounds {}",
                    page, child.bounds, entry.bounds
                ));
            }
        }

        if page.is_leaf() {
            match *leaf_depth {
                None => *leaf_depth = Some(depth),
                Some(expected) if expected != depth => report.fail(format!(
                    "leaf {:?} at depth {}, expected {}",
                    page, depth, expected
                )),
                Some(_) => {}
            }
            let mut previous = None;
            for child in &entries {
                match child.pointer {
                    NodePointer::RowId(row_id) => {
                        if previous.is_some_and(|p| p > row_id) {
                            report.fail(format!("leaf {:?} is not sorted by row id", page));
                        }
                        previous = Some(row_id);
                        report.entries_checked += 1;
                    }
                    other => report.fail(format!("leaf {:?} holds pointer {:?}", page, other)),
                }
            }
            return Ok(());
        }

        for child in &entries {
            self.check_subtree(child, depth + 1, leaf_depth, report)?;
        }
        Ok(())
    }
}

/// Child whose perimeter grows least when covering `new_entry`; ties go to
/// the child with the smaller area.
fn pick_subtree(node: &Node, new_entry: &Entry) -> SpatialResult<usize> {
    if node.is_empty() {
        return Err(SpatialError::Integrity("branch page without children".into()));
    }
    let mut best_idx = 0;
    let mut best_diff = f32::MAX;
    let mut best_area = f32::MAX;
    for (idx, child) in node.entries().iter().enumerate() {
        let diff = child.bounds.merged(&new_entry.bounds).perimeter() - child.bounds.perimeter();
        let area = child.bounds.area();
        if diff < best_diff || (diff <= best_diff && area < best_area) {
            best_idx = idx;
            best_diff = diff;
            best_area = area;
        }
    }
    Ok(best_idx)
}

/// Rejects rows the index cannot hold: row ids beyond 56 bits and boxes
/// with `min > max` or NaN coordinates.
pub(crate) fn check_row(bounds: &Bounds, row_id: RowId) -> SpatialResult<()> {
    if !(MIN_ROW_ID..=MAX_ROW_ID).contains(&row_id) {
        return Err(SpatialError::InvalidOperation(format!(
            "row id {} is outside the indexable range",
            row_id
        )));
    }
    if !(bounds.min.x <= bounds.max.x && bounds.min.y <= bounds.max.y) {
        return Err(SpatialError::InvalidOperation(format!(
            "cannot index invalid bounds {}",
            bounds
        )));
    }
    Ok(())
}

fn check_store_capacity<S: PageStore>(
    config: &RTreeConfig,
    store: &S,
    name: &str,
) -> SpatialResult<()> {
    if store.capacity() != config.max_node_capacity {
        return Err(SpatialError::InvalidConfig(format!(
            "{} page store holds {} entries per page, index expects {}",
            name,
            store.capacity(),
            config.max_node_capacity
        )));
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
