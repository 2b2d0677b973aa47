//! Bottom-up bulk loading.
//!
//! Rows are streamed in space-filling-curve order (see
//! [`sort_by_hilbert`](crate::hilbert::sort_by_hilbert)) and packed into
//! full leaf pages. Every sealed page leaves a `(bounds, page)` entry in a
//! spill collection; each layer is then packed into branch pages the same
//! way until a single entry, the root, remains.

use crate::bounds::Bounds;

use super::page_store::PageStore;
use super::rtree_config::RTreeConfig;
use super::rtree_constants::DEFAULT_SPILL_MEMORY_ENTRIES;
use super::rtree_impl::{check_row, RTree};
use super::rtree_spill::{SpillCollection, SpillScanState};
use super::rtree_types::{
    Entry, NodePointer, PageKind, PageRef, RowId, SpatialError, SpatialResult,
};

/// Packs a stream of entries into pages of one kind.
///
/// The last full page is held back until the layer ends so that a short
/// final page can borrow entries from it.
struct LayerWriter {
    kind: PageKind,
    pending: Option<PageRef>,
    current: Option<PageRef>,
    pages: u64,
}

impl LayerWriter {
    fn new(kind: PageKind) -> Self {
        Self {
            kind,
            pending: None,
            current: None,
            pages: 0,
        }
    }

    fn push<S: PageStore>(
        &mut self,
        tree: &mut RTree<S>,
        entry: Entry,
        out: &mut SpillCollection,
    ) -> SpatialResult<()> {
        let page = match self.current {
            Some(page) => page,
            None => {
                let page = tree.new_page(self.kind)?;
                self.current = Some(page);
                page
            }
        };

        let node = tree.node_mut(page)?;
        node.push(entry);
        if node.is_full() {
            if let Some(previous) = self.pending.take() {
                self.seal(tree, previous, out)?;
            }
            self.pending = self.current.take();
        }
        Ok(())
    }

    fn finish<S: PageStore>(
        &mut self,
        tree: &mut RTree<S>,
        out: &mut SpillCollection,
    ) -> SpatialResult<()> {
        if let (Some(previous), Some(last)) = (self.pending, self.current) {
            let min = tree.config().min_node_capacity;
            let short = min.saturating_sub(tree.node(last)?.len());
            if short > 0 {
                // previous is full and min <= max / 2, so it stays above min
                let mut kept = tree.node_mut(previous)?.take_entries();
                let mut moved = kept.split_off(kept.len() - short);
                tree.node_mut(previous)?.fill(&kept);

                let node = tree.node_mut(last)?;
                moved.extend(node.take_entries());
                node.fill(&moved);
                log::trace!("Moved {} entries into the last {:?} page", short, self.kind);
            }
        }

        if let Some(previous) = self.pending.take() {
            self.seal(tree, previous, out)?;
        }
        if let Some(last) = self.current.take() {
            self.seal(tree, last, out)?;
        }
        Ok(())
    }

    fn seal<S: PageStore>(
        &mut self,
        tree: &mut RTree<S>,
        page: PageRef,
        out: &mut SpillCollection,
    ) -> SpatialResult<()> {
        let node = tree.node_mut(page)?;
        if page.is_leaf() {
            node.sort_by_row_id();
        }
        node.verify(page.kind);
        let bounds = node.bounds();
        self.pages += 1;
        out.append(Entry::new(NodePointer::Page(page), bounds))
    }
}

/// Streaming sink that builds a tree bottom-up.
///
/// ```
/// use spatial_rtree::{Bounds, RTree, RTreeBulkLoader, RTreeConfig};
///
/// let tree = RTree::in_memory(RTreeConfig::new(8)).unwrap();
/// let mut loader = RTreeBulkLoader::new(tree).unwrap();
/// for id in 0..100 {
///     let x = id as f32;
///     loader.push(Bounds::new(x, 0.0, x + 1.0, 1.0), id).unwrap();
/// }
/// let tree = loader.finish().unwrap();
/// assert_eq!(tree.len(), 100);
/// ```
pub struct RTreeBulkLoader<S: PageStore> {
    tree: RTree<S>,
    leaves: LayerWriter,
    layer: SpillCollection,
    spill_memory_entries: usize,
    row_count: u64,
}

impl<S: PageStore> RTreeBulkLoader<S> {
    /// Starts loading into `tree`, which must be empty.
    pub fn new(tree: RTree<S>) -> SpatialResult<Self> {
        Self::with_spill_memory_entries(tree, DEFAULT_SPILL_MEMORY_ENTRIES)
    }

    /// Like [`new`](Self::new) with a bound on the layer entries kept in
    /// memory before spilling to a temp file.
    pub fn with_spill_memory_entries(
        tree: RTree<S>,
        spill_memory_entries: usize,
    ) -> SpatialResult<Self> {
        if !tree.is_empty() {
            return Err(SpatialError::InvalidOperation(
                "bulk loading requires an empty index".into(),
            ));
        }
        Ok(Self {
            tree,
            leaves: LayerWriter::new(PageKind::Leaf),
            layer: SpillCollection::new(spill_memory_entries),
            spill_memory_entries,
            row_count: 0,
        })
    }

    /// Adds the next row in curve order.
    pub fn push(&mut self, bounds: Bounds, row_id: RowId) -> SpatialResult<()> {
        check_row(&bounds, row_id)?;
        self.leaves
            .push(&mut self.tree, Entry::row(bounds, row_id), &mut self.layer)?;
        self.row_count += 1;
        Ok(())
    }

    /// Builds the branch layers and returns the finished tree.
    pub fn finish(self) -> SpatialResult<RTree<S>> {
        let Self {
            mut tree,
            mut leaves,
            mut layer,
            spill_memory_entries,
            row_count,
        } = self;

        leaves.finish(&mut tree, &mut layer)?;
        let leaf_pages = leaves.pages;

        let max = tree.config().max_node_capacity;
        let mut next = SpillCollection::new(spill_memory_entries);
        let mut chunk = Vec::with_capacity(max);
        let mut height = u32::from(!layer.is_empty());

        while layer.len() > 1 {
            let mut writer = LayerWriter::new(PageKind::Branch);
            let mut state = SpillScanState::default();
            loop {
                chunk.clear();
                let read = layer.scan(&mut state, &mut chunk, max)?;
                for entry in chunk.drain(..) {
                    writer.push(&mut tree, entry, &mut next)?;
                }
                if read < max {
                    break;
                }
            }
            writer.finish(&mut tree, &mut next)?;

            layer.clear()?;
            std::mem::swap(&mut layer, &mut next);
            height += 1;
        }

        let mut roots = Vec::with_capacity(1);
        layer.scan(&mut SpillScanState::default(), &mut roots, 1)?;
        if let Some(root) = roots.pop() {
            tree.install_root(root, row_count)?;
        }

        log::debug!(
            "Bulk loaded {} rows into {} leaf pages (height {})",
            row_count,
            leaf_pages,
            height
        );
        Ok(tree)
    }
}

impl<S: PageStore> RTree<S> {
    /// Builds a tree from rows already in space-filling-curve order.
    pub fn bulk_load<I>(
        config: RTreeConfig,
        branch_pages: S,
        leaf_pages: S,
        rows: I,
    ) -> SpatialResult<Self>
    where
        I: IntoIterator<Item = (Bounds, RowId)>,
    {
        let tree = Self::create(config, branch_pages, leaf_pages)?;
        let mut loader = RTreeBulkLoader::new(tree)?;
        for (bounds, row_id) in rows {
            loader.push(bounds, row_id)?;
        }
        loader.finish()
    }
}
