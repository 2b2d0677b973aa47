//! Paged R-Tree engine.
//!
//! Nodes live in fixed-size pages drawn from two page stores, one for leaf
//! pages and one for branch pages. The engine never holds nodes itself:
//! every access goes through a [`PageStore`], either the volatile
//! [`MemoryPageStore`] or the file backed [`FilePageStore`] with its LRU
//! cache of decoded pages. A tree is reattached to its stores from a small
//! [`IndexMetadata`] record written at checkpoint time.

pub mod page_store;
pub mod persistence;
pub mod rtree_cache;
pub mod rtree_config;
pub mod rtree_constants;
pub mod rtree_node;
pub mod rtree_scanner;
pub mod rtree_spill;
pub mod rtree_split;
pub mod rtree_storage;
pub mod rtree_types;
mod rtree_bulk;
mod rtree_impl;
mod rtree_shared;

pub use page_store::{AllocatorState, MemoryPageStore, PageStore};
pub use persistence::{IndexMetadata, IntegrityReport};
pub use rtree_bulk::RTreeBulkLoader;
pub use rtree_config::RTreeConfig;
pub use rtree_impl::{IndexScanState, RTree};
pub use rtree_node::Node;
pub use rtree_scanner::{RTreeScanner, ScanAction};
pub use rtree_shared::SharedRTree;
pub use rtree_storage::FilePageStore;
pub use rtree_types::{
    DumpRow, Entry, NodePointer, PageHandle, PageKind, PageRef, PageStoreStats, RTreeStats,
    RowId, SpatialError, SpatialResult, MAX_ROW_ID, MIN_ROW_ID,
};
