//! # Spatial R-Tree - Paged Spatial Index
//!
//! This crate provides a disk-friendly 2D R-Tree mapping axis-aligned
//! bounding boxes to 64-bit row identifiers, meant to back a spatial index
//! inside a storage engine.
//!
//! ## Features
//!
//! - **Paged Nodes**: Fixed-size pages with a stable little-endian layout and CRC32 checks
//! - **Pluggable Storage**: In-memory or file backed page stores behind one trait
//! - **LRU Cache**: Hot pages stay decoded in memory, cold pages are read on demand
//! - **Quadrant Split**: Deterministic split policy with minimum fill rebalancing
//! - **Resumable Scans**: Range queries hand back results one output batch at a time
//! - **Bulk Loading**: Bottom-up construction from Hilbert-ordered rows with spill to disk
//! - **Checkpoints**: A small metadata record reattaches a tree to its page files
//!
//! ## Quick Start
//!
//! ```rust
//! use spatial_rtree::{Bounds, RTree, RTreeConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut tree = RTree::in_memory(RTreeConfig::new(4))?;
//! tree.insert(Bounds::new(0.0, 0.0, 1.0, 1.0), 1)?;
//! tree.insert(Bounds::new(5.0, 5.0, 6.0, 6.0), 2)?;
//! tree.insert(Bounds::new(0.5, 0.5, 1.5, 1.5), 3)?;
//!
//! let mut hits = tree.query(&Bounds::new(0.0, 0.0, 1.0, 1.0))?;
//! hits.sort_unstable();
//! assert_eq!(hits, vec![1, 3]);
//!
//! assert!(tree.delete(Bounds::new(0.0, 0.0, 1.0, 1.0), 1)?);
//! assert_eq!(tree.query(&Bounds::new(0.0, 0.0, 1.0, 1.0))?, vec![3]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Persistent Index
//!
//! ```rust,no_run
//! use spatial_rtree::{Bounds, RTree, RTreeConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let dir = tempfile::tempdir()?;
//! let mut tree = RTree::create_in_dir(dir.path(), RTreeConfig::default())?;
//! tree.insert(Bounds::from_f64_outward(0.1, 0.1, 10.3, 10.3), 1)?;
//! tree.checkpoint(dir.path().join("index.meta"))?;
//! drop(tree);
//!
//! let mut tree = RTree::open_dir(dir.path())?;
//! assert_eq!(tree.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod bounds;
pub mod hilbert;
pub mod rtree;
pub mod spatial_index;

pub use bounds::{Bounds, Point};
pub use hilbert::sort_by_hilbert;
pub use rtree::{
    FilePageStore, IndexMetadata, IndexScanState, IntegrityReport, MemoryPageStore, PageStore,
    RTree, RTreeBulkLoader, RTreeConfig, RTreeStats, RowId, SharedRTree, SpatialError,
    SpatialResult,
};
pub use spatial_index::SpatialIndex;
