//! SpatialIndex trait definition.

use crate::bounds::Bounds;
use crate::rtree::{RowId, SpatialResult};

/// Thread-safe row index keyed by bounding boxes.
///
/// Implementations serialize writers internally, so every method takes
/// `&self` and the index can be shared across threads.
pub trait SpatialIndex: Send + Sync {
    /// Adds a row to the index.
    fn add(&self, key: &Bounds, row_id: RowId) -> SpatialResult<()>;

    /// Removes a row. Returns false when it was not indexed under `key`.
    fn remove(&self, key: &Bounds, row_id: RowId) -> SpatialResult<bool>;

    /// Rows whose bounds intersect `key`, edges included.
    fn find_intersecting_keys(&self, key: &Bounds) -> SpatialResult<Vec<RowId>>;

    /// Rows whose bounds lie entirely inside `key`.
    fn find_contained_keys(&self, key: &Bounds) -> SpatialResult<Vec<RowId>>;

    /// Number of indexed rows.
    fn size(&self) -> u64;

    /// Removes every row.
    fn clear(&self) -> SpatialResult<()>;
}
