//! Hilbert curve ordering for bulk loading.
//!
//! The Hilbert curve maps 2D cells to a 1D index while preserving spatial
//! locality: boxes whose centers are close in the plane usually end up close
//! in curve order, so packing rows in that order yields compact leaf pages.

use crate::bounds::Bounds;
use crate::rtree::RowId;

/// Maximum order for Hilbert curve encoding (determines precision)
const MAX_HILBERT_ORDER: u32 = 32;

/// Order used for bulk load keys: a 65536 x 65536 grid
pub const DEFAULT_HILBERT_ORDER: u32 = 16;

/// Encodes normalized coordinates in `[0, 1]` to a Hilbert curve index.
///
/// ```
/// use spatial_rtree::hilbert::hilbert_index;
///
/// let index = hilbert_index(0.5, 0.5, 16);
/// assert!(index < (1u64 << 32));
/// ```
pub fn hilbert_index(x: f64, y: f64, order: u32) -> u64 {
    debug_assert!((0.0..=1.0).contains(&x), "x must be in [0,1]");
    debug_assert!((0.0..=1.0).contains(&y), "y must be in [0,1]");
    debug_assert!(order > 0 && order <= MAX_HILBERT_ORDER, "order must be 1-32");

    let n = 1u64 << order;
    let xi = ((x * (n as f64 - 0.5)) as u64).min(n - 1);
    let yi = ((y * (n as f64 - 0.5)) as u64).min(n - 1);

    xy2d(n, xi, yi)
}

/// Curve key of the center of `bounds` within `extent`, the box covering
/// every row being loaded. Centers outside `extent` are clamped to it.
pub fn hilbert_key(bounds: &Bounds, extent: &Bounds) -> u64 {
    let center = bounds.center();
    let x = normalize(center.x, extent.min.x, extent.max.x);
    let y = normalize(center.y, extent.min.y, extent.max.y);
    hilbert_index(x, y, DEFAULT_HILBERT_ORDER)
}

/// Sorts rows into curve order, ready for
/// [`RTreeBulkLoader`](crate::rtree::RTreeBulkLoader).
///
/// Ties keep their input order.
pub fn sort_by_hilbert(rows: Vec<(Bounds, RowId)>) -> Vec<(Bounds, RowId)> {
    let mut extent = Bounds::default();
    for (bounds, _) in &rows {
        extent.union(bounds);
    }

    let mut keyed: Vec<_> = rows
        .into_iter()
        .map(|(bounds, row_id)| (hilbert_key(&bounds, &extent), bounds, row_id))
        .collect();
    keyed.sort_by_key(|(key, _, _)| *key);
    keyed
        .into_iter()
        .map(|(_, bounds, row_id)| (bounds, row_id))
        .collect()
}

fn normalize(value: f32, min: f32, max: f32) -> f64 {
    let range = max as f64 - min as f64;
    if range > 0.0 && range.is_finite() {
        ((value as f64 - min as f64) / range).clamp(0.0, 1.0)
    } else {
        0.5
    }
}

/// Converts (x, y) cells on an `n x n` grid to the distance along the curve.
fn xy2d(n: u64, x: u64, y: u64) -> u64 {
    let mut d = 0u64;
    let mut x = x;
    let mut y = y;
    let mut s = n / 2;

    while s > 0 {
        let rx = ((x & s) > 0) as u64;
        let ry = ((y & s) > 0) as u64;
        d += s * s * ((3 * rx) ^ ry);
        rotate(s, &mut x, &mut y, rx, ry);
        s /= 2;
    }

    d
}

fn rotate(n: u64, x: &mut u64, y: &mut u64, rx: u64, ry: u64) {
    if ry == 0 {
        if rx == 1 {
            *x = n.wrapping_sub(1).wrapping_sub(*x);
            *y = n.wrapping_sub(1).wrapping_sub(*y);
        }
        std::mem::swap(x, y);
    }
}
