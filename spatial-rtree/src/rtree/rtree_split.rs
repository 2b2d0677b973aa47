//! Quadrant split of an over-full node.
//!
//! ```text
//!  C1 | C2
//!  -------
//!  C0 | C3
//! ```
//!
//! Children are bucketed by the quadrant of the node box holding their
//! center, quadrants are paired into two halves, and the smaller half is
//! topped up to the minimum fill with the entries closest to the split line.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::bounds::{Bounds, Point};

use super::rtree_types::Entry;

/// Index of the first quadrant (C0..C3) whose closed box holds `point`.
/// `point` is expected to lie inside the node box.
pub fn quadrant_of(point: &Point, center: &Point) -> usize {
    if point.x <= center.x {
        if point.y <= center.y {
            0
        } else {
            1
        }
    } else if point.y >= center.y {
        2
    } else {
        3
    }
}

/// Maps each quadrant to half 0 or half 1.
///
/// C0 and C2 are opposed by count, as are C1 and C3. When C1 and C3 tie,
/// the pairing with the smaller overlap between halves wins, then the one
/// with the smaller summed area.
pub fn assign_quadrants(counts: &[usize; 4], bounds: &[Bounds; 4]) -> [usize; 4] {
    let mut q_node = [0usize; 4];

    match counts[0].cmp(&counts[2]) {
        Ordering::Greater => {
            q_node[0] = 0;
            q_node[2] = 1;
        }
        Ordering::Less => {
            q_node[0] = 1;
            q_node[2] = 0;
        }
        Ordering::Equal => {}
    }

    match counts[1].cmp(&counts[3]) {
        Ordering::Greater => {
            q_node[1] = 0;
            q_node[3] = 1;
        }
        Ordering::Less => {
            q_node[1] = 1;
            q_node[3] = 0;
        }
        Ordering::Equal => {
            // left | right
            let v_left = bounds[0].merged(&bounds[1]);
            let v_right = bounds[2].merged(&bounds[3]);
            // bottom / top
            let h_bottom = bounds[0].merged(&bounds[3]);
            let h_top = bounds[1].merged(&bounds[2]);

            let overlap_v = v_left.overlap_area(&v_right);
            let overlap_h = h_bottom.overlap_area(&h_top);

            let join_c0 = if overlap_h < overlap_v {
                true
            } else if overlap_h > overlap_v {
                false
            } else {
                let area_v = v_left.area() + v_right.area();
                let area_h = h_bottom.area() + h_top.area();
                area_v < area_h
            };

            if join_c0 {
                q_node[1] = q_node[0];
                q_node[3] = q_node[2];
            } else {
                q_node[1] = q_node[2];
                q_node[3] = q_node[0];
            }
        }
    }

    q_node
}

/// Splits the entries of a full node covered by `node_bounds` into two
/// halves, each holding at least `min_fill` entries.
pub fn split_entries(entries: &[Entry], node_bounds: &Bounds, min_fill: usize) -> [Vec<Entry>; 2] {
    let center = node_bounds.center();

    let mut counts = [0usize; 4];
    let mut q_bounds = [Bounds::default(); 4];
    let mut quadrants = Vec::with_capacity(entries.len());
    for entry in entries {
        let q = quadrant_of(&entry.bounds.center(), &center);
        counts[q] += 1;
        q_bounds[q].union(&entry.bounds);
        quadrants.push(q);
    }

    let q_node = assign_quadrants(&counts, &q_bounds);

    let mut halves = [
        Vec::with_capacity(entries.len()),
        Vec::with_capacity(entries.len()),
    ];
    for (entry, q) in entries.iter().zip(quadrants) {
        halves[q_node[q]].push(*entry);
    }

    // C0 and C1 in different halves means the split line is horizontal,
    // so distance to it is measured along y.
    let axis = if q_node[0] != q_node[1] { 1 } else { 0 };

    let [first, second] = &mut halves;
    if first.len() < min_fill {
        rebalance(second, first, min_fill, axis, &center);
    } else if second.len() < min_fill {
        rebalance(first, second, min_fill, axis, &center);
    }

    halves
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    diff: f32,
    idx: usize,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.diff
            .total_cmp(&other.diff)
            .then(self.idx.cmp(&other.idx))
    }
}

/// Moves the `min_fill - dst.len()` entries of `src` whose centers lie
/// closest to the split line into `dst`.
fn rebalance(
    src: &mut Vec<Entry>,
    dst: &mut Vec<Entry>,
    min_fill: usize,
    axis: usize,
    split_point: &Point,
) {
    debug_assert!(src.len() > dst.len());
    let remaining = min_fill - dst.len();

    // max-heap of the closest entries seen so far
    let mut heap = BinaryHeap::with_capacity(remaining + 1);
    for (idx, entry) in src.iter().enumerate() {
        let diff = (entry.bounds.center().axis(axis) - split_point.axis(axis)).abs();
        let candidate = Candidate { diff, idx };
        if heap.len() < remaining {
            heap.push(candidate);
        } else if heap.peek().is_some_and(|top| candidate.diff < top.diff) {
            heap.pop();
            heap.push(candidate);
        }
    }

    let mut selected: Vec<usize> = heap.into_iter().map(|c| c.idx).collect();
    // highest index first so swap_remove never disturbs a pending index
    selected.sort_unstable_by(|a, b| b.cmp(a));
    for idx in selected {
        dst.push(src.swap_remove(idx));
    }
}
