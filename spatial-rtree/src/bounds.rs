use serde::{Deserialize, Serialize};

/// A 2D point in index space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Coordinate along `axis` (0 = x, 1 = y).
    pub fn axis(&self, axis: usize) -> f32 {
        if axis == 0 {
            self.x
        } else {
            self.y
        }
    }
}

/// An axis-aligned 2D box stored as 32-bit floats.
///
/// `Bounds` is the unit of spatial summary in the index: every leaf entry
/// carries the box of its row, and every branch entry carries the union of
/// the boxes below it.
///
/// The default value is the *inverted* box (`min = +inf`, `max = -inf`),
/// which acts as the identity for [`Bounds::union`] and intersects nothing.
///
/// # Examples
///
/// ```rust
/// use spatial_rtree::Bounds;
///
/// let mut acc = Bounds::default();
/// acc.union(&Bounds::new(0.0, 0.0, 1.0, 1.0));
/// acc.union(&Bounds::new(2.0, 2.0, 3.0, 3.0));
/// assert_eq!(acc, Bounds::new(0.0, 0.0, 3.0, 3.0));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: Point,
    pub max: Point,
}

impl Default for Bounds {
    fn default() -> Self {
        Self {
            min: Point::new(f32::INFINITY, f32::INFINITY),
            max: Point::new(f32::NEG_INFINITY, f32::NEG_INFINITY),
        }
    }
}

impl std::fmt::Display for Bounds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}, {}, {}, {}]",
            self.min.x, self.min.y, self.max.x, self.max.y
        )
    }
}

impl Bounds {
    /// Creates a box from its corner coordinates.
    pub fn new(min_x: f32, min_y: f32, max_x: f32, max_y: f32) -> Self {
        Self {
            min: Point::new(min_x, min_y),
            max: Point::new(max_x, max_y),
        }
    }

    /// Converts a double precision box into the smallest `f32` box that
    /// still covers it: minimums round down, maximums round up.
    ///
    /// Geometry layers feed the index through this so that a box never
    /// shrinks when narrowed to the index precision.
    pub fn from_f64_outward(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self::new(
            f64_to_f32_down(min_x),
            f64_to_f32_down(min_y),
            f64_to_f32_up(max_x),
            f64_to_f32_up(max_y),
        )
    }

    /// Returns true for the inverted (default) box or any box with
    /// `min > max` on an axis.
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y
    }

    /// Grows this box to cover `other`.
    pub fn union(&mut self, other: &Bounds) {
        self.min.x = self.min.x.min(other.min.x);
        self.min.y = self.min.y.min(other.min.y);
        self.max.x = self.max.x.max(other.max.x);
        self.max.y = self.max.y.max(other.max.y);
    }

    /// Returns the union of both boxes without modifying either.
    pub fn merged(&self, other: &Bounds) -> Bounds {
        let mut result = *self;
        result.union(other);
        result
    }

    /// Closed-interval intersection test. Boxes that only share an edge or
    /// a corner intersect.
    pub fn intersects(&self, other: &Bounds) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
    }

    /// True when `other` lies entirely inside this box (edges inclusive).
    pub fn contains(&self, other: &Bounds) -> bool {
        self.min.x <= other.min.x
            && self.min.y <= other.min.y
            && self.max.x >= other.max.x
            && self.max.y >= other.max.y
    }

    pub fn contains_point(&self, point: &Point) -> bool {
        self.min.x <= point.x
            && self.min.y <= point.y
            && self.max.x >= point.x
            && self.max.y >= point.y
    }

    pub fn center(&self) -> Point {
        Point::new(
            (self.min.x + self.max.x) / 2.0,
            (self.min.y + self.max.y) / 2.0,
        )
    }

    pub fn area(&self) -> f32 {
        (self.max.x - self.min.x) * (self.max.y - self.min.y)
    }

    pub fn perimeter(&self) -> f32 {
        2.0 * ((self.max.x - self.min.x) + (self.max.y - self.min.y))
    }

    /// Area of the intersection of both boxes, 0 when they are disjoint.
    pub fn overlap_area(&self, other: &Bounds) -> f32 {
        let width = self.max.x.min(other.max.x) - self.min.x.max(other.min.x);
        let height = self.max.y.min(other.max.y) - self.min.y.max(other.min.y);
        if width <= 0.0 || height <= 0.0 {
            0.0
        } else {
            width * height
        }
    }
}

/// Largest `f32` that is `<= value`.
pub fn f64_to_f32_down(value: f64) -> f32 {
    if value.is_nan() {
        return f32::NAN;
    }
    if value >= f32::MAX as f64 {
        return f32::MAX;
    }
    if value <= f32::MIN as f64 {
        return f32::MIN;
    }
    let narrowed = value as f32;
    if (narrowed as f64) > value {
        next_f32_down(narrowed)
    } else {
        narrowed
    }
}

/// Smallest `f32` that is `>= value`.
pub fn f64_to_f32_up(value: f64) -> f32 {
    if value.is_nan() {
        return f32::NAN;
    }
    if value <= f32::MIN as f64 {
        return f32::MIN;
    }
    if value >= f32::MAX as f64 {
        return f32::MAX;
    }
    let narrowed = value as f32;
    if (narrowed as f64) < value {
        next_f32_up(narrowed)
    } else {
        narrowed
    }
}

fn next_f32_up(value: f32) -> f32 {
    if value == 0.0 {
        return f32::from_bits(1);
    }
    let bits = value.to_bits();
    if value > 0.0 {
        f32::from_bits(bits + 1)
    } else {
        f32::from_bits(bits - 1)
    }
}

fn next_f32_down(value: f32) -> f32 {
    -next_f32_up(-value)
}
