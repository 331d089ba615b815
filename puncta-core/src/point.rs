//! Point types for 2D spatial analysis.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A 2D coordinate with double precision.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Point2 {
    /// X coordinate.
    pub x: f64,
    /// Y coordinate.
    pub y: f64,
}

impl Point2 {
    /// Creates a new point.
    #[inline]
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Computes the squared Euclidean distance to another point.
    #[inline]
    #[must_use]
    pub fn distance_squared(&self, other: &Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    /// Computes the Euclidean distance to another point.
    #[inline]
    #[must_use]
    pub fn distance(&self, other: &Self) -> f64 {
        self.distance_squared(other).sqrt()
    }
}

impl From<(f64, f64)> for Point2 {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

/// A 2D point carrying an integer category id, used for per-category
/// density counting.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CategorizedPoint {
    /// X coordinate.
    pub x: f64,
    /// Y coordinate.
    pub y: f64,
    /// Category id (class label) for density breakdowns.
    pub id: u32,
}

impl CategorizedPoint {
    /// Creates a new categorized point.
    #[inline]
    #[must_use]
    pub fn new(x: f64, y: f64, id: u32) -> Self {
        Self { x, y, id }
    }

    /// Computes the squared Euclidean distance to another point.
    #[inline]
    #[must_use]
    pub fn distance_squared(&self, other: &Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }
}

/// A weighted 2D point with an optional time window, the input unit for
/// cluster linkage.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TimedPoint {
    /// X coordinate.
    pub x: f64,
    /// Y coordinate.
    pub y: f64,
    /// Point weight (photon count, intensity).
    pub weight: f64,
    /// Start of the time window (frame or timestamp).
    pub start: f64,
    /// End of the time window.
    pub end: f64,
    /// Source id carried through clustering.
    pub id: u32,
}

impl TimedPoint {
    /// Creates a new timed point.
    #[must_use]
    pub fn new(x: f64, y: f64, weight: f64, start: f64, end: f64, id: u32) -> Self {
        Self {
            x,
            y,
            weight,
            start,
            end,
            id,
        }
    }

    /// Creates an untimed unit-weight point.
    #[must_use]
    pub fn at(x: f64, y: f64) -> Self {
        Self::new(x, y, 1.0, 0.0, 0.0, 0)
    }

    /// Computes the gap between two time windows.
    ///
    /// Returns zero when the windows overlap, otherwise the distance
    /// between the nearer edges.
    #[inline]
    #[must_use]
    pub fn gap(start1: f64, end1: f64, start2: f64, end2: f64) -> f64 {
        (start1.max(start2) - end1.min(end2)).max(0.0)
    }
}

impl Default for TimedPoint {
    fn default() -> Self {
        Self::at(0.0, 0.0)
    }
}
