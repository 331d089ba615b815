//! Concave hull by k-nearest-neighbour boundary walking.
//!
//! Walks the boundary counter-clockwise from the lowest point, at each
//! step choosing among the k nearest unvisited points the one making the
//! sharpest clockwise turn from the incoming direction. If the walk gets
//! stuck or leaves points outside, the whole attempt restarts with a
//! larger k, so the result degrades gracefully towards the convex hull.

use puncta_core::{NullTracker, Point2, ProgressTracker};
use rstar::primitives::GeomWithData;
use rstar::RTree;

use std::f64::consts::{PI, TAU};

use super::geometry::{edges_cross, orient, polygon_contains};

type IndexedPoint = GeomWithData<[f64; 2], usize>;

/// Concave hull builder using the k-nearest-neighbour strategy.
///
/// Smaller k hugs the point set more tightly; k values below 3 are
/// clamped to 3.
#[derive(Debug, Clone)]
pub struct KnnConcaveHull2d {
    k: usize,
}

impl KnnConcaveHull2d {
    /// Creates a builder with the given neighbourhood size.
    #[must_use]
    pub fn new(k: usize) -> Self {
        Self { k: k.max(3) }
    }

    /// Returns the configured neighbourhood size.
    #[must_use]
    pub fn k(&self) -> usize {
        self.k
    }

    /// Computes the concave hull of a point set.
    ///
    /// Returns the hull vertices as indices into `points`, in
    /// counter-clockwise order. Returns `None` when the set is degenerate
    /// (fewer than three distinct positions, or all collinear), or when
    /// no k up to the point count yields a closed, containing boundary.
    #[must_use]
    pub fn hull(&self, points: &[Point2]) -> Option<Vec<usize>> {
        self.hull_tracked(points, &NullTracker)
    }

    /// [`hull`](Self::hull) with progress reporting; each enlargement of k
    /// after a failed walk is logged to the tracker.
    #[must_use]
    pub fn hull_tracked(
        &self,
        points: &[Point2],
        tracker: &dyn ProgressTracker,
    ) -> Option<Vec<usize>> {
        let mut unique: Vec<usize> = (0..points.len()).collect();
        unique.sort_by(|&a, &b| {
            points[a]
                .x
                .partial_cmp(&points[b].x)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(
                    points[a]
                        .y
                        .partial_cmp(&points[b].y)
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
        });
        unique.dedup_by(|&mut a, &mut b| points[a] == points[b]);

        let n = unique.len();
        if n < 3
            || unique
                .windows(2)
                .all(|w| orient(points[unique[0]], points[w[0]], points[w[1]]) == 0.0)
        {
            return None;
        }
        if n == 3 {
            let mut hull = unique;
            if orient(points[hull[0]], points[hull[1]], points[hull[2]]) < 0.0 {
                hull.swap(1, 2);
            }
            return Some(hull);
        }

        for k in self.k..n {
            if k > self.k {
                tracker.log(&format!("boundary walk failed, retrying with k = {k}"));
            }
            tracker.progress_count((k - self.k) as u64, (n - self.k) as u64);
            if let Some(hull) = attempt(points, &unique, k) {
                tracker.progress(1.0);
                return Some(hull);
            }
        }
        None
    }
}

fn attempt(points: &[Point2], unique: &[usize], k: usize) -> Option<Vec<usize>> {
    let start = *unique
        .iter()
        .min_by(|&&a, &&b| {
            points[a]
                .y
                .partial_cmp(&points[b].y)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(
                    points[a]
                        .x
                        .partial_cmp(&points[b].x)
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
        })
        .unwrap();

    let mut tree: RTree<IndexedPoint> = RTree::bulk_load(
        unique
            .iter()
            .filter(|&&i| i != start)
            .map(|&i| IndexedPoint::new([points[i].x, points[i].y], i))
            .collect(),
    );

    let mut hull = vec![start];
    let mut cur = start;
    // Pretend we arrived at the lowest point travelling east, so the
    // first step continues east along the underside of the set.
    let mut heading = 0.0f64;
    let mut start_open = false;

    loop {
        if !start_open && hull.len() == 4 {
            tree.insert(IndexedPoint::new([points[start].x, points[start].y], start));
            start_open = true;
        }
        let cur_p = points[cur];

        let mut candidates: Vec<(usize, f64, f64)> = tree
            .nearest_neighbor_iter(&[cur_p.x, cur_p.y])
            .take(k)
            .map(|item| {
                let p = Point2::new(item.geom()[0], item.geom()[1]);
                let direction = (p.y - cur_p.y).atan2(p.x - cur_p.x);
                (item.data, clockwise_turn(heading, direction), cur_p.distance_squared(&p))
            })
            .collect();
        if candidates.is_empty() {
            return None;
        }
        // Sharpest turn first; among equal turns prefer the farthest so
        // collinear runs are swallowed in one step.
        candidates.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal))
        });

        let (selected, selected_turn, _) = *candidates.iter().find(|&&(c, _, _)| {
            let cp = points[c];
            !hull
                .windows(2)
                .any(|w| edges_cross(cur_p, cp, points[w[0]], points[w[1]]))
        })?;

        // Points collinear with the chosen step lie on the new edge and
        // can never become vertices of this walk.
        for &(c, turn, _) in &candidates {
            if c != selected && turn == selected_turn {
                tree.remove(&IndexedPoint::new([points[c].x, points[c].y], c));
            }
        }
        tree.remove(&IndexedPoint::new(
            [points[selected].x, points[selected].y],
            selected,
        ));
        if selected == start {
            break;
        }
        let sp = points[selected];
        heading = (sp.y - cur_p.y).atan2(sp.x - cur_p.x);
        hull.push(selected);
        cur = selected;
    }

    let vertices: Vec<Point2> = hull.iter().map(|&i| points[i]).collect();
    if unique
        .iter()
        .all(|&i| polygon_contains(&vertices, points[i]))
    {
        Some(hull)
    } else {
        None
    }
}

/// Rank of a step direction, given the incoming `heading`: the clockwise
/// angle from the reversed heading round to `direction`, in `[0, 2pi)`.
///
/// Hard right turns score close to 2pi, straight ahead scores pi, left
/// turns score below pi and doubling back scores zero, so choosing the
/// maximum keeps the boundary as far right as the candidates allow.
fn clockwise_turn(heading: f64, direction: f64) -> f64 {
    let mut t = (heading + PI - direction) % TAU;
    if t < 0.0 {
        t += TAU;
    }
    t
}
