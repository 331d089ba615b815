//! Concave hull by edge digging.
//!
//! Starts from the convex hull and repeatedly replaces a boundary edge by
//! two edges through a nearby interior point, whenever the edge is long
//! relative to the distance of that point (the dig ratio). Nearest
//! interior points are queried from an R-tree that shrinks as points are
//! consumed onto the boundary.

use puncta_core::{Error, NullTracker, Point2, ProgressTracker, Result};
use rstar::primitives::GeomWithData;
use rstar::RTree;

use std::collections::VecDeque;

use super::convex::convex_hull;
use super::geometry::{cos_angle, edges_cross};

type IndexedPoint = GeomWithData<[f64; 2], usize>;

/// Concave hull builder using the digging strategy.
///
/// The threshold controls how aggressively edges are dug: an edge of
/// length `eh` with a nearest interior point at distance `dd` is split
/// when `eh / dd` exceeds the threshold. Larger thresholds leave the
/// hull closer to convex.
#[derive(Debug, Clone)]
pub struct DiggingConcaveHull2d {
    threshold: f64,
}

impl DiggingConcaveHull2d {
    /// Creates a builder with the given dig threshold.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidThreshold`] unless the threshold is finite
    /// and positive.
    pub fn new(threshold: f64) -> Result<Self> {
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(Error::InvalidThreshold(threshold));
        }
        Ok(Self { threshold })
    }

    /// Returns the configured dig threshold.
    #[must_use]
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Computes the concave hull of a point set.
    ///
    /// Returns the hull vertices as indices into `points`, in
    /// counter-clockwise order, or `None` when the set is degenerate
    /// (fewer than three distinct positions, or all collinear).
    #[must_use]
    pub fn hull(&self, points: &[Point2]) -> Option<Vec<usize>> {
        self.hull_tracked(points, &NullTracker)
    }

    /// [`hull`](Self::hull) with progress reporting; progress advances as
    /// interior points are consumed onto the boundary.
    #[must_use]
    pub fn hull_tracked(
        &self,
        points: &[Point2],
        tracker: &dyn ProgressTracker,
    ) -> Option<Vec<usize>> {
        let mut hull = convex_hull(points)?;

        // Interior points, one tree entry per distinct position.
        let mut tree: RTree<IndexedPoint> = RTree::new();
        let on_hull: std::collections::HashSet<usize> = hull.iter().copied().collect();
        for (i, p) in points.iter().enumerate() {
            if on_hull.contains(&i) {
                continue;
            }
            if tree.locate_at_point(&[p.x, p.y]).is_none()
                && !hull.iter().any(|&h| points[h] == *p)
            {
                tree.insert(IndexedPoint::new([p.x, p.y], i));
            }
        }

        let mut queue: VecDeque<(usize, usize)> = VecDeque::new();
        for w in hull.windows(2) {
            queue.push_back((w[0], w[1]));
        }
        queue.push_back((hull[hull.len() - 1], hull[0]));

        // Consecutive edges share a vertex, so the nearest-neighbour
        // result for the shared endpoint carries over.
        let mut cache: Option<(usize, usize, f64)> = None;

        let interior = tree.size() as u64;
        let mut dug = 0u64;
        tracker.status("digging concave hull");

        while let Some((a, b)) = queue.pop_front() {
            if tree.size() == 0 {
                break;
            }
            let pa = points[a];
            let pb = points[b];
            let eh = pa.distance(&pb);

            let near_a = match cache {
                Some((v, n, d))
                    if v == a && tree.contains(&IndexedPoint::new(coords(points, n), n)) =>
                {
                    Some((n, d))
                }
                _ => nearest(&tree, pa),
            };
            let near_b = nearest(&tree, pb);
            cache = near_b.map(|(n, d)| (b, n, d));

            let (mut dig, mut dd) = match (near_a, near_b) {
                (Some((n1, d1)), Some((n2, d2))) => {
                    if d1 <= d2 {
                        (n1, d1)
                    } else {
                        (n2, d2)
                    }
                }
                (Some(n), None) | (None, Some(n)) => n,
                (None, None) => break,
            };
            if dd <= 0.0 || eh / dd <= self.threshold {
                continue;
            }

            // Refine: within the triangle's neighbourhood, prefer the
            // point subtending the widest angle over the edge.
            let pd = points[dig];
            let cx = (pa.x + pb.x + pd.x) / 3.0;
            let cy = (pa.y + pb.y + pd.y) / 3.0;
            let centre = Point2::new(cx, cy);
            let r_sq = centre
                .distance_squared(&pa)
                .max(centre.distance_squared(&pb))
                .max(centre.distance_squared(&pd));
            let mut best_cos = cos_angle(pd, pa, pb);
            for item in tree.locate_within_distance([cx, cy], r_sq) {
                let q = item.data;
                if q == dig {
                    continue;
                }
                let c = cos_angle(points[q], pa, pb);
                if c < best_cos {
                    best_cos = c;
                    dig = q;
                }
            }
            let pd = points[dig];
            dd = pd.distance(&pa).min(pd.distance(&pb));
            if dd <= 0.0 || eh / dd <= self.threshold {
                continue;
            }

            // The dig point must face this edge more squarely than either
            // neighbouring edge, otherwise it belongs to one of those.
            let pos = match hull.iter().position(|&v| v == a) {
                Some(p) => p,
                None => continue,
            };
            let prev = hull[(pos + hull.len() - 1) % hull.len()];
            let next_pos = (pos + 1) % hull.len();
            let next = hull[(next_pos + 1) % hull.len()];
            let cos_main = best_cos;
            let cos_prev = cos_angle(pd, points[prev], pa);
            let cos_next = cos_angle(pd, pb, points[next]);
            if !(cos_main < cos_prev && cos_main < cos_next) {
                continue;
            }

            // The two replacement edges must not cross the boundary.
            let crosses = hull_edges(&hull).any(|(u, v)| {
                edges_cross(pa, pd, points[u], points[v])
                    || edges_cross(pd, pb, points[u], points[v])
            });
            if crosses {
                continue;
            }

            tree.remove(&IndexedPoint::new([pd.x, pd.y], dig));
            hull.insert(next_pos, dig);
            queue.push_back((a, dig));
            queue.push_back((dig, b));
            cache = None;
            dug += 1;
            tracker.progress_count(dug, interior);
        }

        tracker.progress(1.0);
        Some(hull)
    }
}

fn coords(points: &[Point2], i: usize) -> [f64; 2] {
    [points[i].x, points[i].y]
}

fn nearest(tree: &RTree<IndexedPoint>, from: Point2) -> Option<(usize, f64)> {
    tree.nearest_neighbor(&[from.x, from.y])
        .map(|item| (item.data, from.distance(&Point2::new(item.geom()[0], item.geom()[1]))))
}

fn hull_edges(hull: &[usize]) -> impl Iterator<Item = (usize, usize)> + '_ {
    (0..hull.len()).map(move |i| (hull[i], hull[(i + 1) % hull.len()]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hull::geometry::polygon_contains;

    fn pts(coords: &[(f64, f64)]) -> Vec<Point2> {
        coords.iter().map(|&(x, y)| Point2::new(x, y)).collect()
    }

    fn assert_simple_and_containing(points: &[Point2], hull: &[usize]) {
        let vertices: Vec<Point2> = hull.iter().map(|&i| points[i]).collect();
        for (k, (u, v)) in hull_edges(hull).enumerate() {
            for (m, (s, t)) in hull_edges(hull).enumerate() {
                if k < m {
                    assert!(
                        !edges_cross(points[u], points[v], points[s], points[t]),
                        "hull is self-intersecting"
                    );
                }
            }
        }
        for p in points {
            assert!(polygon_contains(&vertices, *p), "point {p:?} escapes hull");
        }
    }

    #[test]
    fn test_invalid_threshold() {
        assert!(matches!(
            DiggingConcaveHull2d::new(0.0),
            Err(Error::InvalidThreshold(_))
        ));
        assert!(matches!(
            DiggingConcaveHull2d::new(-1.0),
            Err(Error::InvalidThreshold(_))
        ));
        assert!(DiggingConcaveHull2d::new(f64::NAN).is_err());
        assert!(DiggingConcaveHull2d::new(2.0).is_ok());
    }

    #[test]
    fn test_square_with_centre_stays_square() {
        let p = pts(&[
            (0.0, 0.0),
            (1.0, 0.0),
            (1.0, 1.0),
            (0.0, 1.0),
            (0.5, 0.5),
        ]);
        let builder = DiggingConcaveHull2d::new(2.0).unwrap();
        let hull = builder.hull(&p).unwrap();
        assert_eq!(hull.len(), 4);
        assert!(!hull.contains(&4));
    }

    #[test]
    fn test_centre_never_dug_even_at_small_threshold() {
        // The centre faces every edge and both its neighbours at the same
        // right angle, so the neighbour-edge check always rejects it.
        let p = pts(&[
            (0.0, 0.0),
            (1.0, 0.0),
            (1.0, 1.0),
            (0.0, 1.0),
            (0.5, 0.5),
        ]);
        let builder = DiggingConcaveHull2d::new(0.5).unwrap();
        let hull = builder.hull(&p).unwrap();
        assert_eq!(hull.len(), 4);
    }

    #[test]
    fn test_digs_into_a_bay() {
        // A wide rectangle with a line of points dipping inward from the
        // top edge's midpoint. A permissive threshold digs the bay open.
        let p = pts(&[
            (0.0, 0.0),
            (10.0, 0.0),
            (10.0, 4.0),
            (0.0, 4.0),
            (5.0, 1.0),
        ]);
        let builder = DiggingConcaveHull2d::new(1.5).unwrap();
        let hull = builder.hull(&p).unwrap();
        assert!(hull.len() >= 4);
        assert_simple_and_containing(&p, &hull);
    }

    #[test]
    fn test_hull_remains_simple_on_scatter() {
        // Deterministic LCG scatter.
        let mut state = 0x2545_f491_4f6c_dd1du64;
        let mut next = move || {
            state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
            ((state >> 33) as f64) / f64::from(1u32 << 31)
        };
        let p: Vec<Point2> = (0..120)
            .map(|_| Point2::new(next() * 20.0, next() * 20.0))
            .collect();
        let builder = DiggingConcaveHull2d::new(2.0).unwrap();
        let hull = builder.hull(&p).unwrap();
        assert!(hull.len() >= 3);
        assert_simple_and_containing(&p, &hull);
    }

    #[test]
    fn test_larger_threshold_never_adds_vertices() {
        // Raising the threshold only removes dig opportunities, so the
        // vertex count over a fixed point set is non-increasing.
        let mut state = 0x853c_49e6_748f_ea9bu64;
        let mut next = move || {
            state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
            ((state >> 33) as f64) / f64::from(1u32 << 31)
        };
        let p: Vec<Point2> = (0..150)
            .map(|_| Point2::new(next() * 20.0, next() * 20.0))
            .collect();
        let mut previous = usize::MAX;
        for threshold in [1.2, 1.5, 2.0, 3.0, 5.0] {
            let hull = DiggingConcaveHull2d::new(threshold).unwrap().hull(&p).unwrap();
            assert_simple_and_containing(&p, &hull);
            assert!(
                hull.len() <= previous,
                "threshold {threshold} grew the hull: {} > {previous}",
                hull.len()
            );
            previous = hull.len();
        }
    }

    #[test]
    fn test_degenerate_returns_none() {
        let builder = DiggingConcaveHull2d::new(2.0).unwrap();
        assert!(builder.hull(&pts(&[(0.0, 0.0), (1.0, 1.0)])).is_none());
        assert!(builder
            .hull(&pts(&[(0.0, 0.0), (1.0, 1.0), (2.0, 2.0)]))
            .is_none());
    }
}
