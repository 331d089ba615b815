//! Convex hull by Andrew's monotone chain.

use puncta_core::Point2;

use super::geometry::orient;

/// Computes the convex hull of a point set.
///
/// Returns the indices of the hull vertices in counter-clockwise order.
/// Points lying exactly on a hull edge are retained as vertices. Exact
/// coordinate duplicates contribute a single vertex (the first index
/// wins). Returns `None` when fewer than three distinct positions exist
/// or all points are collinear.
#[must_use]
pub fn convex_hull(points: &[Point2]) -> Option<Vec<usize>> {
    let mut order: Vec<usize> = (0..points.len()).collect();
    order.sort_by(|&a, &b| {
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
    order.dedup_by(|&mut a, &mut b| points[a] == points[b]);
    if order.len() < 3 {
        return None;
    }

    // Keep collinear boundary points: pop only on a strict clockwise turn.
    let mut lower: Vec<usize> = Vec::new();
    for &i in &order {
        while lower.len() >= 2
            && orient(
                points[lower[lower.len() - 2]],
                points[lower[lower.len() - 1]],
                points[i],
            ) < 0.0
        {
            lower.pop();
        }
        lower.push(i);
    }

    let mut upper: Vec<usize> = Vec::new();
    for &i in order.iter().rev() {
        while upper.len() >= 2
            && orient(
                points[upper[upper.len() - 2]],
                points[upper[upper.len() - 1]],
                points[i],
            ) < 0.0
        {
            upper.pop();
        }
        upper.push(i);
    }

    lower.pop();
    upper.pop();
    lower.extend(upper);

    // All collinear: the chain has no area.
    let degenerate = lower
        .windows(2)
        .all(|w| orient(points[lower[0]], points[w[0]], points[w[1]]) == 0.0);
    if degenerate {
        return None;
    }
    Some(lower)
}
