//! OPTICS reachability ordering with grid acceleration.
//!
//! Produces the classic OPTICS cluster-order: each point is visited once
//! and annotated with a core distance and a reachability distance. The
//! starting point among unvisited points is arbitrary (index order here),
//! so recorded reachability distances reflect the specific traversal path
//! taken; they are not guaranteed minimal over all traversal orders. This
//! is an accepted property of the algorithm, not a defect.

use puncta_core::{Error, Point2, Result};

use crate::grid::CellGrid;

/// OPTICS configuration.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OpticsConfig {
    /// Maximum neighbour search radius (the generating distance E).
    ///
    /// A non-finite, non-positive or over-large value is replaced by the
    /// point-set diagonal, the largest meaningful distance.
    pub generating_distance: f64,
    /// Minimum neighbours (including the point itself) for a point to be
    /// core. Values below 1 are clamped to 1.
    pub min_pts: usize,
    /// Sub-radius grid resolution; shrunk to respect `max_cells`.
    pub resolution: u32,
    /// Cap on the total number of grid cells.
    pub max_cells: usize,
}

impl OpticsConfig {
    /// Factor applied to the generating distance to produce the sentinel
    /// recorded for undefined core/reachability distances. Slightly above
    /// 1 so downstream consumers can treat "never reached" uniformly as
    /// "far".
    pub const UNDEFINED_MARGIN: f64 = 1.01;
}

impl Default for OpticsConfig {
    fn default() -> Self {
        Self {
            generating_distance: 0.0,
            min_pts: 5,
            resolution: 10,
            max_cells: CellGrid::DEFAULT_MAX_CELLS,
        }
    }
}

/// Per-point OPTICS output.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OpticsEntry {
    /// Index of the point in the input slice.
    pub index: usize,
    /// 1-based visitation order.
    pub order: usize,
    /// Core distance, or the undefined sentinel.
    pub core_distance: f64,
    /// Reachability distance, or the undefined sentinel.
    pub reachability_distance: f64,
}

/// Result of an OPTICS run, sorted by visitation order.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OpticsResult {
    /// Entries in visitation order (`entries[i].order == i + 1`).
    pub entries: Vec<OpticsEntry>,
    /// The generating distance actually used after clamping.
    pub generating_distance: f64,
    /// The minimum-points parameter actually used after clamping.
    pub min_pts: usize,
}

impl OpticsResult {
    /// The sentinel recorded for undefined distances.
    #[must_use]
    pub fn undefined_distance(&self) -> f64 {
        self.generating_distance * OpticsConfig::UNDEFINED_MARGIN
    }
}

/// Computes the OPTICS ordering of a point set.
///
/// # Errors
///
/// Returns [`Error::EmptyInput`] for an empty slice. Out-of-range
/// parameters are clamped, not rejected: `min_pts < 1` becomes 1 and a
/// generating distance that is non-finite, non-positive or larger than the
/// point-set diagonal becomes the diagonal.
pub fn optics(points: &[Point2], config: OpticsConfig) -> Result<OpticsResult> {
    if points.is_empty() {
        return Err(Error::EmptyInput);
    }
    let min_pts = config.min_pts.max(1);
    let generating_distance = clamp_generating_distance(points, config.generating_distance);

    let grid = CellGrid::build_with_resolution(
        points.len(),
        |i| (points[i].x, points[i].y),
        generating_distance,
        config.resolution,
        config.max_cells,
    )?;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let rings = (generating_distance / grid.bin_width()).ceil() as usize;

    let n = points.len();
    let mut order = vec![0usize; n];
    let mut core = vec![f64::NAN; n];
    let mut reach = vec![f64::NAN; n];
    let mut counter = 0usize;

    let mut cells = Vec::new();
    let mut neighbours: Vec<(u32, f64)> = Vec::new();
    let mut seeds: Vec<u32> = Vec::new();

    let find_neighbours = |p: usize, cells: &mut Vec<usize>, out: &mut Vec<(u32, f64)>| {
        out.clear();
        let centre = points[p];
        let e_sq = generating_distance * generating_distance;
        grid.neighbourhood(grid.safe_cell_of(centre.x, centre.y), rings, cells);
        for &c in cells.iter() {
            for &j in grid.cell(c) {
                let d_sq = points[j as usize].distance_squared(&centre);
                if d_sq <= e_sq {
                    out.push((j, d_sq.sqrt()));
                }
            }
        }
    };

    for p in 0..n {
        if order[p] != 0 {
            continue;
        }
        counter += 1;
        order[p] = counter;

        find_neighbours(p, &mut cells, &mut neighbours);
        if neighbours.len() < min_pts {
            // Not core: no expansion from this point.
            continue;
        }
        core[p] = kth_distance(&mut neighbours, min_pts);
        seeds.clear();
        update_seeds(p, &neighbours, &core, &order, &mut reach, &mut seeds);

        let mut pos = 0;
        while pos < seeds.len() {
            // Only the unprocessed suffix needs re-sorting; earlier
            // entries are already consumed.
            sort_suffix(&mut seeds, pos, &reach);
            let q = seeds[pos] as usize;
            pos += 1;
            counter += 1;
            order[q] = counter;

            find_neighbours(q, &mut cells, &mut neighbours);
            if neighbours.len() >= min_pts {
                core[q] = kth_distance(&mut neighbours, min_pts);
                update_seeds(q, &neighbours, &core, &order, &mut reach, &mut seeds);
            }
        }
    }

    let sentinel = generating_distance * OpticsConfig::UNDEFINED_MARGIN;
    let mut entries = vec![
        OpticsEntry {
            index: 0,
            order: 0,
            core_distance: sentinel,
            reachability_distance: sentinel,
        };
        n
    ];
    for index in 0..n {
        let entry = &mut entries[order[index] - 1];
        entry.index = index;
        entry.order = order[index];
        if !core[index].is_nan() {
            entry.core_distance = core[index];
        }
        if !reach[index].is_nan() {
            entry.reachability_distance = reach[index];
        }
    }

    Ok(OpticsResult {
        entries,
        generating_distance,
        min_pts,
    })
}

fn clamp_generating_distance(points: &[Point2], e: f64) -> f64 {
    let mut min = points[0];
    let mut max = points[0];
    for p in points {
        min.x = min.x.min(p.x);
        min.y = min.y.min(p.y);
        max.x = max.x.max(p.x);
        max.y = max.y.max(p.y);
    }
    let diagonal = min.distance(&max);
    // A degenerate (single-position) set has no meaningful distance scale.
    let diagonal = if diagonal > 0.0 { diagonal } else { 1.0 };
    if e.is_finite() && e > 0.0 && e <= diagonal {
        e
    } else {
        diagonal
    }
}

/// The `min_pts`-th smallest neighbour distance (neighbours include the
/// point itself at distance zero).
fn kth_distance(neighbours: &mut [(u32, f64)], min_pts: usize) -> f64 {
    neighbours.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
    neighbours[min_pts - 1].1
}

/// Inserts or tightens seed candidates from an expansion centre.
fn update_seeds(
    centre: usize,
    neighbours: &[(u32, f64)],
    core: &[f64],
    order: &[usize],
    reach: &mut [f64],
    seeds: &mut Vec<u32>,
) {
    let core_distance = core[centre];
    for &(j, distance) in neighbours {
        let j_us = j as usize;
        if order[j_us] != 0 {
            continue;
        }
        let candidate = core_distance.max(distance);
        if reach[j_us].is_nan() {
            reach[j_us] = candidate;
            seeds.push(j);
        } else if candidate < reach[j_us] {
            reach[j_us] = candidate;
        }
    }
}

fn sort_suffix(seeds: &mut [u32], pos: usize, reach: &[f64]) {
    seeds[pos..].sort_by(|&a, &b| {
        reach[a as usize]
            .partial_cmp(&reach[b as usize])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn two_clusters() -> Vec<Point2> {
        let mut pts = Vec::new();
        for i in 0..5 {
            for j in 0..5 {
                pts.push(Point2::new(f64::from(i) * 0.5, f64::from(j) * 0.5));
                pts.push(Point2::new(100.0 + f64::from(i) * 0.5, f64::from(j) * 0.5));
            }
        }
        pts
    }

    #[test]
    fn test_order_is_a_permutation() {
        let pts = two_clusters();
        let result = optics(
            &pts,
            OpticsConfig {
                generating_distance: 2.0,
                min_pts: 4,
                ..OpticsConfig::default()
            },
        )
        .unwrap();
        assert_eq!(result.entries.len(), pts.len());
        let mut seen = vec![false; pts.len()];
        for (i, e) in result.entries.iter().enumerate() {
            assert_eq!(e.order, i + 1);
            assert!(!seen[e.index], "point visited twice");
            seen[e.index] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn test_distances_bounded_by_sentinel() {
        let pts = two_clusters();
        let result = optics(
            &pts,
            OpticsConfig {
                generating_distance: 2.0,
                min_pts: 4,
                ..OpticsConfig::default()
            },
        )
        .unwrap();
        let ceiling = result.undefined_distance();
        for e in &result.entries {
            assert!(e.reachability_distance >= 0.0);
            assert!(e.reachability_distance <= ceiling);
            assert!(e.core_distance <= ceiling);
        }
    }

    #[test]
    fn test_cluster_interior_has_defined_reachability() {
        let pts = two_clusters();
        let result = optics(
            &pts,
            OpticsConfig {
                generating_distance: 2.0,
                min_pts: 4,
                ..OpticsConfig::default()
            },
        )
        .unwrap();
        let ceiling = result.undefined_distance();
        // Every point except the two traversal starts (one per cluster)
        // is reached as a seed and has a defined reachability.
        let undefined = result
            .entries
            .iter()
            .filter(|e| (e.reachability_distance - ceiling).abs() < f64::EPSILON)
            .count();
        assert_eq!(undefined, 2);
    }

    #[test]
    fn test_min_pts_clamped_to_one() {
        let pts = vec![Point2::new(0.0, 0.0), Point2::new(1.0, 0.0)];
        let result = optics(
            &pts,
            OpticsConfig {
                generating_distance: 5.0,
                min_pts: 0,
                ..OpticsConfig::default()
            },
        )
        .unwrap();
        assert_eq!(result.min_pts, 1);
        // With min_pts 1 every point is core at distance zero (itself).
        assert_relative_eq!(result.entries[0].core_distance, 0.0);
    }

    #[test]
    fn test_generating_distance_clamped_to_diagonal() {
        let pts = vec![Point2::new(0.0, 0.0), Point2::new(3.0, 4.0)];
        for e in [f64::NAN, -1.0, 0.0, 1e12] {
            let result = optics(
                &pts,
                OpticsConfig {
                    generating_distance: e,
                    min_pts: 2,
                    ..OpticsConfig::default()
                },
            )
            .unwrap();
            assert_relative_eq!(result.generating_distance, 5.0);
        }
    }

    #[test]
    fn test_empty_input_rejected() {
        assert!(matches!(
            optics(&[], OpticsConfig::default()),
            Err(Error::EmptyInput)
        ));
    }
}
