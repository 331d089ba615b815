//! Density estimators and spatial statistics over a 2D point set.
//!
//! [`DensityManager`] wraps one point set and offers several density
//! estimators sharing the same grid machinery: grid-accelerated circular
//! density, a brute-force reference, square density via a summed-area
//! table, 3x3 block density, and Ripley's K/L statistics. Reachability
//! ordering lives in [`crate::optics`] and is re-exported through
//! [`DensityManager::optics`].

use puncta_core::{Error, Point2, Result};

use crate::grid::CellGrid;
use crate::optics::{self, OpticsConfig, OpticsResult};

/// Density manager configuration.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DensityManagerConfig {
    /// Cap on the total number of grid cells.
    pub max_cells: usize,
    /// Sub-radius resolution for the summed-area-table square density.
    pub square_resolution: u32,
}

impl Default for DensityManagerConfig {
    fn default() -> Self {
        Self {
            max_cells: CellGrid::DEFAULT_MAX_CELLS,
            square_resolution: 10,
        }
    }
}

/// Density estimators and spatial statistics over one point set.
pub struct DensityManager {
    points: Vec<Point2>,
    min_x: f64,
    min_y: f64,
    max_x: f64,
    max_y: f64,
    config: DensityManagerConfig,
}

impl DensityManager {
    /// Creates a manager over the given coordinates.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MismatchedLengths`] when the arrays differ in
    /// length and [`Error::EmptyInput`] when they are empty.
    pub fn new(x: &[f64], y: &[f64]) -> Result<Self> {
        Self::with_config(x, y, DensityManagerConfig::default())
    }

    /// Creates a manager with a custom configuration.
    ///
    /// # Errors
    ///
    /// Same contract as [`DensityManager::new`].
    pub fn with_config(x: &[f64], y: &[f64], config: DensityManagerConfig) -> Result<Self> {
        if x.len() != y.len() {
            return Err(Error::MismatchedLengths {
                x_len: x.len(),
                y_len: y.len(),
            });
        }
        if x.is_empty() {
            return Err(Error::EmptyInput);
        }
        let points: Vec<Point2> = x
            .iter()
            .zip(y)
            .map(|(&px, &py)| Point2::new(px, py))
            .collect();
        let mut min_x = f64::INFINITY;
        let mut min_y = f64::INFINITY;
        let mut max_x = f64::NEG_INFINITY;
        let mut max_y = f64::NEG_INFINITY;
        for p in &points {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Ok(Self {
            points,
            min_x,
            min_y,
            max_x,
            max_y,
            config,
        })
    }

    /// Returns the number of points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns true when the manager holds no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Returns the diagonal of the bounding box.
    #[must_use]
    pub fn diagonal(&self) -> f64 {
        let dx = self.max_x - self.min_x;
        let dy = self.max_y - self.min_y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Grid-accelerated circular density: the number of other points
    /// strictly within `radius` of each point, in input order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRadius`] unless `radius` is finite and
    /// strictly positive.
    pub fn density(&self, radius: f64) -> Result<Vec<u32>> {
        let grid = self.grid(radius)?;
        let radius_sq = radius * radius;
        let mut counts = vec![0u32; self.points.len()];
        let mut neighbours = Vec::with_capacity(4);
        for c in 0..grid.n_cells() {
            let cell = grid.cell(c);
            if cell.is_empty() {
                continue;
            }
            for (j, &pj) in cell.iter().enumerate() {
                for &pk in &cell[..j] {
                    self.count_pair(pj, pk, radius_sq, &mut counts);
                }
            }
            grid.neighbours4(c, &mut neighbours);
            for &nc in &neighbours {
                for &pj in cell {
                    for &pk in grid.cell(nc) {
                        self.count_pair(pj, pk, radius_sq, &mut counts);
                    }
                }
            }
        }
        Ok(counts)
    }

    /// Brute-force circular density, the O(n^2) reference for
    /// [`DensityManager::density`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRadius`] unless `radius` is finite and
    /// strictly positive.
    pub fn density_all_vs_all(&self, radius: f64) -> Result<Vec<u32>> {
        validate_radius(radius)?;
        let radius_sq = radius * radius;
        let mut counts = vec![0u32; self.points.len()];
        for i in 0..self.points.len() {
            for j in 0..i {
                if self.points[i].distance_squared(&self.points[j]) < radius_sq {
                    counts[i] += 1;
                    counts[j] += 1;
                }
            }
        }
        Ok(counts)
    }

    /// Circular density around an external query set: for each query point,
    /// the number of indexed points strictly within `radius`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRadius`] unless `radius` is finite and
    /// strictly positive.
    pub fn density_around(&self, queries: &[Point2], radius: f64) -> Result<Vec<u32>> {
        let grid = self.grid(radius)?;
        let radius_sq = radius * radius;
        let mut cells = Vec::with_capacity(9);
        let counts = queries
            .iter()
            .map(|q| {
                let mut count = 0u32;
                grid.neighbours9(grid.safe_cell_of(q.x, q.y), &mut cells);
                for &c in &cells {
                    for &j in grid.cell(c) {
                        if self.points[j as usize].distance_squared(q) < radius_sq {
                            count += 1;
                        }
                    }
                }
                count
            })
            .collect();
        Ok(counts)
    }

    /// Square density via a summed-area table.
    ///
    /// Counts points inside the axis-aligned square of half-width `radius`
    /// centred on each point, binned at `radius / square_resolution`. The
    /// count is over occupied bins, so it is an approximation whose error
    /// shrinks with the resolution; it includes the point itself.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRadius`] unless `radius` is finite and
    /// strictly positive.
    pub fn square_density(&self, radius: f64) -> Result<Vec<u32>> {
        validate_radius(radius)?;
        let grid = CellGrid::build_with_resolution(
            self.points.len(),
            |i| (self.points[i].x, self.points[i].y),
            radius,
            self.config.square_resolution,
            self.config.max_cells,
        )?;
        let nx = grid.n_x_bins();
        let ny = grid.n_y_bins();

        // Summed-area table with a zero row/column border.
        let mut sat = vec![0u32; (nx + 1) * (ny + 1)];
        for y in 0..ny {
            for x in 0..nx {
                #[allow(clippy::cast_possible_truncation)]
                let here = grid.cell(y * nx + x).len() as u32;
                sat[(y + 1) * (nx + 1) + (x + 1)] =
                    here + sat[y * (nx + 1) + (x + 1)] + sat[(y + 1) * (nx + 1) + x]
                        - sat[y * (nx + 1) + x];
            }
        }

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let rings = (radius / grid.bin_width()).ceil() as usize;
        let counts = self
            .points
            .iter()
            .map(|p| {
                let xbin = grid.x_bin(p.x);
                let ybin = grid.y_bin(p.y);
                let x0 = xbin.saturating_sub(rings);
                let y0 = ybin.saturating_sub(rings);
                let x1 = (xbin + rings).min(nx - 1);
                let y1 = (ybin + rings).min(ny - 1);
                sat[(y1 + 1) * (nx + 1) + (x1 + 1)] + sat[y0 * (nx + 1) + x0]
                    - sat[y0 * (nx + 1) + (x1 + 1)]
                    - sat[(y1 + 1) * (nx + 1) + x0]
            })
            .collect();
        Ok(counts)
    }

    /// 3x3 block density: points in the 3x3 block of radius-wide cells
    /// around each point's cell, including the point itself.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRadius`] unless `radius` is finite and
    /// strictly positive.
    pub fn block_density(&self, radius: f64) -> Result<Vec<u32>> {
        let grid = self.grid(radius)?;
        let mut cells = Vec::with_capacity(9);
        let counts = self
            .points
            .iter()
            .map(|p| {
                grid.neighbours9(grid.safe_cell_of(p.x, p.y), &mut cells);
                #[allow(clippy::cast_possible_truncation)]
                let count = cells.iter().map(|&c| grid.cell(c).len()).sum::<usize>() as u32;
                count
            })
            .collect();
        Ok(counts)
    }

    /// 3x3 block density computed from per-cell block sums.
    ///
    /// Same contract as [`DensityManager::block_density`]; each cell's
    /// block sum is computed once and shared by all points in the cell.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRadius`] unless `radius` is finite and
    /// strictly positive.
    pub fn block_density2(&self, radius: f64) -> Result<Vec<u32>> {
        let grid = self.grid(radius)?;
        let mut cells = Vec::with_capacity(9);
        let mut block_sums = vec![0u32; grid.n_cells()];
        for (c, sum) in block_sums.iter_mut().enumerate() {
            grid.neighbours9(c, &mut cells);
            #[allow(clippy::cast_possible_truncation)]
            let s = cells.iter().map(|&n| grid.cell(n).len()).sum::<usize>() as u32;
            *sum = s;
        }
        let counts = self
            .points
            .iter()
            .map(|p| block_sums[grid.safe_cell_of(p.x, p.y)])
            .collect();
        Ok(counts)
    }

    /// Ripley's K function at `radius` over the bounding-box area.
    ///
    /// `K(r) = area * sum(neighbour counts) / n^2` with neighbours counted
    /// strictly within `radius`, excluding self.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRadius`] unless `radius` is finite and
    /// strictly positive.
    pub fn ripleys_k(&self, radius: f64) -> Result<f64> {
        let counts = self.density(radius)?;
        let area = (self.max_x - self.min_x) * (self.max_y - self.min_y);
        let total: u64 = counts.iter().map(|&c| u64::from(c)).sum();
        #[allow(clippy::cast_precision_loss)]
        let n = self.points.len() as f64;
        #[allow(clippy::cast_precision_loss)]
        Ok(area * total as f64 / (n * n))
    }

    /// Ripley's L function: `L(r) = sqrt(K(r) / pi)`.
    ///
    /// Under complete spatial randomness `L(r) - r` is approximately zero.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRadius`] unless `radius` is finite and
    /// strictly positive.
    pub fn ripleys_l(&self, radius: f64) -> Result<f64> {
        Ok((self.ripleys_k(radius)? / std::f64::consts::PI).sqrt())
    }

    /// Computes the OPTICS reachability ordering of the point set.
    ///
    /// See [`crate::optics::optics`] for the clamping and sentinel
    /// policies.
    ///
    /// # Errors
    ///
    /// Propagates grid construction failures for degenerate point sets.
    pub fn optics(&self, generating_distance: f64, min_pts: usize) -> Result<OpticsResult> {
        optics::optics(
            &self.points,
            OpticsConfig {
                generating_distance,
                min_pts,
                ..OpticsConfig::default()
            },
        )
    }

    #[inline]
    fn count_pair(&self, i: u32, j: u32, radius_sq: f64, counts: &mut [u32]) {
        if self.points[i as usize].distance_squared(&self.points[j as usize]) < radius_sq {
            counts[i as usize] += 1;
            counts[j as usize] += 1;
        }
    }

    fn grid(&self, radius: f64) -> Result<CellGrid> {
        validate_radius(radius)?;
        CellGrid::build(
            self.points.len(),
            |i| (self.points[i].x, self.points[i].y),
            radius,
            self.config.max_cells,
        )
    }
}

fn validate_radius(radius: f64) -> Result<()> {
    if !radius.is_finite() || radius <= 0.0 {
        return Err(Error::InvalidRadius(radius));
    }
    Ok(())
}
