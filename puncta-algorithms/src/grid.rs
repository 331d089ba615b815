//! Uniform spatial binning for distance-bounded neighbour queries.
//!
//! The grid maps arbitrary-precision 2D coordinates into a bounded array of
//! uniform cells sized so that a search radius spans at most one ring of
//! adjacent cells. Every density and ordering algorithm in this crate is
//! built on top of it.

use puncta_core::{Error, Result};

/// Clamps a bin index into `[0, upper - 1]`.
///
/// Used for safe bin lookup of query points that may fall outside the
/// bounds the grid was built from.
#[inline]
#[must_use]
pub fn clip(upper: usize, value: i64) -> usize {
    if value < 0 {
        0
    } else {
        #[allow(clippy::cast_sign_loss)]
        let v = value as usize;
        v.min(upper - 1)
    }
}

/// A uniform 2D binning grid over a point set.
///
/// Cells hold point indices into the caller's arena; the grid never owns
/// coordinates. Cell width is at least the requested search radius, grown
/// when the naive width would exceed the cell cap, so a radius-bounded
/// query only ever needs a cell and its immediate neighbours.
#[derive(Debug, Clone)]
pub struct CellGrid {
    min_x: f64,
    min_y: f64,
    bin_width: f64,
    n_x_bins: usize,
    n_y_bins: usize,
    cells: Vec<Vec<u32>>,
}

impl CellGrid {
    /// Default cap on the total number of grid cells.
    ///
    /// The naive bin width (one search radius) can explode the cell count
    /// for sparse data spread over a large area; the width is grown until
    /// the count falls under this cap.
    pub const DEFAULT_MAX_CELLS: usize = 100_000;

    /// Builds a grid over `n` points with cell width at least `min_width`.
    ///
    /// `coord` maps a point index to its `(x, y)` position. The width is
    /// multiplied by sqrt(2) until the cell count fits under `max_cells`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyInput`] for `n == 0` and
    /// [`Error::InvalidRadius`] when `min_width` is not finite and positive.
    pub fn build<F>(n: usize, coord: F, min_width: f64, max_cells: usize) -> Result<Self>
    where
        F: Fn(usize) -> (f64, f64),
    {
        if n == 0 {
            return Err(Error::EmptyInput);
        }
        if !min_width.is_finite() || min_width <= 0.0 {
            return Err(Error::InvalidRadius(min_width));
        }

        let (min_x, min_y, max_x, max_y) = bounds(n, &coord);

        let mut bin_width = min_width;
        loop {
            let nx = n_bins(max_x - min_x, bin_width);
            let ny = n_bins(max_y - min_y, bin_width);
            if nx.saturating_mul(ny) <= max_cells.max(1) {
                break;
            }
            bin_width *= std::f64::consts::SQRT_2;
        }

        let n_x_bins = n_bins(max_x - min_x, bin_width);
        let n_y_bins = n_bins(max_y - min_y, bin_width);

        let mut cells = vec![Vec::new(); n_x_bins * n_y_bins];
        for i in 0..n {
            let (x, y) = coord(i);
            let xbin = bin_index(x, min_x, bin_width);
            let ybin = bin_index(y, min_y, bin_width);
            #[allow(clippy::cast_possible_truncation)]
            cells[ybin * n_x_bins + xbin].push(i as u32);
        }

        Ok(Self {
            min_x,
            min_y,
            bin_width,
            n_x_bins,
            n_y_bins,
            cells,
        })
    }

    /// Builds a grid for a generating distance using a sub-radius resolution.
    ///
    /// The cell width is `distance / resolution` with the resolution shrunk
    /// until the cell count fits under `max_cells`; a finer resolution keeps
    /// ordering queries tight while the cap bounds memory.
    ///
    /// # Errors
    ///
    /// Same contract as [`CellGrid::build`].
    pub fn build_with_resolution<F>(
        n: usize,
        coord: F,
        distance: f64,
        mut resolution: u32,
        max_cells: usize,
    ) -> Result<Self>
    where
        F: Fn(usize) -> (f64, f64),
    {
        if n == 0 {
            return Err(Error::EmptyInput);
        }
        if !distance.is_finite() || distance <= 0.0 {
            return Err(Error::InvalidRadius(distance));
        }

        let (min_x, min_y, max_x, max_y) = bounds(n, &coord);
        resolution = resolution.max(1);
        while resolution > 1 {
            let width = distance / f64::from(resolution);
            let nx = n_bins(max_x - min_x, width);
            let ny = n_bins(max_y - min_y, width);
            if nx.saturating_mul(ny) <= max_cells.max(1) {
                break;
            }
            resolution -= 1;
        }

        Self::build(n, coord, distance / f64::from(resolution), max_cells)
    }

    /// Returns the effective cell width.
    #[must_use]
    pub fn bin_width(&self) -> f64 {
        self.bin_width
    }

    /// Returns the number of bins along x.
    #[must_use]
    pub fn n_x_bins(&self) -> usize {
        self.n_x_bins
    }

    /// Returns the number of bins along y.
    #[must_use]
    pub fn n_y_bins(&self) -> usize {
        self.n_y_bins
    }

    /// Returns the total number of cells.
    #[must_use]
    pub fn n_cells(&self) -> usize {
        self.cells.len()
    }

    /// Returns the point indices stored in a cell.
    #[must_use]
    pub fn cell(&self, index: usize) -> &[u32] {
        &self.cells[index]
    }

    /// Returns the x bin for a coordinate inside the build bounds.
    #[inline]
    #[must_use]
    pub fn x_bin(&self, x: f64) -> usize {
        bin_index(x, self.min_x, self.bin_width)
    }

    /// Returns the y bin for a coordinate inside the build bounds.
    #[inline]
    #[must_use]
    pub fn y_bin(&self, y: f64) -> usize {
        bin_index(y, self.min_y, self.bin_width)
    }

    /// Returns the cell index for an arbitrary query coordinate, clamping
    /// out-of-bounds positions onto the boundary cells.
    #[inline]
    #[must_use]
    pub fn safe_cell_of(&self, x: f64, y: f64) -> usize {
        #[allow(clippy::cast_possible_truncation)]
        let xbin = clip(self.n_x_bins, ((x - self.min_x) / self.bin_width).floor() as i64);
        #[allow(clippy::cast_possible_truncation)]
        let ybin = clip(self.n_y_bins, ((y - self.min_y) / self.bin_width).floor() as i64);
        ybin * self.n_x_bins + xbin
    }

    /// Collects the forward half-neighbourhood of a cell.
    ///
    /// Emits only the cells after `cell` in raster order:
    /// `(x-1, y+1), (x, y+1), (x+1, y+1), (x+1, y)`. Scanning these plus the
    /// intra-cell `k < j` pairs visits every unordered cell pair exactly
    /// once, so symmetric accumulation never double counts.
    pub fn neighbours4(&self, cell: usize, out: &mut Vec<usize>) {
        out.clear();
        let xbin = cell % self.n_x_bins;
        let ybin = cell / self.n_x_bins;
        if ybin + 1 < self.n_y_bins {
            if xbin > 0 {
                out.push(cell + self.n_x_bins - 1);
            }
            out.push(cell + self.n_x_bins);
            if xbin + 1 < self.n_x_bins {
                out.push(cell + self.n_x_bins + 1);
            }
        }
        if xbin + 1 < self.n_x_bins {
            out.push(cell + 1);
        }
    }

    /// Collects all 8 surrounding cells, clipped at the boundary.
    ///
    /// Used when each point pair is deliberately compared from both
    /// directions (lock-free multi-threaded counting).
    pub fn neighbours8(&self, cell: usize, out: &mut Vec<usize>) {
        out.clear();
        let xbin = cell % self.n_x_bins;
        let ybin = cell / self.n_x_bins;
        for dy in -1i64..=1 {
            for dx in -1i64..=1 {
                if dx == 0 && dy == 0 {
                    continue;
                }
                #[allow(clippy::cast_possible_wrap)]
                let nx = xbin as i64 + dx;
                #[allow(clippy::cast_possible_wrap)]
                let ny = ybin as i64 + dy;
                #[allow(clippy::cast_possible_wrap)]
                if nx >= 0 && ny >= 0 && nx < self.n_x_bins as i64 && ny < self.n_y_bins as i64 {
                    #[allow(clippy::cast_sign_loss)]
                    out.push(ny as usize * self.n_x_bins + nx as usize);
                }
            }
        }
    }

    /// Collects the cell itself plus its 8 surrounding cells.
    ///
    /// Used for single queries around an external point that is not itself
    /// a grid member.
    pub fn neighbours9(&self, cell: usize, out: &mut Vec<usize>) {
        self.neighbours8(cell, out);
        out.push(cell);
    }

    /// Collects every cell within `rings` cells of `cell` (Chebyshev
    /// distance), including the cell itself, clipped at the boundary.
    ///
    /// Needed when the search radius spans more than one cell, as with the
    /// sub-radius resolution grids used for reachability ordering.
    pub fn neighbourhood(&self, cell: usize, rings: usize, out: &mut Vec<usize>) {
        out.clear();
        let xbin = cell % self.n_x_bins;
        let ybin = cell / self.n_x_bins;
        let x0 = xbin.saturating_sub(rings);
        let y0 = ybin.saturating_sub(rings);
        let x1 = (xbin + rings).min(self.n_x_bins - 1);
        let y1 = (ybin + rings).min(self.n_y_bins - 1);
        for y in y0..=y1 {
            for x in x0..=x1 {
                out.push(y * self.n_x_bins + x);
            }
        }
    }
}

fn bounds<F>(n: usize, coord: &F) -> (f64, f64, f64, f64)
where
    F: Fn(usize) -> (f64, f64),
{
    let mut min_x = f64::INFINITY;
    let mut min_y = f64::INFINITY;
    let mut max_x = f64::NEG_INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    for i in 0..n {
        let (x, y) = coord(i);
        min_x = min_x.min(x);
        min_y = min_y.min(y);
        max_x = max_x.max(x);
        max_y = max_y.max(y);
    }
    (min_x, min_y, max_x, max_y)
}

#[inline]
fn n_bins(range: f64, bin_width: f64) -> usize {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let bins = 1 + (range / bin_width).floor() as usize;
    bins
}

#[inline]
fn bin_index(v: f64, min: f64, bin_width: f64) -> usize {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let bin = ((v - min) / bin_width).floor() as usize;
    bin
}
