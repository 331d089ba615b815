//! Per-category neighbour counting within a fixed radius.
//!
//! Builds a [`CellGrid`] at one search radius per cell and counts, for every
//! input point, the neighbours within the radius broken down by category id.
//! Counting is symmetric: each unordered point pair is evaluated exactly
//! once on the single-threaded path, and the two parallel strategies trade
//! synchronization against duplicated distance computations.

use puncta_core::{CategorizedPoint, Error, NullTracker, Point2, ProgressTracker, Result};
use rayon::prelude::*;

use crate::grid::CellGrid;

/// Worker write discipline for multi-threaded counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CountStrategy {
    /// Workers batch increments locally and flush under a lock on the
    /// shared result. Each unordered pair is compared once.
    #[default]
    Synchronized,
    /// Workers scan all 8 neighbour cells and write only the rows of
    /// points they own. No locking, twice the distance computations.
    OwnedRows,
}

/// Density counter configuration.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DensityCounterConfig {
    /// Number of worker threads; 1 selects the single-threaded path.
    /// Defaults to the available parallelism of the host.
    pub threads: usize,
    /// Write discipline for the multi-threaded path.
    pub strategy: CountStrategy,
    /// Cap on the total number of grid cells.
    pub max_cells: usize,
}

impl Default for DensityCounterConfig {
    fn default() -> Self {
        Self {
            threads: std::thread::available_parallelism()
                .map_or(1, std::num::NonZeroUsize::get),
            strategy: CountStrategy::default(),
            max_cells: CellGrid::DEFAULT_MAX_CELLS,
        }
    }
}

impl DensityCounterConfig {
    /// Sets the number of worker threads.
    #[must_use]
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    /// Sets the worker write discipline.
    #[must_use]
    pub fn with_strategy(mut self, strategy: CountStrategy) -> Self {
        self.strategy = strategy;
        self
    }
}

/// Number of buffered increments a synchronized worker holds before
/// flushing under the result lock.
const FLUSH_BATCH: usize = 4096;

/// Counts neighbours within a radius, per category id.
pub struct DensityCounter {
    points: Vec<CategorizedPoint>,
    radius_sq: f64,
    grid: CellGrid,
    config: DensityCounterConfig,
}

impl DensityCounter {
    /// Creates a counter over `points` with the given search radius.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRadius`] unless `radius` is finite and
    /// strictly positive, and [`Error::EmptyInput`] for an empty point set.
    pub fn new(
        points: &[CategorizedPoint],
        radius: f64,
        config: DensityCounterConfig,
    ) -> Result<Self> {
        if !radius.is_finite() || radius <= 0.0 {
            return Err(Error::InvalidRadius(radius));
        }
        let grid = CellGrid::build(
            points.len(),
            |i| (points[i].x, points[i].y),
            radius,
            config.max_cells,
        )?;
        Ok(Self {
            points: points.to_vec(),
            radius_sq: radius * radius,
            grid,
            config,
        })
    }

    /// Returns the number of input points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns true when the counter holds no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Counts, for every input point in input order, the neighbours within
    /// the radius per category id.
    ///
    /// Row `i` has length `max_id + 1`; index `id` holds the number of
    /// neighbours carrying that id, and the point's own id is incremented
    /// once for itself.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCategory`] if any point id exceeds `max_id`.
    pub fn count_all(&self, max_id: u32) -> Result<Vec<Vec<u32>>> {
        self.count_all_tracked(max_id, &NullTracker)
    }

    /// [`count_all`](Self::count_all) with progress reporting.
    ///
    /// The single-threaded path reports per-cell progress; the parallel
    /// strategies report phase boundaries only.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCategory`] if any point id exceeds `max_id`.
    pub fn count_all_tracked(
        &self,
        max_id: u32,
        tracker: &dyn ProgressTracker,
    ) -> Result<Vec<Vec<u32>>> {
        self.validate_ids(max_id)?;
        let width = max_id as usize + 1;
        let mut counts: Vec<Vec<u32>> = vec![vec![0; width]; self.points.len()];

        // Self contribution.
        for (row, p) in counts.iter_mut().zip(&self.points) {
            row[p.id as usize] += 1;
        }

        if self.config.threads > 1 {
            tracker.status("counting neighbours in parallel");
            tracker.progress(0.0);
            self.count_all_parallel(&mut counts);
        } else {
            tracker.status("counting neighbours");
            self.count_all_single(&mut counts, tracker);
        }
        tracker.progress(1.0);
        Ok(counts)
    }

    /// Counts neighbours of an external query set against the indexed
    /// points, per category id.
    ///
    /// Query points are not grid members: the full 9-cell neighbourhood
    /// around the clamped query bin is scanned and there is no self count.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCategory`] if any indexed point id exceeds
    /// `max_id`.
    pub fn count_all_query(&self, queries: &[Point2], max_id: u32) -> Result<Vec<Vec<u32>>> {
        self.validate_ids(max_id)?;
        let width = max_id as usize + 1;

        let count_one = |q: &Point2| {
            let mut row = vec![0u32; width];
            let mut cells = Vec::with_capacity(9);
            self.grid.neighbours9(self.grid.safe_cell_of(q.x, q.y), &mut cells);
            for &c in &cells {
                for &j in self.grid.cell(c) {
                    let p = &self.points[j as usize];
                    let dx = p.x - q.x;
                    let dy = p.y - q.y;
                    if dx * dx + dy * dy < self.radius_sq {
                        row[p.id as usize] += 1;
                    }
                }
            }
            row
        };

        if self.config.threads > 1 {
            Ok(self.run_in_pool(|| queries.par_iter().map(count_one).collect()))
        } else {
            Ok(queries.iter().map(count_one).collect())
        }
    }

    fn validate_ids(&self, max_id: u32) -> Result<()> {
        match self.points.iter().find(|p| p.id > max_id) {
            Some(p) => Err(Error::InvalidCategory {
                id: p.id,
                max_id,
            }),
            None => Ok(()),
        }
    }

    /// Single-threaded symmetric counting: intra-cell `k < j` pairs plus
    /// the forward 4-neighbour half-neighbourhood.
    fn count_all_single(&self, counts: &mut [Vec<u32>], tracker: &dyn ProgressTracker) {
        let mut neighbours = Vec::with_capacity(4);
        let total = self.grid.n_cells() as u64;
        for c in 0..self.grid.n_cells() {
            tracker.progress_count(c as u64, total);
            let cell = self.grid.cell(c);
            if cell.is_empty() {
                continue;
            }
            for (j, &pj) in cell.iter().enumerate() {
                for &pk in &cell[..j] {
                    self.count_pair(pj, pk, counts);
                }
            }
            self.grid.neighbours4(c, &mut neighbours);
            for &nc in &neighbours {
                for &pj in cell {
                    for &pk in self.grid.cell(nc) {
                        self.count_pair(pj, pk, counts);
                    }
                }
            }
        }
    }

    #[inline]
    fn count_pair(&self, i: u32, j: u32, counts: &mut [Vec<u32>]) {
        let a = &self.points[i as usize];
        let b = &self.points[j as usize];
        if a.distance_squared(b) < self.radius_sq {
            counts[i as usize][b.id as usize] += 1;
            counts[j as usize][a.id as usize] += 1;
        }
    }

    fn count_all_parallel(&self, counts: &mut [Vec<u32>]) {
        let partitions = self.grid_priority(self.config.threads);
        match self.config.strategy {
            CountStrategy::Synchronized => self.count_synchronized(&partitions, counts),
            CountStrategy::OwnedRows => self.count_owned_rows(&partitions, counts),
        }
    }

    /// Builds the per-worker cell lists: non-empty cells sorted largest
    /// first, striped round-robin so every worker receives a balanced mix
    /// of cheap and expensive cells.
    fn grid_priority(&self, threads: usize) -> Vec<Vec<usize>> {
        let mut order: Vec<usize> = (0..self.grid.n_cells())
            .filter(|&c| !self.grid.cell(c).is_empty())
            .collect();
        order.sort_by_key(|&c| std::cmp::Reverse(self.grid.cell(c).len()));

        let mut partitions = vec![Vec::new(); threads];
        for (i, c) in order.into_iter().enumerate() {
            partitions[i % threads].push(c);
        }
        partitions
    }

    fn run_in_pool<T, F>(&self, op: F) -> T
    where
        T: Send,
        F: FnOnce() -> T + Send,
    {
        match rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.threads)
            .build()
        {
            Ok(pool) => pool.install(op),
            Err(e) => {
                // Degraded but valid: run on the current thread.
                log::warn!("density worker pool unavailable ({e}); counting on caller thread");
                op()
            }
        }
    }

    /// Synchronized-write strategy: each worker counts its cells with the
    /// forward half-neighbourhood and buffers `(row, id)` increments,
    /// flushing under a lock when the buffer fills.
    fn count_synchronized(&self, partitions: &[Vec<usize>], counts: &mut [Vec<u32>]) {
        let shared = std::sync::Mutex::new(counts);
        self.run_in_pool(|| {
            partitions.par_iter().for_each(|cells| {
                let mut buffer: Vec<(u32, u32)> = Vec::with_capacity(FLUSH_BATCH);
                let mut neighbours = Vec::with_capacity(4);
                for &c in cells {
                    let cell = self.grid.cell(c);
                    for (j, &pj) in cell.iter().enumerate() {
                        for &pk in &cell[..j] {
                            self.buffer_pair(pj, pk, &mut buffer, &shared);
                        }
                    }
                    self.grid.neighbours4(c, &mut neighbours);
                    for &nc in &neighbours {
                        for &pj in cell {
                            for &pk in self.grid.cell(nc) {
                                self.buffer_pair(pj, pk, &mut buffer, &shared);
                            }
                        }
                    }
                }
                flush(&mut buffer, &shared);
            });
        });
    }

    #[inline]
    fn buffer_pair(
        &self,
        i: u32,
        j: u32,
        buffer: &mut Vec<(u32, u32)>,
        shared: &std::sync::Mutex<&mut [Vec<u32>]>,
    ) {
        let a = &self.points[i as usize];
        let b = &self.points[j as usize];
        if a.distance_squared(b) < self.radius_sq {
            buffer.push((i, b.id));
            buffer.push((j, a.id));
            if buffer.len() >= FLUSH_BATCH {
                flush(buffer, shared);
            }
        }
    }

    /// Owned-rows strategy: workers scan the full 8-cell ring and compare
    /// every pair from both directions, so each worker only writes rows of
    /// points in its own cells and needs no lock.
    fn count_owned_rows(&self, partitions: &[Vec<usize>], counts: &mut [Vec<u32>]) {
        let width = counts.first().map_or(0, Vec::len);
        let partials: Vec<Vec<(u32, Vec<u32>)>> = self.run_in_pool(|| {
            partitions
                .par_iter()
                .map(|cells| {
                    let mut rows = Vec::new();
                    let mut neighbours = Vec::with_capacity(8);
                    for &c in cells {
                        let cell = self.grid.cell(c);
                        for &pj in cell {
                            let a = &self.points[pj as usize];
                            let mut row = vec![0u32; width];
                            // Intra-cell, both directions, excluding self.
                            for &pk in cell {
                                if pk == pj {
                                    continue;
                                }
                                let b = &self.points[pk as usize];
                                if a.distance_squared(b) < self.radius_sq {
                                    row[b.id as usize] += 1;
                                }
                            }
                            self.grid.neighbours8(c, &mut neighbours);
                            for &nc in &neighbours {
                                for &pk in self.grid.cell(nc) {
                                    let b = &self.points[pk as usize];
                                    if a.distance_squared(b) < self.radius_sq {
                                        row[b.id as usize] += 1;
                                    }
                                }
                            }
                            rows.push((pj, row));
                        }
                    }
                    rows
                })
                .collect()
        });
        for rows in partials {
            for (i, row) in rows {
                let target = &mut counts[i as usize];
                for (t, v) in target.iter_mut().zip(row) {
                    *t += v;
                }
            }
        }
    }
}

fn flush(buffer: &mut Vec<(u32, u32)>, shared: &std::sync::Mutex<&mut [Vec<u32>]>) {
    if buffer.is_empty() {
        return;
    }
    #[allow(clippy::unwrap_used)]
    let mut counts = shared.lock().unwrap();
    for &(row, id) in buffer.iter() {
        counts[row as usize][id as usize] += 1;
    }
    buffer.clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn points() -> Vec<CategorizedPoint> {
        vec![
            CategorizedPoint::new(0.0, 0.0, 0),
            CategorizedPoint::new(0.5, 0.0, 1),
            CategorizedPoint::new(0.0, 0.6, 0),
            CategorizedPoint::new(10.0, 10.0, 1),
        ]
    }

    #[test]
    fn test_count_all_includes_self_once() {
        let counter =
            DensityCounter::new(&points(), 1.0, DensityCounterConfig::default()).unwrap();
        let counts = counter.count_all(1).unwrap();
        // Point 0 neighbours: itself (id 0), point 1 (id 1), point 2 (id 0).
        assert_eq!(counts[0], vec![2, 1]);
        // Isolated point counts only itself.
        assert_eq!(counts[3], vec![0, 1]);
    }

    #[test]
    fn test_count_symmetry() {
        // An isolated pair: each point sees the other exactly once, in
        // both directions, on top of its own self count.
        let pts = vec![
            CategorizedPoint::new(0.0, 0.0, 0),
            CategorizedPoint::new(0.5, 0.0, 1),
        ];
        let counter = DensityCounter::new(&pts, 1.0, DensityCounterConfig::default()).unwrap();
        let counts = counter.count_all(1).unwrap();
        assert_eq!(counts[0], vec![1, 1]);
        assert_eq!(counts[1], vec![1, 1]);
    }

    #[test]
    fn test_neighbour_counts_in_mixed_fixture() {
        let counter =
            DensityCounter::new(&points(), 1.0, DensityCounterConfig::default()).unwrap();
        let counts = counter.count_all(1).unwrap();
        // Point 1 at (0.5, 0) is within radius of both id-0 points: point
        // 0 at distance 0.5 and point 2 at sqrt(0.61).
        assert_eq!(counts[1], vec![2, 1]);
        // Each of those pairs is mirrored in the id-0 rows.
        assert_eq!(counts[0][1], 1);
        assert_eq!(counts[2][1], 1);
    }

    #[test]
    fn test_invalid_radius_rejected() {
        for r in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(DensityCounter::new(&points(), r, DensityCounterConfig::default()).is_err());
        }
    }

    #[test]
    fn test_id_above_max_rejected() {
        let counter =
            DensityCounter::new(&points(), 1.0, DensityCounterConfig::default()).unwrap();
        assert!(counter.count_all(0).is_err());
    }

    #[test]
    fn test_parallel_strategies_match_single() {
        let mut pts = Vec::new();
        // Deterministic pseudo-random scatter.
        let mut seed = 987_654_321u64;
        for i in 0..300 {
            seed = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
            let x = (seed >> 33) as f64 / u32::MAX as f64 * 50.0;
            seed = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
            let y = (seed >> 33) as f64 / u32::MAX as f64 * 50.0;
            pts.push(CategorizedPoint::new(x, y, i % 3));
        }

        let single = DensityCounter::new(&pts, 2.5, DensityCounterConfig::default().with_threads(1))
            .unwrap()
            .count_all(2)
            .unwrap();
        for strategy in [CountStrategy::Synchronized, CountStrategy::OwnedRows] {
            let config = DensityCounterConfig::default()
                .with_threads(4)
                .with_strategy(strategy);
            let parallel = DensityCounter::new(&pts, 2.5, config)
                .unwrap()
                .count_all(2)
                .unwrap();
            assert_eq!(single, parallel, "strategy {strategy:?} diverged");
        }
    }

    #[test]
    fn test_default_threads_follow_available_parallelism() {
        let expected =
            std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
        assert_eq!(DensityCounterConfig::default().threads, expected);
    }

    #[test]
    fn test_tracked_count_matches_and_completes() {
        use std::sync::Mutex;

        struct Recording(Mutex<Vec<f64>>);
        impl puncta_core::ProgressTracker for Recording {
            fn progress(&self, fraction: f64) {
                self.0.lock().unwrap().push(fraction);
            }
        }

        let counter =
            DensityCounter::new(&points(), 1.0, DensityCounterConfig::default()).unwrap();
        let tracker = Recording(Mutex::new(Vec::new()));
        let tracked = counter.count_all_tracked(1, &tracker).unwrap();
        assert_eq!(tracked, counter.count_all(1).unwrap());
        let seen = tracker.0.lock().unwrap();
        assert_eq!(seen.last().copied(), Some(1.0));
    }

    #[test]
    fn test_query_counts_have_no_self() {
        let counter =
            DensityCounter::new(&points(), 1.0, DensityCounterConfig::default()).unwrap();
        let queries = vec![Point2::new(0.0, 0.0), Point2::new(-50.0, -50.0)];
        let counts = counter.count_all_query(&queries, 1).unwrap();
        // Exactly the three nearby points; the coincident input point is a
        // neighbour, not a self count.
        assert_eq!(counts[0], vec![2, 1]);
        assert_eq!(counts[1], vec![0, 0]);
    }
}
