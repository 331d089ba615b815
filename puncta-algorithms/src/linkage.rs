//! Greedy and hierarchical cluster linkage over timed points.
//!
//! All variants share the same machinery: singleton clusters in a
//! [`ClusterArena`], a grid broad phase over centroids, a parallel
//! candidate-evaluation map phase and a strictly single-threaded commit
//! phase driving [`ClusterArena::link`] / [`ClusterArena::merge`]. The
//! algorithm enum only selects eligibility and priority rules.

use puncta_core::{Error, NullTracker, ProgressTracker, Result, TimedPoint};
use rayon::prelude::*;

use crate::cluster::{Cluster, ClusterArena};
use crate::grid::CellGrid;

/// Linkage variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ClusteringAlgorithm {
    /// Only merges where one side is a single, not-yet-clustered particle;
    /// clusters grow by absorbing particles, never each other. Distance is
    /// single linkage (nearest member point).
    ParticleSingleLinkage,
    /// Full hierarchical merging by nearest centroid pair.
    #[default]
    CentroidLinkage,
    /// Particle restriction with centroid distances.
    ParticleCentroidLinkage,
    /// One greedy sweep of mutual-nearest pairs committed together, without
    /// recomputing centroids mid-pass.
    Pairwise,
    /// Pairwise restricted to pairs where each side has exactly one
    /// neighbour; falls back to the single globally closest pair when no
    /// pair qualifies.
    PairwiseWithoutNeighbours,
    /// Centroid linkage with a time-gap gate; ties resolved by distance
    /// first.
    CentroidLinkageDistancePriority,
    /// Centroid linkage with a time-gap gate; ties resolved by time gap
    /// first.
    CentroidLinkageTimePriority,
}

impl ClusteringAlgorithm {
    /// Returns true when the variant gates merges on a time threshold.
    #[must_use]
    pub fn is_time_gated(self) -> bool {
        matches!(
            self,
            Self::CentroidLinkageDistancePriority | Self::CentroidLinkageTimePriority
        )
    }
}

/// Clustering engine configuration.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClusteringConfig {
    /// Linkage variant.
    pub algorithm: ClusteringAlgorithm,
    /// Merge distance threshold.
    pub radius: f64,
    /// Merge time-gap threshold for the time-gated variants.
    pub time_threshold: f64,
    /// Cap on broad-phase grid cells.
    pub max_cells: usize,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            algorithm: ClusteringAlgorithm::default(),
            radius: 1.0,
            time_threshold: 0.0,
            max_cells: CellGrid::DEFAULT_MAX_CELLS,
        }
    }
}

impl ClusteringConfig {
    /// Sets the linkage variant.
    #[must_use]
    pub fn with_algorithm(mut self, algorithm: ClusteringAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Sets the merge distance threshold.
    #[must_use]
    pub fn with_radius(mut self, radius: f64) -> Self {
        self.radius = radius;
        self
    }

    /// Sets the merge time-gap threshold.
    #[must_use]
    pub fn with_time_threshold(mut self, time_threshold: f64) -> Self {
        self.time_threshold = time_threshold;
        self
    }
}

/// One final cluster.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClusterResult {
    /// Centroid x.
    pub x: f64,
    /// Centroid y.
    pub y: f64,
    /// Total weight.
    pub sum_w: f64,
    /// Member count.
    pub n: u32,
    /// Earliest member start time.
    pub start: f64,
    /// Latest member end time.
    pub end: f64,
    /// Input indices of the member points.
    pub members: Vec<usize>,
}

/// Summary of one clustering run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClusteringStatistics {
    /// Points supplied.
    pub points: usize,
    /// Merges committed.
    pub merges: usize,
    /// Clusters remaining.
    pub clusters: usize,
}

/// Result of a clustering run.
#[derive(Debug, Clone)]
pub struct ClusteringOutcome {
    /// The final clusters, in arena order (stable relative to input).
    pub clusters: Vec<ClusterResult>,
    /// Run statistics.
    pub statistics: ClusteringStatistics,
}

/// A merge candidate produced by the map phase.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    other: usize,
    d2: f64,
    gap: f64,
}

/// Which dimension breaks ties among eligible candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Priority {
    Distance,
    Time,
}

impl Priority {
    fn key(self, c: &Candidate) -> (f64, f64) {
        match self {
            Self::Distance => (c.d2, c.gap),
            Self::Time => (c.gap, c.d2),
        }
    }

    fn better(self, a: &Candidate, b: &Candidate) -> bool {
        let (ka, kb) = (self.key(a), self.key(b));
        ka < kb
    }
}

/// Cluster linkage engine.
pub struct ClusteringEngine {
    config: ClusteringConfig,
}

impl ClusteringEngine {
    /// Creates an engine with the given configuration.
    #[must_use]
    pub fn new(config: ClusteringConfig) -> Self {
        Self { config }
    }

    /// Clusters the points until no remaining pair satisfies the merge
    /// predicate of the configured variant.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRadius`] for a non-finite or non-positive
    /// radius, [`Error::InvalidTimeThreshold`] when a time-gated variant is
    /// configured with a negative or non-finite threshold, and
    /// [`Error::EmptyInput`] for an empty slice.
    pub fn cluster(&self, points: &[TimedPoint]) -> Result<ClusteringOutcome> {
        self.cluster_tracked(points, &NullTracker)
    }

    /// [`ClusteringEngine::cluster`] with progress reporting.
    ///
    /// # Errors
    ///
    /// Same contract as [`ClusteringEngine::cluster`].
    pub fn cluster_tracked(
        &self,
        points: &[TimedPoint],
        tracker: &dyn ProgressTracker,
    ) -> Result<ClusteringOutcome> {
        let radius = self.config.radius;
        if !radius.is_finite() || radius <= 0.0 {
            return Err(Error::InvalidRadius(radius));
        }
        if self.config.algorithm.is_time_gated()
            && (!self.config.time_threshold.is_finite() || self.config.time_threshold < 0.0)
        {
            return Err(Error::InvalidTimeThreshold(self.config.time_threshold));
        }
        if points.is_empty() {
            return Err(Error::EmptyInput);
        }

        let mut arena = ClusterArena::from_points(points);
        tracker.status("clustering");
        let merges = match self.config.algorithm {
            ClusteringAlgorithm::ParticleSingleLinkage => {
                self.particle_single_linkage(points, &mut arena, tracker)?
            }
            ClusteringAlgorithm::CentroidLinkage => {
                self.centroid_linkage(&mut arena, Priority::Distance, false, false, tracker)?
            }
            ClusteringAlgorithm::ParticleCentroidLinkage => {
                self.centroid_linkage(&mut arena, Priority::Distance, true, false, tracker)?
            }
            ClusteringAlgorithm::Pairwise => self.pairwise(&mut arena, false, tracker)?,
            ClusteringAlgorithm::PairwiseWithoutNeighbours => {
                self.pairwise(&mut arena, true, tracker)?
            }
            ClusteringAlgorithm::CentroidLinkageDistancePriority => {
                self.centroid_linkage(&mut arena, Priority::Distance, false, true, tracker)?
            }
            ClusteringAlgorithm::CentroidLinkageTimePriority => {
                self.centroid_linkage(&mut arena, Priority::Time, false, true, tracker)?
            }
        };
        tracker.progress(1.0);

        let clusters: Vec<ClusterResult> = (0..arena.clusters().len())
            .filter(|&i| !arena.cluster(i).is_empty())
            .map(|i| {
                let c = arena.cluster(i);
                ClusterResult {
                    x: c.x,
                    y: c.y,
                    sum_w: c.sum_w,
                    n: c.n,
                    start: c.start,
                    end: c.end,
                    members: arena.members(i).map(|p| p.source).collect(),
                }
            })
            .collect();
        let statistics = ClusteringStatistics {
            points: points.len(),
            merges,
            clusters: clusters.len(),
        };
        Ok(ClusteringOutcome {
            clusters,
            statistics,
        })
    }

    /// Parallel map phase: for every active cluster, its best eligible
    /// candidate under `priority` plus its neighbour count within the
    /// radius. Read-only on the arena; commits happen serially afterwards.
    fn candidate_map<F>(
        &self,
        arena: &ClusterArena,
        active: &[usize],
        priority: Priority,
        eligible: F,
    ) -> Result<Vec<(Option<Candidate>, u32)>>
    where
        F: Fn(&Cluster, &Cluster) -> bool + Sync,
    {
        let radius_sq = self.config.radius * self.config.radius;
        let grid = CellGrid::build(
            active.len(),
            |k| {
                let c = arena.cluster(active[k]);
                (c.x, c.y)
            },
            self.config.radius,
            self.config.max_cells,
        )?;

        let map = (0..active.len())
            .into_par_iter()
            .map(|k| {
                let me = arena.cluster(active[k]);
                let mut cells = Vec::with_capacity(9);
                grid.neighbours9(grid.safe_cell_of(me.x, me.y), &mut cells);
                let mut best: Option<Candidate> = None;
                let mut neighbours = 0u32;
                for &c in &cells {
                    for &m in grid.cell(c) {
                        let m = m as usize;
                        if m == k {
                            continue;
                        }
                        let other = arena.cluster(active[m]);
                        let d2 = me.distance_squared(other);
                        if d2 >= radius_sq {
                            continue;
                        }
                        neighbours += 1;
                        if !eligible(me, other) {
                            continue;
                        }
                        let candidate = Candidate {
                            other: m,
                            d2,
                            gap: me.gap(other),
                        };
                        if best.is_none()
                            || priority.better(&candidate, best.as_ref().unwrap_or(&candidate))
                        {
                            best = Some(candidate);
                        }
                    }
                }
                (best, neighbours)
            })
            .collect();
        Ok(map)
    }

    /// Hierarchical linkage: one merge per iteration, always the best
    /// remaining eligible pair.
    fn centroid_linkage(
        &self,
        arena: &mut ClusterArena,
        priority: Priority,
        particle_restricted: bool,
        time_gated: bool,
        tracker: &dyn ProgressTracker,
    ) -> Result<usize> {
        let time_threshold = self.config.time_threshold;
        let total = arena.clusters().len();
        let mut merges = 0usize;
        loop {
            let active: Vec<usize> = (0..arena.clusters().len())
                .filter(|&i| !arena.cluster(i).is_empty())
                .collect();
            if active.len() < 2 {
                break;
            }
            let eligible = |a: &Cluster, b: &Cluster| {
                if particle_restricted && a.n > 1 && b.n > 1 {
                    return false;
                }
                if time_gated && a.gap(b) > time_threshold {
                    return false;
                }
                true
            };
            let map = self.candidate_map(arena, &active, priority, eligible)?;

            let mut best: Option<(usize, Candidate)> = None;
            for (k, (candidate, _)) in map.iter().enumerate() {
                if let Some(c) = candidate {
                    if best
                        .as_ref()
                        .is_none_or(|(_, b)| priority.better(c, b))
                    {
                        best = Some((k, *c));
                    }
                }
            }
            let Some((k, c)) = best else { break };
            arena.merge(active[k], active[c.other]);
            merges += 1;
            #[allow(clippy::cast_possible_truncation)]
            tracker.progress_count(merges as u64, total as u64);
        }
        Ok(merges)
    }

    /// Greedy pairwise sweeps: candidates evaluated in one pass, mutual
    /// pairs committed together.
    fn pairwise(
        &self,
        arena: &mut ClusterArena,
        without_neighbours: bool,
        tracker: &dyn ProgressTracker,
    ) -> Result<usize> {
        let total = arena.clusters().len();
        let mut merges = 0usize;
        loop {
            let active: Vec<usize> = (0..arena.clusters().len())
                .filter(|&i| !arena.cluster(i).is_empty())
                .collect();
            if active.len() < 2 {
                break;
            }
            let map =
                self.candidate_map(arena, &active, Priority::Distance, |_, _| true)?;

            // Serial link phase establishes the mutual-best-response state.
            arena.reset_candidates();
            let mut any_in_radius = false;
            for (k, (candidate, neighbours)) in map.iter().enumerate() {
                if *neighbours > 0 {
                    any_in_radius = true;
                }
                for _ in 0..*neighbours {
                    arena.increment_neighbour(active[k]);
                }
                if let Some(c) = candidate {
                    arena.link(active[k], active[c.other], c.d2);
                }
            }
            if !any_in_radius {
                break;
            }

            // Commit phase: merge each valid mutual pair once.
            let mut committed = 0usize;
            for &i in &active {
                if arena.cluster(i).is_empty() || !arena.valid_link(i) {
                    continue;
                }
                let Some(j) = arena.cluster(i).closest() else {
                    continue;
                };
                let j = j as usize;
                if j < i || arena.cluster(j).is_empty() {
                    continue;
                }
                if without_neighbours
                    && (arena.cluster(i).neighbours() != 1 || arena.cluster(j).neighbours() != 1)
                {
                    continue;
                }
                arena.merge(i, j);
                committed += 1;
            }

            // Documented fallback for the without-neighbours variant: when
            // no isolated pair qualifies, join only the single globally
            // closest pair this pass.
            if committed == 0 {
                if without_neighbours {
                    let mut best: Option<(usize, Candidate)> = None;
                    for (k, (candidate, _)) in map.iter().enumerate() {
                        if let Some(c) = candidate {
                            if best.as_ref().is_none_or(|(_, b)| c.d2 < b.d2) {
                                best = Some((k, *c));
                            }
                        }
                    }
                    if let Some((k, c)) = best {
                        arena.merge(active[k], active[c.other]);
                        committed = 1;
                    }
                }
                if committed == 0 {
                    break;
                }
            }
            merges += committed;
            #[allow(clippy::cast_possible_truncation)]
            tracker.progress_count(merges as u64, total as u64);
        }
        Ok(merges)
    }

    /// Particle single linkage: point-to-point distances are static, so
    /// every particle's nearest neighbour is computed once from the point
    /// grid and particles are absorbed in ascending distance order.
    fn particle_single_linkage(
        &self,
        points: &[TimedPoint],
        arena: &mut ClusterArena,
        tracker: &dyn ProgressTracker,
    ) -> Result<usize> {
        let radius_sq = self.config.radius * self.config.radius;
        let grid = CellGrid::build(
            points.len(),
            |i| (points[i].x, points[i].y),
            self.config.radius,
            self.config.max_cells,
        )?;

        // Nearest other point per point, within the radius.
        let nearest: Vec<Option<(usize, f64)>> = (0..points.len())
            .into_par_iter()
            .map(|i| {
                let mut cells = Vec::with_capacity(9);
                grid.neighbours9(grid.safe_cell_of(points[i].x, points[i].y), &mut cells);
                let mut best: Option<(usize, f64)> = None;
                for &c in &cells {
                    for &j in grid.cell(c) {
                        let j = j as usize;
                        if j == i {
                            continue;
                        }
                        let dx = points[j].x - points[i].x;
                        let dy = points[j].y - points[i].y;
                        let d2 = dx * dx + dy * dy;
                        if d2 < radius_sq && best.is_none_or(|(_, bd)| d2 < bd) {
                            best = Some((j, d2));
                        }
                    }
                }
                best
            })
            .collect();

        let mut order: Vec<usize> = (0..points.len())
            .filter(|&i| nearest[i].is_some())
            .collect();
        order.sort_by(|&a, &b| {
            let da = nearest[a].map_or(f64::INFINITY, |(_, d)| d);
            let db = nearest[b].map_or(f64::INFINITY, |(_, d)| d);
            da.partial_cmp(&db)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.cmp(&b))
        });

        // cluster_of[i] tracks the cluster currently holding point i. Only
        // particles (still-singleton clusters) are ever absorbed, so the
        // loser of a merge is always a singleton and the update is O(1).
        let mut cluster_of: Vec<usize> = (0..points.len()).collect();
        let mut merges = 0usize;
        for i in order {
            if arena.cluster(cluster_of[i]).n != 1 {
                continue;
            }
            let Some((j, _)) = nearest[i] else { continue };
            let target = cluster_of[j];
            if target == cluster_of[i] {
                continue;
            }
            arena.merge(target, cluster_of[i]);
            cluster_of[i] = target;
            merges += 1;
            #[allow(clippy::cast_possible_truncation)]
            tracker.progress_count(merges as u64, points.len() as u64);
        }
        Ok(merges)
    }
}
