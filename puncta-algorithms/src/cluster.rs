//! Mergeable cluster model backed by index arenas.
//!
//! Clusters own their member points through an intrusive index-based
//! singly linked list inside a point arena, so a merge is an O(min(n1,n2))
//! list splice with no allocation. The transient merge-candidate state
//! (`closest`, `d2`) is a weak index into the cluster arena, only
//! meaningful while a linkage sweep is in flight and validated through
//! mutuality before any merge.

use puncta_core::TimedPoint;

/// A point inside the cluster arena.
///
/// `next` threads the member list of the owning cluster; `source` is the
/// index of the originating input point.
#[derive(Debug, Clone, Copy)]
pub struct ClusterPoint {
    /// X coordinate.
    pub x: f64,
    /// Y coordinate.
    pub y: f64,
    /// Point weight.
    pub weight: f64,
    /// Start of the time window.
    pub start: f64,
    /// End of the time window.
    pub end: f64,
    /// Index of the originating input point.
    pub source: usize,
    next: Option<u32>,
}

/// A mutable aggregate of one or more points.
#[derive(Debug, Clone, Copy)]
pub struct Cluster {
    /// Weighted coordinate sums.
    pub sum_x: f64,
    /// Weighted coordinate sums.
    pub sum_y: f64,
    /// Total weight.
    pub sum_w: f64,
    /// Centroid x, derived from the sums.
    pub x: f64,
    /// Centroid y, derived from the sums.
    pub y: f64,
    /// Member count.
    pub n: u32,
    /// Earliest member start time.
    pub start: f64,
    /// Latest member end time.
    pub end: f64,
    head: Option<u32>,
    closest: Option<u32>,
    d2: f64,
    neighbours: u32,
}

impl Cluster {
    fn empty() -> Self {
        Self {
            sum_x: 0.0,
            sum_y: 0.0,
            sum_w: 0.0,
            x: 0.0,
            y: 0.0,
            n: 0,
            start: 0.0,
            end: 0.0,
            head: None,
            closest: None,
            d2: f64::INFINITY,
            neighbours: 0,
        }
    }

    /// Returns true when the cluster has been merged away.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Returns the current merge-candidate index, if any.
    #[must_use]
    pub fn closest(&self) -> Option<u32> {
        self.closest
    }

    /// Returns the squared distance to the current merge candidate.
    #[must_use]
    pub fn candidate_distance_squared(&self) -> f64 {
        self.d2
    }

    /// Returns the neighbour count accumulated this sweep.
    #[must_use]
    pub fn neighbours(&self) -> u32 {
        self.neighbours
    }

    /// Squared centroid distance to another cluster.
    #[inline]
    #[must_use]
    pub fn distance_squared(&self, other: &Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    /// Time gap between the two clusters' windows; zero when they overlap.
    #[inline]
    #[must_use]
    pub fn gap(&self, other: &Self) -> f64 {
        TimedPoint::gap(self.start, self.end, other.start, other.end)
    }
}

/// Arena holding the points and clusters of one linkage run.
#[derive(Debug, Clone, Default)]
pub struct ClusterArena {
    points: Vec<ClusterPoint>,
    clusters: Vec<Cluster>,
}

impl ClusterArena {
    /// Builds an arena with one singleton cluster per input point.
    #[must_use]
    pub fn from_points(input: &[TimedPoint]) -> Self {
        let mut points = Vec::with_capacity(input.len());
        let mut clusters = Vec::with_capacity(input.len());
        for (i, p) in input.iter().enumerate() {
            #[allow(clippy::cast_possible_truncation)]
            let head = i as u32;
            points.push(ClusterPoint {
                x: p.x,
                y: p.y,
                weight: p.weight,
                start: p.start,
                end: p.end,
                source: i,
                next: None,
            });
            clusters.push(Cluster {
                sum_x: p.x * p.weight,
                sum_y: p.y * p.weight,
                sum_w: p.weight,
                x: p.x,
                y: p.y,
                n: 1,
                start: p.start,
                end: p.end,
                head: Some(head),
                closest: None,
                d2: f64::INFINITY,
                neighbours: 0,
            });
        }
        Self { points, clusters }
    }

    /// Returns the cluster slice.
    #[must_use]
    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    /// Returns one cluster.
    #[must_use]
    pub fn cluster(&self, index: usize) -> &Cluster {
        &self.clusters[index]
    }

    /// Iterates the member points of a cluster.
    pub fn members(&self, index: usize) -> MemberIter<'_> {
        MemberIter {
            points: &self.points,
            next: self.clusters[index].head,
        }
    }

    /// Clears all merge-candidate state before a sweep.
    pub fn reset_candidates(&mut self) {
        for c in &mut self.clusters {
            c.closest = None;
            c.d2 = f64::INFINITY;
            c.neighbours = 0;
        }
    }

    /// Increments the sweep neighbour counter of a cluster.
    pub fn increment_neighbour(&mut self, index: usize) {
        self.clusters[index].neighbours += 1;
    }

    /// Records a merge candidate between two clusters.
    ///
    /// The link is ignored when `b` already holds a strictly closer
    /// candidate; otherwise `a` keeps its best candidate and `b` is
    /// re-pointed at `a`. A later [`ClusterArena::valid_link`] check
    /// commits only mutual links.
    pub fn link(&mut self, a: usize, b: usize, d2: f64) {
        if self.clusters[b].closest.is_some() && self.clusters[b].d2 < d2 {
            return;
        }
        if self.clusters[a].closest.is_none() || self.clusters[a].d2 > d2 {
            #[allow(clippy::cast_possible_truncation)]
            let bi = b as u32;
            self.clusters[a].closest = Some(bi);
            self.clusters[a].d2 = d2;
        }
        #[allow(clippy::cast_possible_truncation)]
        let ai = a as u32;
        self.clusters[b].closest = Some(ai);
        self.clusters[b].d2 = d2;
    }

    /// Returns true when the cluster and its candidate agree on each other.
    #[must_use]
    pub fn valid_link(&self, index: usize) -> bool {
        #[allow(clippy::cast_possible_truncation)]
        let me = index as u32;
        self.clusters[index]
            .closest
            .is_some_and(|other| self.clusters[other as usize].closest == Some(me))
    }

    /// Merges cluster `loser` into cluster `survivor`.
    ///
    /// Splices the shorter member list onto the longer (walk cost bounded
    /// by the smaller cluster), accumulates the sums and recomputes the
    /// centroid by re-dividing. When the two centroids are exactly equal
    /// the division is skipped so repeated merges of identical-coordinate
    /// particles cannot drift apart by floating point noise. The losing
    /// cluster is cleared.
    pub fn merge(&mut self, survivor: usize, loser: usize) {
        debug_assert_ne!(survivor, loser);
        let (s, l) = (self.clusters[survivor], self.clusters[loser]);

        // Splice: walk the shorter chain to its tail, then attach the
        // longer chain behind it.
        let (short_head, long_head) = if s.n <= l.n {
            (s.head, l.head)
        } else {
            (l.head, s.head)
        };
        let head = match short_head {
            Some(h) => {
                let mut tail = h;
                while let Some(next) = self.points[tail as usize].next {
                    tail = next;
                }
                self.points[tail as usize].next = long_head;
                Some(h)
            }
            None => long_head,
        };

        let c = &mut self.clusters[survivor];
        c.head = head;
        c.sum_x += l.sum_x;
        c.sum_y += l.sum_y;
        c.sum_w += l.sum_w;
        c.n += l.n;
        c.start = c.start.min(l.start);
        c.end = c.end.max(l.end);
        if !(l.x == c.x && l.y == c.y) {
            c.x = c.sum_x / c.sum_w;
            c.y = c.sum_y / c.sum_w;
        }

        self.clusters[loser] = Cluster::empty();
    }
}

/// Iterator over a cluster's member points.
pub struct MemberIter<'a> {
    points: &'a [ClusterPoint],
    next: Option<u32>,
}

impl<'a> Iterator for MemberIter<'a> {
    type Item = &'a ClusterPoint;

    fn next(&mut self) -> Option<Self::Item> {
        let i = self.next?;
        let p = &self.points[i as usize];
        self.next = p.next;
        Some(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn arena(points: &[(f64, f64)]) -> ClusterArena {
        let timed: Vec<TimedPoint> = points
            .iter()
            .map(|&(x, y)| TimedPoint::at(x, y))
            .collect();
        ClusterArena::from_points(&timed)
    }

    #[test]
    fn test_merge_accumulates_and_recomputes_centroid() {
        let mut a = arena(&[(0.0, 0.0), (2.0, 2.0)]);
        a.merge(0, 1);
        let c = a.cluster(0);
        assert_eq!(c.n, 2);
        assert_relative_eq!(c.x, 1.0);
        assert_relative_eq!(c.y, 1.0);
        assert!(a.cluster(1).is_empty());
        assert_eq!(a.members(0).count(), 2);
        assert_eq!(a.members(1).count(), 0);
    }

    #[test]
    fn test_merge_weighted_centroid() {
        let timed = vec![
            TimedPoint::new(0.0, 0.0, 3.0, 0.0, 0.0, 0),
            TimedPoint::new(4.0, 0.0, 1.0, 0.0, 0.0, 1),
        ];
        let mut a = ClusterArena::from_points(&timed);
        a.merge(0, 1);
        assert_relative_eq!(a.cluster(0).x, 1.0);
    }

    #[test]
    fn test_merge_identical_centroids_do_not_drift() {
        let mut a = arena(&[(1.5, 2.5), (1.5, 2.5), (1.5, 2.5)]);
        a.merge(0, 1);
        a.merge(0, 2);
        let c = a.cluster(0);
        assert_eq!(c.x, 1.5);
        assert_eq!(c.y, 2.5);
        assert_eq!(c.n, 3);
    }

    #[test]
    fn test_merge_splices_longer_chain_intact() {
        let mut a = arena(&[(0.0, 0.0), (1.0, 0.0), (2.0, 0.0), (3.0, 0.0)]);
        a.merge(0, 1);
        a.merge(0, 2);
        // Cluster 0 has 3 members, cluster 3 is a singleton.
        a.merge(3, 0);
        let sources: std::collections::HashSet<usize> =
            a.members(3).map(|p| p.source).collect();
        assert_eq!(sources.len(), 4);
        assert!(a.cluster(0).is_empty());
    }

    #[test]
    fn test_mutual_link_protocol() {
        let mut a = arena(&[(0.0, 0.0), (1.0, 0.0), (0.9, 0.0)]);
        a.link(0, 1, 1.0);
        a.link(1, 0, 1.0);
        assert!(a.valid_link(0));
        assert!(a.valid_link(1));

        // A strictly closer third party steals the candidate.
        a.link(2, 1, 0.01);
        assert!(!a.valid_link(0));
        assert!(a.valid_link(2));
    }

    #[test]
    fn test_link_ignored_when_target_has_closer_candidate() {
        let mut a = arena(&[(0.0, 0.0), (0.1, 0.0), (5.0, 0.0)]);
        a.link(0, 1, 0.01);
        a.link(1, 0, 0.01);
        // A distant cluster cannot displace the mutual pair.
        a.link(2, 1, 25.0);
        assert!(a.valid_link(0));
        assert!(a.valid_link(1));
        assert!(!a.valid_link(2));
    }

    #[test]
    fn test_cluster_gap() {
        let timed = vec![
            TimedPoint::new(0.0, 0.0, 1.0, 0.0, 5.0, 0),
            TimedPoint::new(1.0, 0.0, 1.0, 7.0, 10.0, 1),
        ];
        let a = ClusterArena::from_points(&timed);
        assert_relative_eq!(a.cluster(0).gap(a.cluster(1)), 2.0);
    }
}
