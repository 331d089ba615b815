use puncta_algorithms::{
    convex_hull, CategorizedPoint, CellGrid, ClusteringAlgorithm, ClusteringConfig,
    ClusteringEngine, ConcurrentMonoStack, DensityCounter, DensityCounterConfig, DensityManager,
    DiggingConcaveHull2d, KnnConcaveHull2d, Point2, TimedPoint,
};

use std::sync::Arc;
use std::thread;

/// Two 5x5 blobs of points at spacing 0.5, the second shifted +100 in x.
fn two_blobs() -> Vec<(f64, f64)> {
    let mut pts = Vec::new();
    for shift in [0.0, 100.0] {
        for i in 0..5 {
            for j in 0..5 {
                pts.push((shift + f64::from(i) * 0.5, f64::from(j) * 0.5));
            }
        }
    }
    pts
}

#[test]
fn test_verification_density_counter_agrees_with_manager() {
    let pts = two_blobs();
    let categorized: Vec<CategorizedPoint> = pts
        .iter()
        .enumerate()
        .map(|(i, &(x, y))| CategorizedPoint::new(x, y, (i % 3) as u32))
        .collect();
    let x: Vec<f64> = pts.iter().map(|p| p.0).collect();
    let y: Vec<f64> = pts.iter().map(|p| p.1).collect();

    let counter = DensityCounter::new(&categorized, 1.2, DensityCounterConfig::default()).unwrap();
    let per_category = counter.count_all(2).unwrap();
    let density = DensityManager::new(&x, &y).unwrap().density(1.2).unwrap();

    // Summing a point's row over all categories gives its neighbour count
    // plus the single self contribution.
    for (row, &d) in per_category.iter().zip(&density) {
        assert_eq!(row.iter().sum::<u32>(), d + 1);
    }
}

#[test]
fn test_verification_optics_visits_blobs_in_turn() {
    let pts = two_blobs();
    let x: Vec<f64> = pts.iter().map(|p| p.0).collect();
    let y: Vec<f64> = pts.iter().map(|p| p.1).collect();
    let dm = DensityManager::new(&x, &y).unwrap();
    let result = dm.optics(2.0, 4).unwrap();

    assert_eq!(result.entries.len(), pts.len());
    // The second blob is unreachable from the first, so the ordering
    // finishes one blob completely before starting the other.
    let transitions = result
        .entries
        .windows(2)
        .filter(|w| (w[0].index < 25) != (w[1].index < 25))
        .count();
    assert_eq!(transitions, 1, "blob memberships interleaved");
}

#[test]
fn test_verification_centroid_linkage_finds_two_clusters() {
    let pts = two_blobs();
    let timed: Vec<TimedPoint> = pts.iter().map(|&(x, y)| TimedPoint::at(x, y)).collect();
    let engine = ClusteringEngine::new(
        ClusteringConfig::default()
            .with_algorithm(ClusteringAlgorithm::CentroidLinkage)
            .with_radius(3.0),
    );
    let outcome = engine.cluster(&timed).unwrap();
    assert_eq!(
        outcome.clusters.len(),
        2,
        "found {} clusters, expected 2",
        outcome.clusters.len()
    );
    assert_eq!(outcome.statistics.points, 50);
    assert_eq!(outcome.statistics.merges, 48);
    let members: usize = outcome.clusters.iter().map(|c| c.members.len()).sum();
    assert_eq!(members, 50);
}

#[test]
fn test_verification_hull_builders_on_square_scenario() {
    // Unit square corners plus the centre: every builder must return
    // exactly the four corners, never the interior point.
    let points = vec![
        Point2::new(0.0, 0.0),
        Point2::new(1.0, 0.0),
        Point2::new(1.0, 1.0),
        Point2::new(0.0, 1.0),
        Point2::new(0.5, 0.5),
    ];
    let corner_set = |hull: &[usize]| {
        let mut sorted = hull.to_vec();
        sorted.sort_unstable();
        sorted
    };

    let convex = convex_hull(&points).unwrap();
    assert_eq!(corner_set(&convex), vec![0, 1, 2, 3]);

    let digging = DiggingConcaveHull2d::new(2.0).unwrap().hull(&points).unwrap();
    assert_eq!(corner_set(&digging), vec![0, 1, 2, 3]);

    let knn = KnnConcaveHull2d::new(3).hull(&points).unwrap();
    assert_eq!(corner_set(&knn), vec![0, 1, 2, 3]);
}

#[test]
fn test_verification_monostack_pipelines_grid_cells() {
    // A producer walks the grid handing non-empty cells to a consumer,
    // which tallies their occupancy. The pipeline must account for every
    // point exactly once.
    let pts = two_blobs();
    let grid = Arc::new(
        CellGrid::build(
            pts.len(),
            |i| (pts[i].0, pts[i].1),
            1.0,
            CellGrid::DEFAULT_MAX_CELLS,
        )
        .unwrap(),
    );
    let stack = Arc::new(ConcurrentMonoStack::new());

    let producer = {
        let grid = Arc::clone(&grid);
        let stack = Arc::clone(&stack);
        thread::spawn(move || {
            for c in 0..grid.n_cells() {
                if !grid.cell(c).is_empty() {
                    assert!(stack.push(c).unwrap());
                }
            }
            stack.close(false);
        })
    };
    let consumer = {
        let grid = Arc::clone(&grid);
        let stack = Arc::clone(&stack);
        thread::spawn(move || {
            let mut total = 0usize;
            while let Some(c) = stack.pop() {
                total += grid.cell(c).len();
            }
            total
        })
    };

    producer.join().unwrap();
    assert_eq!(consumer.join().unwrap(), pts.len());
}
