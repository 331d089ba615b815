//! puncta-algorithms: Spatial density analysis and hull construction.
//!
//! This crate provides the algorithmic layer over [`puncta_core`]:
//! - **Density** - grid-accelerated neighbour counting, per-category and
//!   cross-set, single- or multi-threaded
//! - **OPTICS** - reachability ordering for density-based clustering
//! - **Linkage** - greedy hierarchical clustering over timed, weighted
//!   points with several merge strategies
//! - **Hulls** - convex hull plus two concave hull builders (edge
//!   digging and k-nearest-neighbour growth)
//!
#![warn(missing_docs)]

mod cluster;
mod density;
mod linkage;
mod manager;
mod monostack;
mod optics;
pub mod grid;
pub mod hull;

pub use cluster::{Cluster, ClusterArena, ClusterPoint, MemberIter};
pub use density::{CountStrategy, DensityCounter, DensityCounterConfig};
pub use grid::CellGrid;
pub use hull::{convex_hull, DiggingConcaveHull2d, KnnConcaveHull2d};
pub use linkage::{
    ClusteringAlgorithm, ClusteringConfig, ClusteringEngine, ClusteringOutcome,
    ClusteringStatistics, ClusterResult,
};
pub use manager::{DensityManager, DensityManagerConfig};
pub use monostack::{ClosedPolicy, ConcurrentMonoStack};
pub use optics::{optics, OpticsConfig, OpticsEntry, OpticsResult};

// Re-export the core data model used throughout the APIs.
pub use puncta_core::{
    CategorizedPoint, Error, NullTracker, Point2, ProgressTracker, Result, TimedPoint,
};
