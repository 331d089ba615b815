//! Convex and concave hull construction over 2D point sets.
//!
//! [`convex::convex_hull`] provides the convex baseline; the two concave
//! builders trade it for a tighter boundary in different ways.
//! [`digging::DiggingConcaveHull2d`] starts from the convex hull and digs
//! long edges inward, while [`knn::KnnConcaveHull2d`] grows the boundary
//! outward by walking k-nearest neighbours. Both return vertex indices
//! into the input slice and `None` for degenerate inputs.

pub mod convex;
pub mod digging;
pub mod geometry;
pub mod knn;

pub use convex::convex_hull;
pub use digging::DiggingConcaveHull2d;
pub use knn::KnnConcaveHull2d;
