//! puncta-core: Core types for spatial point-cloud analysis.
//!
//! This crate provides the foundational types shared by the puncta
//! analysis algorithms: 2D point representations, error types, and the
//! progress-tracker seam for long-running computations.
//!

pub mod error;
pub mod point;
pub mod tracker;

pub use error::{Error, Result};
pub use point::{CategorizedPoint, Point2, TimedPoint};
pub use tracker::{NullTracker, ProgressTracker};
