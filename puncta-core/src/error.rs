//! Error types for puncta-core.

use thiserror::Error;

/// Result type alias for puncta operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for puncta operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Search radius must be finite and strictly positive.
    #[error("invalid radius: {0}")]
    InvalidRadius(f64),

    /// Coordinate arrays must have the same length.
    #[error("mismatched coordinate lengths: x has {x_len}, y has {y_len}")]
    MismatchedLengths {
        /// Length of the x coordinate array.
        x_len: usize,
        /// Length of the y coordinate array.
        y_len: usize,
    },

    /// Operation requires at least one input point.
    #[error("empty input point set")]
    EmptyInput,

    /// Threshold parameter must be finite and strictly positive.
    #[error("invalid threshold: {0}")]
    InvalidThreshold(f64),

    /// Temporal threshold must be non-negative.
    #[error("invalid time threshold: {0}")]
    InvalidTimeThreshold(f64),

    /// A point category id exceeds the declared maximum.
    #[error("category id {id} exceeds maximum {max_id}")]
    InvalidCategory {
        /// The offending category id.
        id: u32,
        /// The declared maximum id.
        max_id: u32,
    },

    /// A mono stack operation was attempted after close.
    #[error("mono stack is closed")]
    Closed,
}
