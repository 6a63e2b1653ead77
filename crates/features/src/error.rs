//! Error types for the features crate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FeatureError {
    /// Dense values do not line up with the id arrays
    #[error("Matrix is {rows}x{cols} but got {user_ids} user ids and {movie_ids} movie ids")]
    ShapeMismatch {
        rows: usize,
        cols: usize,
        user_ids: usize,
        movie_ids: usize,
    },

    /// The same id appears twice along one axis
    #[error("Duplicate {axis} id in matrix index")]
    DuplicateId { axis: &'static str },

    /// Held-out fraction outside (0, 1)
    #[error("Held-out fraction must be between 0 and 1 (exclusive), got {0}")]
    InvalidFraction(f64),
}

pub type Result<T> = std::result::Result<T, FeatureError>;
