//! Error types for training, evaluation, scoring and artifact I/O.

use data_loader::UserId;
use thiserror::Error;

/// Errors raised by the models
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Cannot train on an empty matrix")]
    EmptyMatrix,

    /// Neighbor count is zero or larger than the number of users
    #[error("n_neighbors must be between 1 and {available}, got {requested}")]
    InvalidNeighborCount { requested: usize, available: usize },

    /// Rank is zero or exceeds min(n_users, n_items)
    #[error("n_components must be between 1 and {max}, got {requested}")]
    InvalidRank { requested: usize, max: usize },

    #[error("Hyperparameter grid is empty")]
    EmptyGrid,

    /// Query vector length differs from the model's item count
    #[error("Query has {found} values but the model expects {expected}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("No observed ratings to evaluate")]
    NoObservedRatings,

    /// Evaluation matrix holds an id the model was not trained on
    #[error("{axis} id {id} is not part of the model")]
    UnknownId { axis: &'static str, id: u32 },

    /// Scoring was requested for a user the model does not know
    #[error("User {0} is not part of the model")]
    UnknownUser(UserId),

    #[error("Requested {0} recommendations, need at least 1")]
    InvalidCount(usize),

    #[error("Singular value decomposition did not converge")]
    Decomposition,
}

/// Errors raised while writing or reading a model artifact
#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("Model artifact not found at {path}")]
    NotFound { path: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode or decode artifact: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("Not a model artifact (bad magic bytes)")]
    BadMagic,

    #[error("Artifact holds a {found} model, expected {expected}")]
    WrongKind { expected: String, found: String },

    #[error("Artifact version {found} is not supported (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    /// Decoded fine but the fields are inconsistent with each other
    #[error("Corrupt artifact: {0}")]
    Corrupt(String),
}

pub type Result<T> = std::result::Result<T, ModelError>;
