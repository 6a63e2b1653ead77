//! Recommendation models over the user×item rating matrix.
//!
//! - [`knn`]: user-based nearest neighbors with cosine distance
//! - [`svd`]: truncated SVD factorization via nalgebra
//! - [`evaluation`]: RMSE on observed cells and rank grid search
//! - [`scorer`]: top-N unseen movies for a user from a trained SVD model
//! - [`artifact`]: versioned bincode persistence for trained models
//!
//! ## Example Usage
//! ```ignore
//! use models::{grid_search, DEFAULT_GRID, SvdScorer, Recommender};
//!
//! let matrix = features::create_user_item_matrix(index.ratings());
//! let outcome = grid_search(&matrix, &DEFAULT_GRID)?;
//! outcome.best.save(Path::new("models/svd_model.bin"))?;
//!
//! let scorer = SvdScorer::new(Arc::new(outcome.best), Arc::new(index));
//! let top = scorer.recommend(42, 10)?;
//! ```

pub mod artifact;
pub mod error;
pub mod evaluation;
pub mod factors;
pub mod knn;
pub mod recommender;
pub mod scorer;
pub mod svd;

pub use artifact::{ARTIFACT_VERSION, ArtifactHeader, ArtifactKind};
pub use error::{ArtifactError, ModelError, Result};
pub use evaluation::{
    DEFAULT_GRID, GridSearchOutcome, GridTrial, HoldoutReport, evaluate_holdout, evaluate_svd,
    grid_search, ratings_within_model,
};
pub use factors::FactorMatrix;
pub use knn::{DEFAULT_N_NEIGHBORS, KnnConfig, KnnModel, KnnRecommender, Neighbor, train_knn};
pub use recommender::{Recommendation, Recommender};
pub use scorer::SvdScorer;
pub use svd::{DEFAULT_N_COMPONENTS, Decomposition, SvdConfig, SvdModel, decompose, train_svd};
