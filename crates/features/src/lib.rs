//! Feature building for the recommendation models.
//!
//! This crate turns the rating table into the dense user×item matrix every
//! model trains on, and provides the train / held-out split used by the
//! optional held-out evaluation.
//!
//! ## Example Usage
//! ```ignore
//! use features::{create_user_item_matrix, holdout_split};
//!
//! let matrix = create_user_item_matrix(index.ratings());
//! let (n_users, n_items) = matrix.shape();
//!
//! let split = holdout_split(index.ratings(), 0.2, 42)?;
//! let train_matrix = create_user_item_matrix(&split.train);
//! ```

pub mod error;
pub mod matrix;
pub mod split;

pub use error::{FeatureError, Result};
pub use matrix::{DuplicatePolicy, UserItemMatrix, create_user_item_matrix};
pub use split::{RatingSplit, holdout_split};
