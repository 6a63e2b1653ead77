//! Top-N scoring with a trained SVD model.

use crate::error::{ModelError, Result};
use crate::recommender::{Recommendation, Recommender, select_top};
use crate::svd::SvdModel;
use data_loader::{DataIndex, UserId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Scores unseen movies for a user with a trained [`SvdModel`]
///
/// The rating history decides which movies a user has already seen; the
/// model decides how the rest are ranked.
pub struct SvdScorer {
    model: Arc<SvdModel>,
    history: Arc<DataIndex>,
    user_lookup: HashMap<UserId, usize>,
}

impl SvdScorer {
    pub fn new(model: Arc<SvdModel>, history: Arc<DataIndex>) -> Self {
        let user_lookup = model
            .user_ids()
            .iter()
            .enumerate()
            .map(|(idx, &id)| (id, idx))
            .collect();
        Self {
            model,
            history,
            user_lookup,
        }
    }

    pub fn model(&self) -> &SvdModel {
        &self.model
    }

    /// Predicted score of every movie in the model for one user
    pub fn scores_for(&self, user_id: UserId) -> Result<Vec<Recommendation>> {
        let user_idx = *self
            .user_lookup
            .get(&user_id)
            .ok_or(ModelError::UnknownUser(user_id))?;

        Ok(self
            .model
            .movie_ids()
            .iter()
            .zip(self.model.predict_row(user_idx))
            .map(|(&movie_id, score)| Recommendation { movie_id, score })
            .collect())
    }
}

impl Recommender for SvdScorer {
    fn name(&self) -> &str {
        "svd"
    }

    #[instrument(skip(self), fields(model = "svd"))]
    fn recommend(&self, user_id: UserId, n: usize) -> Result<Vec<Recommendation>> {
        if n == 0 {
            return Err(ModelError::InvalidCount(n));
        }

        let rated = self.history.rated_movies(user_id);
        let candidates: Vec<Recommendation> = self
            .scores_for(user_id)?
            .into_iter()
            .filter(|r| !rated.contains(&r.movie_id))
            .collect();

        if n > candidates.len() {
            debug!(
                requested = n,
                available = candidates.len(),
                "Fewer unseen movies than requested"
            );
        }

        Ok(select_top(candidates, n))
    }
}
