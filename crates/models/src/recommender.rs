use crate::error::Result;
use data_loader::{MovieId, UserId};
use serde::{Deserialize, Serialize};

/// A scored movie suggestion
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub movie_id: MovieId,
    pub score: f64,
}

/// Trait for models that can produce top-N recommendations for a user
pub trait Recommender: Send + Sync {
    fn name(&self) -> &str;

    /// Top `n` movies the user has not rated, best first
    fn recommend(&self, user_id: UserId, n: usize) -> Result<Vec<Recommendation>>;
}

/// Keep the `n` best candidates, ordered by score descending then movie id ascending
pub(crate) fn select_top(mut candidates: Vec<Recommendation>, n: usize) -> Vec<Recommendation> {
    candidates.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then(a.movie_id.cmp(&b.movie_id))
    });
    candidates.truncate(n);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(movie_id: MovieId, score: f64) -> Recommendation {
        Recommendation { movie_id, score }
    }

    #[test]
    fn test_select_top_breaks_ties_by_movie_id() {
        let picked = select_top(vec![rec(7, 1.0), rec(3, 2.0), rec(5, 1.0), rec(1, 0.5)], 3);
        let ids: Vec<MovieId> = picked.iter().map(|r| r.movie_id).collect();
        assert_eq!(ids, vec![3, 5, 7]);
    }

    #[test]
    fn test_select_top_short_list() {
        assert_eq!(select_top(vec![rec(1, 1.0)], 5).len(), 1);
        assert!(select_top(Vec::new(), 5).is_empty());
    }
}
