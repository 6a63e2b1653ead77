//! User-based nearest neighbors with cosine distance.

use crate::artifact::{self, Artifact, ArtifactKind};
use crate::error::{ArtifactError, ModelError, Result};
use crate::factors::{FactorMatrix, dot};
use crate::recommender::{Recommendation, Recommender, select_top};
use data_loader::{DataIndex, MovieId, UserId};
use features::UserItemMatrix;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument};

pub const DEFAULT_N_NEIGHBORS: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnnConfig {
    pub n_neighbors: usize,
}

impl Default for KnnConfig {
    fn default() -> Self {
        Self {
            n_neighbors: DEFAULT_N_NEIGHBORS,
        }
    }
}

impl KnnConfig {
    pub fn with_n_neighbors(mut self, n_neighbors: usize) -> Self {
        self.n_neighbors = n_neighbors;
        self
    }
}

/// A training row and its cosine distance to a query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub index: usize,
    pub distance: f64,
}

/// Fitted neighbor index over the user rows of the rating matrix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnnModel {
    user_ids: Vec<UserId>,
    movie_ids: Vec<MovieId>,
    rows: FactorMatrix,
    norms: Vec<f64>,
    n_neighbors: usize,
}

/// Fit a KNN model on the rows of `matrix`
#[instrument(skip(matrix), fields(n_users = matrix.n_users(), n_items = matrix.n_items()))]
pub fn train_knn(matrix: &UserItemMatrix, n_neighbors: usize) -> Result<KnnModel> {
    if matrix.is_empty() {
        return Err(ModelError::EmptyMatrix);
    }
    if n_neighbors == 0 || n_neighbors > matrix.n_users() {
        return Err(ModelError::InvalidNeighborCount {
            requested: n_neighbors,
            available: matrix.n_users(),
        });
    }

    let (n_users, n_items) = matrix.shape();
    let mut rows = FactorMatrix::zeros(n_users, n_items);
    for (i, j, value) in matrix.observed() {
        rows.set(i, j, value);
    }
    let norms = (0..n_users)
        .map(|i| dot(rows.row(i), rows.row(i)).sqrt())
        .collect();

    info!(n_neighbors, "Fitted KNN model");
    Ok(KnnModel {
        user_ids: matrix.user_ids().to_vec(),
        movie_ids: matrix.movie_ids().to_vec(),
        rows,
        norms,
        n_neighbors,
    })
}

impl KnnModel {
    pub fn user_ids(&self) -> &[UserId] {
        &self.user_ids
    }

    pub fn movie_ids(&self) -> &[MovieId] {
        &self.movie_ids
    }

    pub fn n_neighbors(&self) -> usize {
        self.n_neighbors
    }

    pub fn user_index(&self, user_id: UserId) -> Option<usize> {
        self.user_ids.iter().position(|&id| id == user_id)
    }

    /// The stored rating row of a training user
    pub fn row(&self, index: usize) -> &[f64] {
        self.rows.row(index)
    }

    /// The `k` training rows closest to `query` (default: `n_neighbors`)
    ///
    /// Ordered by distance ascending, ties by row index ascending. A zero
    /// vector on either side has distance 1.
    pub fn kneighbors(&self, query: &[f64], k: Option<usize>) -> Result<Vec<Neighbor>> {
        let k = k.unwrap_or(self.n_neighbors);
        let available = self.user_ids.len();
        if k == 0 || k > available {
            return Err(ModelError::InvalidNeighborCount {
                requested: k,
                available,
            });
        }
        if query.len() != self.movie_ids.len() {
            return Err(ModelError::DimensionMismatch {
                expected: self.movie_ids.len(),
                found: query.len(),
            });
        }

        let query_norm = dot(query, query).sqrt();
        let mut neighbors: Vec<Neighbor> = (0..available)
            .into_par_iter()
            .map(|index| {
                let row = self.rows.row(index);
                Neighbor {
                    index,
                    distance: cosine_distance(query, query_norm, row, self.norms[index]),
                }
            })
            .collect();

        neighbors.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.index.cmp(&b.index)));
        neighbors.truncate(k);
        Ok(neighbors)
    }

    /// The `k` users most similar to `user_id`, excluding the user itself
    pub fn similar_users(&self, user_id: UserId, k: usize) -> Result<Vec<(UserId, f64)>> {
        let index = self
            .user_index(user_id)
            .ok_or(ModelError::UnknownUser(user_id))?;
        let available = self.user_ids.len();
        let requested = (k + 1).min(available);

        let similar: Vec<(UserId, f64)> = self
            .kneighbors(self.rows.row(index), Some(requested))?
            .into_iter()
            .filter(|n| n.index != index)
            .take(k)
            .map(|n| (self.user_ids[n.index], n.distance))
            .collect();

        debug!(user_id, found = similar.len(), "Found similar users");
        Ok(similar)
    }

    pub fn save(&self, path: &Path) -> std::result::Result<(), ArtifactError> {
        artifact::save(self, path)
    }

    pub fn load(path: &Path) -> std::result::Result<Self, ArtifactError> {
        artifact::load(path)
    }
}

fn cosine_distance(a: &[f64], a_norm: f64, b: &[f64], b_norm: f64) -> f64 {
    if a_norm == 0.0 || b_norm == 0.0 {
        return 1.0;
    }
    1.0 - dot(a, b) / (a_norm * b_norm)
}

impl Artifact for KnnModel {
    const KIND: ArtifactKind = ArtifactKind::Knn;

    fn validate(&self) -> std::result::Result<(), ArtifactError> {
        if !self.rows.is_consistent() {
            return Err(ArtifactError::Corrupt("row data length mismatch".into()));
        }
        if self.rows.rows() != self.user_ids.len() || self.rows.cols() != self.movie_ids.len() {
            return Err(ArtifactError::Corrupt(format!(
                "rows are {}x{}, expected {}x{}",
                self.rows.rows(),
                self.rows.cols(),
                self.user_ids.len(),
                self.movie_ids.len()
            )));
        }
        if self.norms.len() != self.user_ids.len() {
            return Err(ArtifactError::Corrupt("norm count mismatch".into()));
        }
        if self.n_neighbors == 0 || self.n_neighbors > self.user_ids.len() {
            return Err(ArtifactError::Corrupt(format!(
                "n_neighbors {} out of range",
                self.n_neighbors
            )));
        }
        Ok(())
    }
}

/// Recommends movies rated highly by a user's nearest neighbors
///
/// A candidate's score is the similarity-weighted mean of the neighbors'
/// ratings, where similarity is `1 - distance`.
pub struct KnnRecommender {
    model: Arc<KnnModel>,
    history: Arc<DataIndex>,
}

impl KnnRecommender {
    pub fn new(model: Arc<KnnModel>, history: Arc<DataIndex>) -> Self {
        Self { model, history }
    }
}

impl Recommender for KnnRecommender {
    fn name(&self) -> &str {
        "knn"
    }

    #[instrument(skip(self), fields(model = "knn"))]
    fn recommend(&self, user_id: UserId, n: usize) -> Result<Vec<Recommendation>> {
        if n == 0 {
            return Err(ModelError::InvalidCount(n));
        }

        let neighbors = self.model.similar_users(user_id, self.model.n_neighbors())?;
        let rated = self.history.rated_movies(user_id);

        let mut totals: HashMap<usize, (f64, f64)> = HashMap::new();
        for (neighbor_id, distance) in neighbors {
            let similarity = 1.0 - distance;
            if similarity <= 0.0 {
                continue;
            }
            let Some(row_idx) = self.model.user_index(neighbor_id) else {
                continue;
            };
            for (col, &value) in self.model.row(row_idx).iter().enumerate() {
                if value == 0.0 {
                    continue;
                }
                let entry = totals.entry(col).or_insert((0.0, 0.0));
                entry.0 += similarity * value;
                entry.1 += similarity;
            }
        }

        let candidates = totals
            .into_iter()
            .map(|(col, (weighted, weight))| Recommendation {
                movie_id: self.model.movie_ids()[col],
                score: weighted / weight,
            })
            .filter(|r| !rated.contains(&r.movie_id))
            .collect();

        Ok(select_top(candidates, n))
    }
}
