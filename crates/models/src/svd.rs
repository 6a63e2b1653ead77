//! Truncated SVD matrix factorization.
//!
//! The user×item matrix `R` is decomposed exactly with nalgebra, and the
//! leading `k` components are kept: user factors are `U_k Σ_k`, movie
//! factors are `V_k`, so a predicted rating is the dot product of a user
//! row and a movie row.

use crate::artifact::{self, Artifact, ArtifactKind};
use crate::error::{ArtifactError, ModelError, Result};
use crate::factors::{FactorMatrix, dot};
use data_loader::{MovieId, UserId};
use features::UserItemMatrix;
use nalgebra::{DMatrix, DVector, SVD};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, instrument};

pub const DEFAULT_N_COMPONENTS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SvdConfig {
    pub n_components: usize,
}

impl Default for SvdConfig {
    fn default() -> Self {
        Self {
            n_components: DEFAULT_N_COMPONENTS,
        }
    }
}

impl SvdConfig {
    pub fn with_n_components(mut self, n_components: usize) -> Self {
        self.n_components = n_components;
        self
    }
}

/// A trained truncated-SVD model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SvdModel {
    user_ids: Vec<UserId>,
    movie_ids: Vec<MovieId>,
    user_factors: FactorMatrix,
    movie_factors: FactorMatrix,
    singular_values: Vec<f64>,
    n_components: usize,
}

impl SvdModel {
    pub fn user_ids(&self) -> &[UserId] {
        &self.user_ids
    }

    pub fn movie_ids(&self) -> &[MovieId] {
        &self.movie_ids
    }

    pub fn n_components(&self) -> usize {
        self.n_components
    }

    /// Singular values of the kept components, in descending order
    pub fn singular_values(&self) -> &[f64] {
        &self.singular_values
    }

    pub fn user_factors(&self) -> &FactorMatrix {
        &self.user_factors
    }

    pub fn movie_factors(&self) -> &FactorMatrix {
        &self.movie_factors
    }

    /// Predicted rating for a (row, column) pair of the training matrix
    pub fn predict(&self, user_idx: usize, movie_idx: usize) -> f64 {
        dot(self.user_factors.row(user_idx), self.movie_factors.row(movie_idx))
    }

    /// Predicted ratings of one user for every movie, in `movie_ids` order
    pub fn predict_row(&self, user_idx: usize) -> Vec<f64> {
        let user = self.user_factors.row(user_idx);
        (0..self.movie_factors.rows())
            .map(|j| dot(user, self.movie_factors.row(j)))
            .collect()
    }

    pub fn save(&self, path: &Path) -> std::result::Result<(), ArtifactError> {
        artifact::save(self, path)
    }

    pub fn load(path: &Path) -> std::result::Result<Self, ArtifactError> {
        artifact::load(path)
    }
}

impl Artifact for SvdModel {
    const KIND: ArtifactKind = ArtifactKind::Svd;

    fn validate(&self) -> std::result::Result<(), ArtifactError> {
        let k = self.n_components;
        if !self.user_factors.is_consistent() || !self.movie_factors.is_consistent() {
            return Err(ArtifactError::Corrupt("factor data length mismatch".into()));
        }
        if self.user_factors.rows() != self.user_ids.len() || self.user_factors.cols() != k {
            return Err(ArtifactError::Corrupt(format!(
                "user factors are {}x{}, expected {}x{}",
                self.user_factors.rows(),
                self.user_factors.cols(),
                self.user_ids.len(),
                k
            )));
        }
        if self.movie_factors.rows() != self.movie_ids.len() || self.movie_factors.cols() != k {
            return Err(ArtifactError::Corrupt(format!(
                "movie factors are {}x{}, expected {}x{}",
                self.movie_factors.rows(),
                self.movie_factors.cols(),
                self.movie_ids.len(),
                k
            )));
        }
        if self.singular_values.len() != k {
            return Err(ArtifactError::Corrupt("singular value count mismatch".into()));
        }
        Ok(())
    }
}

/// A full decomposition of a matrix that can be truncated to any rank
///
/// Grid search decomposes once and truncates per candidate rank.
pub struct Decomposition {
    user_ids: Vec<UserId>,
    movie_ids: Vec<MovieId>,
    u: DMatrix<f64>,
    singular_values: DVector<f64>,
    v_t: DMatrix<f64>,
    /// Component indices sorted by singular value, largest first
    order: Vec<usize>,
}

impl Decomposition {
    /// Largest rank a model can be truncated to
    pub fn max_rank(&self) -> usize {
        self.order.len()
    }

    /// Validate a requested rank against the matrix dimensions
    pub fn check_rank(&self, k: usize) -> Result<()> {
        check_rank(k, self.max_rank())
    }

    /// Keep the `k` leading components
    pub fn truncate(&self, k: usize) -> Result<SvdModel> {
        self.check_rank(k)?;

        let n_users = self.u.nrows();
        let n_items = self.v_t.ncols();
        let mut user_factors = FactorMatrix::zeros(n_users, k);
        let mut movie_factors = FactorMatrix::zeros(n_items, k);
        let mut singular_values = Vec::with_capacity(k);

        for (c, &component) in self.order.iter().take(k).enumerate() {
            let sigma = self.singular_values[component];
            let v_row = self.v_t.row(component);

            // Fix the sign so the largest-magnitude item loading is positive
            let pivot = v_row
                .iter()
                .enumerate()
                .max_by(|(ia, a), (ib, b)| a.abs().total_cmp(&b.abs()).then(ib.cmp(ia)))
                .map(|(_, v)| *v)
                .unwrap_or(0.0);
            let sign = if pivot < 0.0 { -1.0 } else { 1.0 };

            for i in 0..n_users {
                user_factors.set(i, c, sign * self.u[(i, component)] * sigma);
            }
            for j in 0..n_items {
                movie_factors.set(j, c, sign * v_row[j]);
            }
            singular_values.push(sigma);
        }

        Ok(SvdModel {
            user_ids: self.user_ids.clone(),
            movie_ids: self.movie_ids.clone(),
            user_factors,
            movie_factors,
            singular_values,
            n_components: k,
        })
    }
}

fn check_rank(k: usize, max: usize) -> Result<()> {
    if k == 0 || k > max {
        return Err(ModelError::InvalidRank { requested: k, max });
    }
    Ok(())
}

/// Decompose the full matrix
#[instrument(skip(matrix), fields(n_users = matrix.n_users(), n_items = matrix.n_items()))]
pub fn decompose(matrix: &UserItemMatrix) -> Result<Decomposition> {
    if matrix.is_empty() {
        return Err(ModelError::EmptyMatrix);
    }

    let svd = SVD::try_new(matrix.values().clone(), true, true, f64::EPSILON, 0)
        .ok_or(ModelError::Decomposition)?;
    let u = svd.u.ok_or(ModelError::Decomposition)?;
    let v_t = svd.v_t.ok_or(ModelError::Decomposition)?;
    let singular_values = svd.singular_values;

    let mut order: Vec<usize> = (0..singular_values.len()).collect();
    order.sort_by(|&a, &b| {
        singular_values[b]
            .total_cmp(&singular_values[a])
            .then(a.cmp(&b))
    });

    debug!(
        components = order.len(),
        top = order.first().map(|&i| singular_values[i]),
        "Decomposed matrix"
    );

    Ok(Decomposition {
        user_ids: matrix.user_ids().to_vec(),
        movie_ids: matrix.movie_ids().to_vec(),
        u,
        singular_values,
        v_t,
        order,
    })
}

/// Train a truncated SVD model of rank `n_components`
pub fn train_svd(matrix: &UserItemMatrix, n_components: usize) -> Result<SvdModel> {
    if matrix.is_empty() {
        return Err(ModelError::EmptyMatrix);
    }
    let (n_users, n_items) = matrix.shape();
    check_rank(n_components, n_users.min(n_items))?;

    let model = decompose(matrix)?.truncate(n_components)?;
    info!(
        n_components,
        n_users,
        n_items,
        "Trained SVD model"
    );
    Ok(model)
}
