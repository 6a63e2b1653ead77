//! Reconstruction error and rank selection for SVD models.

use crate::error::{ModelError, Result};
use crate::svd::{SvdModel, decompose};
use data_loader::Rating;
use features::UserItemMatrix;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, instrument, warn};

/// Ranks tried when no grid is given
pub const DEFAULT_GRID: [usize; 4] = [20, 50, 80, 120];

/// RMSE of `model` over the observed (non-zero) cells of `matrix`
///
/// Every id of `matrix` must be known to the model.
pub fn evaluate_svd(model: &SvdModel, matrix: &UserItemMatrix) -> Result<f64> {
    let users = id_lookup(model.user_ids());
    let movies = id_lookup(model.movie_ids());

    let user_map = matrix
        .user_ids()
        .iter()
        .map(|id| {
            users
                .get(id)
                .copied()
                .ok_or(ModelError::UnknownId { axis: "user", id: *id })
        })
        .collect::<Result<Vec<_>>>()?;
    let movie_map = matrix
        .movie_ids()
        .iter()
        .map(|id| {
            movies
                .get(id)
                .copied()
                .ok_or(ModelError::UnknownId { axis: "movie", id: *id })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut squared = 0.0;
    let mut count = 0usize;
    for (row, col, value) in matrix.observed() {
        let err = value - model.predict(user_map[row], movie_map[col]);
        squared += err * err;
        count += 1;
    }

    if count == 0 {
        return Err(ModelError::NoObservedRatings);
    }
    Ok((squared / count as f64).sqrt())
}

/// Ratings whose user and movie both appear in the model, and how many were not
///
/// A model trained on a held-out split lacks any user or movie whose only
/// ratings were held out; this narrows a full table down to what
/// [`evaluate_svd`] can score.
pub fn ratings_within_model(model: &SvdModel, ratings: &[Rating]) -> (Vec<Rating>, usize) {
    let users: HashSet<u32> = model.user_ids().iter().copied().collect();
    let movies: HashSet<u32> = model.movie_ids().iter().copied().collect();

    let (kept, dropped): (Vec<Rating>, Vec<Rating>) = ratings
        .iter()
        .copied()
        .partition(|r| users.contains(&r.user_id) && movies.contains(&r.movie_id));
    if !dropped.is_empty() {
        debug!(dropped = dropped.len(), "Ratings outside the model left out");
    }
    (kept, dropped.len())
}

/// RMSE on ratings the model never saw during training
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HoldoutReport {
    pub rmse: f64,
    /// Ratings whose user and movie were both in the model
    pub evaluated: usize,
    /// Ratings dropped because the user or movie was unknown
    pub skipped: usize,
}

/// Score held-out ratings; pairs with an unknown user or movie are skipped
pub fn evaluate_holdout(model: &SvdModel, held_out: &[Rating]) -> Result<HoldoutReport> {
    let users = id_lookup(model.user_ids());
    let movies = id_lookup(model.movie_ids());

    let mut squared = 0.0;
    let mut evaluated = 0usize;
    let mut skipped = 0usize;
    for rating in held_out {
        match (users.get(&rating.user_id), movies.get(&rating.movie_id)) {
            (Some(&u), Some(&m)) => {
                let err = f64::from(rating.rating) - model.predict(u, m);
                squared += err * err;
                evaluated += 1;
            }
            _ => skipped += 1,
        }
    }

    if evaluated == 0 {
        return Err(ModelError::NoObservedRatings);
    }
    if skipped > 0 {
        warn!(skipped, evaluated, "Held-out ratings outside the model were skipped");
    }

    Ok(HoldoutReport {
        rmse: (squared / evaluated as f64).sqrt(),
        evaluated,
        skipped,
    })
}

/// One candidate rank and its in-sample RMSE
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GridTrial {
    pub n_components: usize,
    pub rmse: f64,
}

#[derive(Debug, Clone)]
pub struct GridSearchOutcome {
    pub best: SvdModel,
    pub best_rmse: f64,
    /// Every trial in grid order
    pub trials: Vec<GridTrial>,
}

/// Train one model per rank in `grid` and keep the one with the lowest RMSE
///
/// The matrix is decomposed once. Every rank is validated before any model
/// is built; on equal RMSE the earlier rank in the grid wins.
#[instrument(skip(matrix), fields(n_users = matrix.n_users(), n_items = matrix.n_items()))]
pub fn grid_search(matrix: &UserItemMatrix, grid: &[usize]) -> Result<GridSearchOutcome> {
    if grid.is_empty() {
        return Err(ModelError::EmptyGrid);
    }
    if matrix.is_empty() {
        return Err(ModelError::EmptyMatrix);
    }
    let max = matrix.n_users().min(matrix.n_items());
    if let Some(&bad) = grid.iter().find(|&&k| k == 0 || k > max) {
        return Err(ModelError::InvalidRank { requested: bad, max });
    }

    let decomposition = decompose(matrix)?;
    let mut trials = Vec::with_capacity(grid.len());
    let mut best: Option<(SvdModel, f64)> = None;

    for &k in grid {
        let model = decomposition.truncate(k)?;
        let rmse = evaluate_svd(&model, matrix)?;
        info!(n_components = k, rmse, "Evaluated SVD rank");
        trials.push(GridTrial {
            n_components: k,
            rmse,
        });

        let improves = best.as_ref().is_none_or(|(_, best_rmse)| rmse < *best_rmse);
        if improves {
            best = Some((model, rmse));
        }
    }

    let (best, best_rmse) = best.ok_or(ModelError::EmptyGrid)?;
    info!(
        n_components = best.n_components(),
        rmse = best_rmse,
        "Selected best SVD rank"
    );
    Ok(GridSearchOutcome {
        best,
        best_rmse,
        trials,
    })
}

fn id_lookup(ids: &[u32]) -> HashMap<u32, usize> {
    ids.iter().enumerate().map(|(idx, &id)| (id, idx)).collect()
}
