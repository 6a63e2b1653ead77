//! Dense user×item rating matrix.
//!
//! Rows are users and columns are movies, both in ascending id order so the
//! layout only depends on the set of ids present. Cells without a rating
//! hold 0.0, which every model treats as "unrated".

use crate::error::{FeatureError, Result};
use data_loader::{MovieId, Rating, UserId};
use nalgebra::DMatrix;
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// What to store when the same (user, movie) pair is rated more than once
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DuplicatePolicy {
    /// Mean of all ratings for the pair
    #[default]
    Average,
    /// The first rating in input order
    KeepFirst,
    /// The last rating in input order
    KeepLast,
}

/// Dense user×item matrix with its id index arrays
#[derive(Debug, Clone, PartialEq)]
pub struct UserItemMatrix {
    user_ids: Vec<UserId>,
    movie_ids: Vec<MovieId>,
    values: DMatrix<f64>,
    user_lookup: HashMap<UserId, usize>,
    movie_lookup: HashMap<MovieId, usize>,
}

/// Build the matrix with the default duplicate policy
pub fn create_user_item_matrix(ratings: &[Rating]) -> UserItemMatrix {
    UserItemMatrix::from_ratings(ratings)
}

impl UserItemMatrix {
    pub fn from_ratings(ratings: &[Rating]) -> Self {
        Self::from_ratings_with_policy(ratings, DuplicatePolicy::default())
    }

    pub fn from_ratings_with_policy(ratings: &[Rating], policy: DuplicatePolicy) -> Self {
        let user_ids: Vec<UserId> = ratings
            .iter()
            .map(|r| r.user_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let movie_ids: Vec<MovieId> = ratings
            .iter()
            .map(|r| r.movie_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let user_lookup = lookup(&user_ids);
        let movie_lookup = lookup(&movie_ids);

        // (sum, count) per cell
        let mut cells: HashMap<(usize, usize), (f64, u32)> = HashMap::with_capacity(ratings.len());
        for rating in ratings {
            let key = (user_lookup[&rating.user_id], movie_lookup[&rating.movie_id]);
            let value = f64::from(rating.rating);
            match policy {
                DuplicatePolicy::Average => {
                    let cell = cells.entry(key).or_insert((0.0, 0));
                    cell.0 += value;
                    cell.1 += 1;
                }
                DuplicatePolicy::KeepFirst => {
                    cells.entry(key).or_insert((value, 1));
                }
                DuplicatePolicy::KeepLast => {
                    cells.insert(key, (value, 1));
                }
            }
        }

        let duplicates = ratings.len() - cells.len();
        if duplicates > 0 {
            debug!(duplicates, ?policy, "Resolved duplicate (user, movie) ratings");
        }

        let mut values = DMatrix::zeros(user_ids.len(), movie_ids.len());
        for ((row, col), (sum, count)) in cells {
            values[(row, col)] = sum / f64::from(count);
        }

        Self {
            user_ids,
            movie_ids,
            values,
            user_lookup,
            movie_lookup,
        }
    }

    /// Wrap an existing dense matrix. Ids must be unique and match the shape.
    pub fn from_dense(
        user_ids: Vec<UserId>,
        movie_ids: Vec<MovieId>,
        values: DMatrix<f64>,
    ) -> Result<Self> {
        if values.nrows() != user_ids.len() || values.ncols() != movie_ids.len() {
            return Err(FeatureError::ShapeMismatch {
                rows: values.nrows(),
                cols: values.ncols(),
                user_ids: user_ids.len(),
                movie_ids: movie_ids.len(),
            });
        }

        let user_lookup = lookup(&user_ids);
        if user_lookup.len() != user_ids.len() {
            return Err(FeatureError::DuplicateId { axis: "user" });
        }
        let movie_lookup = lookup(&movie_ids);
        if movie_lookup.len() != movie_ids.len() {
            return Err(FeatureError::DuplicateId { axis: "movie" });
        }

        Ok(Self {
            user_ids,
            movie_ids,
            values,
            user_lookup,
            movie_lookup,
        })
    }

    pub fn user_ids(&self) -> &[UserId] {
        &self.user_ids
    }

    pub fn movie_ids(&self) -> &[MovieId] {
        &self.movie_ids
    }

    pub fn values(&self) -> &DMatrix<f64> {
        &self.values
    }

    /// (users, movies)
    pub fn shape(&self) -> (usize, usize) {
        self.values.shape()
    }

    pub fn n_users(&self) -> usize {
        self.user_ids.len()
    }

    pub fn n_items(&self) -> usize {
        self.movie_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn user_index(&self, user_id: UserId) -> Option<usize> {
        self.user_lookup.get(&user_id).copied()
    }

    pub fn movie_index(&self, movie_id: MovieId) -> Option<usize> {
        self.movie_lookup.get(&movie_id).copied()
    }

    /// Cell value by ids, `None` if either id is not in the matrix
    pub fn get(&self, user_id: UserId, movie_id: MovieId) -> Option<f64> {
        let row = self.user_index(user_id)?;
        let col = self.movie_index(movie_id)?;
        Some(self.values[(row, col)])
    }

    /// A user's rating vector, copied out of the column-major storage
    pub fn row(&self, index: usize) -> Vec<f64> {
        self.values.row(index).iter().copied().collect()
    }

    /// Non-zero cells as (row, col, value)
    pub fn observed(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        let (rows, cols) = self.shape();
        (0..cols).flat_map(move |col| {
            (0..rows).filter_map(move |row| {
                let value = self.values[(row, col)];
                (value != 0.0).then_some((row, col, value))
            })
        })
    }

    pub fn observed_count(&self) -> usize {
        self.values.iter().filter(|&&v| v != 0.0).count()
    }

    /// Fraction of unrated cells
    pub fn sparsity(&self) -> f64 {
        let (rows, cols) = self.shape();
        let total = rows * cols;
        if total == 0 {
            return 0.0;
        }
        1.0 - self.observed_count() as f64 / total as f64
    }
}

fn lookup(ids: &[u32]) -> HashMap<u32, usize> {
    ids.iter().enumerate().map(|(idx, &id)| (id, idx)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rating(user_id: UserId, movie_id: MovieId, rating: f32) -> Rating {
        Rating {
            user_id,
            movie_id,
            rating,
            timestamp: None,
        }
    }

    #[test]
    fn test_user_item_matrix() {
        let ratings = vec![rating(1, 10, 4.0), rating(1, 11, 5.0), rating(2, 10, 3.0)];

        let matrix = create_user_item_matrix(&ratings);

        assert_eq!(matrix.shape(), (2, 2));
        assert_eq!(matrix.get(1, 10), Some(4.0));
        assert_eq!(matrix.get(1, 11), Some(5.0));
        assert_eq!(matrix.get(2, 10), Some(3.0));
        assert_eq!(matrix.get(2, 11), Some(0.0));
        assert_eq!(matrix.get(3, 10), None);
    }

    #[test]
    fn test_rows_and_columns_are_sorted() {
        let ratings = vec![rating(9, 30, 1.0), rating(2, 20, 2.0), rating(5, 10, 3.0)];

        let matrix = create_user_item_matrix(&ratings);

        assert_eq!(matrix.user_ids(), &[2, 5, 9]);
        assert_eq!(matrix.movie_ids(), &[10, 20, 30]);
        assert_eq!(matrix.row(0), vec![0.0, 2.0, 0.0]);

        // Same input in a different order gives the same matrix
        let mut reversed = ratings.clone();
        reversed.reverse();
        assert_eq!(create_user_item_matrix(&reversed), matrix);
    }

    #[test]
    fn test_duplicate_policies() {
        let ratings = vec![rating(1, 10, 2.0), rating(1, 10, 4.0), rating(1, 10, 5.0)];

        let average = UserItemMatrix::from_ratings_with_policy(&ratings, DuplicatePolicy::Average);
        let first = UserItemMatrix::from_ratings_with_policy(&ratings, DuplicatePolicy::KeepFirst);
        let last = UserItemMatrix::from_ratings_with_policy(&ratings, DuplicatePolicy::KeepLast);

        assert!((average.get(1, 10).unwrap() - 11.0 / 3.0).abs() < 1e-12);
        assert_eq!(first.get(1, 10), Some(2.0));
        assert_eq!(last.get(1, 10), Some(5.0));
        assert_eq!(average.observed_count(), 1);
    }

    #[test]
    fn test_observed_and_sparsity() {
        let ratings = vec![rating(1, 10, 4.0), rating(1, 11, 5.0), rating(2, 10, 3.0)];
        let matrix = create_user_item_matrix(&ratings);

        let mut observed: Vec<_> = matrix.observed().collect();
        observed.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
        assert_eq!(observed, vec![(0, 0, 4.0), (0, 1, 5.0), (1, 0, 3.0)]);
        assert!((matrix.sparsity() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_empty_input() {
        let matrix = create_user_item_matrix(&[]);
        assert!(matrix.is_empty());
        assert_eq!(matrix.shape(), (0, 0));
        assert_eq!(matrix.sparsity(), 0.0);
    }

    #[test]
    fn test_from_dense_validates_shape() {
        let values = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, 1.0]);
        assert!(UserItemMatrix::from_dense(vec![1, 2], vec![10, 11], values.clone()).is_ok());
        assert!(matches!(
            UserItemMatrix::from_dense(vec![1], vec![10, 11], values.clone()),
            Err(FeatureError::ShapeMismatch { .. })
        ));
        assert!(matches!(
            UserItemMatrix::from_dense(vec![1, 1], vec![10, 11], values),
            Err(FeatureError::DuplicateId { axis: "user" })
        ));
    }
}
