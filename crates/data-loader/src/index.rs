//! DataIndex building and indexing logic.
//!
//! This module builds the DataIndex from parsed data:
//! - Create primary indices (movies, ratings per user and per movie)
//! - Compute aggregate statistics (movie stats, user stats)
//! - Validate data integrity

use crate::error::{DataLoadError, Result};
use crate::parser;
use crate::types::*;
use rayon::prelude::*;
use std::path::Path;
use tracing::{info, warn};

/// File names of the raw MovieLens tables
pub const RAW_RATINGS_FILE: &str = "ratings.csv";
pub const RAW_MOVIES_FILE: &str = "movies.csv";

/// File names written by preprocessing
pub const PROCESSED_RATINGS_FILE: &str = "ratings_processed.csv";
pub const PROCESSED_MOVIES_FILE: &str = "movies_processed.csv";
pub const USER_STATS_FILE: &str = "user_stats.csv";

impl DataIndex {
    /// Load the raw MovieLens tables (`ratings.csv`, `movies.csv`) from a directory
    pub fn load_from_files(data_dir: &Path) -> Result<Self> {
        Self::load_from_paths(
            &data_dir.join(RAW_RATINGS_FILE),
            &data_dir.join(RAW_MOVIES_FILE),
        )
    }

    /// Load the tables written by [`crate::preprocess::write_processed`]
    pub fn load_processed(data_dir: &Path) -> Result<Self> {
        Self::load_from_paths(
            &data_dir.join(PROCESSED_RATINGS_FILE),
            &data_dir.join(PROCESSED_MOVIES_FILE),
        )
    }

    /// Load a ratings table and a movies table and build all indices
    ///
    /// Steps:
    /// 1. Parse both files in parallel
    /// 2. Build primary indices
    /// 3. Compute movie and user statistics
    /// 4. Validate data integrity
    pub fn load_from_paths(ratings_path: &Path, movies_path: &Path) -> Result<Self> {
        info!(
            ratings = %ratings_path.display(),
            movies = %movies_path.display(),
            "Loading MovieLens tables"
        );

        let (ratings, movies) = rayon::join(
            || parser::parse_ratings(ratings_path),
            || parser::parse_movies(movies_path),
        );
        let ratings = ratings?;
        let movies = movies?;

        info!(
            "Loaded {} movies, {} ratings ({} movie rows and {} rating rows dropped)",
            movies.records.len(),
            ratings.records.len(),
            movies.dropped,
            ratings.dropped
        );

        let mut index = DataIndex::new();
        for movie in movies.records {
            index.insert_movie(movie);
        }
        for rating in ratings.records {
            index.insert_rating(rating);
        }

        index.compute_movie_stats();
        index.compute_user_stats();
        index.validate()?;

        let (users, movies, ratings) = index.counts();
        info!(users, movies, ratings, "DataIndex built and validated");
        Ok(index)
    }

    /// Compute average rating and rating count for every rated movie
    pub fn compute_movie_stats(&mut self) {
        self.movie_stats = self
            .movie_ratings
            .par_iter()
            .map(|(&movie_id, ratings)| {
                let (avg_rating, rating_count) = mean_and_count(ratings);
                (movie_id, MovieStats {
                    avg_rating,
                    rating_count,
                })
            })
            .collect();
    }

    /// Compute average rating and rating count for every user
    pub fn compute_user_stats(&mut self) {
        self.user_stats = self
            .user_ratings
            .par_iter()
            .map(|(&user_id, ratings)| {
                let (avg_rating, rating_count) = mean_and_count(ratings);
                (user_id, UserStats {
                    avg_rating,
                    rating_count,
                })
            })
            .collect();
    }

    /// Validate data integrity
    ///
    /// Every rating must be positive and finite, since 0.0 is reserved for
    /// "unrated" cells. Ratings for movies missing from the movie table are
    /// allowed but reported.
    pub fn validate(&self) -> Result<()> {
        if let Some(bad) = self
            .ratings
            .iter()
            .find(|r| !r.rating.is_finite() || r.rating <= 0.0)
        {
            return Err(DataLoadError::ValidationError(format!(
                "rating {} for user {} and movie {} is not a positive number",
                bad.rating, bad.user_id, bad.movie_id
            )));
        }

        let orphans = self
            .movie_ratings
            .keys()
            .filter(|movie_id| !self.movies.contains_key(movie_id))
            .count();
        if orphans > 0 {
            warn!(orphans, "Rated movies missing from the movie table");
        }
        Ok(())
    }
}

fn mean_and_count(ratings: &[Rating]) -> (f32, u32) {
    let count = ratings.len() as u32;
    if count == 0 {
        return (0.0, 0);
    }
    let total: f32 = ratings.iter().map(|r| r.rating).sum();
    (total / count as f32, count)
}
