//! Core domain types for the MovieLens dataset.
//!
//! This module defines the fundamental data structures used throughout the system:
//! - Type aliases for domain clarity (UserId, MovieId)
//! - Rating and Movie records as parsed from the CSV tables
//! - Genre labels with their fixed one-hot column order
//! - DataIndex, the in-memory database every other crate reads from

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use crate::error::DataLoadError;

// =============================================================================
// Type Aliases
// =============================================================================

/// Unique identifier for a user
pub type UserId = u32;

/// Unique identifier for a movie
pub type MovieId = u32;

// =============================================================================
// Movie-related Types
// =============================================================================

/// Represents a movie in the dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movie {
    pub id: MovieId,
    pub title: String,
    /// Year extracted from title (e.g., "Toy Story (1995)")
    pub year: Option<u16>,
    pub genres: Vec<Genre>,
}

impl Movie {
    /// One boolean per entry of [`Genre::ALL`], the one-hot genre encoding
    pub fn genre_flags(&self) -> [bool; Genre::COUNT] {
        let mut flags = [false; Genre::COUNT];
        for genre in &self.genres {
            flags[genre.position()] = true;
        }
        flags
    }
}

/// Movie genres from the MovieLens "latest" datasets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Genre {
    Action,
    Adventure,
    Animation,
    Children,
    Comedy,
    Crime,
    Documentary,
    Drama,
    Fantasy,
    FilmNoir,
    Horror,
    Imax,
    Musical,
    Mystery,
    Romance,
    SciFi,
    Thriller,
    War,
    Western,
    NoGenresListed,
}

impl Genre {
    pub const COUNT: usize = 20;

    /// Every genre, in one-hot column order
    pub const ALL: [Genre; Genre::COUNT] = [
        Genre::Action,
        Genre::Adventure,
        Genre::Animation,
        Genre::Children,
        Genre::Comedy,
        Genre::Crime,
        Genre::Documentary,
        Genre::Drama,
        Genre::Fantasy,
        Genre::FilmNoir,
        Genre::Horror,
        Genre::Imax,
        Genre::Musical,
        Genre::Mystery,
        Genre::Romance,
        Genre::SciFi,
        Genre::Thriller,
        Genre::War,
        Genre::Western,
        Genre::NoGenresListed,
    ];

    /// The label used in `movies.csv`
    pub fn label(self) -> &'static str {
        match self {
            Genre::Action => "Action",
            Genre::Adventure => "Adventure",
            Genre::Animation => "Animation",
            Genre::Children => "Children",
            Genre::Comedy => "Comedy",
            Genre::Crime => "Crime",
            Genre::Documentary => "Documentary",
            Genre::Drama => "Drama",
            Genre::Fantasy => "Fantasy",
            Genre::FilmNoir => "Film-Noir",
            Genre::Horror => "Horror",
            Genre::Imax => "IMAX",
            Genre::Musical => "Musical",
            Genre::Mystery => "Mystery",
            Genre::Romance => "Romance",
            Genre::SciFi => "Sci-Fi",
            Genre::Thriller => "Thriller",
            Genre::War => "War",
            Genre::Western => "Western",
            Genre::NoGenresListed => "(no genres listed)",
        }
    }

    fn position(self) -> usize {
        self as usize
    }
}

impl FromStr for Genre {
    type Err = DataLoadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Genre::ALL
            .into_iter()
            .find(|genre| genre.label() == s)
            .ok_or_else(|| DataLoadError::InvalidValue {
                field: "genre".to_string(),
                value: s.to_string(),
            })
    }
}

// =============================================================================
// Rating Type
// =============================================================================

/// Represents a single rating from a user for a movie
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub user_id: UserId,
    pub movie_id: MovieId,
    /// Rating value, strictly positive (0.5 to 5.0 in MovieLens)
    pub rating: f32,
    /// Unix timestamp (seconds) when the rating was made, if it could be parsed
    pub timestamp: Option<i64>,
}

impl Rating {
    /// The timestamp as a UTC datetime
    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        self.timestamp
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
    }
}

// =============================================================================
// Statistics Types
// =============================================================================

/// Precomputed statistics for a movie
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MovieStats {
    pub avg_rating: f32,
    pub rating_count: u32,
}

/// Precomputed statistics for a user
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UserStats {
    pub avg_rating: f32,
    pub rating_count: u32,
}

// =============================================================================
// DataIndex - The Core In-Memory Database
// =============================================================================

/// Main data structure that holds all data and indices.
///
/// Provides O(1) lookups for movies and per-user / per-movie ratings through
/// HashMap indices. The flat `ratings` list keeps file order, which the
/// matrix builder relies on for its duplicate policies.
#[derive(Debug, Default)]
pub struct DataIndex {
    pub(crate) movies: HashMap<MovieId, Movie>,

    /// Every rating in load order
    pub(crate) ratings: Vec<Rating>,
    /// All ratings made by each user
    pub(crate) user_ratings: HashMap<UserId, Vec<Rating>>,
    /// All ratings received by each movie
    pub(crate) movie_ratings: HashMap<MovieId, Vec<Rating>>,

    // Precomputed statistics
    pub(crate) movie_stats: HashMap<MovieId, MovieStats>,
    pub(crate) user_stats: HashMap<UserId, UserStats>,
}

impl DataIndex {
    /// Creates a new, empty DataIndex
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a movie by ID
    pub fn get_movie(&self, id: MovieId) -> Option<&Movie> {
        self.movies.get(&id)
    }

    /// Get all ratings made by a user
    ///
    /// Returns an empty slice if user has no ratings
    pub fn get_user_ratings(&self, user_id: UserId) -> &[Rating] {
        self.user_ratings
            .get(&user_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Get all ratings for a movie
    pub fn get_movie_ratings(&self, movie_id: MovieId) -> &[Rating] {
        self.movie_ratings
            .get(&movie_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Get precomputed statistics for a movie
    pub fn get_movie_stats(&self, movie_id: MovieId) -> Option<&MovieStats> {
        self.movie_stats.get(&movie_id)
    }

    /// Get precomputed statistics for a user
    pub fn get_user_stats(&self, user_id: UserId) -> Option<&UserStats> {
        self.user_stats.get(&user_id)
    }

    /// Every rating, in the order it was inserted
    pub fn ratings(&self) -> &[Rating] {
        &self.ratings
    }

    /// The set of movies a user has rated
    pub fn rated_movies(&self, user_id: UserId) -> HashSet<MovieId> {
        self.get_user_ratings(user_id)
            .iter()
            .map(|r| r.movie_id)
            .collect()
    }

    /// All movie ids in the movie table, ascending
    pub fn get_all_movie_ids(&self) -> Vec<MovieId> {
        let mut ids: Vec<MovieId> = self.movies.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// All users with at least one rating, ascending
    pub fn get_all_user_ids(&self) -> Vec<UserId> {
        let mut ids: Vec<UserId> = self.user_ratings.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Insert a movie into the index
    pub fn insert_movie(&mut self, movie: Movie) {
        self.movies.insert(movie.id, movie);
    }

    /// Insert a rating and update indices
    pub fn insert_rating(&mut self, rating: Rating) {
        self.ratings.push(rating);

        self.user_ratings
            .entry(rating.user_id)
            .or_default()
            .push(rating);

        self.movie_ratings
            .entry(rating.movie_id)
            .or_default()
            .push(rating);
    }

    /// Get counts for debugging/validation: (users, movies, ratings)
    pub fn counts(&self) -> (usize, usize, usize) {
        (self.user_ratings.len(), self.movies.len(), self.ratings.len())
    }
}
