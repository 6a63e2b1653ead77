//! # Data Loader Crate
//!
//! This crate handles loading, indexing and preprocessing the MovieLens
//! "latest" CSV tables.
//!
//! ## Main Components
//!
//! - **types**: Core domain types (Movie, Rating, Genre, DataIndex)
//! - **parser**: Parse CSV tables into Rust structs, dropping invalid rows
//! - **index**: Build the DataIndex and its statistics
//! - **preprocess**: Write the processed tables used for training and serving
//! - **error**: Error types for data loading
//!
//! ## Example Usage
//!
//! ```ignore
//! use data_loader::DataIndex;
//! use std::path::Path;
//!
//! let index = DataIndex::load_from_files(Path::new("data/raw"))?;
//! data_loader::preprocess::write_processed(&index, Path::new("data/processed"))?;
//!
//! let ratings = index.get_user_ratings(1);
//! println!("User 1 rated {} movies", ratings.len());
//! ```

pub mod error;
pub mod types;
pub mod parser;
pub mod index;
pub mod preprocess;

// Re-export commonly used types for convenience
pub use error::{DataLoadError, Result};
pub use parser::Parsed;
pub use preprocess::{write_processed, PreprocessSummary};
pub use types::{
    // Type aliases
    UserId,
    MovieId,
    // Core types
    Movie,
    Rating,
    DataIndex,
    MovieStats,
    UserStats,
    Genre,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_index_creation() {
        let index = DataIndex::new();
        let (users, movies, ratings) = index.counts();

        assert_eq!(users, 0);
        assert_eq!(movies, 0);
        assert_eq!(ratings, 0);
    }

    #[test]
    fn test_insert_movie() {
        let mut index = DataIndex::new();

        index.insert_movie(Movie {
            id: 1,
            title: "Toy Story (1995)".to_string(),
            year: Some(1995),
            genres: vec![Genre::Animation, Genre::Children, Genre::Comedy],
        });

        let retrieved = index.get_movie(1).unwrap();
        assert_eq!(retrieved.id, 1);
        assert_eq!(retrieved.year, Some(1995));
        assert_eq!(retrieved.genres.len(), 3);

        let flags = retrieved.genre_flags();
        assert_eq!(flags.iter().filter(|&&f| f).count(), 3);
        assert!(flags[2]);
    }

    #[test]
    fn test_insert_rating() {
        let mut index = DataIndex::new();

        index.insert_rating(Rating {
            user_id: 1,
            movie_id: 1193,
            rating: 5.0,
            timestamp: Some(978300760),
        });

        let user_ratings = index.get_user_ratings(1);
        assert_eq!(user_ratings.len(), 1);
        assert_eq!(user_ratings[0].rating, 5.0);
        assert_eq!(
            user_ratings[0].datetime().unwrap().to_rfc3339(),
            "2000-12-31T22:12:40+00:00"
        );

        assert_eq!(index.get_movie_ratings(1193).len(), 1);
        assert!(index.rated_movies(1).contains(&1193));
        assert_eq!(index.get_all_user_ids(), vec![1]);
    }

    #[test]
    fn test_duplicate_ratings_are_kept() {
        let mut index = DataIndex::new();
        for rating in [3.0, 4.0] {
            index.insert_rating(Rating {
                user_id: 1,
                movie_id: 5,
                rating,
                timestamp: None,
            });
        }
        assert_eq!(index.ratings().len(), 2);
        assert_eq!(index.rated_movies(1).len(), 1);
    }

    #[test]
    fn test_empty_queries() {
        let index = DataIndex::new();

        assert!(index.get_movie(999).is_none());
        assert!(index.get_user_ratings(999).is_empty());
        assert!(index.get_movie_ratings(999).is_empty());
        assert!(index.get_movie_stats(999).is_none());
        assert!(index.rated_movies(999).is_empty());
    }
}
