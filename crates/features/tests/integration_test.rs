//! Integration tests for the feature builder.
//!
//! These tests verify that the matrix built from a DataIndex matches the
//! ratings it was loaded with.

use data_loader::{DataIndex, Genre, Movie, Rating};
use features::{create_user_item_matrix, holdout_split, DuplicatePolicy, UserItemMatrix};

fn create_test_index() -> DataIndex {
    let mut index = DataIndex::new();

    for (id, title) in [(10, "Alien (1979)"), (11, "Heat (1995)"), (12, "Fargo (1996)")] {
        index.insert_movie(Movie {
            id,
            title: title.to_string(),
            year: None,
            genres: vec![Genre::Drama],
        });
    }

    let rows = [
        (1, 10, 4.0),
        (1, 11, 5.0),
        (2, 10, 3.0),
        (3, 12, 2.5),
        // Duplicate pair, later in the file
        (1, 10, 2.0),
    ];
    for (user_id, movie_id, rating) in rows {
        index.insert_rating(Rating {
            user_id,
            movie_id,
            rating,
            timestamp: Some(1_000_000),
        });
    }
    index.compute_movie_stats();
    index
}

#[test]
fn test_matrix_from_index() {
    let index = create_test_index();

    let matrix = create_user_item_matrix(index.ratings());

    assert_eq!(matrix.shape(), (3, 3));
    assert_eq!(matrix.get(1, 10), Some(3.0));
    assert_eq!(matrix.get(1, 11), Some(5.0));
    assert_eq!(matrix.get(2, 11), Some(0.0));
    assert_eq!(matrix.get(3, 12), Some(2.5));
    assert_eq!(matrix.observed_count(), 4);
}

#[test]
fn test_matrix_cells_match_user_histories() {
    let index = create_test_index();
    let matrix =
        UserItemMatrix::from_ratings_with_policy(index.ratings(), DuplicatePolicy::KeepFirst);

    for &user_id in matrix.user_ids() {
        let rated = index.rated_movies(user_id);
        for &movie_id in matrix.movie_ids() {
            let value = matrix.get(user_id, movie_id).unwrap();
            assert_eq!(value != 0.0, rated.contains(&movie_id));
        }
    }
    assert_eq!(matrix.get(1, 10), Some(4.0));
}

#[test]
fn test_training_matrix_from_split() {
    let index = create_test_index();
    let split = holdout_split(index.ratings(), 0.4, 42).unwrap();

    assert_eq!(split.held_out.len(), 2);
    let train = create_user_item_matrix(&split.train);
    assert_eq!(
        train.observed_count() + split.held_out.len(),
        index.ratings().len() - duplicates_in(&split.train)
    );
}

fn duplicates_in(ratings: &[Rating]) -> usize {
    let mut seen = std::collections::HashSet::new();
    ratings
        .iter()
        .filter(|r| !seen.insert((r.user_id, r.movie_id)))
        .count()
}
