//! Writes the processed tables consumed by training and serving.
//!
//! Output files (overwritten if they exist):
//! - `ratings_processed.csv`: cleaned ratings with datetime timestamps
//! - `movies_processed.csv`: movies with rating statistics and one boolean
//!   column per genre
//! - `user_stats.csv`: average rating and rating count per user

use crate::error::{DataLoadError, Result};
use crate::index::{PROCESSED_MOVIES_FILE, PROCESSED_RATINGS_FILE, USER_STATS_FILE};
use crate::parser::DATETIME_FORMAT;
use crate::types::{DataIndex, Genre};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::info;

/// What a preprocessing run wrote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreprocessSummary {
    pub ratings_written: usize,
    pub movies_written: usize,
    pub users_written: usize,
    pub files: Vec<PathBuf>,
}

fn writer(path: &Path) -> Result<csv::Writer<File>> {
    csv::Writer::from_path(path).map_err(|e| DataLoadError::csv(&path.display().to_string(), e))
}

fn write_row<I, T>(writer: &mut csv::Writer<File>, path: &Path, row: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    writer
        .write_record(row)
        .map_err(|e| DataLoadError::csv(&path.display().to_string(), e))
}

/// Write all processed tables for `index` into `out_dir`
pub fn write_processed(index: &DataIndex, out_dir: &Path) -> Result<PreprocessSummary> {
    fs::create_dir_all(out_dir)?;

    let ratings_path = out_dir.join(PROCESSED_RATINGS_FILE);
    let movies_path = out_dir.join(PROCESSED_MOVIES_FILE);
    let users_path = out_dir.join(USER_STATS_FILE);

    let ratings_written = write_ratings(index, &ratings_path)?;
    let movies_written = write_movies(index, &movies_path)?;
    let users_written = write_user_stats(index, &users_path)?;

    info!(
        ratings_written,
        movies_written,
        users_written,
        out_dir = %out_dir.display(),
        "Wrote processed tables"
    );

    Ok(PreprocessSummary {
        ratings_written,
        movies_written,
        users_written,
        files: vec![ratings_path, movies_path, users_path],
    })
}

fn write_ratings(index: &DataIndex, path: &Path) -> Result<usize> {
    let mut out = writer(path)?;
    write_row(&mut out, path, ["userId", "movieId", "rating", "timestamp"])?;

    for rating in index.ratings() {
        let timestamp = rating
            .datetime()
            .map(|dt| dt.format(DATETIME_FORMAT).to_string())
            .unwrap_or_default();
        write_row(&mut out, path, [
            rating.user_id.to_string(),
            rating.movie_id.to_string(),
            rating.rating.to_string(),
            timestamp,
        ])?;
    }
    out.flush()?;
    Ok(index.ratings().len())
}

fn write_movies(index: &DataIndex, path: &Path) -> Result<usize> {
    let mut out = writer(path)?;

    let mut header = vec![
        "movieId".to_string(),
        "title".to_string(),
        "genres".to_string(),
        "movie_avg_rating".to_string(),
        "movie_rating_count".to_string(),
    ];
    header.extend(Genre::ALL.iter().map(|g| format!("genre_{}", g.label())));
    write_row(&mut out, path, &header)?;

    let movie_ids = index.get_all_movie_ids();
    for &movie_id in &movie_ids {
        let Some(movie) = index.get_movie(movie_id) else {
            continue;
        };
        let genres = movie
            .genres
            .iter()
            .map(|g| g.label())
            .collect::<Vec<_>>()
            .join("|");
        let (avg, count) = match index.get_movie_stats(movie_id) {
            Some(stats) => (stats.avg_rating.to_string(), stats.rating_count.to_string()),
            None => (String::new(), String::new()),
        };

        let mut row = vec![movie_id.to_string(), movie.title.clone(), genres, avg, count];
        row.extend(
            movie
                .genre_flags()
                .iter()
                .map(|&flag| if flag { "True" } else { "False" }.to_string()),
        );
        write_row(&mut out, path, &row)?;
    }
    out.flush()?;
    Ok(movie_ids.len())
}

fn write_user_stats(index: &DataIndex, path: &Path) -> Result<usize> {
    let mut out = writer(path)?;
    write_row(&mut out, path, ["userId", "user_avg_rating", "user_rating_count"])?;

    let user_ids = index.get_all_user_ids();
    for &user_id in &user_ids {
        if let Some(stats) = index.get_user_stats(user_id) {
            write_row(&mut out, path, [
                user_id.to_string(),
                stats.avg_rating.to_string(),
                stats.rating_count.to_string(),
            ])?;
        }
    }
    out.flush()?;
    Ok(user_ids.len())
}
