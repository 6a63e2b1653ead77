//! Parser for MovieLens CSV tables.
//!
//! This module handles the comma-separated files of the MovieLens
//! "latest" datasets and their processed counterparts:
//! - ratings.csv: userId,movieId,rating,timestamp
//! - movies.csv: movieId,title,genres
//!
//! Columns are located by header name, so extra columns (like the genre
//! one-hot columns of the processed movie table) are ignored. A row that is
//! missing a required field is dropped and counted instead of failing the
//! whole load.

use crate::error::{DataLoadError, Result};
use crate::types::*;
use chrono::NaiveDateTime;
use csv::StringRecord;
use std::fs::File;
use std::path::Path;
use tracing::{debug, warn};

/// Datetime layout used by the processed tables
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Records parsed from one file plus the number of rows that were rejected
#[derive(Debug, Clone)]
pub struct Parsed<T> {
    pub records: Vec<T>,
    pub dropped: usize,
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn open_reader(path: &Path) -> Result<csv::Reader<File>> {
    if !path.exists() {
        return Err(DataLoadError::FileNotFound {
            path: path.display().to_string(),
        });
    }
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .map_err(|e| DataLoadError::csv(&file_label(path), e))
}

/// Find the position of a named column in the header row
fn column(headers: &StringRecord, file: &str, name: &str) -> Result<usize> {
    headers
        .iter()
        .position(|h| h == name)
        .ok_or_else(|| DataLoadError::MissingColumn {
            file: file.to_string(),
            column: name.to_string(),
        })
}

/// A field that is present and non-empty
fn field(record: &StringRecord, idx: usize) -> Option<&str> {
    record.get(idx).filter(|s| !s.is_empty())
}

/// Parse an integer id, accepting float spellings like "12.0"
fn parse_id(s: &str) -> Option<u32> {
    if let Ok(id) = s.parse::<u32>() {
        return Some(id);
    }
    let value = s.parse::<f64>().ok()?;
    if value.fract() == 0.0 && value >= 0.0 && value <= u32::MAX as f64 {
        Some(value as u32)
    } else {
        None
    }
}

/// Parse a timestamp given either as unix seconds or as a datetime
pub fn parse_timestamp(s: &str) -> Option<i64> {
    if let Ok(secs) = s.parse::<i64>() {
        return Some(secs);
    }
    if let Ok(secs) = s.parse::<f64>() {
        return secs.is_finite().then_some(secs as i64);
    }
    NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)
        .ok()
        .map(|dt| dt.and_utc().timestamp())
}

struct RatingColumns {
    user_id: usize,
    movie_id: usize,
    rating: usize,
    timestamp: Option<usize>,
}

fn parse_rating_row(
    record: &StringRecord,
    cols: &RatingColumns,
) -> std::result::Result<Rating, &'static str> {
    let user_id = field(record, cols.user_id)
        .ok_or("missing userId")
        .and_then(|s| parse_id(s).ok_or("invalid userId"))?;
    let movie_id = field(record, cols.movie_id)
        .ok_or("missing movieId")
        .and_then(|s| parse_id(s).ok_or("invalid movieId"))?;
    let rating = field(record, cols.rating)
        .ok_or("missing rating")
        .and_then(|s| s.parse::<f32>().map_err(|_| "invalid rating"))?;

    // 0.0 means "unrated" in the user-item matrix
    if !rating.is_finite() || rating <= 0.0 {
        return Err("rating must be positive");
    }

    let timestamp = cols
        .timestamp
        .and_then(|idx| field(record, idx))
        .and_then(parse_timestamp);

    Ok(Rating {
        user_id,
        movie_id,
        rating,
        timestamp,
    })
}

/// Parse a ratings table
///
/// Format: userId,movieId,rating,timestamp (timestamp optional)
pub fn parse_ratings(path: &Path) -> Result<Parsed<Rating>> {
    let file = file_label(path);
    let mut reader = open_reader(path)?;
    let headers = reader
        .headers()
        .map_err(|e| DataLoadError::csv(&file, e))?
        .clone();

    let cols = RatingColumns {
        user_id: column(&headers, &file, "userId")?,
        movie_id: column(&headers, &file, "movieId")?,
        rating: column(&headers, &file, "rating")?,
        timestamp: column(&headers, &file, "timestamp").ok(),
    };

    let mut ratings = Vec::new();
    let mut dropped = 0;

    for (idx, result) in reader.records().enumerate() {
        // Header is line 1
        let line_no = idx + 2;
        let parsed = result
            .map_err(|_| "unreadable record")
            .and_then(|record| parse_rating_row(&record, &cols));

        match parsed {
            Ok(rating) => ratings.push(rating),
            Err(reason) => {
                debug!(file = %file, line = line_no, reason, "Dropping rating row");
                dropped += 1;
            }
        }
    }

    if dropped > 0 {
        warn!(file = %file, dropped, "Dropped invalid rating rows");
    }

    Ok(Parsed {
        records: ratings,
        dropped,
    })
}

/// Parse a movies table
///
/// Format: movieId,title,genres
///
/// The title often includes year in parentheses: "Toy Story (1995)"
/// Genres are pipe-separated: "Animation|Children|Comedy"
pub fn parse_movies(path: &Path) -> Result<Parsed<Movie>> {
    let file = file_label(path);
    let mut reader = open_reader(path)?;
    let headers = reader
        .headers()
        .map_err(|e| DataLoadError::csv(&file, e))?
        .clone();

    let id_col = column(&headers, &file, "movieId")?;
    let title_col = column(&headers, &file, "title")?;
    let genres_col = column(&headers, &file, "genres")?;

    let mut movies = Vec::new();
    let mut dropped = 0;

    for (idx, result) in reader.records().enumerate() {
        let line_no = idx + 2;
        let Ok(record) = result else {
            debug!(file = %file, line = line_no, "Dropping unreadable movie row");
            dropped += 1;
            continue;
        };

        let id = field(&record, id_col).and_then(parse_id);
        let title = field(&record, title_col);
        let (Some(id), Some(title)) = (id, title) else {
            debug!(file = %file, line = line_no, "Dropping movie row without id or title");
            dropped += 1;
            continue;
        };

        movies.push(Movie {
            id,
            title: title.to_string(),
            year: extract_year_from_title(title),
            genres: parse_genres(field(&record, genres_col).unwrap_or("")),
        });
    }

    if dropped > 0 {
        warn!(file = %file, dropped, "Dropped invalid movie rows");
    }

    Ok(Parsed {
        records: movies,
        dropped,
    })
}

/// Extract year from movie title
///
/// Example: "Toy Story (1995)" -> Some(1995)
///          "Movie Title" -> None
fn extract_year_from_title(title: &str) -> Option<u16> {
    let start = title.rfind('(')?;
    let end = title.rfind(')')?;
    if start < end {
        let year_str = title[start + 1..end].trim();
        if year_str.len() == 4 {
            return year_str.parse::<u16>().ok();
        }
    }
    None
}

/// Parse pipe-separated genres, skipping labels we do not know
///
/// Example: "Action|Adventure|Sci-Fi" -> vec![Genre::Action, Genre::Adventure, Genre::SciFi]
fn parse_genres(s: &str) -> Vec<Genre> {
    let mut genres = Vec::new();
    for label in s.split('|').map(str::trim).filter(|l| !l.is_empty()) {
        match label.parse::<Genre>() {
            Ok(genre) if !genres.contains(&genre) => genres.push(genre),
            Ok(_) => {}
            Err(e) => debug!("Ignoring genre: {}", e),
        }
    }
    genres
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_csv(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_extract_year() {
        assert_eq!(extract_year_from_title("Toy Story (1995)"), Some(1995));
        assert_eq!(extract_year_from_title("Babylon 5 (1994) "), Some(1994));
        assert_eq!(extract_year_from_title("Movie Title"), None);
        assert_eq!(extract_year_from_title("Big (Remix)"), None);
    }

    #[test]
    fn test_parse_genres() {
        let genres = parse_genres("Action|Sci-Fi|Children|Unknown|Action");
        assert_eq!(genres, vec![Genre::Action, Genre::SciFi, Genre::Children]);
        assert!(parse_genres("").is_empty());
        assert_eq!(parse_genres("(no genres listed)"), vec![Genre::NoGenresListed]);
    }

    #[test]
    fn test_parse_timestamp_formats() {
        assert_eq!(parse_timestamp("964982703"), Some(964982703));
        assert_eq!(parse_timestamp("964982703.0"), Some(964982703));
        assert_eq!(parse_timestamp("1970-01-01 00:01:00"), Some(60));
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_parse_ratings_drops_bad_rows() {
        let file = write_csv(
            "userId,movieId,rating,timestamp\n\
             1,10,4.0,964982703\n\
             ,11,5.0,964982703\n\
             1,,3.0,964982703\n\
             2,10,,964982703\n\
             2,12,abc,964982703\n\
             2,13,0,964982703\n\
             3,10,3.5,not-a-time\n",
        );

        let parsed = parse_ratings(file.path()).unwrap();

        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.dropped, 5);
        assert_eq!(parsed.records[0].user_id, 1);
        assert_eq!(parsed.records[0].timestamp, Some(964982703));
        // Bad timestamps keep the row
        assert_eq!(parsed.records[1].user_id, 3);
        assert_eq!(parsed.records[1].timestamp, None);
    }

    #[test]
    fn test_parse_ratings_missing_column() {
        let file = write_csv("userId,movieId,timestamp\n1,10,964982703\n");
        let err = parse_ratings(file.path()).unwrap_err();
        assert!(matches!(
            err,
            DataLoadError::MissingColumn { ref column, .. } if column == "rating"
        ));
    }

    #[test]
    fn test_parse_movies_quoted_titles() {
        let file = write_csv(
            "movieId,title,genres\n\
             1,Toy Story (1995),Adventure|Animation|Children|Comedy|Fantasy\n\
             11,\"American President, The (1995)\",Comedy|Drama|Romance\n\
             ,No Id (2000),Drama\n",
        );

        let parsed = parse_movies(file.path()).unwrap();

        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.dropped, 1);
        let president = &parsed.records[1];
        assert_eq!(president.title, "American President, The (1995)");
        assert_eq!(president.year, Some(1995));
        assert_eq!(president.genres.len(), 3);
    }

    #[test]
    fn test_missing_file() {
        let err = parse_movies(Path::new("/definitely/not/here.csv")).unwrap_err();
        assert!(matches!(err, DataLoadError::FileNotFound { .. }));
    }
}
