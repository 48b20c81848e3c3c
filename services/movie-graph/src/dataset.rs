//! CSV dataset reader.

use crate::movie::{finite, GenreField, Record};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("dataset not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("failed to parse dataset: {0}")]
    Csv(#[from] csv::Error),
}

/// Columns the loader cares about; any other column is ignored.
#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    overview: Option<String>,
    #[serde(default)]
    release_date: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    vote_average: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    vote_count: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    popularity: Option<f64>,
    #[serde(default)]
    genres: Option<String>,
}

/// Read every row of `path` into memory, preserving file order.
///
/// Rows without a usable integer id cannot be merged and are dropped with
/// a warning.
pub fn read_records(path: &Path) -> Result<Vec<Record>, DatasetError> {
    if !path.is_file() {
        return Err(DatasetError::NotFound(path.to_path_buf()));
    }

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_path(path)?;

    let mut records = Vec::new();
    let mut dropped = 0usize;

    for (index, row) in reader.deserialize::<CsvRow>().enumerate() {
        let row = row?;
        match parse_id(row.id.as_deref()) {
            Some(id) => records.push(Record {
                id,
                title: row.title,
                overview: row.overview,
                release_date: row.release_date,
                vote_average: finite(row.vote_average),
                vote_count: finite(row.vote_count).map(|v| v.round() as i64),
                popularity: finite(row.popularity),
                genres: GenreField::from(row.genres),
            }),
            None => {
                // +2: header line and 1-based numbering
                warn!("⚠️  Skipping row {} without a valid id: {:?}", index + 2, row.id);
                dropped += 1;
            }
        }
    }

    if dropped > 0 {
        warn!("⚠️  Dropped {} rows without a valid id", dropped);
    }
    info!("   Read {} records from {}", records.len(), path.display());
    Ok(records)
}

/// Accepts `603` as well as the `603.0` that float-typed exports produce.
fn parse_id(raw: Option<&str>) -> Option<i64> {
    let raw = raw?.trim();
    if let Ok(id) = raw.parse::<i64>() {
        return Some(id);
    }
    let value = raw.parse::<f64>().ok()?;
    if value.is_finite() && value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Some(value as i64)
    } else {
        None
    }
}
