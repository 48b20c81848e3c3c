//! Movie records and their normalization into upsert parameters.

use neo4rs::{BoltNull, BoltType};
use serde_json::Value;
use std::collections::HashMap;
use tracing::warn;

/// Genre column as it arrives from a dataset row.
#[derive(Debug, Clone, PartialEq)]
pub enum GenreField {
    /// Already split into entries; `None` entries are dropped.
    List(Vec<Option<String>>),
    /// JSON array, Python-style list literal or comma separated names.
    Text(String),
    Missing,
}

impl From<Option<String>> for GenreField {
    fn from(value: Option<String>) -> Self {
        match value {
            Some(text) => GenreField::Text(text),
            None => GenreField::Missing,
        }
    }
}

/// One dataset row before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: i64,
    pub title: Option<String>,
    pub overview: Option<String>,
    pub release_date: Option<String>,
    pub vote_average: Option<f64>,
    pub vote_count: Option<i64>,
    pub popularity: Option<f64>,
    pub genres: GenreField,
}

impl Record {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            title: None,
            overview: None,
            release_date: None,
            vote_average: None,
            vote_count: None,
            popularity: None,
            genres: GenreField::Missing,
        }
    }
}

/// A normalized row, ready to be merged as a `Movie` node.
#[derive(Debug, Clone, PartialEq)]
pub struct Movie {
    pub id: i64,
    pub title: Option<String>,
    pub overview: Option<String>,
    pub release_date: Option<String>,
    pub vote_average: f64,
    pub vote_count: i64,
    pub popularity: f64,
    pub genres: Vec<String>,
}

impl Movie {
    pub fn from_record(record: &Record) -> Self {
        Self {
            id: record.id,
            title: non_blank(&record.title),
            overview: non_blank(&record.overview),
            release_date: non_blank(&record.release_date),
            vote_average: finite(record.vote_average).unwrap_or(0.0),
            vote_count: record.vote_count.unwrap_or(0),
            popularity: finite(record.popularity).unwrap_or(0.0),
            genres: normalize_genres(record.id, &record.genres),
        }
    }

    /// Parameter map for one element of the `$movies` upsert list.
    pub fn to_bolt_map(&self) -> HashMap<String, BoltType> {
        let mut m: HashMap<String, BoltType> = HashMap::new();
        m.insert("id".to_string(), self.id.into());
        m.insert("title".to_string(), optional(self.title.clone()));
        m.insert("overview".to_string(), optional(self.overview.clone()));
        m.insert("release_date".to_string(), optional(self.release_date.clone()));
        m.insert("vote_average".to_string(), self.vote_average.into());
        m.insert("vote_count".to_string(), self.vote_count.into());
        m.insert("popularity".to_string(), self.popularity.into());
        m.insert("genres".to_string(), self.genres.clone().into());
        m
    }
}

fn optional(value: Option<String>) -> BoltType {
    match value {
        Some(v) => v.into(),
        None => BoltType::Null(BoltNull),
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// NaN and infinities count as absent.
pub(crate) fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

/// Normalize a genre column into trimmed, non-empty names in input order.
///
/// Duplicates are kept. A bracketed literal that is not a valid list yields
/// no genres and a warning instead of failing the record.
pub fn normalize_genres(movie_id: i64, field: &GenreField) -> Vec<String> {
    match field {
        GenreField::Missing => Vec::new(),
        GenreField::List(items) => clean(items.iter().filter_map(|g| g.as_deref())),
        GenreField::Text(text) => parse_genre_text(movie_id, text),
    }
}

fn parse_genre_text(movie_id: i64, text: &str) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    if text.starts_with('[') {
        return match parse_list_literal(text) {
            Some(items) => clean(items.iter().filter_map(Value::as_str)),
            None => {
                warn!("⚠️  Malformed genres for movie {}: {:?}", movie_id, text);
                Vec::new()
            }
        };
    }

    clean(text.split(',').map(|g| g.trim().trim_matches(|c: char| c == '"' || c == '\'')))
}

/// Strict JSON first, then a Python-style literal with single quotes.
fn parse_list_literal(text: &str) -> Option<Vec<Value>> {
    let parsed = serde_json::from_str::<Value>(text)
        .or_else(|_| serde_json::from_str::<Value>(&text.replace('\'', "\"")));
    match parsed {
        Ok(Value::Array(items)) => Some(items),
        _ => None,
    }
}

fn clean<'a>(items: impl Iterator<Item = &'a str>) -> Vec<String> {
    items
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .map(str::to_string)
        .collect()
}
