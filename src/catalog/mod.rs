//! In-process movie catalog.
//!
//! A thin store standing in for the database behind the HTTP handlers. Rows
//! carry a version; an update against a stale version is an edit conflict.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const SORT_SAFELIST: &[&str] = &[
    "id", "title", "year", "runtime", "-id", "-title", "-year", "-runtime",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("record not found")]
    NotFound,

    #[error("edit conflict")]
    EditConflict,

    /// A sort key outside the safelist reached the store.
    #[error("unsafe sort parameter: {0}")]
    UnsafeSortField(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Movie {
    pub id: i64,
    #[serde(skip)]
    pub created_at: SystemTime,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    /// Minutes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime: Option<i32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub genres: Vec<String>,
    pub version: i32,
}

/// Fields supplied by a client when creating a movie.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewMovie {
    #[serde(default)]
    pub title: String,
    pub year: Option<i32>,
    pub runtime: Option<i32>,
    #[serde(default)]
    pub genres: Vec<String>,
}

/// Partial update; absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MoviePatch {
    pub title: Option<String>,
    pub year: Option<i32>,
    pub runtime: Option<i32>,
    pub genres: Option<Vec<String>>,
}

impl MoviePatch {
    pub fn apply(self, movie: &mut Movie) {
        if let Some(title) = self.title {
            movie.title = title;
        }
        if let Some(year) = self.year {
            movie.year = Some(year);
        }
        if let Some(runtime) = self.runtime {
            movie.runtime = Some(runtime);
        }
        if let Some(genres) = self.genres {
            movie.genres = genres;
        }
    }
}

/// Minimal field checks; returns field → message for every failure.
pub fn validate_movie(title: &str, year: Option<i32>, runtime: Option<i32>) -> BTreeMap<String, String> {
    let mut errors = BTreeMap::new();
    if title.trim().is_empty() {
        errors.insert("title".into(), "must be provided".into());
    } else if title.len() > 500 {
        errors.insert("title".into(), "must not be more than 500 bytes long".into());
    }
    if matches!(year, Some(y) if y < 1888) {
        errors.insert("year".into(), "must be greater than 1888".into());
    }
    if matches!(runtime, Some(r) if r <= 0) {
        errors.insert("runtime".into(), "must be a positive integer".into());
    }
    errors
}

/// Listing parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filters {
    pub title: String,
    pub page: u32,
    pub page_size: u32,
    pub sort: String,
}

impl Default for Filters {
    fn default() -> Self {
        Self {
            title: String::new(),
            page: 1,
            page_size: 20,
            sort: "id".into(),
        }
    }
}

impl Filters {
    pub fn validate(&self) -> BTreeMap<String, String> {
        let mut errors = BTreeMap::new();
        if self.page == 0 {
            errors.insert("page".into(), "must be greater than zero".into());
        } else if self.page > 10_000 {
            errors.insert("page".into(), "must be a maximum of 10,000".into());
        }
        if self.page_size == 0 {
            errors.insert("page_size".into(), "must be greater than zero".into());
        } else if self.page_size > 100 {
            errors.insert("page_size".into(), "must be a maximum of 100".into());
        }
        if !SORT_SAFELIST.contains(&self.sort.as_str()) {
            errors.insert("sort".into(), "invalid sort value".into());
        }
        errors
    }

    fn sort_column(&self) -> Result<&str, CatalogError> {
        if SORT_SAFELIST.contains(&self.sort.as_str()) {
            Ok(self.sort.trim_start_matches('-'))
        } else {
            Err(CatalogError::UnsafeSortField(self.sort.clone()))
        }
    }

    fn descending(&self) -> bool {
        self.sort.starts_with('-')
    }
}

/// Pagination details for a listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Metadata {
    #[serde(skip_serializing_if = "is_zero")]
    pub current_page: u32,
    #[serde(skip_serializing_if = "is_zero")]
    pub page_size: u32,
    #[serde(skip_serializing_if = "is_zero")]
    pub first_page: u32,
    #[serde(skip_serializing_if = "is_zero")]
    pub last_page: u32,
    pub total_records: u32,
}

fn is_zero(v: &u32) -> bool {
    *v == 0
}

impl Metadata {
    fn calculate(total_records: u32, page: u32, page_size: u32) -> Self {
        if total_records == 0 {
            return Self::default();
        }
        Self {
            current_page: page,
            page_size,
            first_page: 1,
            last_page: total_records.div_ceil(page_size),
            total_records,
        }
    }
}

#[derive(Debug, Default)]
struct Rows {
    next_id: i64,
    movies: HashMap<i64, Movie>,
}

/// Concurrent in-memory movie store.
#[derive(Debug, Default)]
pub struct MovieStore {
    rows: RwLock<Rows>,
}

impl MovieStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Rows> {
        self.rows.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Rows> {
        self.rows.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, input: NewMovie) -> Movie {
        let mut rows = self.write();
        rows.next_id += 1;
        let movie = Movie {
            id: rows.next_id,
            created_at: SystemTime::now(),
            title: input.title,
            year: input.year,
            runtime: input.runtime,
            genres: input.genres,
            version: 1,
        };
        rows.movies.insert(movie.id, movie.clone());
        movie
    }

    pub fn get(&self, id: i64) -> Result<Movie, CatalogError> {
        if id < 1 {
            return Err(CatalogError::NotFound);
        }
        self.read().movies.get(&id).cloned().ok_or(CatalogError::NotFound)
    }

    /// Store `movie` if its version still matches, bumping the version.
    pub fn update(&self, movie: &Movie) -> Result<Movie, CatalogError> {
        let mut rows = self.write();
        let stored = rows.movies.get_mut(&movie.id).ok_or(CatalogError::EditConflict)?;
        if stored.version != movie.version {
            return Err(CatalogError::EditConflict);
        }
        *stored = Movie {
            version: movie.version + 1,
            created_at: stored.created_at,
            ..movie.clone()
        };
        Ok(stored.clone())
    }

    pub fn delete(&self, id: i64) -> Result<(), CatalogError> {
        if id < 1 {
            return Err(CatalogError::NotFound);
        }
        self.write().movies.remove(&id).map(|_| ()).ok_or(CatalogError::NotFound)
    }

    /// Titles match case-insensitively on substring; an empty title matches all.
    pub fn list(&self, filters: &Filters) -> Result<(Vec<Movie>, Metadata), CatalogError> {
        let column = filters.sort_column()?;
        let needle = filters.title.to_lowercase();

        let mut matched: Vec<Movie> = self
            .read()
            .movies
            .values()
            .filter(|m| needle.is_empty() || m.title.to_lowercase().contains(&needle))
            .cloned()
            .collect();

        matched.sort_by(|a, b| {
            let primary = compare_by(column, a, b);
            let primary = if filters.descending() { primary.reverse() } else { primary };
            primary.then(a.id.cmp(&b.id))
        });

        let total = matched.len() as u32;
        let offset = ((filters.page.max(1) - 1) as usize).saturating_mul(filters.page_size as usize);
        let page: Vec<Movie> = matched
            .into_iter()
            .skip(offset)
            .take(filters.page_size as usize)
            .collect();

        Ok((page, Metadata::calculate(total, filters.page, filters.page_size)))
    }
}

fn compare_by(column: &str, a: &Movie, b: &Movie) -> Ordering {
    match column {
        "title" => a.title.cmp(&b.title),
        "year" => a.year.cmp(&b.year),
        "runtime" => a.runtime.cmp(&b.runtime),
        _ => a.id.cmp(&b.id),
    }
}
