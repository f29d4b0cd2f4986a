//! Movie catalog handlers.
//!
//! Every handler here sits behind a permission gate; by the time one runs
//! the caller is authenticated, activated and holds the route's permission.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::auth::Principal;
use crate::catalog::{validate_movie, Filters, MoviePatch, NewMovie};
use crate::http::error::ApiError;
use crate::http::server::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub title: Option<String>,
    pub sort: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl From<ListQuery> for Filters {
    fn from(query: ListQuery) -> Self {
        let defaults = Filters::default();
        Filters {
            title: query.title.unwrap_or(defaults.title),
            sort: query.sort.unwrap_or(defaults.sort),
            page: query.page.unwrap_or(defaults.page),
            page_size: query.page_size.unwrap_or(defaults.page_size),
        }
    }
}

// Unparsable ids answer 404, same as ids that do not exist.
fn movie_id(path: Result<Path<i64>, PathRejection>) -> Result<i64, ApiError> {
    match path {
        Ok(Path(id)) if id >= 1 => Ok(id),
        _ => Err(ApiError::NotFound),
    }
}

pub(crate) fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(value)| value).map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge
        } else {
            ApiError::BadRequest(rejection.body_text())
        }
    })
}

pub async fn list_movies(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(query) = query.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    let filters = Filters::from(query);

    let errors = filters.validate();
    if !errors.is_empty() {
        return Err(ApiError::FailedValidation(errors));
    }

    let (movies, metadata) = state.movies.list(&filters)?;
    Ok(Json(json!({ "movies": movies, "metadata": metadata })).into_response())
}

pub async fn show_movie(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Response, ApiError> {
    let movie = state.movies.get(movie_id(path)?)?;
    Ok(Json(json!({ "movie": movie })).into_response())
}

pub async fn create_movie(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    body: Result<Json<NewMovie>, JsonRejection>,
) -> Result<Response, ApiError> {
    let input = json_body(body)?;

    let errors = validate_movie(&input.title, input.year, input.runtime);
    if !errors.is_empty() {
        return Err(ApiError::FailedValidation(errors));
    }

    let movie = state.movies.insert(input);

    let notifier = state.notifier.clone();
    let recipient = format!("principal:{}", principal.id);
    let payload = json!({ "id": movie.id, "title": movie.title });
    state.tasks.run("movie_created_notification", async move {
        notifier.send(&recipient, "movie_created", payload).await
    });

    let location = format!("/v1/movies/{}", movie.id);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(json!({ "movie": movie })),
    )
        .into_response())
}

pub async fn update_movie(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    body: Result<Json<MoviePatch>, JsonRejection>,
) -> Result<Response, ApiError> {
    let mut movie = state.movies.get(movie_id(path)?)?;
    json_body(body)?.apply(&mut movie);

    let errors = validate_movie(&movie.title, movie.year, movie.runtime);
    if !errors.is_empty() {
        return Err(ApiError::FailedValidation(errors));
    }

    let movie = state.movies.update(&movie)?;
    Ok(Json(json!({ "movie": movie })).into_response())
}

pub async fn delete_movie(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Response, ApiError> {
    state.movies.delete(movie_id(path)?)?;
    Ok(Json(json!({ "message": "movie successfully deleted" })).into_response())
}
