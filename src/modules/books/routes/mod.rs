//! HTTP handlers for the books module, mounted under `/books`.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use bookshelf_http::error::AppError;
use bookshelf_http::extract::{self, Path, Query};
use serde::Deserialize;
use serde_json::json;

use super::models::{BookResponse, CreateBook, UpdateBook};
use super::repository::{BookRepository, RepositoryError};

pub const DEFAULT_LIMIT: i64 = 100;
pub const MAX_LIMIT: i64 = 1000;

type Repository = Arc<dyn BookRepository>;

/// Routes relative to the module mount point.
pub fn router(repository: Repository) -> Router {
    Router::new()
        .route("/", post(create_book).get(list_books))
        .route("/search", get(search_books))
        .route("/{id}", get(get_book).put(update_book).delete(delete_book))
        .with_state(repository)
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(_) => AppError::not_found("Book not found"),
            other => AppError::Internal(anyhow::Error::new(other)),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    DEFAULT_LIMIT
}

impl ListParams {
    fn validate(&self) -> Vec<serde_json::Value> {
        let mut problems = Vec::new();
        if self.skip < 0 {
            problems.push(json!({"field": "skip", "error": "must be greater than or equal to 0"}));
        }
        if !(1..=MAX_LIMIT).contains(&self.limit) {
            problems.push(json!({
                "field": "limit",
                "error": format!("must be between 1 and {}", MAX_LIMIT)
            }));
        }
        problems
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: String,
}

fn reject_invalid(problems: Vec<serde_json::Value>, message: &str) -> Result<(), AppError> {
    if problems.is_empty() {
        Ok(())
    } else {
        Err(AppError::validation(problems, message))
    }
}

async fn create_book(
    State(repository): State<Repository>,
    extract::Json(payload): extract::Json<CreateBook>,
) -> Result<(StatusCode, Json<BookResponse>), AppError> {
    reject_invalid(payload.validate(), "invalid book")?;

    let book = repository.create(payload).await?;
    tracing::info!(book_id = book.id, "book created");

    Ok((StatusCode::CREATED, Json(book.into())))
}

async fn list_books(
    State(repository): State<Repository>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<BookResponse>>, AppError> {
    reject_invalid(params.validate(), "invalid pagination parameters")?;

    let books = repository.list(params.skip, params.limit).await?;
    Ok(Json(books.into_iter().map(BookResponse::from).collect()))
}

async fn search_books(
    State(repository): State<Repository>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<BookResponse>>, AppError> {
    let books = repository.search(&params.q).await?;
    tracing::debug!(term = %params.q, matches = books.len(), "book search");
    Ok(Json(books.into_iter().map(BookResponse::from).collect()))
}

async fn get_book(
    State(repository): State<Repository>,
    Path(id): Path<i64>,
) -> Result<Json<BookResponse>, AppError> {
    let book = repository.get(id).await?;
    Ok(Json(book.into()))
}

async fn update_book(
    State(repository): State<Repository>,
    Path(id): Path<i64>,
    extract::Json(patch): extract::Json<UpdateBook>,
) -> Result<Json<BookResponse>, AppError> {
    reject_invalid(patch.validate(), "invalid book update")?;

    let book = repository.update(id, patch).await?;
    tracing::info!(book_id = book.id, "book updated");

    Ok(Json(book.into()))
}

async fn delete_book(
    State(repository): State<Repository>,
    Path(id): Path<i64>,
) -> Result<Json<BookResponse>, AppError> {
    let book = repository.delete(id).await?;
    tracing::info!(book_id = book.id, "book deleted");

    Ok(Json(book.into()))
}
