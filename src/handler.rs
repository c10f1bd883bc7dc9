use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use tracing::info;

use crate::api::{APIResponse, QueryParams};
use crate::db::Database;
use crate::error::CatalogError;
use crate::guard::{Action, authorize};
use crate::model::{Book, BookWrite};
use crate::resources::{Resource, Resources};
use crate::session::CurrentUser;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
}

/// A book together with the resources submitted for it.
#[derive(Debug, Serialize)]
pub struct BookDetail {
    #[serde(flatten)]
    pub book: Book,
    pub cover_url: Option<String>,
    pub resources: Vec<Resource>,
}

/// Attempted input echoed back when a book write is rejected.
#[derive(Debug, Serialize)]
pub struct BookFormResponse {
    pub book: BookWrite,
    pub errors: Vec<String>,
}

fn book_write_failed(write: BookWrite, err: CatalogError) -> Response {
    match err {
        CatalogError::Validation(errors) => {
            tracing::info!(?errors, "book rejected");
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(BookFormResponse { book: write, errors }),
            )
                .into_response()
        }
        other => other.into_response(),
    }
}

pub async fn healthcheck() -> impl IntoResponse {
    info!("got healthcheck request");
    Json(APIResponse::new_from_msg("ok"))
}

pub async fn get_books(State(state): State<AppState>, Query(qp): Query<QueryParams>) -> Response {
    let hp = qp.into_handler_params();
    let db_call = state.db.get_books(&hp).await;

    match db_call {
        Ok(books) => {
            tracing::info!(count = books.len(), "got books");
            (StatusCode::OK, Json(APIResponse::new("got books", books))).into_response()
        }
        Err(e) => {
            tracing::info!("failed to get books. db_error: {}", e);
            e.into_response()
        }
    }
}

pub async fn get_book(State(state): State<AppState>, Path(id): Path<i32>) -> Response {
    let book = match state.db.get_book(id).await {
        Ok(Some(book)) => book,
        Ok(None) => return CatalogError::NotFound("book").into_response(),
        Err(e) => return e.into_response(),
    };

    let resources = match Resources::new(&state.db).list(100, 0, Some(id)).await {
        Ok(resources) => resources,
        Err(e) => return e.into_response(),
    };

    let detail = BookDetail {
        cover_url: book.cover_url().map(str::to_string),
        book,
        resources,
    };
    (StatusCode::OK, Json(APIResponse::new("got book", detail))).into_response()
}

pub async fn create_book(State(state): State<AppState>, actor: CurrentUser, payload: Option<Json<BookWrite>>) -> Response {
    if let Err(e) = authorize(actor.user(), None, Action::WriteBook).into_result() {
        return e.into_response();
    }

    let write = payload.map(|Json(w)| w).unwrap_or_default();

    match state.db.create_book(&write).await {
        Ok(book) => (StatusCode::CREATED, Json(APIResponse::new("created book", book))).into_response(),
        Err(e) => book_write_failed(write, e),
    }
}

pub async fn update_book(
    State(state): State<AppState>,
    actor: CurrentUser,
    Path(id): Path<i32>,
    payload: Option<Json<BookWrite>>,
) -> Response {
    if let Err(e) = authorize(actor.user(), None, Action::WriteBook).into_result() {
        return e.into_response();
    }

    let write = payload.map(|Json(w)| w).unwrap_or_default();

    match state.db.update_book(id, &write).await {
        Ok(book) => (StatusCode::OK, Json(APIResponse::new("updated book", book))).into_response(),
        Err(e) => book_write_failed(write, e),
    }
}

pub async fn delete_book(State(state): State<AppState>, actor: CurrentUser, Path(id): Path<i32>) -> Response {
    if let Err(e) = authorize(actor.user(), None, Action::WriteBook).into_result() {
        return e.into_response();
    }

    match state.db.delete_book(id).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => CatalogError::NotFound("book").into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn get_labels(State(state): State<AppState>) -> Response {
    match state.db.get_label_aggregates().await {
        Ok(aggregates) => (StatusCode::OK, Json(APIResponse::new("got labels", aggregates))).into_response(),
        Err(e) => {
            tracing::error!("failed to get label aggregates: {}", e);
            e.into_response()
        }
    }
}
