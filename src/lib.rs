use crate::api::APIResponse;
use crate::handler::AppState;
use axum::{
    Json, Router,
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
};
use std::error::Error;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod guard;
pub mod handler;
pub mod labels;
pub mod locale;
pub mod model;
pub mod resources;
pub mod session;
pub mod sync;

#[cfg(test)]
pub(crate) mod testing;

pub fn server_error(msg: &str) -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(APIResponse::new_from_msg(msg))).into_response()
}

pub fn unpack_error(err: &(dyn Error)) -> String {
    let mut parts = Vec::new();
    parts.push(err.to_string());
    let mut current = err.source();
    while let Some(source) = current {
        parts.push(source.to_string());
        current = source.source();
    }
    parts.join(": ")
}

pub fn get_s3_url(service: &str, bucket: &str, key: &str) -> String {
    match service {
        "t3" => format!("https://{}.t3.storage.dev/{}", bucket, key),
        "s3" => format!("https://{}.s3.amazonaws.com/{}", bucket, key),
        _ => format!("https://{}.storage.dev/{}", service, key),
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);

    Router::new()
        .route("/", get(handler::healthcheck))
        .route("/books", get(handler::get_books).post(handler::create_book))
        .route(
            "/books/:id",
            get(handler::get_book)
                .put(handler::update_book)
                .delete(handler::delete_book),
        )
        .route("/labels", get(handler::get_labels))
        .nest("/resources", resources::routes())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
