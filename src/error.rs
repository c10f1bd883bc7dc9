use axum::{
    Json,
    http::{StatusCode, header},
    response::{IntoResponse, Redirect, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::locale;

pub type Result<T, E = CatalogError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("ValidationError: {}", .0.join(", "))]
    Validation(Vec<String>),
    #[error("AuthorizationError")]
    Unauthorized,
    #[error("NotFound: {0}")]
    NotFound(&'static str),
    #[error("StoreError: {0}")]
    Store(#[from] anyhow::Error),
}

impl CatalogError {
    pub fn validation(message: impl Into<String>) -> Self {
        CatalogError::Validation(vec![message.into()])
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, CatalogError::Validation(_))
    }

    /// Messages shown back to the client alongside the re-rendered form.
    pub fn messages(&self) -> Vec<String> {
        match self {
            CatalogError::Validation(messages) => messages.clone(),
            other => vec![other.to_string()],
        }
    }
}

impl From<libsql::Error> for CatalogError {
    fn from(error: libsql::Error) -> Self {
        CatalogError::Store(error.into())
    }
}

/// True when the store rejected a write on a UNIQUE constraint.
pub fn is_unique_violation(err: &(dyn std::error::Error + 'static)) -> bool {
    crate::unpack_error(err).contains("UNIQUE constraint failed")
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct ValidationResponse {
    pub errors: Vec<String>,
}

pub const FLASH_COOKIE: &str = "flash_alert";

/// Redirect home carrying the localized unauthorized notice.
pub fn unauthorized_redirect() -> Response {
    let cookie = format!(
        "{}={}; Path=/; Max-Age=60; HttpOnly",
        FLASH_COOKIE,
        urlencoding::encode(&locale::t("unauthorized.default"))
    );
    ([(header::SET_COOKIE, cookie)], Redirect::to("/")).into_response()
}

impl IntoResponse for CatalogError {
    fn into_response(self) -> Response {
        match self {
            CatalogError::Validation(errors) => {
                (StatusCode::UNPROCESSABLE_ENTITY, Json(ValidationResponse { errors })).into_response()
            }
            CatalogError::Unauthorized => unauthorized_redirect(),
            CatalogError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse {
                    error: format!("{} not found", what),
                }),
            )
                .into_response(),
            CatalogError::Store(e) => {
                tracing::error!(error = %crate::unpack_error(&*e), "store error");
                crate::server_error("internal error")
            }
        }
    }
}
