//! Fixtures shared by the unit tests.

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, header},
    response::Response,
};
use chrono::Duration;
use serde::de::DeserializeOwned;
use tower::ServiceExt;

use crate::config::Storage;
use crate::db::Database;
use crate::handler::AppState;
use crate::model::User;
use crate::resources::{Resource, ResourceParams, Resources};
use crate::session::Sessions;

pub async fn database() -> Database {
    let storage = Storage {
        service: "s3".into(),
        bucket: "covers".into(),
    };
    Database::open(":memory:", storage).await.unwrap()
}

/// Inserts a book row without labels.
pub async fn insert_bare_book(db: &Database, name: &str) -> i32 {
    let mut rows = db
        .connection()
        .query(
            "INSERT INTO books (name, content) VALUES (?, 'content') RETURNING id",
            libsql::params![name],
        )
        .await
        .unwrap();
    rows.next().await.unwrap().unwrap().get(0).unwrap()
}

pub async fn signed_in(db: &Database, email: &str) -> (User, String) {
    let sessions = Sessions::new(db);
    let user = sessions.find_or_create_user(email).await.unwrap();
    let token = sessions.issue(user.id, Duration::hours(1)).await.unwrap();
    (user, token)
}

pub async fn insert_resource(db: &Database, book_id: i32, user_id: i32) -> Resource {
    let params = ResourceParams {
        book_id: Some(book_id),
        title: "Reading notes".into(),
        link: "https://example.com/notes".into(),
        description: None,
    };
    Resources::new(db).create(user_id, &params).await.unwrap()
}

pub async fn json<T: DeserializeOwned>(response: Response) -> T {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub struct TestApp {
    pub db: Arc<Database>,
    router: Router,
}

impl TestApp {
    pub async fn new() -> Self {
        let db = Arc::new(database().await);
        let router = crate::router(AppState { db: db.clone() });
        Self { db, router }
    }

    pub async fn request(&self, method: &str, uri: &str, token: Option<&str>, body: Option<String>) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json)
            }
            None => Body::empty(),
        };

        self.router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap()
    }
}
