//! Current-user lookup from bearer tokens.
//!
//! Tokens are issued out of band (`shelfmark issue-token`) and only their SHA-256
//! digest is stored. A missing, unknown or expired token means an anonymous request.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts},
    response::{IntoResponse, Response},
};
use chrono::{Duration, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

use crate::db::Database;
use crate::error::{CatalogError, Result};
use crate::handler::AppState;
use crate::model::User;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%.3fZ";

pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub struct Sessions<'a> {
    db: &'a Database,
}

impl<'a> Sessions<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub async fn find_or_create_user(&self, email: &str) -> Result<User> {
        let email = email.trim().to_lowercase();
        if email.is_empty() {
            return Err(CatalogError::validation("email can't be blank"));
        }

        let _guard = self.db.lock().await;
        let conn = self.db.connection();
        conn.execute("INSERT OR IGNORE INTO users (email) VALUES (?)", libsql::params![email.as_str()])
            .await?;

        let mut rows = conn
            .query("SELECT id, email FROM users WHERE email = ?", libsql::params![email.as_str()])
            .await?;

        if let Some(row) = rows.next().await? {
            Ok(User {
                id: row.get(0)?,
                email: row.get(1)?,
            })
        } else {
            Err(anyhow::anyhow!("failed to get or create user: {}", email).into())
        }
    }

    /// Stores a new session for `user_id` and returns the raw token.
    pub async fn issue(&self, user_id: i32, ttl: Duration) -> Result<String> {
        let token = generate_token();
        let expires_at = (Utc::now() + ttl).format(TIMESTAMP_FORMAT).to_string();

        let _guard = self.db.lock().await;
        self.db
            .connection()
            .execute(
                "INSERT INTO sessions (token_hash, user_id, expires_at) VALUES (?, ?, ?)",
                libsql::params![hash_token(&token), user_id, expires_at],
            )
            .await?;

        tracing::info!(user_id, "issued session");
        Ok(token)
    }

    pub async fn current_user(&self, token: &str) -> Result<Option<User>> {
        let query = r#"
            SELECT users.id, users.email
            FROM sessions
            JOIN users ON users.id = sessions.user_id
            WHERE sessions.token_hash = ?
              AND sessions.expires_at > strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
        "#;

        let mut rows = self
            .db
            .connection()
            .query(query, libsql::params![hash_token(token)])
            .await?;

        if let Some(row) = rows.next().await? {
            Ok(Some(User {
                id: row.get(0)?,
                email: row.get(1)?,
            }))
        } else {
            Ok(None)
        }
    }

    /// Removes expired sessions, returning how many were deleted.
    pub async fn purge_expired(&self) -> Result<u64> {
        let _guard = self.db.lock().await;
        let deleted = self
            .db
            .connection()
            .execute(
                "DELETE FROM sessions WHERE expires_at <= strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                (),
            )
            .await?;
        Ok(deleted)
    }
}

/// The signed-in user, if any.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Option<User>);

impl CurrentUser {
    pub fn user(&self) -> Option<&User> {
        self.0.as_ref()
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(token) = bearer_token(parts) else {
            return Ok(CurrentUser(None));
        };

        match Sessions::new(&state.db).current_user(token).await {
            Ok(user) => Ok(CurrentUser(user)),
            Err(e) => {
                tracing::error!(error = %e, "failed to look up session");
                Err(e.into_response())
            }
        }
    }
}
