use serde::{Deserialize, Serialize};

use crate::db::Database;
use crate::error::{CatalogError, Result};
use crate::locale::t;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: i32,
    pub book_id: i32,
    pub user_id: i32,
    pub title: String,
    pub link: String,
    pub description: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Fields a client may submit. Owner is never taken from input.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceParams {
    #[serde(default)]
    pub book_id: Option<i32>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl ResourceParams {
    pub fn from_resource(resource: &Resource) -> Self {
        Self {
            book_id: Some(resource.book_id),
            title: resource.title.clone(),
            link: resource.link.clone(),
            description: resource.description.clone(),
        }
    }

    fn field_errors(&self) -> Vec<String> {
        let mut errors = vec![];
        if self.title.trim().is_empty() {
            errors.push(t("resources.title_blank"));
        }
        if self.link.trim().is_empty() {
            errors.push(t("resources.link_blank"));
        }
        errors
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

pub struct Resources<'a> {
    db: &'a Database,
}

const COLUMNS: &str = "id, book_id, user_id, title, link, description, created_at, updated_at";

impl<'a> Resources<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    fn row_to_resource(row: &libsql::Row) -> Result<Resource, libsql::Error> {
        Ok(Resource {
            id: row.get(0)?,
            book_id: row.get(1)?,
            user_id: row.get(2)?,
            title: row.get(3)?,
            link: row.get(4)?,
            description: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    pub async fn create(&self, user_id: i32, params: &ResourceParams) -> Result<Resource> {
        let mut errors = params.field_errors();

        // Book writers hold this lock across their transaction, so the existence
        // check cannot observe an uncommitted book.
        let _guard = self.db.lock().await;
        let book_id = match params.book_id {
            Some(id) => self.db.book_exists(id).await?.then_some(id),
            None => None,
        };
        if book_id.is_none() {
            errors.push(t("resources.book_missing"));
        }

        let book_id = match book_id {
            Some(id) if errors.is_empty() => id,
            _ => return Err(CatalogError::Validation(errors)),
        };

        let query = format!(
            r#"
            INSERT INTO resources (book_id, user_id, title, link, description)
            VALUES (?, ?, ?, ?, ?)
            RETURNING {}
            "#,
            COLUMNS
        );

        let mut rows = self
            .db
            .connection()
            .query(
                &query,
                libsql::params![
                    book_id,
                    user_id,
                    params.title.trim(),
                    params.link.trim(),
                    params.description()
                ],
            )
            .await?;

        if let Some(row) = rows.next().await? {
            let resource = Self::row_to_resource(&row)?;
            tracing::info!(id = resource.id, book_id, user_id, "created resource");
            Ok(resource)
        } else {
            Err(anyhow::anyhow!("failed to create resource").into())
        }
    }

    pub async fn get(&self, id: i32) -> Result<Option<Resource>> {
        let query = format!("SELECT {} FROM resources WHERE id = ?", COLUMNS);
        let mut rows = self.db.connection().query(&query, libsql::params![id]).await?;

        if let Some(row) = rows.next().await? {
            Ok(Some(Self::row_to_resource(&row)?))
        } else {
            Ok(None)
        }
    }

    pub async fn list(&self, limit: i32, offset: i32, book_id: Option<i32>) -> Result<Vec<Resource>> {
        let mut resources = Vec::new();

        let mut rows = if let Some(book_id) = book_id {
            let query = format!(
                "SELECT {} FROM resources WHERE book_id = ? ORDER BY id LIMIT ? OFFSET ?",
                COLUMNS
            );
            self.db
                .connection()
                .query(&query, libsql::params![book_id, limit, offset])
                .await?
        } else {
            let query = format!("SELECT {} FROM resources ORDER BY id LIMIT ? OFFSET ?", COLUMNS);
            self.db
                .connection()
                .query(&query, libsql::params![limit, offset])
                .await?
        };

        while let Some(row) = rows.next().await? {
            resources.push(Self::row_to_resource(&row)?);
        }

        Ok(resources)
    }

    /// Updates the editable fields. Owner and book stay as created.
    pub async fn update(&self, id: i32, params: &ResourceParams) -> Result<Option<Resource>> {
        let errors = params.field_errors();
        if !errors.is_empty() {
            return Err(CatalogError::Validation(errors));
        }

        let query = format!(
            r#"
            UPDATE resources
            SET title = ?, link = ?, description = ?,
                updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
            WHERE id = ?
            RETURNING {}
            "#,
            COLUMNS
        );

        let _guard = self.db.lock().await;
        let mut rows = self
            .db
            .connection()
            .query(
                &query,
                libsql::params![params.title.trim(), params.link.trim(), params.description(), id],
            )
            .await?;

        if let Some(row) = rows.next().await? {
            tracing::info!(id, "updated resource");
            Ok(Some(Self::row_to_resource(&row)?))
        } else {
            Ok(None)
        }
    }

    pub async fn delete(&self, id: i32) -> Result<bool> {
        let _guard = self.db.lock().await;
        let deleted = self
            .db
            .connection()
            .execute("DELETE FROM resources WHERE id = ?", libsql::params![id])
            .await?;
        if deleted > 0 {
            tracing::info!(id, "deleted resource");
        }
        Ok(deleted > 0)
    }

    pub async fn count(&self) -> Result<i64> {
        let mut rows = self
            .db
            .connection()
            .query("SELECT COUNT(*) FROM resources", ())
            .await?;
        match rows.next().await? {
            Some(row) => Ok(row.get(0)?),
            None => Ok(0),
        }
    }
}
