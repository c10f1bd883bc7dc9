use crate::api::HandlerParams;
use crate::config::{Config, Storage};
use crate::error::{CatalogError, Result, is_unique_violation};
use crate::labels::LabelRegistry;
use crate::locale::t;
use crate::model::*;
use crate::sync::{self, LabelInput};
use libsql::{Builder, Connection};
use std::path::Path;
use tokio::sync::{Mutex, MutexGuard};

const SYSTEM_MIGRATIONS: &[(&str, &str)] =
    &[("system/000_migrations_table.sql", include_str!("migrations/system/000_migrations_table.sql"))];

const MIGRATIONS: &[(&str, &str)] = &[
    ("001_schema.sql", include_str!("migrations/001_schema.sql")),
    ("002_users_sessions.sql", include_str!("migrations/002_users_sessions.sql")),
];

/// Escapes LIKE wildcards so user input matches literally under `ESCAPE '\'`.
fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

pub struct Database {
    conn: Connection,
    tx_lock: Mutex<()>,
    storage: Storage,
}

impl Database {
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Serializes writers on the shared connection.
    pub async fn lock(&self) -> MutexGuard<'_, ()> {
        self.tx_lock.lock().await
    }

    async fn is_migration_applied(conn: &Connection, name: &str) -> anyhow::Result<bool> {
        let query = "SELECT 1 FROM _migrations WHERE name = ?";
        match conn.query(query, libsql::params![name]).await {
            Ok(mut rows) => Ok(rows.next().await?.is_some()),
            Err(e) => {
                if e.to_string().contains("no such table") {
                    Ok(false)
                } else {
                    Err(e.into())
                }
            }
        }
    }

    async fn record_migration(conn: &Connection, name: &str) -> anyhow::Result<()> {
        let query = r#"
            INSERT INTO _migrations (name, applied_at)
            VALUES (?, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        "#;
        conn.execute(query, libsql::params![name]).await?;
        Ok(())
    }

    async fn run_migration(conn: &Connection, name: &str, sql: &str) -> anyhow::Result<()> {
        if Self::is_migration_applied(conn, name).await? {
            tracing::debug!("migration {} already applied, skipping", name);
            return Ok(());
        }

        tracing::info!("applying migration: {}", name);
        conn.execute_batch(sql)
            .await
            .map_err(|e| anyhow::anyhow!("failed to execute migration {name}: {e}"))?;

        Self::record_migration(conn, name).await?;
        Ok(())
    }

    pub async fn new(cfg: &Config, data_dir: &Path) -> anyhow::Result<Self> {
        let path = data_dir.join(cfg.app.get_db());
        tracing::info!(path = ?path, "[db] opening local database");
        Self::open(path.to_string_lossy().as_ref(), cfg.storage.clone()).await
    }

    /// Opens (or creates) the database at `path`; `":memory:"` gives a throwaway store.
    pub async fn open(path: &str, storage: Storage) -> anyhow::Result<Self> {
        let db = Builder::new_local(path).build().await?;
        let conn = db.connect()?;
        conn.query("SELECT 1", ()).await?;

        for (filename, sql) in SYSTEM_MIGRATIONS {
            Self::run_migration(&conn, filename, sql).await?;
        }

        for (filename, sql) in MIGRATIONS {
            Self::run_migration(&conn, filename, sql).await?;
        }

        for (filename, sql) in crate::resources::migrations() {
            Self::run_migration(&conn, filename, sql).await?;
        }

        Ok(Database {
            conn,
            tx_lock: Mutex::new(()),
            storage,
        })
    }

    pub async fn get_books(&self, params: &HandlerParams) -> Result<Vec<Book>> {
        let last_n_books = r#"
SELECT books.id
FROM books
ORDER BY books.id
LIMIT ? OFFSET ?
"#;

        let search_books = r#"
SELECT DISTINCT books.id
FROM books
LEFT JOIN relationships ON relationships.book_id = books.id
LEFT JOIN tags ON relationships.label_type = 'tag' AND tags.id = relationships.label_id
LEFT JOIN authors ON relationships.label_type = 'author' AND authors.id = relationships.label_id
LEFT JOIN translators ON relationships.label_type = 'translator' AND translators.id = relationships.label_id
WHERE books.name LIKE ?1 ESCAPE '\'
   OR tags.name LIKE ?1 ESCAPE '\'
   OR authors.name LIKE ?1 ESCAPE '\'
   OR translators.name LIKE ?1 ESCAPE '\'
ORDER BY books.id
LIMIT ?2 OFFSET ?3
"#;

        let mut rows = if let Some(search) = &params.q {
            let pattern = format!("%{}%", escape_like(search));
            self.conn
                .query(
                    search_books,
                    libsql::params![pattern, params.limit as i32, params.offset as i32],
                )
                .await?
        } else {
            self.conn
                .query(last_n_books, libsql::params![params.limit as i32, params.offset as i32])
                .await?
        };

        let mut ids: Vec<i32> = vec![];
        while let Some(row) = rows.next().await? {
            ids.push(row.get(0)?);
        }
        drop(rows);

        let mut books = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(book) = self.get_book(id).await? {
                books.push(book);
            }
        }

        Ok(books)
    }

    pub async fn get_book(&self, book_id: i32) -> Result<Option<Book>> {
        let query = r#"
SELECT id, isbn, name, content, pages, publishing_house, created_at, updated_at
FROM books
WHERE id = ?
"#;

        let mut rows = self.conn.query(query, libsql::params![book_id]).await?;
        let Some(row) = rows.next().await? else {
            return Ok(None);
        };

        let id: i32 = row.get(0)?;
        let isbn: Option<String> = row.get(1)?;
        let name: String = row.get(2)?;
        let content: String = row.get(3)?;
        let pages: Option<i32> = row.get(4)?;
        let publishing_house: Option<String> = row.get(5)?;
        let created_at: String = row.get(6)?;
        let updated_at: String = row.get(7)?;
        drop(rows);

        let registry = LabelRegistry::new(&self.conn);
        let tags = registry.labels_for_book(book_id, LabelKind::Tag).await?;
        let authors = registry.labels_for_book(book_id, LabelKind::Author).await?;
        let translators = registry.labels_for_book(book_id, LabelKind::Translator).await?;
        let cover = self.get_attachment(BOOK_OWNER, book_id).await?;

        Ok(Some(Book {
            id,
            isbn,
            name,
            content,
            pages,
            publishing_house,
            tags,
            authors,
            translators,
            cover,
            created_at,
            updated_at,
        }))
    }

    pub async fn book_exists(&self, book_id: i32) -> Result<bool> {
        let mut rows = self
            .conn
            .query("SELECT 1 FROM books WHERE id = ?", libsql::params![book_id])
            .await?;
        Ok(rows.next().await?.is_some())
    }

    pub async fn get_attachment(&self, owner_type: &str, owner_id: i32) -> Result<Option<Attachment>> {
        let query = r#"
            SELECT id, owner_type, owner_id, file_reference
            FROM attachments
            WHERE owner_type = ? AND owner_id = ?
        "#;
        let mut rows = self
            .conn
            .query(query, libsql::params![owner_type, owner_id])
            .await?;

        if let Some(row) = rows.next().await? {
            let file_reference: String = row.get(3)?;
            Ok(Some(Attachment {
                id: row.get(0)?,
                owner_type: row.get(1)?,
                owner_id: row.get(2)?,
                url: self.storage.file_url(&file_reference),
                file_reference,
            }))
        } else {
            Ok(None)
        }
    }

    async fn attach(&self, owner_type: &str, owner_id: i32, file_reference: &str) -> Result<()> {
        let query = r#"
            INSERT INTO attachments (owner_type, owner_id, file_reference)
            VALUES (?, ?, ?)
            ON CONFLICT (owner_type, owner_id) DO UPDATE SET file_reference = excluded.file_reference
        "#;
        self.conn
            .execute(query, libsql::params![owner_type, owner_id, file_reference])
            .await?;
        Ok(())
    }

    async fn ensure_unique_name(&self, name: &str, except_id: Option<i32>) -> Result<()> {
        let mut rows = self
            .conn
            .query(
                "SELECT id FROM books WHERE name = ? AND id IS NOT ?",
                libsql::params![name, except_id],
            )
            .await?;

        if rows.next().await?.is_some() {
            return Err(CatalogError::validation(t("books.name_taken")));
        }
        Ok(())
    }

    fn map_book_write_error(e: libsql::Error) -> CatalogError {
        if is_unique_violation(&e) {
            CatalogError::validation(t("books.name_taken"))
        } else {
            e.into()
        }
    }

    /// Validates, writes the book, synchronizes its labels and cover in one transaction.
    pub async fn create_book(&self, write: &BookWrite) -> Result<Book> {
        write.validate()?;
        let input = write.label_input();

        let book_id = {
            let _guard = self.lock().await;

            self.conn.execute("BEGIN TRANSACTION", ()).await?;

            let result = self.create_book_internal(write, &input).await;

            match result {
                Ok(book_id) => {
                    self.conn.execute("COMMIT", ()).await?;
                    book_id
                }
                Err(e) => {
                    let _ = self.conn.execute("ROLLBACK", ()).await;
                    return Err(e);
                }
            }
        };

        tracing::info!(book_id, name = %write.name.trim(), "created book");
        self.get_book(book_id)
            .await?
            .ok_or(CatalogError::NotFound("book"))
    }

    async fn create_book_internal(&self, write: &BookWrite, input: &LabelInput) -> Result<i32> {
        let name = write.name.trim();
        self.ensure_unique_name(name, None).await?;

        let insert_book = r#"
            INSERT INTO books (isbn, name, content, pages, publishing_house)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id
        "#;

        let mut rows = self
            .conn
            .query(
                insert_book,
                libsql::params![
                    write.isbn.as_deref(),
                    name,
                    write.content.as_str(),
                    write.pages,
                    write.publishing_house.as_deref()
                ],
            )
            .await
            .map_err(Self::map_book_write_error)?;

        let book_id: i32 = if let Some(row) = rows.next().await.map_err(Self::map_book_write_error)? {
            row.get(0)?
        } else {
            return Err(anyhow::anyhow!("failed to create book").into());
        };
        drop(rows);

        sync::synchronize(&self.conn, book_id, input).await?;

        if let Some(reference) = write.cover_reference() {
            self.attach(BOOK_OWNER, book_id, reference).await?;
        }

        Ok(book_id)
    }

    /// Rewrites the book's fields and adds any newly listed labels. Labels missing
    /// from the input stay linked; an absent cover keeps the current one.
    pub async fn update_book(&self, book_id: i32, write: &BookWrite) -> Result<Book> {
        write.validate()?;
        let input = write.label_input();

        {
            let _guard = self.lock().await;

            self.conn.execute("BEGIN TRANSACTION", ()).await?;

            let result = self.update_book_internal(book_id, write, &input).await;

            match result {
                Ok(_) => {
                    self.conn.execute("COMMIT", ()).await?;
                }
                Err(e) => {
                    let _ = self.conn.execute("ROLLBACK", ()).await;
                    return Err(e);
                }
            }
        }

        tracing::info!(book_id, "updated book");
        self.get_book(book_id)
            .await?
            .ok_or(CatalogError::NotFound("book"))
    }

    async fn update_book_internal(&self, book_id: i32, write: &BookWrite, input: &LabelInput) -> Result<()> {
        if !self.book_exists(book_id).await? {
            return Err(CatalogError::NotFound("book"));
        }

        let name = write.name.trim();
        self.ensure_unique_name(name, Some(book_id)).await?;

        self.conn
            .execute(
                r#"
                UPDATE books
                SET isbn = ?, name = ?, content = ?, pages = ?, publishing_house = ?,
                    updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                WHERE id = ?
                "#,
                libsql::params![
                    write.isbn.as_deref(),
                    name,
                    write.content.as_str(),
                    write.pages,
                    write.publishing_house.as_deref(),
                    book_id
                ],
            )
            .await
            .map_err(Self::map_book_write_error)?;

        sync::synchronize(&self.conn, book_id, input).await?;

        if let Some(reference) = write.cover_reference() {
            self.attach(BOOK_OWNER, book_id, reference).await?;
        }

        Ok(())
    }

    /// Deletes a book with its cover, resources and label links.
    pub async fn delete_book(&self, book_id: i32) -> Result<bool> {
        let _guard = self.lock().await;

        self.conn.execute("BEGIN TRANSACTION", ()).await?;

        let result = async {
            self.conn
                .execute("DELETE FROM relationships WHERE book_id = ?", libsql::params![book_id])
                .await?;
            self.conn
                .execute("DELETE FROM resources WHERE book_id = ?", libsql::params![book_id])
                .await?;
            self.conn
                .execute(
                    "DELETE FROM attachments WHERE owner_type = ? AND owner_id = ?",
                    libsql::params![BOOK_OWNER, book_id],
                )
                .await?;
            let deleted = self
                .conn
                .execute("DELETE FROM books WHERE id = ?", libsql::params![book_id])
                .await?;
            Ok::<bool, libsql::Error>(deleted > 0)
        }
        .await;

        match result {
            Ok(deleted) => {
                self.conn.execute("COMMIT", ()).await?;
                if deleted {
                    tracing::info!(book_id, "deleted book");
                }
                Ok(deleted)
            }
            Err(e) => {
                let _ = self.conn.execute("ROLLBACK", ()).await;
                Err(e.into())
            }
        }
    }

    pub async fn get_label_aggregates(&self) -> Result<LabelAggregates> {
        Ok(LabelRegistry::new(&self.conn).aggregates().await?)
    }
}
