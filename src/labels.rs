//! Label registry: find-or-create lookup of tags, authors and translators by name.

use libsql::Connection;

use crate::error::{CatalogError, Result, is_unique_violation};
use crate::locale::t;
use crate::model::{Label, LabelAggregate, LabelAggregates, LabelKind};
use crate::sync::SyncStats;

/// Outcome of a resolve: whether the label had to be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    Created(Label),
    Existing(Label),
}

impl Resolved {
    pub fn record(self, stats: &mut SyncStats) -> Label {
        match self {
            Resolved::Created(label) => {
                stats.created += 1;
                label
            }
            Resolved::Existing(label) => label,
        }
    }
}

pub struct LabelRegistry<'a> {
    conn: &'a Connection,
}

impl<'a> LabelRegistry<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub async fn find(&self, kind: LabelKind, name: &str) -> Result<Option<Label>, libsql::Error> {
        let query = format!("SELECT id, name FROM {} WHERE name = ? LIMIT 1", kind.table());
        let mut rows = self.conn.query(&query, libsql::params![name]).await?;

        if let Some(row) = rows.next().await? {
            Ok(Some(Label {
                id: row.get(0)?,
                kind,
                name: row.get(1)?,
            }))
        } else {
            Ok(None)
        }
    }

    async fn insert(&self, kind: LabelKind, name: &str) -> Result<Option<Label>, libsql::Error> {
        let query = format!("INSERT INTO {} (name) VALUES (?) RETURNING id, name", kind.table());
        let mut rows = self.conn.query(&query, libsql::params![name]).await?;

        if let Some(row) = rows.next().await? {
            Ok(Some(Label {
                id: row.get(0)?,
                kind,
                name: row.get(1)?,
            }))
        } else {
            Ok(None)
        }
    }

    /// Returns the label named `name` in `kind`, creating it on first reference.
    pub async fn resolve(&self, kind: LabelKind, name: &str) -> Result<Resolved> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CatalogError::validation(t("labels.name_blank")));
        }

        if let Some(label) = self.find(kind, name).await? {
            return Ok(Resolved::Existing(label));
        }

        self.create_or_find(kind, name).await
    }

    /// Inserts a label whose lookup just missed.
    ///
    /// A concurrent writer may have inserted the same name since; the losing insert
    /// trips the UNIQUE constraint and the lookup is retried once.
    async fn create_or_find(&self, kind: LabelKind, name: &str) -> Result<Resolved> {
        match self.insert(kind, name).await {
            Ok(Some(label)) => {
                tracing::debug!(kind = kind.as_str(), id = label.id, name, "created label");
                Ok(Resolved::Created(label))
            }
            Ok(None) => Err(anyhow::anyhow!("failed to create {} {}", kind.as_str(), name).into()),
            Err(e) if is_unique_violation(&e) => {
                tracing::warn!(kind = kind.as_str(), name, "label inserted concurrently, retrying lookup");
                match self.find(kind, name).await? {
                    Some(label) => Ok(Resolved::Existing(label)),
                    None => Err(CatalogError::Validation(vec![format!(
                        "{}: {} {}",
                        t("labels.unresolvable"),
                        kind.as_str(),
                        name
                    )])),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Labels of `kind` linked to a book, in the order they were linked.
    pub async fn labels_for_book(&self, book_id: i32, kind: LabelKind) -> Result<Vec<Label>, libsql::Error> {
        let query = format!(
            r#"
            SELECT labels.id, labels.name
            FROM relationships
            JOIN {table} AS labels ON labels.id = relationships.label_id
            WHERE relationships.book_id = ? AND relationships.label_type = ?
            ORDER BY relationships.id
            "#,
            table = kind.table()
        );

        let mut rows = self
            .conn
            .query(&query, libsql::params![book_id, kind.as_str()])
            .await?;
        let mut labels = vec![];

        while let Some(row) = rows.next().await? {
            labels.push(Label {
                id: row.get(0)?,
                kind,
                name: row.get(1)?,
            });
        }

        Ok(labels)
    }

    pub async fn link(&self, book_id: i32, label: &Label) -> Result<(), libsql::Error> {
        self.conn
            .execute(
                "INSERT INTO relationships (book_id, label_id, label_type) VALUES (?, ?, ?)",
                libsql::params![book_id, label.id, label.kind.as_str()],
            )
            .await?;
        Ok(())
    }

    /// Every label with the number of books it is linked to, most used first.
    pub async fn aggregates(&self) -> Result<LabelAggregates, libsql::Error> {
        let mut aggregates = LabelAggregates::default();

        for kind in LabelKind::ALL {
            let query = format!(
                r#"
                SELECT labels.id, labels.name, COUNT(relationships.id) AS count
                FROM {table} AS labels
                LEFT JOIN relationships
                    ON relationships.label_id = labels.id AND relationships.label_type = ?
                GROUP BY labels.id, labels.name
                ORDER BY count DESC, labels.name
                "#,
                table = kind.table()
            );

            let mut rows = self.conn.query(&query, libsql::params![kind.as_str()]).await?;
            let target = match kind {
                LabelKind::Tag => &mut aggregates.tags,
                LabelKind::Author => &mut aggregates.authors,
                LabelKind::Translator => &mut aggregates.translators,
            };

            while let Some(row) = rows.next().await? {
                target.push(LabelAggregate {
                    label: Label {
                        id: row.get(0)?,
                        kind,
                        name: row.get(1)?,
                    },
                    count: row.get(2)?,
                });
            }
        }

        Ok(aggregates)
    }
}
