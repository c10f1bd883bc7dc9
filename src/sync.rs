//! Label synchronization: turns the free-text tag/author/translator lists of a book
//! write into relationship rows.
//!
//! The pipeline is split so the decisions stay pure:
//! [`parse_labels`] tokenizes, the registry resolves names to entities, [`plan`]
//! computes which links are missing, and [`synchronize`] writes them. Links are only
//! ever added; dropping a name from the input leaves its existing link in place.

use std::collections::HashSet;

use libsql::Connection;

use crate::error::Result;
use crate::labels::LabelRegistry;
use crate::model::{Label, LabelKind};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncStats {
    /// Labels that did not exist before this write.
    pub created: i32,
    /// Relationships inserted.
    pub linked: i32,
    /// Requested labels that were already linked.
    pub unchanged: i32,
}

/// Parsed label names per kind, deduplicated, in input order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LabelInput {
    pub tags: Vec<String>,
    pub authors: Vec<String>,
    pub translators: Vec<String>,
}

impl LabelInput {
    pub fn parse(tag: &str, author: &str, translator: &str) -> Self {
        Self {
            tags: parse_labels(tag),
            authors: parse_labels(author),
            translators: parse_labels(translator),
        }
    }

    pub fn names(&self, kind: LabelKind) -> &[String] {
        match kind {
            LabelKind::Tag => &self.tags,
            LabelKind::Author => &self.authors,
            LabelKind::Translator => &self.translators,
        }
    }
}

/// Splits on `,`, trims, drops empty tokens and repeats (first occurrence wins).
pub fn parse_labels(input: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(s.to_string()))
        .map(str::to_string)
        .collect()
}

/// Labels from `target` that `current` does not already contain, keeping target order.
pub fn plan(current: &[Label], target: Vec<Label>) -> Vec<Label> {
    let mut linked: HashSet<(LabelKind, i32)> = current.iter().map(|l| (l.kind, l.id)).collect();
    target
        .into_iter()
        .filter(|label| linked.insert((label.kind, label.id)))
        .collect()
}

/// Resolves and links every label in `input` for `book_id`.
///
/// Must run on the connection that holds the book write transaction: any error
/// leaves partial links behind for the caller's rollback to discard.
pub async fn synchronize(conn: &Connection, book_id: i32, input: &LabelInput) -> Result<SyncStats> {
    let registry = LabelRegistry::new(conn);
    let mut stats = SyncStats::default();

    for kind in LabelKind::ALL {
        let names = input.names(kind);
        if names.is_empty() {
            continue;
        }

        let mut target = Vec::with_capacity(names.len());
        for name in names {
            target.push(registry.resolve(kind, name).await?.record(&mut stats));
        }

        let requested = target.len() as i32;
        let current = registry.labels_for_book(book_id, kind).await?;
        let additions = plan(&current, target);

        for label in &additions {
            registry.link(book_id, label).await?;
        }

        stats.linked += additions.len() as i32;
        stats.unchanged += requested - additions.len() as i32;
    }

    tracing::debug!(
        book_id,
        created = stats.created,
        linked = stats.linked,
        unchanged = stats.unchanged,
        "synchronized labels"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    fn label(kind: LabelKind, id: i32, name: &str) -> Label {
        Label {
            id,
            kind,
            name: name.to_string(),
        }
    }

    #[test]
    fn repeated_tokens_collapse_to_one() {
        assert_eq!(parse_labels("fiction,fiction, fiction"), vec!["fiction"]);
    }

    #[test]
    fn order_follows_first_occurrence() {
        assert_eq!(parse_labels("b, a, b, c"), vec!["b", "a", "c"]);
    }

    #[test]
    fn trailing_comma_is_skipped() {
        assert_eq!(parse_labels("fiction, classics,"), vec!["fiction", "classics"]);
    }

    #[test]
    fn blank_and_whitespace_tokens_are_skipped() {
        assert!(parse_labels("").is_empty());
        assert!(parse_labels(" , ,").is_empty());
        assert_eq!(parse_labels(",, poetry ,"), vec!["poetry"]);
    }

    #[test]
    fn plan_skips_already_linked_labels() {
        let current = vec![label(LabelKind::Tag, 1, "fiction")];
        let target = vec![
            label(LabelKind::Tag, 2, "classics"),
            label(LabelKind::Tag, 1, "fiction"),
            label(LabelKind::Tag, 3, "poetry"),
        ];

        let additions = plan(&current, target);
        let ids: Vec<i32> = additions.iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[test]
    fn plan_compares_identity_not_name() {
        let current = vec![label(LabelKind::Author, 7, "Jane Doe")];
        let target = vec![label(LabelKind::Translator, 7, "Jane Doe")];
        assert_eq!(plan(&current, target).len(), 1);
    }

    #[test]
    fn plan_dedupes_within_target() {
        let target = vec![label(LabelKind::Tag, 4, "x"), label(LabelKind::Tag, 4, "x")];
        assert_eq!(plan(&[], target).len(), 1);
    }

    #[tokio::test]
    async fn second_run_with_same_input_is_a_no_op() {
        let db = testing::database().await;
        let book_id = testing::insert_bare_book(&db, "Dune").await;
        let input = LabelInput::parse("sci-fi, classics", "Frank Herbert", "");

        let first = synchronize(db.connection(), book_id, &input).await.unwrap();
        assert_eq!(first, SyncStats { created: 3, linked: 3, unchanged: 0 });

        let second = synchronize(db.connection(), book_id, &input).await.unwrap();
        assert_eq!(second, SyncStats { created: 0, linked: 0, unchanged: 3 });

        let registry = LabelRegistry::new(db.connection());
        assert_eq!(registry.labels_for_book(book_id, LabelKind::Tag).await.unwrap().len(), 2);
        assert_eq!(registry.labels_for_book(book_id, LabelKind::Author).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn dropped_names_keep_their_links() {
        let db = testing::database().await;
        let book_id = testing::insert_bare_book(&db, "Dune").await;

        synchronize(db.connection(), book_id, &LabelInput::parse("a, b", "", "")).await.unwrap();
        synchronize(db.connection(), book_id, &LabelInput::parse("c", "", "")).await.unwrap();

        let registry = LabelRegistry::new(db.connection());
        let names: Vec<String> = registry
            .labels_for_book(book_id, LabelKind::Tag)
            .await
            .unwrap()
            .into_iter()
            .map(|l| l.name)
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }
}
