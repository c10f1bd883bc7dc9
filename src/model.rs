use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, Result};
use crate::locale::t;
use crate::sync::LabelInput;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelKind {
    Tag,
    Author,
    Translator,
}

impl LabelKind {
    pub const ALL: [LabelKind; 3] = [LabelKind::Tag, LabelKind::Author, LabelKind::Translator];

    /// Value stored in `relationships.label_type`.
    pub fn as_str(&self) -> &'static str {
        match self {
            LabelKind::Tag => "tag",
            LabelKind::Author => "author",
            LabelKind::Translator => "translator",
        }
    }

    pub fn table(&self) -> &'static str {
        match self {
            LabelKind::Tag => "tags",
            LabelKind::Author => "authors",
            LabelKind::Translator => "translators",
        }
    }
}

/// A Tag, Author or Translator. Two labels are the same entity when kind and id match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Label {
    pub id: i32,
    pub kind: LabelKind,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LabelAggregate {
    pub label: Label,
    pub count: i32,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct LabelAggregates {
    pub tags: Vec<LabelAggregate>,
    pub authors: Vec<LabelAggregate>,
    pub translators: Vec<LabelAggregate>,
}

pub const BOOK_OWNER: &str = "book";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: i32,
    pub owner_type: String,
    pub owner_id: i32,
    pub file_reference: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    pub id: i32,
    pub isbn: Option<String>,
    pub name: String,
    pub content: String,
    pub pages: Option<i32>,
    pub publishing_house: Option<String>,
    pub tags: Vec<Label>,
    pub authors: Vec<Label>,
    pub translators: Vec<Label>,
    pub cover: Option<Attachment>,
    pub created_at: String,
    pub updated_at: String,
}

impl Book {
    pub fn cover_url(&self) -> Option<&str> {
        self.cover.as_ref().map(|attachment| attachment.url.as_str())
    }
}

/// Incoming book fields. The free-text label lists are never stored verbatim,
/// only the associations they resolve to.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookWrite {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub pages: Option<i32>,
    #[serde(default)]
    pub publishing_house: Option<String>,
    #[serde(default, alias = "ISBN")]
    pub isbn: Option<String>,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub translator: String,
    #[serde(default)]
    pub cover: Option<String>,
}

impl BookWrite {
    pub fn validate(&self) -> Result<()> {
        let mut errors = vec![];
        if self.name.trim().is_empty() {
            errors.push(t("books.name_blank"));
        }
        if self.content.trim().is_empty() {
            errors.push(t("books.content_blank"));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(CatalogError::Validation(errors))
        }
    }

    pub fn label_input(&self) -> LabelInput {
        LabelInput::parse(&self.tag, &self.author, &self.translator)
    }

    pub fn cover_reference(&self) -> Option<&str> {
        self.cover.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i32,
    pub email: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write() -> BookWrite {
        BookWrite {
            name: "Dune".into(),
            content: "Desert planet".into(),
            ..Default::default()
        }
    }

    #[test]
    fn valid_write_passes() {
        assert!(write().validate().is_ok());
    }

    #[test]
    fn blank_name_and_content_are_rejected() {
        let mut w = write();
        w.name = "  ".into();
        w.content = String::new();
        match w.validate() {
            Err(CatalogError::Validation(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn isbn_accepts_upper_case_key() {
        let w: BookWrite = serde_json::from_str(r#"{"name":"a","content":"b","ISBN":"978-0"}"#).unwrap();
        assert_eq!(w.isbn.as_deref(), Some("978-0"));
    }

    #[test]
    fn blank_cover_reference_is_absent() {
        let mut w = write();
        w.cover = Some("   ".into());
        assert_eq!(w.cover_reference(), None);
        w.cover = Some("covers/dune.png".into());
        assert_eq!(w.cover_reference(), Some("covers/dune.png"));
    }
}
