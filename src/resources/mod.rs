//! Resources Module
//!
//! User-submitted material attached to a book: links, notes, errata. Anyone may
//! browse resources; only a signed-in user may add one, and only its owner may
//! edit or delete it. Every handler asks [`crate::guard::authorize`] first.
//!
//! # Usage
//!
//! ```rust,ignore
//! use shelfmark::resources;
//!
//! let app = Router::new()
//!     .nest("/resources", resources::routes())
//!     .with_state(app_state);
//!
//! let store = resources::Resources::new(&db);
//! let resource = store.create(user.id, &params).await?;
//! ```

mod handler;
mod lib;
mod routes;

pub use lib::*;

pub use routes::routes;

/// Schema for the resources table, applied after the catalog schema.
pub fn migrations() -> &'static [(&'static str, &'static str)] {
    &[("resources_001_schema.sql", include_str!("migrations/001_schema.sql"))]
}
