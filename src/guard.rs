//! Ownership guard for resource actions.

use crate::error::{CatalogError, Result};
use crate::model::User;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Index,
    Show,
    New,
    Create,
    Edit,
    Update,
    Destroy,
    WriteBook,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn into_result(self) -> Result<()> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Deny => Err(CatalogError::Unauthorized),
        }
    }
}

/// Decides whether `actor` may perform `action` on a resource owned by `owner`.
///
/// `owner` is `None` when there is no target (index, new, create) or when the
/// target could not be found; for owner-only actions both cases deny.
pub fn authorize(actor: Option<&User>, owner: Option<i32>, action: Action) -> Decision {
    use Action::*;
    let allowed = match action {
        Index | Show => true,
        New | Create | WriteBook => actor.is_some(),
        Edit | Update | Destroy => match (actor, owner) {
            (Some(user), Some(owner_id)) => user.id == owner_id,
            _ => false,
        },
    };

    if allowed { Decision::Allow } else { Decision::Deny }
}
