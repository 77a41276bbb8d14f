//! Access policy
//!
//! Evaluated by the repository before every mutation. Owner-scoped
//! resources (a user's brothers, goals, interactions) are private to their
//! owner; authored resources (dua requests, announcements) accept content
//! edits only from their author but responses, likes and comments from
//! any signed-in user.

use crate::auth::CurrentUser;
use crate::error::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Read,
    Create,
    Update,
    Delete,
    /// Say Ameen to a dua request
    Respond,
    /// Like or unlike an announcement
    React,
    Comment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource<'a> {
    Owned { owner_id: &'a str },
    Authored { author_id: &'a str },
}

/// Decide whether `actor` may perform `action` on `resource`.
///
/// Returns the actor on success so callers can use it for attribution.
pub fn authorize<'u>(
    actor: Option<&'u CurrentUser>,
    action: Action,
    resource: Resource<'_>,
) -> Result<&'u CurrentUser> {
    let user = actor.ok_or(AppError::Unauthenticated)?;

    let allowed = match resource {
        Resource::Owned { owner_id } => owner_id == user.uid,
        Resource::Authored { author_id } => match action {
            Action::Read | Action::Respond | Action::React | Action::Comment => true,
            Action::Create | Action::Update | Action::Delete => author_id == user.uid,
        },
    };

    if !allowed {
        tracing::warn!("Denied {:?} on {:?} for user {}", action, resource, user.uid);
        return Err(AppError::PermissionDenied(match resource {
            Resource::Owned { .. } => "only the owner can access this item".to_string(),
            Resource::Authored { .. } => "only the author can change this item".to_string(),
        }));
    }

    Ok(user)
}

/// Require a signed-in user without naming a resource
pub fn require_user(actor: Option<&CurrentUser>) -> Result<&CurrentUser> {
    actor.ok_or(AppError::Unauthenticated)
}
