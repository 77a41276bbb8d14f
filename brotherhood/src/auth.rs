//! Authentication gate
//!
//! Holds the user handed over by the identity provider. Services read the
//! current user to scope their queries and watch for sign-in/sign-out to
//! re-bind their live subscriptions.

use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

/// Signed-in user as supplied by the identity provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUser {
    pub uid: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl CurrentUser {
    pub fn new(uid: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            display_name: Some(display_name.into()),
            email: None,
        }
    }

    /// Name recorded on authored content
    pub fn name(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .or(self.email.as_deref())
            .unwrap_or("Brother")
    }
}

/// Current-user state shared by every service
#[derive(Clone)]
pub struct AuthSession {
    current: Arc<watch::Sender<Option<CurrentUser>>>,
}

impl Default for AuthSession {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthSession {
    pub fn new() -> Self {
        let (current, _) = watch::channel(None);
        Self {
            current: Arc::new(current),
        }
    }

    pub fn sign_in(&self, user: CurrentUser) {
        tracing::info!("User signed in: {}", user.uid);
        self.current.send_replace(Some(user));
    }

    pub fn sign_out(&self) {
        if let Some(user) = self.current.send_replace(None) {
            tracing::info!("User signed out: {}", user.uid);
        }
    }

    pub fn current(&self) -> Option<CurrentUser> {
        self.current.borrow().clone()
    }

    /// The signed-in user, or an authentication error
    pub fn require_user(&self) -> Result<CurrentUser> {
        self.current().ok_or(AppError::Unauthenticated)
    }

    /// Receiver that wakes on every sign-in and sign-out
    pub fn watch(&self) -> watch::Receiver<Option<CurrentUser>> {
        self.current.subscribe()
    }
}
