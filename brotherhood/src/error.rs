//! Error types for the Brotherhood application
//!
//! All errors use thiserror for structured error handling.
//! These errors can be serialized to the presentation layer, and each
//! carries a stable code that maps to a user-facing message.

use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Scheduler error: {0}")]
    Scheduler(String),

    /// Operation attempted with no signed-in user
    #[error("You must be signed in to do that")]
    Unauthenticated,

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    /// Form validation with one message per offending field
    #[error("Invalid fields: {}", format_fields(.0))]
    InvalidFields(BTreeMap<String, String>),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Precondition failed: {0}")]
    FailedPrecondition(String),

    /// Live subscription was torn down or its source closed
    #[error("Subscription closed")]
    SubscriptionClosed,

    #[error("{0}")]
    Generic(String),
}

fn format_fields(fields: &BTreeMap<String, String>) -> String {
    fields
        .iter()
        .map(|(field, message)| format!("{}: {}", field, message))
        .collect::<Vec<_>>()
        .join(", ")
}

impl AppError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        AppError::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Stable error code in the document store's vocabulary
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Unauthenticated => "unauthenticated",
            AppError::PermissionDenied(_) => "permission-denied",
            AppError::Validation(_) | AppError::InvalidFields(_) => "invalid-argument",
            AppError::NotFound { .. } => "not-found",
            AppError::AlreadyExists(_) => "already-exists",
            AppError::FailedPrecondition(_) => "failed-precondition",
            AppError::Database(sqlx::Error::PoolTimedOut)
            | AppError::Database(sqlx::Error::PoolClosed)
            | AppError::Io(_)
            | AppError::SubscriptionClosed => "unavailable",
            AppError::Database(_)
            | AppError::Serialization(_)
            | AppError::Scheduler(_)
            | AppError::Generic(_) => "internal",
        }
    }

    /// Friendly text for alert-style display.
    ///
    /// Validation and precondition errors already carry a message meant for
    /// the user, so those are passed through unchanged.
    pub fn user_message(&self) -> String {
        match self.code() {
            "unauthenticated" => "Please sign in to continue.".to_string(),
            "permission-denied" => "You don't have permission to do that.".to_string(),
            "not-found" => "That item no longer exists.".to_string(),
            "unavailable" => {
                "The service is temporarily unavailable. Please try again.".to_string()
            }
            "invalid-argument" | "already-exists" | "failed-precondition" => match self {
                AppError::Validation(msg)
                | AppError::AlreadyExists(msg)
                | AppError::FailedPrecondition(msg) => msg.clone(),
                other => other.to_string(),
            },
            _ => "Something went wrong. Please try again.".to_string(),
        }
    }
}

impl serde::Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
