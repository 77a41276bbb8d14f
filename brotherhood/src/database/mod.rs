//! Database module
//!
//! This module provides the document store the application runs on:
//! - Schema and migrations
//! - Document paths and the CRUD + live-query store client
//! - Model definitions for every document kind
//! - Policy-checked repository layer for typed access

pub mod live;
pub mod models;
pub mod paths;
pub mod repository;
pub mod schema;
pub mod store;

pub use live::{Subscription, Snapshot};
pub use models::*;
pub use paths::{CollectionPath, DocPath};
pub use repository::Repository;
pub use schema::initialize_database;
pub use store::{Direction, Document, DocumentStore, FieldOp, Patch, Query};

use crate::error::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Writers serialize on SQLite's lock; a few readers serve live queries
const STORE_CONNECTIONS: u32 = 5;

/// Build connection options shared by migration and application connections.
fn connect_options(db_path: &Path) -> std::result::Result<SqliteConnectOptions, sqlx::Error> {
    SqliteConnectOptions::from_str(&format!("sqlite://{}?mode=rwc", db_path.display())).map(
        |opts| {
            opts.create_if_missing(true)
                .busy_timeout(Duration::from_secs(5))
                .journal_mode(SqliteJournalMode::Wal)
                .foreign_keys(true)
        },
    )
}

/// Create and initialize a database connection pool.
///
/// Migrations run on a dedicated single-connection pool that is closed
/// before the application pool is created, so every pooled connection
/// sees the final schema.
pub async fn create_pool(db_path: &Path) -> Result<SqlitePool> {
    tracing::info!("Opening document store at: {:?}", db_path);

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let migration_pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(connect_options(db_path)?)
        .await?;

    initialize_database(&migration_pool).await?;
    migration_pool.close().await;

    let pool = SqlitePoolOptions::new()
        .max_connections(STORE_CONNECTIONS)
        .connect_with(connect_options(db_path)?)
        .await?;

    tracing::info!("Document store ready");

    Ok(pool)
}

/// Single-connection in-memory pool with the schema applied.
///
/// Every SQLite `:memory:` connection is its own database, so the pool is
/// pinned to one connection.
pub async fn create_memory_pool() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;

    initialize_database(&pool).await?;

    Ok(pool)
}
