//! Persistence for history and current documents
//!
//! Two SQLite-backed stores share one pool. Records are whole-document
//! replacements keyed by an opaque id plus an optimistic version; nothing
//! is ever mutated in place.

pub mod current;
pub mod history;

pub use current::CurrentStore;
pub use history::HistoryStore;

use folio_common::{Error, Result};
use serde_json::Value;
use sqlx::SqlitePool;
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

/// One stored record: opaque identity, optimistic version, document.
#[derive(Debug, Clone)]
pub struct StoredDocument {
    pub id: Uuid,
    pub version: i64,
    pub doc: Value,
}

/// Initialize the database connection pool and create tables.
pub async fn init_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;
    init_tables(&pool).await?;
    Ok(pool)
}

/// Create the store tables and indexes if they do not exist.
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS history_documents (
            id TEXT PRIMARY KEY,
            version INTEGER NOT NULL DEFAULT 1,
            history_key TEXT NOT NULL,
            schema TEXT NOT NULL,
            classification TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            doc TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_history_key ON history_documents(history_key)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_history_entity ON history_documents(schema, classification)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_history_entity_id ON history_documents(entity_id, schema)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS current_documents (
            id TEXT PRIMARY KEY,
            version INTEGER NOT NULL DEFAULT 1,
            current_key TEXT NOT NULL,
            schema TEXT NOT NULL,
            classification TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            doc TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_current_key ON current_documents(current_key)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_current_entity_id ON current_documents(entity_id, schema)",
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized (history_documents, current_documents)");
    Ok(())
}

/// Run a store query under the per-call timeout.
///
/// Every call into a store is an I/O boundary that may block; a timeout is
/// a temporary failure and the message goes back to the bus.
pub(crate) async fn bounded<T, F>(op: &'static str, timeout: Duration, fut: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, sqlx::Error>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result.map_err(Error::from),
        Err(_) => Err(Error::StoreTimeout(op)),
    }
}

pub(crate) fn parse_row(id: String, version: i64, doc: String) -> Result<StoredDocument> {
    let id = Uuid::parse_str(&id)
        .map_err(|e| Error::Config(format!("corrupt record id in store: {}", e)))?;
    let doc: Value = serde_json::from_str(&doc)?;
    Ok(StoredDocument { id, version, doc })
}
