//! Shared helpers for integration tests

use folio_common::config::Config;
use folio_ingest::index::MemorySearchBackend;
use folio_ingest::AppState;
use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use std::time::Duration;

/// Application state over an in-memory database and in-process index.
///
/// A single pooled connection keeps the in-memory schema visible to
/// background tasks.
pub async fn test_state() -> (AppState, Arc<MemorySearchBackend>) {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory database");
    folio_ingest::store::init_tables(&pool).await.unwrap();

    let backend = Arc::new(MemorySearchBackend::new());
    let config = Arc::new(Config::default());
    let state = AppState::new(config, pool, backend.clone());
    (state, backend)
}

/// A raw book payload from one upstream source.
pub fn book_payload(system: &str, processed_at: &str, fields: Value) -> Vec<u8> {
    let mut doc = json!({
        "$schema": "book.v2",
        "classification": [{"realm": "isbn", "id": "9780000000001"}],
        "source": {"system": system, "processedAt": processed_at, "role": "publisher"},
    });
    for (key, value) in fields.as_object().unwrap() {
        doc[key.as_str()] = value.clone();
    }
    serde_json::to_vec(&doc).unwrap()
}

/// Wait until the in-process index holds `expected` documents.
pub async fn await_index(backend: &MemorySearchBackend, index: &str, expected: usize) {
    for _ in 0..100 {
        if backend.len(index).await >= expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "index {} did not reach {} documents",
        index, expected
    );
}

pub async fn history_count(state: &AppState) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM history_documents")
        .fetch_one(&state.db)
        .await
        .unwrap()
}

pub async fn current_count(state: &AppState) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM current_documents")
        .fetch_one(&state.db)
        .await
        .unwrap()
}
