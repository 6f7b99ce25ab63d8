//! History store: one annotated document per (source, entity)
//!
//! Indexed by history key and by (schema, classification). The history key
//! index is how the at-most-one-per-origin invariant is enforced; more than
//! one hit on lookup is a repair case for the ingestor.

use chrono::Utc;
use folio_common::canonical::canonical_json;
use folio_common::{Error, Result};
use serde_json::Value;
use sqlx::{Row, SqlitePool};
use std::time::Duration;
use uuid::Uuid;

use super::{bounded, parse_row, StoredDocument};
use crate::engine::keys::DocumentKeys;

#[derive(Clone)]
pub struct HistoryStore {
    pool: SqlitePool,
    timeout: Duration,
}

impl HistoryStore {
    pub fn new(pool: SqlitePool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    /// Every stored record whose history key equals `key`. Expected size 0
    /// or 1; more means a duplicate slipped in and must be repaired.
    pub async fn lookup_by_history_key(&self, key: &str) -> Result<Vec<StoredDocument>> {
        let rows = bounded("history lookup", self.timeout, async {
            sqlx::query(
                "SELECT id, version, doc FROM history_documents WHERE history_key = ? ORDER BY updated_at, id",
            )
            .bind(key)
            .fetch_all(&self.pool)
            .await
        })
        .await?;

        rows.into_iter()
            .map(|row| parse_row(row.get("id"), row.get("version"), row.get("doc")))
            .collect()
    }

    /// All per-source documents contributing to one entity.
    pub async fn fetch_by_entity(&self, keys: &DocumentKeys) -> Result<Vec<Value>> {
        let classification = canonical_json(&keys.classification);
        let rows = bounded("history fetch by entity", self.timeout, async {
            sqlx::query(
                "SELECT doc FROM history_documents WHERE schema = ? AND classification = ?",
            )
            .bind(&keys.schema)
            .bind(&classification)
            .fetch_all(&self.pool)
            .await
        })
        .await?;

        rows.into_iter()
            .map(|row| {
                let doc: String = row.get("doc");
                serde_json::from_str(&doc).map_err(Error::from)
            })
            .collect()
    }

    /// Insert a new record, or replace `replace` by id with an optimistic
    /// version check.
    pub async fn store(
        &self,
        keys: &DocumentKeys,
        doc: &Value,
        replace: Option<&StoredDocument>,
    ) -> Result<Uuid> {
        let payload = serde_json::to_string(doc)?;
        let classification = canonical_json(&keys.classification);
        let now = Utc::now().to_rfc3339();

        match replace {
            Some(existing) => {
                let result = bounded("history replace", self.timeout, async {
                    sqlx::query(
                        r#"
                        UPDATE history_documents
                        SET version = version + 1, doc = ?, updated_at = ?
                        WHERE id = ? AND version = ?
                        "#,
                    )
                    .bind(&payload)
                    .bind(&now)
                    .bind(existing.id.to_string())
                    .bind(existing.version)
                    .execute(&self.pool)
                    .await
                })
                .await?;

                if result.rows_affected() == 0 {
                    return Err(Error::StoreConflict("history replace"));
                }
                Ok(existing.id)
            }
            None => {
                let id = Uuid::new_v4();
                bounded("history insert", self.timeout, async {
                    sqlx::query(
                        r#"
                        INSERT INTO history_documents
                            (id, version, history_key, schema, classification, entity_id, doc, updated_at)
                        VALUES (?, 1, ?, ?, ?, ?, ?, ?)
                        "#,
                    )
                    .bind(id.to_string())
                    .bind(&keys.history_key)
                    .bind(&keys.schema)
                    .bind(&classification)
                    .bind(keys.entity_id.to_string())
                    .bind(&payload)
                    .bind(&now)
                    .execute(&self.pool)
                    .await
                })
                .await?;
                Ok(id)
            }
        }
    }

    /// Idempotent removal of records by opaque id.
    pub async fn delete_many(&self, ids: &[Uuid]) -> Result<()> {
        for id in ids {
            bounded("history delete", self.timeout, async {
                sqlx::query("DELETE FROM history_documents WHERE id = ?")
                    .bind(id.to_string())
                    .execute(&self.pool)
                    .await
            })
            .await?;
        }
        Ok(())
    }

    /// Per-source documents for the revisions view.
    pub async fn history_for_entity(&self, entity_id: Uuid, schema: &str) -> Result<Vec<Value>> {
        let rows = bounded("history by entity id", self.timeout, async {
            sqlx::query(
                "SELECT doc FROM history_documents WHERE entity_id = ? AND schema = ?",
            )
            .bind(entity_id.to_string())
            .bind(schema)
            .fetch_all(&self.pool)
            .await
        })
        .await?;

        rows.into_iter()
            .map(|row| {
                let doc: String = row.get("doc");
                serde_json::from_str(&doc).map_err(Error::from)
            })
            .collect()
    }

    /// Keyset-paginated scan for full reindex runs.
    pub async fn scan_chunk(
        &self,
        after: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<(Uuid, Value)>> {
        let after = after.map(|id| id.to_string()).unwrap_or_default();
        let rows = bounded("history scan", self.timeout, async {
            sqlx::query(
                "SELECT id, version, doc FROM history_documents WHERE id > ? ORDER BY id LIMIT ?",
            )
            .bind(&after)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
        })
        .await?;

        rows.into_iter()
            .map(|row| {
                let record = parse_row(row.get("id"), row.get("version"), row.get("doc"))?;
                Ok((record.id, record.doc))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::annotate::annotate;
    use crate::engine::keys::extract;
    use serde_json::json;

    async fn store() -> HistoryStore {
        let pool = SqlitePool::connect("sqlite::memory:")
            .await
            .expect("in-memory database");
        crate::store::init_tables(&pool).await.unwrap();
        HistoryStore::new(pool, Duration::from_secs(5))
    }

    fn sample(system: &str) -> (Value, DocumentKeys) {
        let doc = annotate(json!({
            "$schema": "book.v2",
            "classification": [{"realm": "isbn", "id": "9780000000001"}],
            "source": {"system": system, "processedAt": "2020-01-01T00:00:00Z", "role": "publisher"},
            "title": "Alpha",
        }))
        .unwrap();
        let keys = extract(&doc, &["processedAt".into(), "system".into()]).unwrap();
        (doc, keys)
    }

    #[tokio::test]
    async fn insert_then_lookup() {
        let store = store().await;
        let (doc, keys) = sample("sA");

        let id = store.store(&keys, &doc, None).await.unwrap();
        let matches = store.lookup_by_history_key(&keys.history_key).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id, id);
        assert_eq!(matches[0].version, 1);
        assert_eq!(matches[0].doc, doc);
    }

    #[tokio::test]
    async fn replace_bumps_version_and_keeps_id() {
        let store = store().await;
        let (doc, keys) = sample("sA");

        store.store(&keys, &doc, None).await.unwrap();
        let existing = store
            .lookup_by_history_key(&keys.history_key)
            .await
            .unwrap()
            .remove(0);

        let mut updated = doc.clone();
        updated["title"]["value"] = json!("Alpha (2nd)");
        let id = store.store(&keys, &updated, Some(&existing)).await.unwrap();
        assert_eq!(id, existing.id);

        let matches = store.lookup_by_history_key(&keys.history_key).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].version, 2);
        assert_eq!(matches[0].doc["title"]["value"], "Alpha (2nd)");
    }

    #[tokio::test]
    async fn stale_version_conflicts() {
        let store = store().await;
        let (doc, keys) = sample("sA");

        store.store(&keys, &doc, None).await.unwrap();
        let stale = store
            .lookup_by_history_key(&keys.history_key)
            .await
            .unwrap()
            .remove(0);

        // First replace succeeds and bumps the version.
        store.store(&keys, &doc, Some(&stale)).await.unwrap();
        // Second replace with the stale version must conflict.
        match store.store(&keys, &doc, Some(&stale)).await {
            Err(Error::StoreConflict(_)) => {}
            other => panic!("expected StoreConflict, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn fetch_by_entity_spans_sources() {
        let store = store().await;
        let (doc_a, keys_a) = sample("sA");
        let (doc_b, keys_b) = sample("sB");
        assert_ne!(keys_a.history_key, keys_b.history_key);

        store.store(&keys_a, &doc_a, None).await.unwrap();
        store.store(&keys_b, &doc_b, None).await.unwrap();

        let docs = store.fetch_by_entity(&keys_a).await.unwrap();
        assert_eq!(docs.len(), 2);
    }

    #[tokio::test]
    async fn delete_many_is_idempotent() {
        let store = store().await;
        let (doc, keys) = sample("sA");
        let id = store.store(&keys, &doc, None).await.unwrap();

        store.delete_many(&[id, Uuid::new_v4()]).await.unwrap();
        store.delete_many(&[id]).await.unwrap();
        assert!(store
            .lookup_by_history_key(&keys.history_key)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn scan_pages_through_everything() {
        let store = store().await;
        for system in ["sA", "sB", "sC"] {
            let (doc, keys) = sample(system);
            store.store(&keys, &doc, None).await.unwrap();
        }

        let mut seen = 0;
        let mut after = None;
        loop {
            let chunk = store.scan_chunk(after, 2).await.unwrap();
            if chunk.is_empty() {
                break;
            }
            seen += chunk.len();
            after = chunk.last().map(|(id, _)| *id);
        }
        assert_eq!(seen, 3);
    }
}
