//! Current store: one merged document per entity
//!
//! Replace-by-id whenever any contributing history document changes; the
//! current-key index backs the same duplicate repair the history store gets
//! from its history-key index.

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
pub struct CurrentStore {
    pool: SqlitePool,
    timeout: Duration,
}

impl CurrentStore {
    pub fn new(pool: SqlitePool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    /// Every record under one current key; more than one is a repair case.
    pub async fn lookup_by_current_key(&self, key: &str) -> Result<Vec<StoredDocument>> {
        let rows = bounded("current lookup", self.timeout, async {
            sqlx::query(
                "SELECT id, version, doc FROM current_documents WHERE current_key = ? ORDER BY updated_at, id",
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

    /// The merged document for one entity, for the HTTP surface.
    pub async fn get_by_id(&self, entity_id: Uuid, schema: &str) -> Result<Option<Value>> {
        let row = bounded("current get by id", self.timeout, async {
            sqlx::query(
                "SELECT doc FROM current_documents WHERE entity_id = ? AND schema = ?",
            )
            .bind(entity_id.to_string())
            .bind(schema)
            .fetch_optional(&self.pool)
            .await
        })
        .await?;

        match row {
            Some(row) => {
                let doc: String = row.get("doc");
                Ok(Some(serde_json::from_str(&doc)?))
            }
            None => Ok(None),
        }
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
                let result = bounded("current replace", self.timeout, async {
                    sqlx::query(
                        r#"
                        UPDATE current_documents
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
                    return Err(Error::StoreConflict("current replace"));
                }
                Ok(existing.id)
            }
            None => {
                let id = Uuid::new_v4();
                bounded("current insert", self.timeout, async {
                    sqlx::query(
                        r#"
                        INSERT INTO current_documents
                            (id, version, current_key, schema, classification, entity_id, doc, updated_at)
                        VALUES (?, 1, ?, ?, ?, ?, ?, ?)
                        "#,
                    )
                    .bind(id.to_string())
                    .bind(&keys.current_key)
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
            bounded("current delete", self.timeout, async {
                sqlx::query("DELETE FROM current_documents WHERE id = ?")
                    .bind(id.to_string())
                    .execute(&self.pool)
                    .await
            })
            .await?;
        }
        Ok(())
    }

    /// Keyset-paginated scan for full reindex runs, yielding entity ids.
    pub async fn scan_chunk(
        &self,
        after: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<(Uuid, Uuid, Value)>> {
        let after = after.map(|id| id.to_string()).unwrap_or_default();
        let rows = bounded("current scan", self.timeout, async {
            sqlx::query(
                "SELECT id, entity_id, doc FROM current_documents WHERE id > ? ORDER BY id LIMIT ?",
            )
            .bind(&after)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
        })
        .await?;

        rows.into_iter()
            .map(|row| {
                let id: String = row.get("id");
                let entity_id: String = row.get("entity_id");
                let doc: String = row.get("doc");
                let id = Uuid::parse_str(&id)
                    .map_err(|e| Error::Config(format!("corrupt record id in store: {}", e)))?;
                let entity_id = Uuid::parse_str(&entity_id)
                    .map_err(|e| Error::Config(format!("corrupt entity id in store: {}", e)))?;
                Ok((id, entity_id, serde_json::from_str(&doc)?))
            })
            .collect()
    }
}
