//! Ingest orchestration
//!
//! Runs one message through the full pipeline: parse, enrich, annotate,
//! key extraction, history normalization and store, merge, current
//! normalization and store, index notification. All steps are strictly
//! ordered; only the final index push is fire-and-forget.

use chrono::Utc;
use folio_common::config::Config;
use folio_common::events::{EventBus, FolioEvent};
use folio_common::{Error, Result};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::engine::annotate::annotate;
use crate::engine::enrich::attach_contributor_ids;
use crate::engine::keys::{extract, single_source_stamp, DocumentKeys};
use crate::engine::merge::merge_set;
use crate::index::IndexBridge;
use crate::store::{CurrentStore, HistoryStore, StoredDocument};

/// Result of one successful pipeline run.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub entity_id: Uuid,
    pub schema: String,
    /// True when an earlier document from the same origin was replaced.
    pub replaced: bool,
}

pub struct Ingestor {
    history: HistoryStore,
    current: CurrentStore,
    bridge: Arc<IndexBridge>,
    events: EventBus,
    config: Arc<Config>,
}

impl Ingestor {
    pub fn new(
        history: HistoryStore,
        current: CurrentStore,
        bridge: Arc<IndexBridge>,
        events: EventBus,
        config: Arc<Config>,
    ) -> Self {
        Self {
            history,
            current,
            bridge,
            events,
            config,
        }
    }

    /// Process one message body. Every error before the index push fails
    /// the message; its disposition decides retry versus dead-letter.
    pub async fn ingest(&self, expected_schema: &str, payload: &[u8]) -> Result<IngestOutcome> {
        let mut raw: Value = serde_json::from_slice(payload)?;
        attach_contributor_ids(&mut raw);

        let annotated = annotate(raw)?;
        let keys = extract(&annotated, &self.config.source.volatile_fields)?;
        if keys.schema != expected_schema {
            return Err(Error::SchemaMismatch {
                expected: expected_schema.to_string(),
                got: keys.schema,
            });
        }

        let replaced = self.store_history(&keys, &annotated).await?;

        let history = self.history.fetch_by_entity(&keys).await?;
        if history.is_empty() {
            return Err(Error::EmptyHistory);
        }
        let contributing = history.len();
        let merged = merge_set(history)?;

        self.store_current(&keys, &merged).await?;

        info!(
            entity_id = %keys.entity_id,
            schema = %keys.schema,
            contributing,
            replaced,
            "document ingested"
        );

        self.notify(&keys, &annotated, merged);

        Ok(IngestOutcome {
            entity_id: keys.entity_id,
            schema: keys.schema,
            replaced,
        })
    }

    /// Normalize and write the per-source document: replace the existing
    /// record for this history key when there is one, and delete any
    /// duplicates beyond it.
    async fn store_history(&self, keys: &DocumentKeys, annotated: &Value) -> Result<bool> {
        let matches = self.history.lookup_by_history_key(&keys.history_key).await?;
        if matches.len() > 1 {
            let extra = duplicate_ids(&matches);
            warn!(
                store = "history",
                duplicates = extra.len(),
                "duplicate records for one history key, repairing"
            );
            self.history.delete_many(&extra).await?;
        }

        let replace = matches.first();
        self.history.store(keys, annotated, replace).await?;
        Ok(replace.is_some())
    }

    /// Normalize and write the merged document, mirroring the history
    /// normalization for the current key.
    async fn store_current(&self, keys: &DocumentKeys, merged: &Value) -> Result<()> {
        let matches = self.current.lookup_by_current_key(&keys.current_key).await?;
        if matches.len() > 1 {
            let extra = duplicate_ids(&matches);
            warn!(
                store = "current",
                duplicates = extra.len(),
                "duplicate records for one current key, repairing"
            );
            self.current.delete_many(&extra).await?;
        }

        self.current.store(keys, merged, matches.first()).await?;
        Ok(())
    }

    /// Fire-and-forget index push and downstream notification. Failures
    /// here are logged and reported on the event bus, never propagated.
    fn notify(&self, keys: &DocumentKeys, annotated: &Value, merged: Value) {
        let system = single_source_stamp(annotated)
            .ok()
            .and_then(|stamp| stamp.get("system").and_then(Value::as_str).map(str::to_string));

        self.events
            .emit(FolioEvent::DocumentIngested {
                entity_id: keys.entity_id,
                schema: keys.schema.clone(),
                system,
                timestamp: Utc::now(),
            })
            .ok();

        let bridge = self.bridge.clone();
        let events = self.events.clone();
        let entity_id = keys.entity_id;
        let schema = keys.schema.clone();
        tokio::spawn(async move {
            if let Err(err) = bridge.push_current(entity_id, &merged).await {
                error!(entity_id = %entity_id, error = %err, "index push failed");
                events
                    .emit(FolioEvent::IndexPushFailed {
                        entity_id,
                        schema,
                        reason: err.to_string(),
                        timestamp: Utc::now(),
                    })
                    .ok();
            } else {
                debug!(entity_id = %entity_id, "index push completed");
            }
        });
    }
}

/// Everything past the first match is a duplicate to delete.
fn duplicate_ids(matches: &[StoredDocument]) -> Vec<Uuid> {
    matches[1..].iter().map(|m| m.id).collect()
}
