//! Search index bridge
//!
//! Forwards whole current documents to the search backend keyed by entity
//! id, and supports full rebuilds from either store. Rebuilds are chunked
//! and single-flighted per target.

use async_trait::async_trait;
use chrono::Utc;
use folio_common::events::{EventBus, FolioEvent, ReindexTarget};
use folio_common::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::store::{CurrentStore, HistoryStore};

/// One page of search results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchPage {
    pub results: Vec<Value>,
    pub offset: usize,
    pub count: usize,
    #[serde(rename = "lastPage")]
    pub last_page: bool,
}

/// The search backend contract. The backend itself is an external
/// collaborator; the bridge only pushes documents and forwards queries.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn put_document(&self, index: &str, id: Uuid, doc: &Value) -> Result<()>;
    async fn search(
        &self,
        index: &str,
        query: &str,
        offset: usize,
        count: usize,
    ) -> Result<SearchPage>;
}

/// HTTP search backend client.
pub struct HttpSearchBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSearchBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl SearchBackend for HttpSearchBackend {
    async fn put_document(&self, index: &str, id: Uuid, doc: &Value) -> Result<()> {
        let url = format!("{}/{}/docs/{}", self.base_url, index, id);
        let response = self
            .client
            .put(&url)
            .json(doc)
            .send()
            .await
            .map_err(|e| Error::Index(format!("put {} failed: {}", url, e)))?;
        if !response.status().is_success() {
            return Err(Error::Index(format!(
                "put {} returned {}",
                url,
                response.status()
            )));
        }
        Ok(())
    }

    async fn search(
        &self,
        index: &str,
        query: &str,
        offset: usize,
        count: usize,
    ) -> Result<SearchPage> {
        let url = format!("{}/{}/search", self.base_url, index);
        let response = self
            .client
            .get(&url)
            .query(&[("q", query)])
            .query(&[("offset", offset), ("count", count)])
            .send()
            .await
            .map_err(|e| Error::Index(format!("search {} failed: {}", url, e)))?;
        if !response.status().is_success() {
            return Err(Error::Index(format!(
                "search {} returned {}",
                url,
                response.status()
            )));
        }
        response
            .json::<SearchPage>()
            .await
            .map_err(|e| Error::Index(format!("search response decode failed: {}", e)))
    }
}

/// In-process search backend.
///
/// Used when no backend URL is configured, and by tests. Matching is a
/// plain substring scan over the serialized document.
#[derive(Default)]
pub struct MemorySearchBackend {
    docs: RwLock<HashMap<String, HashMap<Uuid, Value>>>,
}

impl MemorySearchBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self, index: &str) -> usize {
        self.docs
            .read()
            .await
            .get(index)
            .map(HashMap::len)
            .unwrap_or(0)
    }
}

#[async_trait]
impl SearchBackend for MemorySearchBackend {
    async fn put_document(&self, index: &str, id: Uuid, doc: &Value) -> Result<()> {
        self.docs
            .write()
            .await
            .entry(index.to_string())
            .or_default()
            .insert(id, doc.clone());
        Ok(())
    }

    async fn search(
        &self,
        index: &str,
        query: &str,
        offset: usize,
        count: usize,
    ) -> Result<SearchPage> {
        let docs = self.docs.read().await;
        let mut hits: Vec<(Uuid, &Value)> = docs
            .get(index)
            .map(|by_id| {
                by_id
                    .iter()
                    .filter(|(_, doc)| doc.to_string().contains(query))
                    .map(|(id, doc)| (*id, doc))
                    .collect()
            })
            .unwrap_or_default();
        hits.sort_by_key(|(id, _)| *id);

        let total = hits.len();
        let results: Vec<Value> = hits
            .into_iter()
            .skip(offset)
            .take(count)
            .map(|(_, doc)| doc.clone())
            .collect();
        Ok(SearchPage {
            offset,
            count: results.len(),
            last_page: offset + count >= total,
            results,
        })
    }
}

/// Outcome of a rebuild request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReindexOutcome {
    Completed(usize),
    AlreadyRunning,
}

/// Bridge between the stores and the search backend.
pub struct IndexBridge {
    backend: Arc<dyn SearchBackend>,
    history: HistoryStore,
    current: CurrentStore,
    index_name: String,
    chunk: usize,
    events: EventBus,
    current_rebuild: AtomicBool,
    history_rebuild: AtomicBool,
}

impl IndexBridge {
    pub fn new(
        backend: Arc<dyn SearchBackend>,
        history: HistoryStore,
        current: CurrentStore,
        index_name: String,
        chunk: usize,
        events: EventBus,
    ) -> Self {
        Self {
            backend,
            history,
            current,
            index_name,
            chunk,
            events,
            current_rebuild: AtomicBool::new(false),
            history_rebuild: AtomicBool::new(false),
        }
    }

    /// Push one current document, keyed by entity id.
    pub async fn push_current(&self, entity_id: Uuid, doc: &Value) -> Result<()> {
        self.backend
            .put_document(&self.index_name, entity_id, doc)
            .await
    }

    /// Forward a query to the backend.
    pub async fn search(&self, query: &str, offset: usize, count: usize) -> Result<SearchPage> {
        self.backend
            .search(&self.index_name, query, offset, count)
            .await
    }

    /// Re-push every current document. Single-flighted; a request while a
    /// rebuild runs is dropped.
    pub async fn reindex_current(&self) -> Result<ReindexOutcome> {
        if self
            .current_rebuild
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("current reindex already running, request dropped");
            return Ok(ReindexOutcome::AlreadyRunning);
        }
        self.emit_started(ReindexTarget::Current);

        let result = self.scan_current().await;
        self.current_rebuild.store(false, Ordering::SeqCst);

        let pushed = result?;
        self.emit_completed(ReindexTarget::Current, pushed);
        info!(documents = pushed, "current reindex completed");
        Ok(ReindexOutcome::Completed(pushed))
    }

    /// Re-push every history document, keyed by record id.
    pub async fn reindex_history(&self) -> Result<ReindexOutcome> {
        if self
            .history_rebuild
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("history reindex already running, request dropped");
            return Ok(ReindexOutcome::AlreadyRunning);
        }
        self.emit_started(ReindexTarget::History);

        let result = self.scan_history().await;
        self.history_rebuild.store(false, Ordering::SeqCst);

        let pushed = result?;
        self.emit_completed(ReindexTarget::History, pushed);
        info!(documents = pushed, "history reindex completed");
        Ok(ReindexOutcome::Completed(pushed))
    }

    async fn scan_current(&self) -> Result<usize> {
        let mut pushed = 0;
        let mut after = None;
        loop {
            let records = self.current.scan_chunk(after, self.chunk).await?;
            if records.is_empty() {
                return Ok(pushed);
            }
            after = records.last().map(|(id, _, _)| *id);
            for (_, entity_id, doc) in records {
                self.backend
                    .put_document(&self.index_name, entity_id, &doc)
                    .await?;
                pushed += 1;
            }
        }
    }

    async fn scan_history(&self) -> Result<usize> {
        let mut pushed = 0;
        let mut after = None;
        loop {
            let records = self.history.scan_chunk(after, self.chunk).await?;
            if records.is_empty() {
                return Ok(pushed);
            }
            after = records.last().map(|(id, _)| *id);
            for (record_id, doc) in records {
                self.backend
                    .put_document(&self.index_name, record_id, &doc)
                    .await?;
                pushed += 1;
            }
        }
    }

    fn emit_started(&self, target: ReindexTarget) {
        self.events
            .emit(FolioEvent::ReindexStarted {
                target,
                timestamp: Utc::now(),
            })
            .ok();
    }

    fn emit_completed(&self, target: ReindexTarget, documents: usize) {
        self.events
            .emit(FolioEvent::ReindexCompleted {
                target,
                documents,
                timestamp: Utc::now(),
            })
            .ok();
    }
}
