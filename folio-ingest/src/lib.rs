//! folio-ingest library interface
//!
//! Exposes the reconciliation engine, stores, listener and HTTP router for
//! the binary and for integration testing.

pub mod api;
pub mod bus;
pub mod engine;
pub mod error;
pub mod index;
pub mod ingest;
pub mod listener;
pub mod store;

pub use crate::error::{ApiError, ApiResult};

use axum::http::{header, HeaderValue};
use axum::Router;
use chrono::{DateTime, Utc};
use folio_common::config::Config;
use folio_common::events::EventBus;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::index::{IndexBridge, SearchBackend};
use crate::ingest::Ingestor;
use crate::store::{CurrentStore, HistoryStore};

/// Application state shared across handlers and workers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: SqlitePool,
    pub history: HistoryStore,
    pub current: CurrentStore,
    pub bridge: Arc<IndexBridge>,
    pub ingestor: Arc<Ingestor>,
    pub events: EventBus,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Wire stores, bridge and ingestor from a pool and a search backend.
    pub fn new(config: Arc<Config>, db: SqlitePool, backend: Arc<dyn SearchBackend>) -> Self {
        let timeout = Duration::from_millis(config.api.timeout_ms);
        let history = HistoryStore::new(db.clone(), timeout);
        let current = CurrentStore::new(db.clone(), timeout);
        let events = EventBus::new(1000);

        let bridge = Arc::new(IndexBridge::new(
            backend,
            history.clone(),
            current.clone(),
            config.index.name.clone(),
            config.index.reindex_chunk,
            events.clone(),
        ));
        let ingestor = Arc::new(Ingestor::new(
            history.clone(),
            current.clone(),
            bridge.clone(),
            events.clone(),
            config.clone(),
        ));

        Self {
            config,
            db,
            history,
            current,
            bridge,
            ingestor,
            events,
            started_at: Utc::now(),
        }
    }
}

/// Build the application router.
///
/// All responses are marked non-cacheable and vary on Accept headers; CORS
/// allows all origins.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::book_routes())
        .merge(api::contributor_routes())
        .merge(api::search_routes())
        .merge(api::health_routes())
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::VARY,
            HeaderValue::from_static("Accept, Accept-Encoding"),
        ))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
