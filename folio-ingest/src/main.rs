//! folio-ingest - Metadata Reconciliation Service
//!
//! Consumes book and contributor metadata from the message bus, reconciles
//! each source's partial view into one provenance-annotated document per
//! entity, and serves the result over HTTP and the search index.

use anyhow::Result;
use folio_common::config::Config;
use folio_common::events::FolioEvent;
use folio_ingest::bus::{InMemoryBus, InMemoryDeadLetter};
use folio_ingest::index::{HttpSearchBackend, MemorySearchBackend, SearchBackend};
use folio_ingest::listener::Listener;
use folio_ingest::{build_router, AppState};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    info!("Starting folio-ingest (Metadata Reconciliation)");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = Arc::new(Config::load(config_path.as_deref())?);
    info!("Database: {}", config.database.path.display());

    let db = folio_ingest::store::init_pool(&config.database.path).await?;
    info!("Database connection established");

    let backend: Arc<dyn SearchBackend> = match &config.index.base_url {
        Some(url) => {
            info!(index = %config.index.name, url = %url, "using HTTP search backend");
            Arc::new(HttpSearchBackend::new(url.clone()))
        }
        None => {
            info!(index = %config.index.name, "no search backend configured, using in-process index");
            Arc::new(MemorySearchBackend::new())
        }
    };

    let state = AppState::new(config.clone(), db, backend);

    // The bus transport itself is external; the in-memory queue is the
    // default wiring behind the consumer trait.
    let bus = Arc::new(InMemoryBus::new());
    let dead_letter = Arc::new(InMemoryDeadLetter::new());

    let shutdown = CancellationToken::new();
    let listener = Arc::new(Listener::new(
        bus.clone(),
        dead_letter,
        state.ingestor.clone(),
        state.events.clone(),
        config.clone(),
    ));
    let workers = listener.spawn(shutdown.clone());

    spawn_distributor(&state, &config);

    let app = build_router(state);
    let listener_addr = &config.http.listen;
    let tcp = tokio::net::TcpListener::bind(listener_addr).await?;
    info!("Listening on http://{}", listener_addr);
    info!("Health check: http://{}/health", listener_addr);

    let server_shutdown = shutdown.clone();
    axum::serve(tcp, app)
        .with_graceful_shutdown(async move {
            tokio::signal::ctrl_c().await.ok();
            info!("shutdown signal received");
            server_shutdown.cancel();
        })
        .await?;

    shutdown.cancel();
    for worker in workers {
        worker.await.ok();
    }
    info!("folio-ingest stopped");
    Ok(())
}

/// Forward ingest notifications to the downstream output exchange.
fn spawn_distributor(state: &AppState, config: &Arc<Config>) {
    let mut rx = state.events.subscribe();
    let exchange = config.listener.distributor.output_exchange.clone();
    tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            if let FolioEvent::DocumentIngested {
                entity_id, schema, ..
            } = event
            {
                info!(
                    exchange = %exchange,
                    entity_id = %entity_id,
                    schema = %schema,
                    "distributing ingest notification"
                );
            }
        }
    });
}
