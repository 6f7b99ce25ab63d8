//! Search endpoints
//!
//! `GET /search` forwards to the search backend; the reindex endpoints
//! start full rebuilds in the background and return immediately.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::error::ApiResult;
use crate::index::{ReindexOutcome, SearchPage};
use crate::AppState;

pub fn search_routes() -> Router<AppState> {
    Router::new()
        .route("/search", get(search))
        .route("/search/reindex/current", put(reindex_current))
        .route("/search/reindex/history", put(reindex_history))
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: String,
    #[serde(default)]
    offset: usize,
    #[serde(default = "default_count")]
    count: usize,
}

fn default_count() -> usize {
    20
}

async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<SearchPage>> {
    let page = state
        .bridge
        .search(&params.q, params.offset, params.count)
        .await?;
    Ok(Json(page))
}

async fn reindex_current(State(state): State<AppState>) -> StatusCode {
    let bridge = state.bridge.clone();
    tokio::spawn(async move {
        match bridge.reindex_current().await {
            Ok(ReindexOutcome::Completed(documents)) => {
                info!(documents, "current reindex finished")
            }
            Ok(ReindexOutcome::AlreadyRunning) => {
                warn!("current reindex request dropped, rebuild in progress")
            }
            Err(err) => error!(error = %err, "current reindex failed"),
        }
    });
    StatusCode::ACCEPTED
}

async fn reindex_history(State(state): State<AppState>) -> StatusCode {
    let bridge = state.bridge.clone();
    tokio::spawn(async move {
        match bridge.reindex_history().await {
            Ok(ReindexOutcome::Completed(documents)) => {
                info!(documents, "history reindex finished")
            }
            Ok(ReindexOutcome::AlreadyRunning) => {
                warn!("history reindex request dropped, rebuild in progress")
            }
            Err(err) => error!(error = %err, "history reindex failed"),
        }
    });
    StatusCode::ACCEPTED
}
