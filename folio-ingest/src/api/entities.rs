//! Entity read endpoints
//!
//! Books and contributors share the same handler logic; only the schema
//! identifier differs. All reads are non-cacheable and keyed by entity
//! UUID.

use axum::{
    extract::{Path, State},
    routing::{get, put},
    Json, Router,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::engine::revisions::{revisions, Revision};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

pub fn book_routes() -> Router<AppState> {
    Router::new()
        .route("/books/:id", get(get_book))
        .route("/books/:id/history", get(get_book_history))
        .route("/books/:id/reindex", put(reindex_book))
}

pub fn contributor_routes() -> Router<AppState> {
    Router::new()
        .route("/contributors/:id", get(get_contributor))
        .route("/contributors/:id/history", get(get_contributor_history))
        .route("/contributors/:id/reindex", put(reindex_contributor))
}

async fn get_book(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    let schema = state.config.schema.book.clone();
    current_document(&state, &schema, &id).await.map(Json)
}

async fn get_contributor(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let schema = state.config.schema.contributor.clone();
    current_document(&state, &schema, &id).await.map(Json)
}

async fn get_book_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<Revision>>> {
    let schema = state.config.schema.book.clone();
    entity_revisions(&state, &schema, &id).await.map(Json)
}

async fn get_contributor_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<Revision>>> {
    let schema = state.config.schema.contributor.clone();
    entity_revisions(&state, &schema, &id).await.map(Json)
}

async fn reindex_book(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let schema = state.config.schema.book.clone();
    reindex_entity(&state, &schema, &id).await.map(Json)
}

async fn reindex_contributor(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let schema = state.config.schema.contributor.clone();
    reindex_entity(&state, &schema, &id).await.map(Json)
}

async fn current_document(state: &AppState, schema: &str, id: &str) -> ApiResult<Value> {
    let entity_id = parse_entity_id(id)?;
    state
        .current
        .get_by_id(entity_id, schema)
        .await?
        .ok_or_else(|| ApiError::NotFound(id.to_string()))
}

async fn entity_revisions(state: &AppState, schema: &str, id: &str) -> ApiResult<Vec<Revision>> {
    let entity_id = parse_entity_id(id)?;
    let history = state.history.history_for_entity(entity_id, schema).await?;
    if history.is_empty() {
        return Err(ApiError::NotFound(id.to_string()));
    }
    Ok(revisions(history)?)
}

/// Re-push one current document; 200 when present, 404 otherwise.
async fn reindex_entity(state: &AppState, schema: &str, id: &str) -> ApiResult<Value> {
    let entity_id = parse_entity_id(id)?;
    let doc = state
        .current
        .get_by_id(entity_id, schema)
        .await?
        .ok_or_else(|| ApiError::NotFound(id.to_string()))?;

    state.bridge.push_current(entity_id, &doc).await?;
    Ok(json!({"status": "reindexed", "id": entity_id}))
}

fn parse_entity_id(segment: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(segment).map_err(|_| ApiError::InvalidUuid(segment.to_string()))
}
