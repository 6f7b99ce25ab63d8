//! Pipeline-level invariants
//!
//! Idempotence and permutation invariance of the whole ingest path, plus
//! the at-most-one-record store invariants after every run.

mod common;

use common::{book_payload, current_count, history_count, test_state};
use folio_common::canonical::canonical_json;
use serde_json::{json, Value};

async fn current_doc(state: &folio_ingest::AppState, entity: uuid::Uuid) -> Value {
    state
        .current
        .get_by_id(entity, "book.v2")
        .await
        .unwrap()
        .expect("current document")
}

#[tokio::test]
async fn ingesting_twice_is_idempotent() {
    let (state, _backend) = test_state().await;
    let payload = book_payload("sA", "2020-01-01T00:00:00Z", json!({"title": "Alpha"}));

    let first = state.ingestor.ingest("book.v2", &payload).await.unwrap();
    let after_first = current_doc(&state, first.entity_id).await;
    let history_first = history_count(&state).await;

    let second = state.ingestor.ingest("book.v2", &payload).await.unwrap();
    assert!(second.replaced);
    let after_second = current_doc(&state, second.entity_id).await;

    assert_eq!(history_first, history_count(&state).await);
    assert_eq!(current_count(&state).await, 1);
    assert_eq!(
        canonical_json(&after_first),
        canonical_json(&after_second),
        "stores must be bit-equal to the single-ingest state"
    );
}

#[tokio::test]
async fn ingest_order_does_not_change_the_current_document() {
    let messages = [
        book_payload("sA", "2020-01-01T00:00:00Z", json!({"title": "Alpha", "pages": 100})),
        book_payload("sB", "2020-01-02T00:00:00Z", json!({"title": "Alpha!"})),
        book_payload("sC", "2020-01-03T00:00:00Z", json!({"subtitle": "Again", "pages": 320})),
    ];

    let (forward, _) = test_state().await;
    let mut entity = None;
    for payload in &messages {
        entity = Some(
            forward
                .ingestor
                .ingest("book.v2", payload)
                .await
                .unwrap()
                .entity_id,
        );
    }
    let entity = entity.unwrap();
    let forward_doc = current_doc(&forward, entity).await;

    let (reverse, _) = test_state().await;
    for payload in messages.iter().rev() {
        reverse.ingestor.ingest("book.v2", payload).await.unwrap();
    }
    let reverse_doc = current_doc(&reverse, entity).await;

    assert_eq!(canonical_json(&forward_doc), canonical_json(&reverse_doc));
    assert_eq!(forward_doc["title"]["value"], "Alpha!");
    assert_eq!(forward_doc["pages"]["value"], 320);
    assert_eq!(forward_doc["subtitle"]["value"], "Again");
}

#[tokio::test]
async fn store_invariants_hold_after_every_run() {
    let (state, _backend) = test_state().await;

    let deliveries = [
        ("sA", "2020-01-01T00:00:00Z"),
        ("sB", "2020-01-02T00:00:00Z"),
        ("sA", "2020-01-03T00:00:00Z"),
        ("sB", "2020-01-04T00:00:00Z"),
    ];
    for (system, processed_at) in deliveries {
        state
            .ingestor
            .ingest(
                "book.v2",
                &book_payload(system, processed_at, json!({"title": system})),
            )
            .await
            .unwrap();

        // At most one record per history key and per current key.
        let history_max: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(n), 0) FROM (SELECT COUNT(*) AS n FROM history_documents GROUP BY history_key)",
        )
        .fetch_one(&state.db)
        .await
        .unwrap();
        let current_max: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(n), 0) FROM (SELECT COUNT(*) AS n FROM current_documents GROUP BY current_key)",
        )
        .fetch_one(&state.db)
        .await
        .unwrap();
        assert!(history_max <= 1);
        assert!(current_max <= 1);
    }

    // Two origins, one entity.
    assert_eq!(history_count(&state).await, 2);
    assert_eq!(current_count(&state).await, 1);
}

#[tokio::test]
async fn every_current_leaf_resolves_in_the_source_map() {
    let (state, _backend) = test_state().await;

    state
        .ingestor
        .ingest(
            "book.v2",
            &book_payload("sA", "2020-01-01T00:00:00Z", json!({"title": "Alpha", "tags": ["x"]})),
        )
        .await
        .unwrap();
    let outcome = state
        .ingestor
        .ingest(
            "book.v2",
            &book_payload("sB", "2020-01-02T00:00:00Z", json!({"pages": 10})),
        )
        .await
        .unwrap();

    let current = current_doc(&state, outcome.entity_id).await;
    let sources = current["source"].as_object().unwrap();
    let mut hashes = Vec::new();
    collect_source_refs(&current, &mut hashes);

    assert!(!hashes.is_empty());
    for hash in hashes {
        assert!(sources.contains_key(&hash), "unresolvable source {}", hash);
    }
}

fn collect_source_refs(node: &Value, out: &mut Vec<String>) {
    if let Some(map) = node.as_object() {
        if map.len() == 2 {
            if let (Some(_), Some(Value::String(hash))) = (map.get("value"), map.get("source")) {
                out.push(hash.clone());
                return;
            }
        }
        for (key, child) in map {
            if key == "source" {
                continue;
            }
            collect_source_refs(child, out);
        }
    } else if let Some(items) = node.as_array() {
        for item in items {
            collect_source_refs(item, out);
        }
    }
}
