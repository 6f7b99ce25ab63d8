//! End-to-end pipeline scenarios
//!
//! Each test drives the ingestor the way the listener does and checks the
//! stores afterwards.

mod common;

use common::{book_payload, current_count, history_count, test_state};
use folio_common::canonical::sha1_hex;
use folio_common::Error;
use serde_json::json;

#[tokio::test]
async fn single_source_first_ingest() {
    let (state, _backend) = test_state().await;

    let outcome = state
        .ingestor
        .ingest(
            "book.v2",
            &book_payload("sA", "2020-01-01T00:00:00Z", json!({"title": "Alpha"})),
        )
        .await
        .unwrap();
    assert!(!outcome.replaced);

    assert_eq!(history_count(&state).await, 1);
    assert_eq!(current_count(&state).await, 1);

    let current = state
        .current
        .get_by_id(outcome.entity_id, "book.v2")
        .await
        .unwrap()
        .expect("current document");
    assert_eq!(current["title"]["value"], "Alpha");

    // The title's provenance resolves to sA's stamp in the source map.
    let hash = current["title"]["source"].as_str().unwrap();
    assert_eq!(current["source"][hash]["system"], "sA");
}

#[tokio::test]
async fn two_sources_non_overlapping_fields() {
    let (state, _backend) = test_state().await;

    state
        .ingestor
        .ingest(
            "book.v2",
            &book_payload("sA", "2020-01-01T00:00:00Z", json!({"title": "Alpha"})),
        )
        .await
        .unwrap();
    let outcome = state
        .ingestor
        .ingest(
            "book.v2",
            &book_payload(
                "sB",
                "2020-01-02T00:00:00Z",
                json!({"subtitle": "An Introduction"}),
            ),
        )
        .await
        .unwrap();

    assert_eq!(history_count(&state).await, 2);
    assert_eq!(current_count(&state).await, 1);

    let current = state
        .current
        .get_by_id(outcome.entity_id, "book.v2")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(current["title"]["value"], "Alpha");
    assert_eq!(current["subtitle"]["value"], "An Introduction");

    let title_hash = current["title"]["source"].as_str().unwrap();
    let subtitle_hash = current["subtitle"]["source"].as_str().unwrap();
    assert_eq!(current["source"][title_hash]["system"], "sA");
    assert_eq!(current["source"][subtitle_hash]["system"], "sB");
}

#[tokio::test]
async fn overlapping_field_later_wins() {
    let (state, _backend) = test_state().await;

    state
        .ingestor
        .ingest(
            "book.v2",
            &book_payload("sA", "2020-01-01T00:00:00Z", json!({"title": "Alpha"})),
        )
        .await
        .unwrap();
    let outcome = state
        .ingestor
        .ingest(
            "book.v2",
            &book_payload("sB", "2020-01-02T00:00:00Z", json!({"title": "Alpha!"})),
        )
        .await
        .unwrap();

    let current = state
        .current
        .get_by_id(outcome.entity_id, "book.v2")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(current["title"]["value"], "Alpha!");
    let hash = current["title"]["source"].as_str().unwrap();
    assert_eq!(current["source"][hash]["system"], "sB");
}

#[tokio::test]
async fn resend_replaces_history_without_duplicating() {
    let (state, _backend) = test_state().await;

    state
        .ingestor
        .ingest(
            "book.v2",
            &book_payload("sA", "2020-01-01T00:00:00Z", json!({"title": "Alpha"})),
        )
        .await
        .unwrap();

    // Same payload relayed later: processedAt and system differ, both are
    // stripped from the history key.
    let outcome = state
        .ingestor
        .ingest(
            "book.v2",
            &book_payload("sA-relay", "2020-06-01T00:00:00Z", json!({"title": "Alpha"})),
        )
        .await
        .unwrap();
    assert!(outcome.replaced);

    assert_eq!(history_count(&state).await, 1);
    assert_eq!(current_count(&state).await, 1);

    let current = state
        .current
        .get_by_id(outcome.entity_id, "book.v2")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(current["title"]["value"], "Alpha");
}

#[tokio::test]
async fn contributor_display_names_get_ids() {
    let (state, _backend) = test_state().await;

    let payload = serde_json::to_vec(&json!({
        "$schema": "contributor.v2",
        "classification": [{"realm": "contributor", "id": "c-1"}],
        "source": {"system": "sA", "processedAt": "2020-01-01T00:00:00Z", "role": "registry"},
        "contributors": [{"names": {"display": "Jane Doe"}}],
    }))
    .unwrap();

    let outcome = state
        .ingestor
        .ingest("contributor.v2", &payload)
        .await
        .unwrap();

    let current = state
        .current
        .get_by_id(outcome.entity_id, "contributor.v2")
        .await
        .unwrap()
        .unwrap();

    // The contributors array has no classified elements, so it is one
    // annotated leaf whose value carries the derived id.
    assert_eq!(
        current["contributors"]["value"][0]["ids"]["bbb"],
        json!(sha1_hex(b"Jane Doe"))
    );
}

#[tokio::test]
async fn history_duplicates_are_repaired_on_ingest() {
    let (state, _backend) = test_state().await;

    // Seed two records under one history key, bypassing normalization.
    let raw = json!({
        "$schema": "book.v2",
        "classification": [{"realm": "isbn", "id": "9780000000001"}],
        "source": {"system": "sA", "processedAt": "2020-01-01T00:00:00Z", "role": "publisher"},
        "title": "Alpha",
    });
    let annotated = folio_ingest::engine::annotate::annotate(raw).unwrap();
    let keys = folio_ingest::engine::keys::extract(
        &annotated,
        &state.config.source.volatile_fields,
    )
    .unwrap();
    state.history.store(&keys, &annotated, None).await.unwrap();
    state.history.store(&keys, &annotated, None).await.unwrap();
    assert_eq!(history_count(&state).await, 2);

    // A third message with the same key restores the invariant.
    let outcome = state
        .ingestor
        .ingest(
            "book.v2",
            &book_payload("sA", "2020-02-01T00:00:00Z", json!({"title": "Alpha v2"})),
        )
        .await
        .unwrap();
    assert!(outcome.replaced);

    assert_eq!(history_count(&state).await, 1);
    let current = state
        .current
        .get_by_id(outcome.entity_id, "book.v2")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(current["title"]["value"], "Alpha v2");
}

#[tokio::test]
async fn schema_mismatch_is_permanent() {
    let (state, _backend) = test_state().await;

    let result = state
        .ingestor
        .ingest(
            "contributor.v2",
            &book_payload("sA", "2020-01-01T00:00:00Z", json!({"title": "Alpha"})),
        )
        .await;

    match result {
        Err(err @ Error::SchemaMismatch { .. }) => {
            assert_eq!(err.disposition(), folio_common::Disposition::Permanent)
        }
        other => panic!("expected SchemaMismatch, got {:?}", other),
    }
    assert_eq!(history_count(&state).await, 0);
}

#[tokio::test]
async fn malformed_json_is_permanent() {
    let (state, _backend) = test_state().await;

    let result = state.ingestor.ingest("book.v2", b"{not json").await;
    match result {
        Err(err @ Error::MalformedJson(_)) => {
            assert_eq!(err.disposition(), folio_common::Disposition::Permanent)
        }
        other => panic!("expected MalformedJson, got {:?}", other),
    }
}
