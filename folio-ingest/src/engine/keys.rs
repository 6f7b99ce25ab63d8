//! Lookup key extraction
//!
//! Derives the history key (one per upstream origin and entity), the
//! current key (one per entity) and the entity id from an annotated
//! document. Both keys are canonical serializations so equality is
//! independent of field order.

use folio_common::canonical::{canonical_json, is_hash_key};
use folio_common::{Error, Result};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use super::node::{strip_annotations, CLASSIFICATION_FIELD, SOURCE_FIELD};

/// Keys derived from one document.
#[derive(Debug, Clone)]
pub struct DocumentKeys {
    pub schema: String,
    /// De-annotated classification subtree.
    pub classification: Value,
    /// Canonical `[schema, source-minus-volatile, classification]`.
    pub history_key: String,
    /// Canonical `{"$schema", "classification"}`.
    pub current_key: String,
    pub entity_id: Uuid,
}

/// Extract all lookup keys from an annotated document.
///
/// `volatile_fields` are stripped from the source stamp before the history
/// key is formed; they vary across retransmits of the same payload.
pub fn extract(doc: &Value, volatile_fields: &[String]) -> Result<DocumentKeys> {
    let schema = strip_annotations(doc.get("$schema").unwrap_or(&Value::Null))
        .as_str()
        .map(str::to_string)
        .ok_or(Error::MissingSchema)?;

    let classification = strip_annotations(doc.get(CLASSIFICATION_FIELD).unwrap_or(&Value::Null));
    if is_empty(&classification) {
        return Err(Error::MissingClassification);
    }

    let mut stable = single_source_stamp(doc)?;
    for field in volatile_fields {
        stable.remove(field);
    }

    let history_key = canonical_json(&json!([&schema, Value::Object(stable), &classification]));
    let current_key =
        canonical_json(&json!({"$schema": &schema, "classification": &classification}));
    let entity_id = entity_id_of(doc, &current_key);

    Ok(DocumentKeys {
        schema,
        classification,
        history_key,
        current_key,
        entity_id,
    })
}

/// The single source stamp of a per-source document.
///
/// Accepts both forms the annotator emits: a one-entry hash map and a plain
/// stamp object.
pub fn single_source_stamp(doc: &Value) -> Result<Map<String, Value>> {
    let source = doc
        .get(SOURCE_FIELD)
        .and_then(Value::as_object)
        .ok_or(Error::MissingSourceFields)?;

    if !source.is_empty() && source.keys().all(|k| is_hash_key(k)) {
        if source.len() != 1 {
            return Err(Error::MissingSourceFields);
        }
        return source
            .values()
            .next()
            .and_then(Value::as_object)
            .cloned()
            .ok_or(Error::MissingSourceFields);
    }
    Ok(source.clone())
}

/// Deterministic entity id: the document's own `id` when it is a UUID,
/// otherwise UUID v5 of the current key so unidentified entities are still
/// addressable.
fn entity_id_of(doc: &Value, current_key: &str) -> Uuid {
    if let Some(id) = strip_annotations(doc.get("id").unwrap_or(&Value::Null)).as_str() {
        if let Ok(uuid) = Uuid::parse_str(id) {
            return uuid;
        }
    }
    Uuid::new_v5(&Uuid::NAMESPACE_URL, current_key.as_bytes())
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}
