//! Provenance-aware document merging
//!
//! The merge operator folds a set of per-source annotated documents into one
//! aggregate. It is associative, commutative and idempotent in observable
//! effect, which makes the reduction independent of the order history
//! documents come back from the store.
//!
//! Last-writer-wins is applied per leaf, never per document: an annotated
//! leaf survives when its source stamp has the larger `processedAt`, with
//! the lexicographically larger source hash as the deterministic tie-break.

use chrono::{DateTime, Utc};
use folio_common::canonical::{canonical_json, is_hash_key, source_hash};
use folio_common::{Error, Result};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::node::{
    self, annotated_source, is_classified_array, strip_annotations, CLASSIFICATION_FIELD,
    SOURCE_FIELD,
};

/// Lookup context for leaf tie-breaks: the union of the operands' top-level
/// source maps.
pub struct MergeContext {
    sources: Map<String, Value>,
}

impl MergeContext {
    pub fn new(sources: Map<String, Value>) -> Self {
        Self { sources }
    }

    /// `processedAt` of the stamp a leaf references. Unknown hashes and
    /// unparseable timestamps sort earliest, so a leaf with a resolvable
    /// stamp always beats one without.
    fn processed_at(&self, hash: &str) -> Option<DateTime<Utc>> {
        self.sources
            .get(hash)?
            .get("processedAt")?
            .as_str()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc))
    }
}

/// Reduce a non-empty set of annotated documents for one entity.
pub fn merge_set(docs: Vec<Value>) -> Result<Value> {
    let mut iter = docs.into_iter();
    let first = iter.next().ok_or(Error::EmptyMerge)?;
    iter.try_fold(first, merge_documents)
}

/// Merge two annotated documents covering the same schema and
/// classification.
pub fn merge_documents(a: Value, b: Value) -> Result<Value> {
    check_coherence(&a, &b)?;

    let (mut obj_a, sources_a) = detach_sources(a)?;
    let (obj_b, sources_b) = detach_sources(b)?;

    // Key-wise union; identical hashes reference identical stamps.
    let mut sources = sources_a;
    for (hash, stamp) in sources_b {
        sources.insert(hash, stamp);
    }
    let ctx = MergeContext::new(sources);

    for (key, value_b) in obj_b {
        match obj_a.remove(&key) {
            Some(value_a) => {
                obj_a.insert(key, merge_nodes(value_a, value_b, &ctx)?);
            }
            None => {
                obj_a.insert(key, value_b);
            }
        }
    }

    obj_a.insert(SOURCE_FIELD.to_string(), Value::Object(ctx.sources));
    Ok(Value::Object(obj_a))
}

/// Merge two nodes at the same path.
pub fn merge_nodes(a: Value, b: Value, ctx: &MergeContext) -> Result<Value> {
    if node::is_annotated(&a) && node::is_annotated(&b) {
        return Ok(pick_leaf(a, b, ctx));
    }

    match (a, b) {
        (Value::Object(mut obj_a), Value::Object(obj_b)) => {
            for (key, value_b) in obj_b {
                match obj_a.remove(&key) {
                    Some(value_a) => {
                        obj_a.insert(key, merge_nodes(value_a, value_b, ctx)?);
                    }
                    None => {
                        obj_a.insert(key, value_b);
                    }
                }
            }
            Ok(Value::Object(obj_a))
        }
        (Value::Array(items_a), Value::Array(items_b))
            if is_classified_array(&items_a) || is_classified_array(&items_b) =>
        {
            let mut union = items_a;
            union.extend(items_b);
            Ok(Value::Array(dedupe_classified(union, ctx)?))
        }
        (a, b) => Err(Error::Incoherent(format!(
            "cannot merge {} with {}",
            kind_name(&a),
            kind_name(&b)
        ))),
    }
}

/// Deduplicate classified-array elements by classification key, merging
/// elements that share one. Survivors come out ordered by canonical
/// classification key so the reduction is byte-deterministic.
pub fn dedupe_classified(items: Vec<Value>, ctx: &MergeContext) -> Result<Vec<Value>> {
    let mut by_key: BTreeMap<String, Value> = BTreeMap::new();
    for element in items {
        let classification = node::classification_of(&element)
            .ok_or(Error::BadClassification)?;
        let key = canonical_json(&strip_annotations(classification));
        match by_key.remove(&key) {
            Some(existing) => {
                by_key.insert(key, merge_nodes(existing, element, ctx)?);
            }
            None => {
                by_key.insert(key, element);
            }
        }
    }
    Ok(by_key.into_values().collect())
}

/// Per-leaf last-writer-wins.
///
/// Ordering is the pair (processedAt, source hash); the larger pair
/// survives. When both hashes and values are identical either operand is
/// fine; a value disagreement under one hash is pathological and resolved
/// by canonical bytes to keep the operator commutative.
fn pick_leaf(a: Value, b: Value, ctx: &MergeContext) -> Value {
    let hash_a = annotated_source(&a).unwrap_or_default().to_string();
    let hash_b = annotated_source(&b).unwrap_or_default().to_string();
    let rank_a = (ctx.processed_at(&hash_a), hash_a);
    let rank_b = (ctx.processed_at(&hash_b), hash_b);

    match rank_b.cmp(&rank_a) {
        std::cmp::Ordering::Greater => b,
        std::cmp::Ordering::Less => a,
        std::cmp::Ordering::Equal => {
            if canonical_json(&b) > canonical_json(&a) {
                b
            } else {
                a
            }
        }
    }
}

/// Split a document into its content fields and its source map.
///
/// A `source` already in map form (every key a SHA-1 hash) is taken as is;
/// a plain stamp is promoted to a one-entry map under its own hash.
fn detach_sources(doc: Value) -> Result<(Map<String, Value>, Map<String, Value>)> {
    let Value::Object(mut obj) = doc else {
        return Err(Error::Incoherent("merge operand is not an object".into()));
    };
    let source = obj.remove(SOURCE_FIELD).ok_or(Error::MissingSource)?;
    let sources = into_source_map(source)?;
    Ok((obj, sources))
}

fn into_source_map(source: Value) -> Result<Map<String, Value>> {
    match source {
        Value::Object(map) if !map.is_empty() && map.keys().all(|k| is_hash_key(k)) => Ok(map),
        stamp @ Value::Object(_) => {
            let mut map = Map::with_capacity(1);
            map.insert(source_hash(&stamp), stamp);
            Ok(map)
        }
        _ => Err(Error::MissingSourceFields),
    }
}

/// Both operands must describe the same entity.
fn check_coherence(a: &Value, b: &Value) -> Result<()> {
    let schema_a = strip_annotations(a.get("$schema").unwrap_or(&Value::Null));
    let schema_b = strip_annotations(b.get("$schema").unwrap_or(&Value::Null));
    if schema_a != schema_b {
        return Err(Error::Incoherent(format!(
            "schema {} vs {}",
            schema_a, schema_b
        )));
    }
    let class_a = strip_annotations(a.get(CLASSIFICATION_FIELD).unwrap_or(&Value::Null));
    let class_b = strip_annotations(b.get(CLASSIFICATION_FIELD).unwrap_or(&Value::Null));
    if canonical_json(&class_a) != canonical_json(&class_b) {
        return Err(Error::Incoherent("classification mismatch".into()));
    }
    Ok(())
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
