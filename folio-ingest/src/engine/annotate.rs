//! Document annotation
//!
//! Rewrites a raw incoming document so every leaf carries a `{value,
//! source}` pair referencing the document's source stamp. Classified arrays
//! are annotated element-wise so each element keeps its identity; every
//! other array is one atomic leaf.

use folio_common::canonical::source_hash;
use folio_common::{Error, Result};
use serde_json::{Map, Value};

use super::merge::{dedupe_classified, MergeContext};
use super::node::{self, is_classified_array, SOURCE_FIELD};

/// Annotate a raw document.
///
/// Fails with `MissingSource` when the top-level `source` subtree is
/// absent. On success every leaf path resolves to a `{value, source}` pair
/// and the top-level `source` maps each referenced hash to its full stamp.
pub fn annotate(raw: Value) -> Result<Value> {
    let Value::Object(mut obj) = raw else {
        return Err(Error::MissingSource);
    };
    let stamp = obj.remove(SOURCE_FIELD).ok_or(Error::MissingSource)?;
    let src_hash = source_hash(&stamp);

    // Pre-annotated elements may reference stamps this message does not
    // carry; the dedup merge still needs the incoming stamp for tie-breaks.
    let mut own_sources = Map::with_capacity(1);
    own_sources.insert(src_hash.clone(), stamp.clone());
    let ctx = MergeContext::new(own_sources);

    let single_child = obj.len() == 1;
    let mut stamped = false;

    let mut annotated = Map::with_capacity(obj.len());
    for (key, value) in obj {
        annotated.insert(key, annotate_node(value, &src_hash, &ctx, &mut stamped)?);
    }

    // Reinstate the stamp: map form once anything references it, otherwise
    // the original stamp unchanged (there was nothing to stamp).
    let source = if single_child || stamped {
        let mut map = Map::with_capacity(1);
        map.insert(src_hash, stamp);
        Value::Object(map)
    } else {
        stamp
    };
    annotated.insert(SOURCE_FIELD.to_string(), source);

    Ok(Value::Object(annotated))
}

fn annotate_node(
    value: Value,
    src_hash: &str,
    ctx: &MergeContext,
    stamped: &mut bool,
) -> Result<Value> {
    if node::is_annotated(&value) {
        return Ok(value);
    }

    match value {
        Value::Object(map) if !map.is_empty() => {
            let mut out = Map::with_capacity(map.len());
            for (key, child) in map {
                out.insert(key, annotate_node(child, src_hash, ctx, stamped)?);
            }
            Ok(Value::Object(out))
        }
        Value::Array(items) if is_classified_array(&items) => {
            let mut elements = Vec::with_capacity(items.len());
            for element in items {
                elements.push(annotate_node(element, src_hash, ctx, stamped)?);
            }
            Ok(Value::Array(dedupe_classified(elements, ctx)?))
        }
        // Scalars, empty objects and non-classified arrays are leaves.
        leaf => {
            *stamped = true;
            Ok(node::wrap(leaf, src_hash))
        }
    }
}
