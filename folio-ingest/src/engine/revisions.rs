//! Per-source change history
//!
//! Derives a chronological sequence of structural diffs from the history
//! documents of one entity. Read path only; no side effects.

use chrono::{DateTime, Utc};
use folio_common::Result;
use serde::Serialize;
use serde_json::{Map, Value};

use super::keys::single_source_stamp;
use super::merge::merge_documents;
use super::node::{strip_annotations, SOURCE_FIELD};

/// One upstream delivery and its effect on the merged projection.
#[derive(Debug, Clone, Serialize)]
pub struct Revision {
    #[serde(rename = "processedAt")]
    pub processed_at: Option<DateTime<Utc>>,
    pub system: Option<String>,
    pub changes: Vec<Change>,
}

/// A single leaf-level difference against the previous merge.
#[derive(Debug, Clone, Serialize)]
pub struct Change {
    pub path: String,
    pub kind: ChangeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Removed,
    Changed,
}

/// Build the revisions sequence for one entity's history documents.
///
/// Order is `processedAt` ascending, tie-break by `system`; each entry
/// diffs the merged projection after that delivery against the projection
/// before it.
pub fn revisions(history: Vec<Value>) -> Result<Vec<Revision>> {
    let mut dated: Vec<(Option<DateTime<Utc>>, Option<String>, Value)> = history
        .into_iter()
        .map(|doc| {
            let stamp = single_source_stamp(&doc).unwrap_or_default();
            let processed_at = stamp
                .get("processedAt")
                .and_then(Value::as_str)
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|t| t.with_timezone(&Utc));
            let system = stamp
                .get("system")
                .and_then(Value::as_str)
                .map(str::to_string);
            (processed_at, system, doc)
        })
        .collect();
    dated.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

    let mut out = Vec::with_capacity(dated.len());
    let mut running: Option<Value> = None;

    for (processed_at, system, doc) in dated {
        let before_view = match &running {
            None => Value::Object(Map::new()),
            Some(prev) => content_view(prev),
        };
        let next = match running.take() {
            None => doc,
            Some(prev) => merge_documents(prev, doc)?,
        };
        let after_view = content_view(&next);

        let mut changes = Vec::new();
        diff(&before_view, &after_view, "", &mut changes);
        out.push(Revision {
            processed_at,
            system,
            changes,
        });

        running = Some(next);
    }

    Ok(out)
}

/// The de-annotated content of a document, without the source map.
fn content_view(doc: &Value) -> Value {
    let mut stripped = strip_annotations(doc);
    if let Some(map) = stripped.as_object_mut() {
        map.remove(SOURCE_FIELD);
    }
    stripped
}

fn diff(before: &Value, after: &Value, path: &str, out: &mut Vec<Change>) {
    match (before, after) {
        (Value::Object(map_a), Value::Object(map_b)) => {
            for (key, value_a) in map_a {
                let child_path = format!("{}/{}", path, key);
                match map_b.get(key) {
                    Some(value_b) => diff(value_a, value_b, &child_path, out),
                    None => out.push(Change {
                        path: child_path,
                        kind: ChangeKind::Removed,
                        before: Some(value_a.clone()),
                        after: None,
                    }),
                }
            }
            for (key, value_b) in map_b {
                if !map_a.contains_key(key) {
                    out.push(Change {
                        path: format!("{}/{}", path, key),
                        kind: ChangeKind::Added,
                        before: None,
                        after: Some(value_b.clone()),
                    });
                }
            }
        }
        _ if before == after => {}
        _ => out.push(Change {
            path: path.to_string(),
            kind: ChangeKind::Changed,
            before: Some(before.clone()),
            after: Some(after.clone()),
        }),
    }
}
