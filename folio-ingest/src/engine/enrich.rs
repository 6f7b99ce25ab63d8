//! Pre-annotation enrichment
//!
//! Contributor elements that arrive without an internal id get one derived
//! from their display name, so the same person lines up across sources that
//! never exchanged identifiers.

use folio_common::canonical::sha1_hex;
use serde_json::{json, Value};

/// Attach `ids.bbb` to every `contributors` element that has a
/// `names.display` string and no such id yet. Runs on the raw document,
/// before annotation, so the attached id is stamped like any other leaf.
pub fn attach_contributor_ids(doc: &mut Value) {
    let Some(contributors) = doc
        .get_mut("contributors")
        .and_then(Value::as_array_mut)
    else {
        return;
    };

    for element in contributors {
        let Some(display) = element
            .get("names")
            .and_then(|names| names.get("display"))
            .and_then(Value::as_str)
        else {
            continue;
        };
        if element
            .get("ids")
            .and_then(|ids| ids.get("bbb"))
            .is_some()
        {
            continue;
        }

        let id = sha1_hex(display.as_bytes());
        match element.get_mut("ids") {
            Some(Value::Object(ids)) => {
                ids.insert("bbb".to_string(), Value::String(id));
            }
            _ => {
                element["ids"] = json!({"bbb": id});
            }
        }
    }
}
