//! Canonical JSON serialization and source hashing
//!
//! History keys, current keys, classification equality and source hashes all
//! depend on a byte-stable serialization: object keys sorted, no whitespace,
//! numbers in serde_json's deterministic shortest form.

use serde_json::Value;
use sha1::{Digest, Sha1};

/// Serialize a document to its canonical form.
///
/// Objects are emitted with keys in ascending order regardless of input
/// order, so two structurally equal documents always produce identical
/// bytes.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        // Scalar Display is already compact and deterministic (itoa/ryu).
        other => out.push_str(&other.to_string()),
    }
}

/// SHA-1 of a byte slice, lowercase hex.
pub fn sha1_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(40);
    for byte in digest {
        use std::fmt::Write;
        let _ = write!(hex, "{:02x}", byte);
    }
    hex
}

/// Content hash of a source stamp: SHA-1 over its canonical serialization.
///
/// Identifies one source-version; two retransmits with identical stamps hash
/// identically.
pub fn source_hash(stamp: &Value) -> String {
    sha1_hex(canonical_json(stamp).as_bytes())
}

/// True when a string looks like a lowercase SHA-1 hex digest.
pub fn is_hash_key(s: &str) -> bool {
    s.len() == 40 && s.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase())
}
