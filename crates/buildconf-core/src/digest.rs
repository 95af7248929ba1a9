//! Canonical JSON and SHA-256 digests of loaded configuration.
//!
//! Object keys are ordered by UTF-16 code units (RFC 8785 §3.2.3); array
//! order is kept, so declared rule and step order is part of the digest.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

// Writes objects by hand: `serde_json::Map` re-sorts keys by UTF-8 bytes,
// which disagrees with UTF-16 order above U+FFFF.
fn write_canonical(value: &Value, out: &mut String) -> Result<(), serde_json::Error> {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.encode_utf16().cmp(b.encode_utf16()));

            out.push('{');
            for (i, (key, v)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key)?);
                out.push(':');
                write_canonical(v, out)?;
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out)?;
            }
            out.push(']');
        }
        scalar => out.push_str(&serde_json::to_string(scalar)?),
    }
    Ok(())
}

/// Compact canonical JSON for a value.
pub fn canonical_json(value: &Value) -> Result<String, serde_json::Error> {
    let mut out = String::new();
    write_canonical(value, &mut out)?;
    Ok(out)
}

/// SHA-256 hex digest over the canonical JSON of any serializable value.
pub fn compute_digest<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let canonical = canonical_json(&serde_json::to_value(value)?)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}
