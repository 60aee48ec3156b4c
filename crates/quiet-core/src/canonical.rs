//! Canonical event serialization.
//!
//! # Invariants
//!
//! - Object keys are emitted in ascending byte order, recursively.
//! - Output is compact (no whitespace), so the same logical event always
//!   produces identical bytes regardless of field declaration order or
//!   map-ordering features in any serde backend.
//! - `canonical_bytes` is the sole input to both signing and event-id
//!   hashing.

use crate::errors::{QuietError, Result};
use serde::Serialize;
use serde_json::Value;

/// Serialize a value to canonical sorted-key JSON bytes.
pub fn canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let value = serde_json::to_value(value)
        .map_err(|e| QuietError::serialization(format!("canonicalize: {e}")))?;
    let mut out = Vec::new();
    write_canonical(&value, &mut out)?;
    Ok(out)
}

fn write_canonical(value: &Value, out: &mut Vec<u8>) -> Result<()> {
    match value {
        Value::Object(map) => {
            out.push(b'{');
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_scalar(&Value::String((*key).clone()), out)?;
                out.push(b':');
                // Key presence is guaranteed by the iteration above.
                if let Some(v) = map.get(*key) {
                    write_canonical(v, out)?;
                }
            }
            out.push(b'}');
            Ok(())
        }
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical(item, out)?;
            }
            out.push(b']');
            Ok(())
        }
        scalar => write_scalar(scalar, out),
    }
}

fn write_scalar(value: &Value, out: &mut Vec<u8>) -> Result<()> {
    let rendered = serde_json::to_vec(value)
        .map_err(|e| QuietError::serialization(format!("canonical scalar: {e}")))?;
    out.extend_from_slice(&rendered);
    Ok(())
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_keys_sorted_recursively() {
        let value = json!({"b": 1, "a": {"z": true, "m": [2, {"y": 0, "x": 1}]}});
        let bytes = canonical_bytes(&value).expect("canonical");
        assert_eq!(
            String::from_utf8(bytes).expect("utf8"),
            r#"{"a":{"m":[2,{"x":1,"y":0}],"z":true},"b":1}"#
        );
    }

    #[test]
    fn test_string_escaping_preserved() {
        let value = json!({"content": "line\n\"quoted\""});
        let bytes = canonical_bytes(&value).expect("canonical");
        assert_eq!(
            String::from_utf8(bytes).expect("utf8"),
            r#"{"content":"line\n\"quoted\""}"#
        );
    }

    proptest! {
        // Canonical bytes must not depend on insertion order.
        #[test]
        fn prop_insertion_order_irrelevant(
            entries in proptest::collection::btree_map("[a-z]{1,8}", 0i64..1000, 1..8)
        ) {
            let forward: serde_json::Map<String, serde_json::Value> = entries
                .iter()
                .map(|(k, v)| (k.clone(), json!(v)))
                .collect();
            let reverse: serde_json::Map<String, serde_json::Value> = entries
                .iter()
                .rev()
                .map(|(k, v)| (k.clone(), json!(v)))
                .collect();
            prop_assert_eq!(
                canonical_bytes(&Value::Object(forward)).expect("canonical"),
                canonical_bytes(&Value::Object(reverse)).expect("canonical")
            );
        }
    }
}
