//! Canonical JSON rendering.
//!
//! Every durable artifact (journal lines, KV values, the stdout report) is
//! written as compact JSON with sorted keys and a single trailing newline so
//! that identical state always produces identical bytes.

use serde::Serialize;

/// Render a value as a single canonical JSON line (sorted keys, compact
/// separators, trailing newline).
pub fn to_canonical_line<T: Serialize>(value: &T) -> serde_json::Result<String> {
    // Round-tripping through Value sorts object keys: serde_json's Map is
    // BTreeMap-backed unless the preserve_order feature is enabled.
    let value = serde_json::to_value(value)?;
    let mut out = serde_json::to_string(&value)?;
    out.push('\n');
    Ok(out)
}

/// Render a value as compact canonical JSON without the trailing newline.
pub fn to_canonical_string<T: Serialize>(value: &T) -> serde_json::Result<String> {
    let value = serde_json::to_value(value)?;
    serde_json::to_string(&value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_keys_are_sorted() {
        let value = json!({"zeta": 1, "alpha": 2, "mid": {"b": 1, "a": 2}});
        let line = to_canonical_line(&value).unwrap();
        assert_eq!(line, "{\"alpha\":2,\"mid\":{\"a\":2,\"b\":1},\"zeta\":1}\n");
    }

    #[test]
    fn test_compact_separators() {
        let value = json!({"k": [1, 2, 3]});
        assert_eq!(to_canonical_string(&value).unwrap(), "{\"k\":[1,2,3]}");
    }

    #[test]
    fn test_struct_fields_sorted() {
        #[derive(serde::Serialize)]
        struct Sample {
            z_field: u32,
            a_field: u32,
        }
        let line = to_canonical_line(&Sample { z_field: 1, a_field: 2 }).unwrap();
        assert_eq!(line, "{\"a_field\":2,\"z_field\":1}\n");
    }
}
