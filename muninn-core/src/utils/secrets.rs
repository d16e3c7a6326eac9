//! Secret masking for log output.
//!
//! Any structured log field whose key matches the sensitive vocabulary is
//! rendered as its first three characters followed by `*****`. Masking is
//! applied recursively so nested request payloads are covered too.

use serde_json::Value;

/// Field names (case-insensitive substring match) that must be masked.
const SENSITIVE_FIELDS: &[&str] = &[
    "key",
    "secret",
    "token",
    "password",
    "api_key",
    "api_secret",
    "apikey",
    "apisecret",
];

/// Mask a single value: first 3 chars + `*****`.
pub fn mask_value(value: &str) -> String {
    if value.len() <= 3 {
        format!("{value}*****")
    } else {
        format!("{}*****", &value[..3])
    }
}

/// Whether a field key is considered sensitive.
pub fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_lowercase();
    SENSITIVE_FIELDS.iter().any(|s| lower.contains(s))
}

/// Recursively mask sensitive fields in a JSON value. Returns a new value,
/// the input is not mutated.
pub fn mask_sensitive(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| {
                    if is_sensitive_key(k) {
                        let rendered = match v {
                            Value::String(s) => mask_value(s),
                            other => mask_value(&other.to_string()),
                        };
                        (k.clone(), Value::String(rendered))
                    } else {
                        (k.clone(), mask_sensitive(v))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(mask_sensitive).collect()),
        other => other.clone(),
    }
}
