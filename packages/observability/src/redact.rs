//! Credential redaction for structured log fields.

use serde_json::{Map, Value};

/// Replacement written in place of a redacted value.
pub const REDACTED: &str = "[REDACTED]";

const DENYLIST_KEYS: &[&str] = &[
    "ott",
    "token",
    "secret",
    "password",
    "cookie",
    "authorization",
    "api_key",
    "apikey",
];

const MAX_FIELD_LEN: usize = 512;

/// Returns true when a field name denotes a credential.
pub fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    DENYLIST_KEYS.iter().any(|entry| lower.contains(entry))
}

/// Sanitize a field value for output, recursing into objects and arrays.
pub fn sanitize_value(key: &str, value: &Value) -> Value {
    if is_sensitive_key(key) {
        return Value::String(REDACTED.to_string());
    }

    match value {
        Value::String(s) => sanitize_string(s),
        Value::Object(map) => {
            let mut out = Map::new();
            for (k, v) in map {
                out.insert(k.clone(), sanitize_value(k, v));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| sanitize_value(key, item))
                .collect::<Vec<_>>(),
        ),
        _ => value.clone(),
    }
}

fn sanitize_string(raw: &str) -> Value {
    if looks_like_sensitive_value(raw) {
        return Value::String(REDACTED.to_string());
    }
    if raw.len() > MAX_FIELD_LEN {
        return Value::String(format!("[TRUNCATED:len={}]", raw.len()));
    }
    Value::String(raw.to_string())
}

fn looks_like_sensitive_value(raw: &str) -> bool {
    let lower = raw.to_ascii_lowercase();
    if lower.starts_with("bearer ") {
        return true;
    }
    // JWT shape: three dot-separated segments
    if raw.matches('.').count() == 2 && raw.len() > 40 {
        return true;
    }
    is_long_hex(raw)
}

fn is_long_hex(value: &str) -> bool {
    value.len() > 48 && value.chars().all(|c| c.is_ascii_hexdigit())
}
