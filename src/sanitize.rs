//! The single redaction point for anything that leaves the engine as a
//! structured record: log fields, error details, audit snapshots.

use serde::Serialize;
use serde_json::{json, Map, Value};
use std::fmt;

pub const REDACTED: &str = "[REDACTED]";

const SENSITIVE_KEY_PATTERNS: &[&str] = &[
    "secret",
    "token",
    "password",
    "authorization",
    "api_key",
    "apikey",
    "signature",
    "email",
    "phone",
    "contact",
    "address",
    "card",
    "cvv",
    "vpa",
];

pub fn is_sensitive_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    SENSITIVE_KEY_PATTERNS.iter().any(|p| key.contains(p))
}

pub fn redact(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(redact_map(map)),
        Value::Array(items) => Value::Array(items.iter().map(redact).collect()),
        other => other.clone(),
    }
}

pub fn redact_map(map: &Map<String, Value>) -> Map<String, Value> {
    map.iter()
        .map(|(k, v)| {
            if is_sensitive_key(k) && !v.is_null() {
                (k.clone(), Value::String(REDACTED.to_string()))
            } else {
                (k.clone(), redact(v))
            }
        })
        .collect()
}

/// Redacts a raw upstream body. JSON and form-encoded bodies are redacted by
/// key; any other text is never attached, only its length.
pub fn redact_body(raw: &str) -> Value {
    if let Ok(v) = serde_json::from_str::<Value>(raw) {
        return redact(&v);
    }
    if let Some(pairs) = form_pairs(raw) {
        return Value::Object(redact_map(&pairs));
    }
    json!({ "unparsed": true, "length": raw.len() })
}

fn form_pairs(raw: &str) -> Option<Map<String, Value>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let mut pairs = Map::new();
    for part in raw.split('&') {
        let (key, value) = part.split_once('=')?;
        if key.is_empty() || key.contains(char::is_whitespace) {
            return None;
        }
        pairs.insert(key.to_string(), Value::String(value.to_string()));
    }
    Some(pairs)
}

/// Display adapter that serializes `T` and redacts it, for use in log fields:
/// `tracing::info!(payload = %Sanitized(&body), "...")`.
pub struct Sanitized<'a, T: ?Sized>(pub &'a T);

impl<T: Serialize + ?Sized> fmt::Display for Sanitized<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_value(self.0) {
            Ok(v) => write!(f, "{}", redact(&v)),
            Err(_) => f.write_str(REDACTED),
        }
    }
}
