//! Best-effort extraction of human-readable detail from error bodies.
//!
//! Parsing is explicit and typed: a handful of well-known JSON keys, then a
//! raw-body fallback. No reflection, no schema.

use crate::error::FieldError;
use serde_json::Value;

/// Top-level keys probed for a message, in priority order.
const MESSAGE_KEYS: &[&str] = &[
    "message",
    "error",
    "detail",
    "title",
    "errorMessage",
    "error_description",
];

/// Extracts an error message from a JSON body, trying the well-known keys in
/// order. Returns `None` when the body is not JSON or carries none of them.
pub fn extract_message(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    let obj = value.as_object()?;
    for key in MESSAGE_KEYS {
        match obj.get(*key) {
            Some(Value::String(s)) if !s.is_empty() => return Some(s.clone()),
            _ => {}
        }
    }
    None
}

/// Extracts the message, falling back to the raw body text when nothing
/// structured is found.
pub fn message_or_body(body: &[u8], fallback: &str) -> String {
    if let Some(msg) = extract_message(body) {
        return msg;
    }
    let raw = String::from_utf8_lossy(body);
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Extracts field-level validation errors.
///
/// Understands, in order: Spring-style `errors[]` (field/defaultMessage),
/// RFC 7807 `invalid-params[]` (name/reason), and a plain
/// `validationErrors[]` (field/message) list.
pub fn extract_field_errors(body: &[u8]) -> Vec<FieldError> {
    let Ok(value) = serde_json::from_slice::<Value>(body) else {
        return Vec::new();
    };
    let Some(obj) = value.as_object() else {
        return Vec::new();
    };

    if let Some(items) = obj.get("errors").and_then(Value::as_array) {
        let parsed = collect(items, "field", &["defaultMessage", "message"]);
        if !parsed.is_empty() {
            return parsed;
        }
    }
    if let Some(items) = obj.get("invalid-params").and_then(Value::as_array) {
        let parsed = collect(items, "name", &["reason"]);
        if !parsed.is_empty() {
            return parsed;
        }
    }
    if let Some(items) = obj.get("validationErrors").and_then(Value::as_array) {
        return collect(items, "field", &["message"]);
    }
    Vec::new()
}

fn collect(items: &[Value], field_key: &str, message_keys: &[&str]) -> Vec<FieldError> {
    items
        .iter()
        .filter_map(|item| {
            let obj = item.as_object()?;
            let field = obj.get(field_key)?.as_str()?.to_string();
            let message = message_keys
                .iter()
                .find_map(|k| obj.get(*k).and_then(Value::as_str))
                .unwrap_or("invalid value")
                .to_string();
            Some(FieldError { field, message })
        })
        .collect()
}
