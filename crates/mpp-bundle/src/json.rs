//! JSON helpers shared by the pipeline stages.
//!
//! Generators wrap JSON in markdown fences, pad it with prose and emit keys in
//! arbitrary order. These helpers recover the object and give it one stable
//! encoding.

use serde_json::{Map, Value};
use std::fmt::Write;

/// Removes a surrounding markdown code fence, including its language tag.
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }

    let mut lines: Vec<&str> = trimmed.lines().collect();
    lines.remove(0);
    if lines
        .last()
        .map(|line| line.trim_start().starts_with("```"))
        .unwrap_or(false)
    {
        lines.pop();
    }
    lines.join("\n").trim().to_string()
}

/// Best-effort parse of a JSON object out of model output.
///
/// Tries the fence-stripped text first, then the span between the first `{`
/// and the last `}`.
pub fn parse_json_object(text: &str) -> Option<Map<String, Value>> {
    let stripped = strip_code_fences(text);
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&stripped) {
        return Some(map);
    }

    let start = stripped.find('{')?;
    let end = stripped.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&stripped[start..=end]) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Deep copy with every object's keys in sorted order.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::with_capacity(map.len());
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key.as_str()]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Sorted keys, no whitespace, ASCII only. Equal logical values encode to
/// equal strings.
pub fn canonical_json(value: &Value) -> String {
    escape_non_ascii(&canonicalize(value).to_string())
}

// Non-ASCII can only occur inside JSON strings, where `\uXXXX` is valid.
fn escape_non_ascii(encoded: &str) -> String {
    let mut out = String::with_capacity(encoded.len());
    let mut units = [0u16; 2];
    for c in encoded.chars() {
        if c.is_ascii() {
            out.push(c);
            continue;
        }
        for unit in c.encode_utf16(&mut units) {
            let _ = write!(out, "\\u{:04x}", unit);
        }
    }
    out
}

/// `blake3:<hex>` over the canonical encoding.
pub fn digest(value: &Value) -> String {
    format!("blake3:{}", blake3::hash(canonical_json(value).as_bytes()))
}
