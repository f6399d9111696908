use crate::json::strip_code_fences;
use serde_json::Value;

const EMBEDDED_FIELDS: [&str; 2] = [
    "derivative_protocol_specification",
    "derivative_protocol_payload",
];

/// Decodes spec/payload fields that a generator emitted as JSON text.
///
/// Text that does not decode to a JSON object is left as is, so the
/// validator still reports it against the right field.
pub fn normalize(bundle: Value) -> Value {
    let mut root = match bundle {
        Value::Object(map) => map,
        other => return other,
    };

    for field in EMBEDDED_FIELDS {
        let decoded = match root.get(field) {
            Some(Value::String(text)) => decode_object(text),
            _ => None,
        };
        if let Some(value) = decoded {
            root.insert(field.to_string(), value);
        }
    }

    Value::Object(root)
}

fn decode_object(text: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(&strip_code_fences(text)) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}
