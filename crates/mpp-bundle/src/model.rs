//! Typed bundle model.
//!
//! Only validated values are turned into a [`Bundle`]; structural equality of
//! two bundles ignores key insertion order.

use crate::json;
use crate::validate::validate;
use crate::violation::{Violation, ViolationRule};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    pub meta_protocol_version: String,
    pub derivative_protocol_specification: ProtocolSpec,
    /// Tag to value, in the order the architect emitted it.
    pub derivative_protocol_payload: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProtocolSpec {
    pub protocol_name: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub tag_definition_schema: Vec<String>,
    pub core_tag_library: Map<String, Value>,
    pub processor_semantics: Map<String, Value>,
    pub guiding_principles: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload_order: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processor_pipeline: Option<Vec<String>>,
}

impl Bundle {
    /// Validates `value` and decodes it.
    pub fn from_value(value: &Value) -> Result<Self, Violation> {
        validate(value)?;
        serde_json::from_value(value.clone())
            .map_err(|e| Violation::new(ViolationRule::Malformed, "bundle", e.to_string()))
    }

    pub fn to_value(&self) -> Value {
        let mut root = Map::new();
        root.insert(
            "meta_protocol_version".to_string(),
            Value::String(self.meta_protocol_version.clone()),
        );
        root.insert(
            "derivative_protocol_specification".to_string(),
            self.derivative_protocol_specification.to_value(),
        );
        root.insert(
            "derivative_protocol_payload".to_string(),
            Value::Object(self.derivative_protocol_payload.clone()),
        );
        Value::Object(root)
    }

    pub fn digest(&self) -> String {
        json::digest(&self.to_value())
    }

    /// Distinct processors used by the payload, in first-use order.
    pub fn processor_sequence(&self) -> Vec<String> {
        self.derivative_protocol_specification
            .processors_for(self.derivative_protocol_payload.keys().map(String::as_str))
    }
}

impl ProtocolSpec {
    pub fn to_value(&self) -> Value {
        let mut spec = Map::new();
        spec.insert("protocol_name".to_string(), Value::String(self.protocol_name.clone()));
        spec.insert("abstract".to_string(), Value::String(self.abstract_text.clone()));
        spec.insert(
            "tag_definition_schema".to_string(),
            Value::Array(
                self.tag_definition_schema
                    .iter()
                    .cloned()
                    .map(Value::String)
                    .collect(),
            ),
        );
        spec.insert("core_tag_library".to_string(), Value::Object(self.core_tag_library.clone()));
        spec.insert(
            "processor_semantics".to_string(),
            Value::Object(self.processor_semantics.clone()),
        );
        spec.insert(
            "guiding_principles".to_string(),
            Value::Object(self.guiding_principles.clone()),
        );
        if let Some(order) = &self.payload_order {
            spec.insert("payload_order".to_string(), string_array(order));
        }
        if let Some(pipeline) = &self.processor_pipeline {
            spec.insert("processor_pipeline".to_string(), string_array(pipeline));
        }
        Value::Object(spec)
    }

    /// A tag is required unless its definition sets `required: false`.
    pub fn is_required(&self, tag: &str) -> bool {
        self.core_tag_library
            .get(tag)
            .and_then(|def| def.get("required"))
            .and_then(Value::as_bool)
            .unwrap_or(true)
    }

    pub fn processor_of(&self, tag: &str) -> Option<&str> {
        self.core_tag_library
            .get(tag)
            .and_then(|def| def.get("processor"))
            .and_then(Value::as_str)
    }

    fn processors_for<'a>(&self, tags: impl Iterator<Item = &'a str>) -> Vec<String> {
        let mut seen: Vec<String> = Vec::new();
        for tag in tags {
            if let Some(processor) = self.processor_of(tag) {
                if !seen.iter().any(|p| p == processor) {
                    seen.push(processor.to_string());
                }
            }
        }
        seen
    }
}

fn string_array(items: &[String]) -> Value {
    Value::Array(items.iter().cloned().map(Value::String).collect())
}
