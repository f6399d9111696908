//! Structural validation of raw bundles.
//!
//! Checks run in a fixed order and stop at the first violation: top-level
//! keys, the version type, the specification, then the payload.

use crate::violation::{Violation, ViolationRule};
use crate::BUNDLE_FIELDS;
use serde_json::{Map, Value};
use std::collections::BTreeSet;

const SPEC_FIELD: &str = "derivative_protocol_specification";
const PAYLOAD_FIELD: &str = "derivative_protocol_payload";

const SPEC_KEYS: [&str; 6] = [
    "protocol_name",
    "abstract",
    "tag_definition_schema",
    "core_tag_library",
    "processor_semantics",
    "guiding_principles",
];
const OPTIONAL_SPEC_KEYS: [&str; 2] = ["payload_order", "processor_pipeline"];

/// The parts of a checked specification the payload rules need.
struct SpecView<'a> {
    library: &'a Map<String, Value>,
    payload_order: Option<Vec<&'a str>>,
    processor_pipeline: Option<Vec<&'a str>>,
}

impl<'a> SpecView<'a> {
    fn is_required(&self, tag: &str) -> bool {
        self.library
            .get(tag)
            .and_then(|def| def.get("required"))
            .and_then(Value::as_bool)
            .unwrap_or(true)
    }

    fn processor_of(&self, tag: &str) -> Option<&'a str> {
        self.library
            .get(tag)
            .and_then(|def| def.get("processor"))
            .and_then(Value::as_str)
    }
}

/// Validates a whole raw bundle.
pub fn validate(bundle: &Value) -> Result<(), Violation> {
    let root = bundle.as_object().ok_or_else(|| {
        Violation::new(ViolationRule::NotAMapping, "bundle", "bundle must be a mapping")
    })?;

    require_keys(root, &BUNDLE_FIELDS, "bundle")?;

    if !root["meta_protocol_version"].is_string() {
        return Err(Violation::new(
            ViolationRule::WrongType,
            "meta_protocol_version",
            "meta_protocol_version must be a string",
        ));
    }

    let spec = check_spec(&root[SPEC_FIELD])?;
    check_payload(&root[PAYLOAD_FIELD], &spec)
}

/// Validates a specification on its own.
pub fn validate_spec(spec: &Value) -> Result<(), Violation> {
    check_spec(spec).map(|_| ())
}

/// Validates a payload against an already valid specification.
pub fn validate_payload(payload: &Value, spec: &Value) -> Result<(), Violation> {
    let view = check_spec(spec)?;
    check_payload(payload, &view)
}

// =============================================================================
// Specification
// =============================================================================

fn check_spec(value: &Value) -> Result<SpecView<'_>, Violation> {
    let spec = mapping(value, SPEC_FIELD)?;
    require_keys(spec, &SPEC_KEYS, SPEC_FIELD)?;

    let mut unknown: Vec<&str> = spec
        .keys()
        .map(String::as_str)
        .filter(|k| !SPEC_KEYS.contains(k) && !OPTIONAL_SPEC_KEYS.contains(k))
        .collect();
    if !unknown.is_empty() {
        unknown.sort_unstable();
        return Err(Violation::new(
            ViolationRule::UnknownKeys,
            SPEC_FIELD,
            format!("{} has unknown keys: {}", SPEC_FIELD, unknown.join(", ")),
        ));
    }

    for key in ["protocol_name", "abstract"] {
        if !spec[key].is_string() {
            return Err(Violation::new(
                ViolationRule::WrongType,
                key,
                format!("{} must be a string", key),
            ));
        }
    }

    let schema = string_list(&spec["tag_definition_schema"]).ok_or_else(|| {
        Violation::new(
            ViolationRule::WrongType,
            "tag_definition_schema",
            "tag_definition_schema must be a list of field names (e.g., [\"description\"])",
        )
    })?;
    let library = mapping(&spec["core_tag_library"], "core_tag_library")?;
    let processors = mapping(&spec["processor_semantics"], "processor_semantics")?;
    mapping(&spec["guiding_principles"], "guiding_principles")?;

    let uses_processor = schema.contains(&"processor");
    for (tag, definition) in library {
        let field = format!("core_tag_library.{}", tag);
        let definition = definition.as_object().ok_or_else(|| {
            Violation::new(
                ViolationRule::WrongType,
                field.clone(),
                format!("tag {} definition must be a mapping", tag),
            )
        })?;

        let missing: Vec<&str> = schema
            .iter()
            .copied()
            .filter(|f| !definition.contains_key(*f))
            .collect();
        if !missing.is_empty() {
            return Err(Violation::new(
                ViolationRule::TagMissingFields,
                field,
                format!("tag {} is missing required fields: {}", tag, missing.join(", ")),
            ));
        }

        if uses_processor {
            let processor = definition["processor"].as_str().ok_or_else(|| {
                Violation::new(
                    ViolationRule::WrongType,
                    format!("{}.processor", field),
                    format!("tag {} processor must be a string", tag),
                )
            })?;
            if !processors.contains_key(processor) {
                return Err(Violation::new(
                    ViolationRule::UndefinedProcessor,
                    format!("{}.processor", field),
                    format!("tag {} references undefined processor: {}", tag, processor),
                ));
            }
        }
    }

    let payload_order = match spec.get("payload_order") {
        None | Some(Value::Null) => None,
        Some(value) => {
            let order = unique_string_list(value, "payload_order")?;
            let undefined: Vec<&str> = order
                .iter()
                .copied()
                .filter(|tag| !library.contains_key(*tag))
                .collect();
            if !undefined.is_empty() {
                return Err(Violation::new(
                    ViolationRule::UndefinedTag,
                    "payload_order",
                    format!("payload_order references unknown tags: {}", undefined.join(", ")),
                ));
            }
            Some(order)
        }
    };

    let processor_pipeline = match spec.get("processor_pipeline") {
        None | Some(Value::Null) => None,
        Some(value) => {
            let pipeline = unique_string_list(value, "processor_pipeline")?;
            let undefined: Vec<&str> = pipeline
                .iter()
                .copied()
                .filter(|p| !processors.contains_key(*p))
                .collect();
            if !undefined.is_empty() {
                return Err(Violation::new(
                    ViolationRule::UndefinedProcessor,
                    "processor_pipeline",
                    format!(
                        "processor_pipeline references undefined processors: {}",
                        undefined.join(", ")
                    ),
                ));
            }
            Some(pipeline)
        }
    };

    Ok(SpecView {
        library,
        payload_order,
        processor_pipeline,
    })
}

// =============================================================================
// Payload
// =============================================================================

fn check_payload(value: &Value, spec: &SpecView<'_>) -> Result<(), Violation> {
    let payload = mapping(value, PAYLOAD_FIELD)?;

    let mut unknown: Vec<&str> = payload
        .keys()
        .map(String::as_str)
        .filter(|tag| !spec.library.contains_key(*tag))
        .collect();
    if !unknown.is_empty() {
        unknown.sort_unstable();
        return Err(Violation::new(
            ViolationRule::UnknownPayloadTags,
            PAYLOAD_FIELD,
            format!("payload includes unknown tags: {}", unknown.join(", ")),
        ));
    }

    let mut missing: Vec<&str> = spec
        .library
        .keys()
        .map(String::as_str)
        .filter(|tag| spec.is_required(tag) && !payload.contains_key(*tag))
        .collect();
    if !missing.is_empty() {
        missing.sort_unstable();
        return Err(Violation::new(
            ViolationRule::MissingRequiredTags,
            PAYLOAD_FIELD,
            format!("payload is missing required tags: {}", missing.join(", ")),
        ));
    }

    let keys: Vec<&str> = payload.keys().map(String::as_str).collect();

    if let Some(order) = &spec.payload_order {
        let expected: BTreeSet<&str> = order.iter().copied().collect();
        let found: BTreeSet<&str> = keys.iter().copied().collect();
        if expected != found {
            let absent: Vec<&str> = expected.difference(&found).copied().collect();
            let extra: Vec<&str> = found.difference(&expected).copied().collect();
            return Err(Violation::new(
                ViolationRule::PayloadOrderMismatch,
                "payload_order",
                format!(
                    "payload keys do not match payload_order (absent: [{}], extra: [{}])",
                    absent.join(", "),
                    extra.join(", ")
                ),
            ));
        }
        if keys != *order {
            return Err(Violation::new(
                ViolationRule::PayloadOrderMismatch,
                "payload_order",
                format!(
                    "payload keys must follow payload_order: expected [{}], found [{}]",
                    order.join(", "),
                    keys.join(", ")
                ),
            ));
        }
    }

    if let Some(pipeline) = &spec.processor_pipeline {
        let mut implied: Vec<&str> = Vec::new();
        for tag in &keys {
            if let Some(processor) = spec.processor_of(tag) {
                if !implied.contains(&processor) {
                    implied.push(processor);
                }
            }
        }
        if implied != *pipeline {
            return Err(Violation::new(
                ViolationRule::ProcessorPipelineMismatch,
                "processor_pipeline",
                format!(
                    "payload processors [{}] do not match processor_pipeline [{}]",
                    implied.join(", "),
                    pipeline.join(", ")
                ),
            ));
        }
    }

    Ok(())
}

// =============================================================================
// Helpers
// =============================================================================

fn require_keys(map: &Map<String, Value>, keys: &[&str], label: &str) -> Result<(), Violation> {
    let missing: Vec<&str> = keys
        .iter()
        .copied()
        .filter(|k| !map.contains_key(*k))
        .collect();
    if missing.is_empty() {
        return Ok(());
    }
    Err(Violation::new(
        ViolationRule::MissingKeys,
        label,
        format!("{} is missing required keys: {}", label, missing.join(", ")),
    ))
}

fn mapping<'a>(value: &'a Value, field: &str) -> Result<&'a Map<String, Value>, Violation> {
    value.as_object().ok_or_else(|| {
        Violation::new(
            ViolationRule::NotAMapping,
            field,
            format!("{} must be a mapping", field),
        )
    })
}

fn string_list(value: &Value) -> Option<Vec<&str>> {
    value.as_array()?.iter().map(Value::as_str).collect()
}

fn unique_string_list<'a>(value: &'a Value, field: &str) -> Result<Vec<&'a str>, Violation> {
    let items = string_list(value).ok_or_else(|| {
        Violation::new(
            ViolationRule::WrongType,
            field,
            format!("{} must be a list of strings", field),
        )
    })?;
    let mut seen = BTreeSet::new();
    let duplicates: Vec<&str> = items
        .iter()
        .copied()
        .filter(|item| !seen.insert(*item))
        .collect();
    if !duplicates.is_empty() {
        return Err(Violation::new(
            ViolationRule::DuplicateEntries,
            field,
            format!("{} has duplicate entries: {}", field, duplicates.join(", ")),
        ));
    }
    Ok(items)
}
