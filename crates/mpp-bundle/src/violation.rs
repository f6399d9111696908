//! Violation types for bundle validation

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The rule a bundle broke. Serialized as its snake_case code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationRule {
    NotAMapping,
    MissingKeys,
    WrongType,
    UnknownKeys,
    TagMissingFields,
    UndefinedProcessor,
    DuplicateEntries,
    UndefinedTag,
    UnknownPayloadTags,
    MissingRequiredTags,
    PayloadOrderMismatch,
    ProcessorPipelineMismatch,
    Malformed,
}

impl ViolationRule {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotAMapping => "not_a_mapping",
            Self::MissingKeys => "missing_keys",
            Self::WrongType => "wrong_type",
            Self::UnknownKeys => "unknown_keys",
            Self::TagMissingFields => "tag_missing_fields",
            Self::UndefinedProcessor => "undefined_processor",
            Self::DuplicateEntries => "duplicate_entries",
            Self::UndefinedTag => "undefined_tag",
            Self::UnknownPayloadTags => "unknown_payload_tags",
            Self::MissingRequiredTags => "missing_required_tags",
            Self::PayloadOrderMismatch => "payload_order_mismatch",
            Self::ProcessorPipelineMismatch => "processor_pipeline_mismatch",
            Self::Malformed => "malformed",
        }
    }
}

impl fmt::Display for ViolationRule {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// First violated invariant of a bundle.
///
/// The display form is fed back to the architect verbatim, so it names both
/// the field and the rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{message} (field: {field}, rule: {rule})")]
pub struct Violation {
    pub rule: ViolationRule,
    /// Dotted path of the offending field, e.g. `core_tag_library.$task`.
    pub field: String,
    pub message: String,
}

impl Violation {
    pub fn new(rule: ViolationRule, field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            rule,
            field: field.into(),
            message: message.into(),
        }
    }
}
