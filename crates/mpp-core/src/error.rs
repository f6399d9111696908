//! Unified error model for MPP refinement
use crate::backend::GenerationError;
use crate::generator::Role;
use mpp_bundle::Violation;
use mpp_template::TemplateError;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MppError {
    #[error(transparent)]
    MalformedTemplate(#[from] TemplateError),

    #[error("TEMPLATE/NO_BLOCKS: template has no mutable blocks to optimize")]
    NoMutableBlocks,

    #[error("BUNDLE/{0}")]
    BundleInvalid(#[from] Violation),

    #[error("FIELD/MISSING: {role} output is missing required field `{field}`")]
    MissingField { role: Role, field: String },

    #[error("REASONING/MISSING: executor is configured for chain-of-thought but no reasoning was returned")]
    MissingReasoning,

    #[error(
        "ARCHITECT/EXHAUSTED: failed to produce a valid MPP bundle after {iterations} iterations. Last error: {}",
        .last_error.as_deref().unwrap_or("none")
    )]
    ArchitectExhausted {
        iterations: usize,
        last_error: Option<String>,
        /// Last bundle the architect produced, valid or not.
        last_attempt: Option<Value>,
    },

    #[error("QA/NOT_CONFIGURED: open-world execution requires a QA generator")]
    QaNotConfigured,

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("CONFIG/{0}")]
    Config(String),

    #[error("SERIALIZE/{0}")]
    Serialization(#[from] serde_json::Error),
}
