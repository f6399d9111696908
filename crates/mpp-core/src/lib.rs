//! MPP Core: generator seams, error model and run configuration.
//!
//! The refinement stages never talk to a model directly. Each stage receives a
//! [`Generator`] for its [`Role`] and exchanges typed [`GeneratorInput`] and
//! [`Prediction`] values with it; LLM-backed generators sit on top of a
//! [`TextGenerator`] backend.

pub mod backend;
pub mod config;
pub mod context;
pub mod error;
pub mod generator;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use backend::{
    is_retryable_status, ChatMessage, GenerationError, GenerationParams, MessageRole,
    TextGenerator,
};
pub use config::RefinementConfig;
pub use context::RunContext;
pub use error::MppError;
pub use generator::{
    FeedbackSink, Generator, GeneratorInput, Prediction, QaFeedback, QaResult, Role,
};

/// Meta-protocol version generators are asked to target.
pub const MPP_VERSION: &str = "1.3.0";
