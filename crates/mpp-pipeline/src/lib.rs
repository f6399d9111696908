//! MPP Pipeline: vertical refinement of one user goal.
//!
//! # Flow
//!
//! ```text
//! goal → Architect ⟲ validate → Bundle (stable?) → Executor ⟲ QA → Response
//!            ↑                                                     │
//!            └────────────── FeedbackTrace (on failure) ───────────┘
//! ```
//!
//! The architect loop redrafts until two consecutive valid bundles are
//! equal. The executor loop either waits for a QA pass (open world) or for
//! two equal normalized responses (closed world). A failed execution is
//! recorded in the feedback trace and the architect runs again with it.

pub mod architect;
pub mod executor;
pub mod feedback;
pub mod pipeline;
pub mod scope;
pub mod step;

pub use architect::{assemble_bundle, refinement_prompt, BundleRequest};
pub use executor::{extract_reasoning, normalize_response, response_text};
pub use feedback::{FeedbackEvent, FeedbackKind, FeedbackTrace};
pub use pipeline::VerticalPipeline;
pub use scope::FeedbackScope;
pub use step::{
    BundleResult, ExecutionFailure, ExecutionResult, PipelineFailure, RunOptions, VerticalOutcome,
    VerticalStep,
};
