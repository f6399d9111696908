//! MPP Longitudinal: dataset-level refinement of prompt templates.
//!
//! A template carries named mutable blocks. The refiner scores the template
//! over a set of cases, asks a [`MutationPolicy`] for new block contents,
//! re-scores, and keeps a candidate only when it beats the best score so far.
//!
//! ```text
//! template ─extract─▶ blocks ─render─▶ candidate ─score─▶ traces
//!                        ▲                                  │
//!                        └──────────── propose ◀────────────┘
//! ```

mod case;
mod config;
pub mod mutation;
mod refiner;
mod scorer;

pub use case::Case;
pub use config::LongitudinalConfig;
pub use mutation::{DefaultMutator, MutationPolicy, MutationRequest, DEFAULT_MUTABLE_KEYS, ENTRY_PROMPT};
pub use refiner::{LongitudinalRefiner, LongitudinalResult, LongitudinalScore, LongitudinalStep, ScoreFunction};
pub use scorer::{compose_goal, PipelineScorer, ProgramFactory};
