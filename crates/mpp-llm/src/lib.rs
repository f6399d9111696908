//! MPP LLM: HTTP text generation and model-backed role generators.
//!
//! [`HttpTextGenerator`] speaks the OpenAI chat-completions dialect with
//! retry, backoff and model fallback. [`LlmGenerator`] wraps any
//! [`TextGenerator`](mpp_core::TextGenerator) into a pipeline
//! [`Generator`](mpp_core::Generator) for one role.
//!
//! ```no_run
//! use mpp_llm::{BackendConfig, HttpTextGenerator, LlmGenerator};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), mpp_core::MppError> {
//! let config = BackendConfig::default().with_api_key("sk-...");
//! let backend = Arc::new(HttpTextGenerator::new(&config)?);
//! let architect = LlmGenerator::architect(backend, config.params(None));
//! # let _ = architect;
//! # Ok(())
//! # }
//! ```

mod config;
mod generator;
mod http;

pub use config::{BackendConfig, DEFAULT_BASE_URL};
pub use generator::{role_primer, LlmGenerator, DEFAULT_PROTOCOL_SUMMARY};
pub use http::{assistant_text, backoff_delay, parse_retry_after, HttpTextGenerator};
