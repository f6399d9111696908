//! Text-generation backend seam.
//!
//! A backend turns a role-tagged conversation into text. Retry, backoff and
//! model fallback are the backend's job; stages only see the final text or a
//! [`GenerationError`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Per-call generation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub timeout: Duration,
    /// Extra attempts per model after the first one.
    pub retries: u32,
    /// Backoff base; attempt `n` waits `base_delay * 2^n`.
    pub base_delay: Duration,
    /// Tried in order when a model is refused.
    pub fallback_models: Vec<String>,
}

impl GenerationParams {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, retries: u32, base_delay: Duration) -> Self {
        self.retries = retries;
        self.base_delay = base_delay;
        self
    }

    pub fn with_fallback_models(mut self, models: Vec<String>) -> Self {
        self.fallback_models = models;
        self
    }

    /// Primary model followed by distinct, non-empty fallbacks.
    pub fn models(&self) -> Vec<String> {
        let mut models: Vec<String> = Vec::new();
        for model in std::iter::once(&self.model).chain(self.fallback_models.iter()) {
            let model = model.trim();
            if !model.is_empty() && !models.iter().any(|m| m == model) {
                models.push(model.to_string());
            }
        }
        models
    }
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: None,
            max_tokens: None,
            timeout: Duration::from_secs(60),
            retries: 2,
            base_delay: Duration::from_millis(500),
            fallback_models: Vec::new(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("GENERATION/TIMEOUT: model {model} did not answer within {seconds}s")]
    Timeout { model: String, seconds: u64 },

    #[error("GENERATION/NETWORK: {0}")]
    Network(String),

    #[error("GENERATION/HTTP: status {status}: {body}")]
    Http { status: u16, body: String },

    #[error("GENERATION/FORBIDDEN: model {model} refused with status {status}")]
    Forbidden { status: u16, model: String },

    #[error("GENERATION/MALFORMED: {0}")]
    MalformedOutput(String),

    #[error("GENERATION/NO_MODELS: no model configured")]
    NoModels,

    #[error("GENERATION/EXHAUSTED: {0}")]
    Exhausted(String),
}

impl GenerationError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Network(_) => true,
            Self::Http { status, .. } => is_retryable_status(*status),
            _ => false,
        }
    }
}

/// 408, 409, 429 and every 5xx.
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 409 | 429) || status >= 500
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> Result<String, GenerationError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_models_unique_in_order() {
        let params = GenerationParams::new("a").with_fallback_models(vec![
            "b".to_string(),
            "a".to_string(),
            " ".to_string(),
            "c".to_string(),
            "b".to_string(),
        ]);
        assert_eq!(params.models(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_retryable_statuses() {
        for status in [408, 409, 429, 500, 502, 503] {
            assert!(is_retryable_status(status), "{}", status);
        }
        for status in [400, 401, 403, 404, 422] {
            assert!(!is_retryable_status(status), "{}", status);
        }
    }

    #[test]
    fn test_error_retryability() {
        assert!(GenerationError::Network("reset".to_string()).is_retryable());
        assert!(!GenerationError::Forbidden {
            status: 403,
            model: "m".to_string()
        }
        .is_retryable());
        assert!(!GenerationError::MalformedOutput("x".to_string()).is_retryable());
    }
}
