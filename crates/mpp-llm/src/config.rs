//! Backend connection settings.

use mpp_core::{GenerationParams, MppError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// OpenAI-compatible API root; `/chat/completions` is appended.
    pub base_url: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub model: String,
    pub fallback_models: Vec<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub timeout_secs: u64,
    pub retries: u32,
    pub base_delay_ms: u64,
}

impl BackendConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, MppError> {
        let config: Self = serde_yaml::from_str(yaml).map_err(|e| MppError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), MppError> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(MppError::Config(format!("base_url must be an http(s) URL: {}", self.base_url)));
        }
        if self.model.trim().is_empty() {
            return Err(MppError::Config("model must not be empty".to_string()));
        }
        if self.timeout_secs == 0 {
            return Err(MppError::Config("timeout_secs must be positive".to_string()));
        }
        Ok(())
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Generation parameters for the configured model, or an override.
    pub fn params(&self, model: Option<&str>) -> GenerationParams {
        GenerationParams {
            model: model.unwrap_or(&self.model).to_string(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            timeout: Duration::from_secs(self.timeout_secs),
            retries: self.retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            fallback_models: self.fallback_models.clone(),
        }
    }

    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            model: GenerationParams::default().model,
            fallback_models: Vec::new(),
            temperature: None,
            max_tokens: None,
            timeout_secs: 60,
            retries: 2,
            base_delay_ms: 500,
        }
    }
}
