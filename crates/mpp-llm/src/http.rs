//! OpenAI-compatible chat-completions backend.
//!
//! Each configured model gets `1 + retries` attempts. Retryable statuses,
//! timeouts and connection errors back off exponentially; an authorization
//! refusal moves on to the next model immediately.

use crate::config::BackendConfig;
use async_trait::async_trait;
use mpp_core::{
    is_retryable_status, ChatMessage, GenerationError, GenerationParams, MppError, TextGenerator,
};
use reqwest::header::RETRY_AFTER;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

const MAX_ERROR_BODY: usize = 512;

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

/// A failed attempt and the server's requested wait, if any.
struct AttemptError {
    error: GenerationError,
    retry_after: Option<Duration>,
}

impl From<GenerationError> for AttemptError {
    fn from(error: GenerationError) -> Self {
        Self {
            error,
            retry_after: None,
        }
    }
}

pub struct HttpTextGenerator {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl HttpTextGenerator {
    pub fn new(config: &BackendConfig) -> Result<Self, MppError> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| MppError::Config(format!("http client: {}", e)))?;
        Ok(Self {
            client,
            url: config.completions_url(),
            api_key: config.api_key.clone().filter(|k| !k.trim().is_empty()),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn complete_with_model(
        &self,
        model: &str,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> Result<String, GenerationError> {
        let request = ChatRequest {
            model,
            messages,
            temperature: params.temperature,
            max_tokens: params.max_tokens,
        };
        let mut attempt = 0u32;
        loop {
            match self.send(&request, params.timeout).await {
                Ok(text) => return Ok(text),
                Err(failed) if failed.error.is_retryable() && attempt < params.retries => {
                    let delay = backoff_delay(params.base_delay, attempt, failed.retry_after);
                    warn!(
                        model,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %failed.error,
                        "Retrying generation"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(failed) => return Err(failed.error),
            }
        }
    }

    async fn send(&self, request: &ChatRequest<'_>, timeout: Duration) -> Result<String, AttemptError> {
        let mut builder = self.client.post(&self.url).timeout(timeout).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| transport_error(e, request.model, timeout))?;
        let status = response.status().as_u16();
        debug!(model = request.model, status, "Completion response");

        if !response.status().is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            let body = response.text().await.unwrap_or_default();
            let error = match status {
                401 | 403 => GenerationError::Forbidden {
                    status,
                    model: request.model.to_string(),
                },
                _ => GenerationError::Http {
                    status,
                    body: truncate(&body, MAX_ERROR_BODY),
                },
            };
            return Err(AttemptError { error, retry_after });
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| transport_error(e, request.model, timeout))?;
        assistant_text(&payload).ok_or_else(|| {
            GenerationError::MalformedOutput(format!(
                "no assistant text in response: {}",
                truncate(&payload.to_string(), MAX_ERROR_BODY)
            ))
            .into()
        })
    }
}

#[async_trait]
impl TextGenerator for HttpTextGenerator {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> Result<String, GenerationError> {
        let models = params.models();
        let mut refused = None;
        for model in &models {
            match self.complete_with_model(model, messages, params).await {
                Err(error @ GenerationError::Forbidden { .. }) => {
                    warn!(model = %model, "Model refused, trying next");
                    refused = Some(error);
                }
                other => return other,
            }
        }
        Err(refused.unwrap_or(GenerationError::NoModels))
    }
}

fn transport_error(error: reqwest::Error, model: &str, timeout: Duration) -> AttemptError {
    let error = if error.is_timeout() {
        GenerationError::Timeout {
            model: model.to_string(),
            seconds: timeout.as_secs(),
        }
    } else if error.is_decode() {
        GenerationError::MalformedOutput(error.to_string())
    } else if let Some(status) = error.status().map(|s| s.as_u16()).filter(|s| is_retryable_status(*s)) {
        GenerationError::Http {
            status,
            body: error.to_string(),
        }
    } else {
        GenerationError::Network(error.to_string())
    };
    error.into()
}

/// `base · 2^attempt`, never shorter than the server's `Retry-After`.
pub fn backoff_delay(base: Duration, attempt: u32, retry_after: Option<Duration>) -> Duration {
    let exponential = base.saturating_mul(2u32.saturating_pow(attempt));
    match retry_after {
        Some(wait) => exponential.max(wait),
        None => exponential,
    }
}

/// Delay-seconds form only; HTTP dates are ignored.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let seconds: f64 = value.trim().parse().ok()?;
    if seconds.is_finite() && seconds >= 0.0 {
        Some(Duration::from_secs_f64(seconds))
    } else {
        None
    }
}

/// Pulls the assistant text out of the response shapes seen in the wild:
/// `choices[0].message.content`, `choices[0].text`, `data`, `result`,
/// `message.content`, `content`, or the first element of a top-level list.
pub fn assistant_text(payload: &Value) -> Option<String> {
    if let Some(choice) = payload.get("choices").and_then(|c| c.get(0)) {
        let from_choice = choice
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(content_text)
            .or_else(|| choice.get("text").and_then(content_text));
        if from_choice.is_some() {
            return from_choice;
        }
    }
    for key in ["data", "result"] {
        match payload.get(key) {
            Some(Value::String(text)) if !text.is_empty() => return Some(text.clone()),
            Some(nested @ (Value::Object(_) | Value::Array(_))) => {
                if let Some(text) = assistant_text(nested) {
                    return Some(text);
                }
            }
            _ => {}
        }
    }
    if let Some(text) = payload
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(content_text)
    {
        return Some(text);
    }
    if let Some(text) = payload.get("content").and_then(content_text) {
        return Some(text);
    }
    match payload {
        Value::Array(items) => items.first().and_then(|first| match first {
            Value::String(text) if !text.is_empty() => Some(text.clone()),
            other => assistant_text(other),
        }),
        _ => None,
    }
}

/// Plain string content, or the concatenated text of content parts.
fn content_text(content: &Value) -> Option<String> {
    let text = match content {
        Value::String(text) => text.clone(),
        Value::Array(parts) => parts
            .iter()
            .filter_map(|part| match part {
                Value::String(text) => Some(text.as_str()),
                other => other.get("text").and_then(Value::as_str),
            })
            .collect::<String>(),
        _ => return None,
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_backoff_doubles_and_honors_retry_after() {
        let base = Duration::from_millis(500);
        assert_eq!(backoff_delay(base, 0, None), Duration::from_millis(500));
        assert_eq!(backoff_delay(base, 2, None), Duration::from_secs(2));
        assert_eq!(
            backoff_delay(base, 0, Some(Duration::from_secs(3))),
            Duration::from_secs(3)
        );
        assert_eq!(
            backoff_delay(base, 3, Some(Duration::from_secs(1))),
            Duration::from_secs(4)
        );
        assert_eq!(
            backoff_delay(Duration::from_secs(u64::MAX), 1, None),
            Duration::MAX
        );
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after(" 2 "), Some(Duration::from_secs(2)));
        assert_eq!(parse_retry_after("0.5"), Some(Duration::from_millis(500)));
        assert_eq!(parse_retry_after("-1"), None);
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }

    #[test]
    fn test_assistant_text_shapes() {
        let cases = [
            json!({"choices": [{"message": {"role": "assistant", "content": "a"}}]}),
            json!({"choices": [{"text": "a"}]}),
            json!({"choices": [{"message": {"content": [{"type": "text", "text": "a"}]}}]}),
            json!({"data": "a"}),
            json!({"result": {"content": "a"}}),
            json!({"message": {"content": "a"}}),
            json!({"content": "a"}),
            json!(["a", "b"]),
        ];
        for payload in cases {
            assert_eq!(assistant_text(&payload).as_deref(), Some("a"), "{}", payload);
        }
    }

    #[test]
    fn test_assistant_text_missing() {
        assert!(assistant_text(&json!({"choices": []})).is_none());
        assert!(assistant_text(&json!({"choices": [{"message": {"content": ""}}]})).is_none());
        assert!(assistant_text(&json!({"id": "x"})).is_none());
    }

    #[test]
    fn test_truncate_on_char_boundary() {
        assert_eq!(truncate("héllo", 2), "hé...");
        assert_eq!(truncate("hi", 5), "hi");
    }

    #[test]
    fn test_blank_api_key_is_dropped() {
        let generator = HttpTextGenerator::new(&BackendConfig::default().with_api_key("  ")).unwrap();
        assert!(generator.api_key.is_none());
        assert_eq!(generator.url(), "https://api.openai.com/v1/chat/completions");
    }
}
