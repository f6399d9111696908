//! Mutation policies: proposals for new block contents between scoring rounds.

use crate::case::Case;
use crate::refiner::LongitudinalStep;
use async_trait::async_trait;
use mpp_bundle::json::parse_json_object;
use mpp_core::{ChatMessage, GenerationParams, MppError, TextGenerator};
use mpp_quality::LongitudinalTrace;
use mpp_template::Blocks;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Block anchoring fidelity to the raw goal; never proposed for mutation.
pub const ENTRY_PROMPT: &str = "entry_prompt";

pub const DEFAULT_MUTABLE_KEYS: [&str; 3] = ["strategy_payload", "architect_primer", "executor_primer"];

/// Everything a policy may look at when proposing.
#[derive(Debug, Clone, Copy)]
pub struct MutationRequest<'a> {
    pub blocks: &'a Blocks,
    pub cases: &'a [Case],
    /// Traces of the currently accepted blocks.
    pub traces: &'a [LongitudinalTrace],
    pub history: &'a [LongitudinalStep],
}

#[async_trait]
pub trait MutationPolicy: Send + Sync {
    /// Replacement contents for some subset of blocks. An empty mapping is a no-op.
    async fn propose(&self, request: &MutationRequest<'_>) -> Result<Blocks, MppError>;
}

/// Asks a text generator for new primers and strategy text.
pub struct DefaultMutator {
    backend: Arc<dyn TextGenerator>,
    params: GenerationParams,
    max_sentences: usize,
    allowed_keys: Vec<String>,
}

impl DefaultMutator {
    pub fn new(backend: Arc<dyn TextGenerator>, params: GenerationParams) -> Self {
        Self {
            backend,
            params,
            max_sentences: 3,
            allowed_keys: DEFAULT_MUTABLE_KEYS.iter().map(|k| k.to_string()).collect(),
        }
    }

    pub fn with_max_sentences(mut self, max_sentences: usize) -> Self {
        self.max_sentences = max_sentences;
        self
    }

    /// `entry_prompt` is dropped from the list even when given.
    pub fn with_allowed_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_keys = keys
            .into_iter()
            .map(Into::into)
            .filter(|key| key != ENTRY_PROMPT)
            .collect();
        self
    }

    pub fn allowed_keys(&self) -> &[String] {
        &self.allowed_keys
    }

    pub fn prompt(&self, request: &MutationRequest<'_>) -> String {
        let keys = self.allowed_keys.join(", ");
        let blocks = serde_json::to_string_pretty(request.blocks).unwrap_or_default();
        let mut prompt = format!(
            "You are optimizing prompt primers for an MPP system. \
             Do not modify {ENTRY_PROMPT}; keep it fixed. \
             You may update {keys}. \
             These texts are prepended before the user goal or used as role primers. \
             Keep each block short (<= {} sentences).\
             \n\nCurrent blocks:\n{blocks}\
             \n\nDataset goals:\n{}\n\n",
            self.max_sentences,
            summarize_cases(request.cases),
        );

        let traces = summarize_traces(request.traces);
        if !traces.is_empty() {
            prompt.push_str(&format!("Recent vertical traces:\n{}\n\n", traces));
        }
        if let Some(history) = summarize_history(request.history) {
            prompt.push_str(&format!("Longitudinal score history: {}\n\n", history));
        }
        prompt.push_str(&format!("Return JSON with keys: {}.", keys));
        prompt
    }
}

#[async_trait]
impl MutationPolicy for DefaultMutator {
    async fn propose(&self, request: &MutationRequest<'_>) -> Result<Blocks, MppError> {
        let messages = [ChatMessage::user(self.prompt(request))];
        let reply = self.backend.complete(&messages, &self.params).await?;

        let Some(payload) = parse_json_object(&reply) else {
            debug!(reply_chars = reply.len(), "mutator reply is not a JSON object, proposing nothing");
            return Ok(Blocks::new());
        };

        let mut proposal = Blocks::new();
        for key in &self.allowed_keys {
            let text = match payload.get(key) {
                None | Some(Value::Null) => continue,
                Some(Value::String(text)) => text.clone(),
                Some(other) => other.to_string(),
            };
            proposal.insert(key.clone(), limit_sentences(&text, self.max_sentences));
        }
        Ok(proposal)
    }
}

/// Keep the first `max` sentences; `0` keeps everything.
pub fn limit_sentences(text: &str, max: usize) -> String {
    let text = text.trim();
    if max == 0 {
        return text.to_string();
    }

    let mut count = 0;
    for (i, c) in text.char_indices() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        let end = i + c.len_utf8();
        if text[end..].chars().next().map_or(true, char::is_whitespace) {
            count += 1;
            if count == max {
                return text[..end].to_string();
            }
        }
    }
    text.to_string()
}

pub fn summarize_cases(cases: &[Case]) -> String {
    cases
        .iter()
        .map(|case| {
            format!(
                "- {} (open_world={}, use_cot={}):\n{}",
                case.name, case.open_world, case.use_cot, case.user_goal
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn summarize_traces(traces: &[LongitudinalTrace]) -> String {
    traces
        .iter()
        .map(|trace| {
            let mut line = format!("- {}: refinements={}", trace.case, trace.total_refinements());
            if let Some(passed) = trace.qa_passed {
                line.push_str(&format!(", qa_passed={}", passed));
            }
            if let Some(stable) = trace.bundle_stable {
                line.push_str(&format!(", bundle_stable={}", stable));
            }
            if let Some(stable) = trace.executor_stable {
                line.push_str(&format!(", executor_stable={}", stable));
            }
            let issues: Vec<&String> = trace.issues.iter().chain(&trace.errors).collect();
            if !issues.is_empty() {
                let rendered = serde_json::to_string(&issues).unwrap_or_default();
                line.push_str(&format!(", issues={}", rendered));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn summarize_history(history: &[LongitudinalStep]) -> Option<String> {
    let last = history.last()?;
    let best = history.iter().map(|step| step.score).fold(f64::NEG_INFINITY, f64::max);
    let delta = match history.len() {
        0 | 1 => 0.0,
        n => last.score - history[n - 2].score,
    };
    Some(format!(
        "last_score={:.2}, best_score={:.2}, delta={:.2}",
        last.score, best, delta
    ))
}
