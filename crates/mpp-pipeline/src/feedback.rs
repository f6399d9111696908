//! Feedback trace: why earlier cycles failed.
//!
//! The trace is a persistent vector. `append` returns a new trace sharing
//! structure with the old one, so a trace handed to one cycle can never be
//! changed by another.

use crate::step::ExecutionResult;
use mpp_bundle::json::canonical_json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackKind {
    ExecutorNonconvergent,
    QaFailed,
    ExecutorException,
    BundleInvalid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackEvent {
    pub kind: FeedbackKind,
    pub summary: String,
    #[serde(default)]
    pub qa_verdict: Option<String>,
    #[serde(default)]
    pub qa_issues: Vec<String>,
    #[serde(default)]
    pub qa_repair_examples: Vec<String>,
    #[serde(default)]
    pub last_response: Option<String>,
    #[serde(default)]
    pub executor_iterations: Option<usize>,
    #[serde(default)]
    pub executor_stable: Option<bool>,
    #[serde(default)]
    pub executor_refinements: Option<usize>,
}

impl FeedbackEvent {
    pub fn new(kind: FeedbackKind, summary: impl Into<String>) -> Self {
        Self {
            kind,
            summary: summary.into(),
            qa_verdict: None,
            qa_issues: Vec::new(),
            qa_repair_examples: Vec::new(),
            last_response: None,
            executor_iterations: None,
            executor_stable: None,
            executor_refinements: None,
        }
    }

    /// Classifies a failed execution: a non-pass QA verdict is `qa_failed`,
    /// a loop whose every call errored is `executor_exception`, anything else
    /// is `executor_nonconvergent`.
    pub fn from_execution(result: &ExecutionResult) -> Self {
        let verdict = result
            .qa_result
            .as_ref()
            .map(|qa| qa.verdict.clone())
            .filter(|v| !v.trim().is_empty());

        let mut event = match &verdict {
            Some(v) if !v.trim().eq_ignore_ascii_case("pass") => {
                Self::new(FeedbackKind::QaFailed, "QA failed for executor output.")
            }
            _ if !result.produced_response() => {
                let cause = result.errors().last().unwrap_or("no response");
                Self::new(
                    FeedbackKind::ExecutorException,
                    format!("Executor raised on every attempt: {}", cause),
                )
            }
            _ => Self::new(
                FeedbackKind::ExecutorNonconvergent,
                "Executor failed to stabilize within the configured iteration cap.",
            ),
        };

        if let Some(qa) = &result.qa_result {
            event.qa_issues = qa.issues.clone();
            event.qa_repair_examples = qa.repair_examples.clone();
        }
        event.qa_verdict = verdict;
        if result.produced_response() {
            event.last_response = Some(result.final_response.clone());
        }
        event.executor_iterations = Some(result.iterations);
        event.executor_stable = Some(result.stable);
        event.executor_refinements = Some(result.refinements());
        event
    }

    pub fn bundle_invalid(error: &str) -> Self {
        Self::new(
            FeedbackKind::BundleInvalid,
            format!("Last architect attempt was rejected: {}", error),
        )
    }

    fn to_value(&self) -> Value {
        json!({
            "kind": self.kind,
            "summary": self.summary,
            "qa_verdict": self.qa_verdict,
            "qa_issues": self.qa_issues,
            "qa_repair_examples": self.qa_repair_examples,
            "last_response": self.last_response,
            "executor_iterations": self.executor_iterations,
            "executor_stable": self.executor_stable,
            "executor_refinements": self.executor_refinements,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackTrace {
    version: String,
    events: im::Vector<FeedbackEvent>,
}

impl FeedbackTrace {
    pub const VERSION: &'static str = "1";

    pub fn new() -> Self {
        Self {
            version: Self::VERSION.to_string(),
            events: im::Vector::new(),
        }
    }

    #[must_use]
    pub fn append(&self, event: FeedbackEvent) -> Self {
        let mut events = self.events.clone();
        events.push_back(event);
        Self {
            version: self.version.clone(),
            events,
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn events(&self) -> impl Iterator<Item = &FeedbackEvent> {
        self.events.iter()
    }

    pub fn last(&self) -> Option<&FeedbackEvent> {
        self.events.last()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn to_value(&self) -> Value {
        json!({
            "version": self.version,
            "events": self.events.iter().map(FeedbackEvent::to_value).collect::<Vec<_>>(),
        })
    }

    /// Canonical JSON, embedded verbatim in architect prompts.
    pub fn to_prompt_text(&self) -> String {
        canonical_json(&self.to_value())
    }

    /// The trace wrapped in the tags the architect primer refers to.
    pub fn to_refinement_context(&self) -> String {
        format!(
            "<MPP_REFINEMENT_TRACE>\n{}\n</MPP_REFINEMENT_TRACE>",
            self.to_prompt_text()
        )
    }
}

impl Default for FeedbackTrace {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mpp_core::QaResult;

    fn failed_execution() -> ExecutionResult {
        ExecutionResult {
            final_response: "{\"answer\": 1}".to_string(),
            reasoning: None,
            iterations: 2,
            stable: false,
            qa_result: Some(QaResult {
                verdict: "fail".to_string(),
                issues: vec!["wrong format".to_string()],
                repair_examples: vec!["{\"answer\": \"1\"}".to_string()],
            }),
            qa_passed: Some(false),
            steps: vec![crate::step::VerticalStep::output(
                1,
                Value::String("{\"answer\": 1}".to_string()),
            )],
        }
    }

    #[test]
    fn test_append_returns_new_trace() {
        let empty = FeedbackTrace::new();
        let one = empty.append(FeedbackEvent::from_execution(&failed_execution()));
        assert!(empty.is_empty());
        assert_eq!(one.len(), 1);
        assert_eq!(one.last().unwrap().kind, FeedbackKind::QaFailed);
    }

    #[test]
    fn test_prompt_text_is_canonical() {
        let trace = FeedbackTrace::new().append(FeedbackEvent::from_execution(&failed_execution()));
        let text = trace.to_prompt_text();
        assert!(text.starts_with("{\"events\":[{\"executor_iterations\":2,"));
        assert!(text.ends_with("}],\"version\":\"1\"}"));
        assert!(!text.contains(": "));
        assert_eq!(text, trace.clone().to_prompt_text());
    }

    #[test]
    fn test_nonconvergent_without_verdict() {
        let mut execution = failed_execution();
        execution.qa_result = None;
        execution.qa_passed = None;
        let event = FeedbackEvent::from_execution(&execution);
        assert_eq!(event.kind, FeedbackKind::ExecutorNonconvergent);
        assert_eq!(event.executor_refinements, Some(1));
        assert_eq!(event.last_response.as_deref(), Some("{\"answer\": 1}"));
    }

    #[test]
    fn test_exception_when_no_response() {
        let mut execution = failed_execution();
        execution.qa_result = None;
        execution.final_response = String::new();
        execution.steps = vec![crate::step::VerticalStep::failed(1, None, "timeout")];
        let event = FeedbackEvent::from_execution(&execution);
        assert_eq!(event.kind, FeedbackKind::ExecutorException);
        assert!(event.summary.contains("timeout"));
        assert!(event.last_response.is_none());
    }
}
