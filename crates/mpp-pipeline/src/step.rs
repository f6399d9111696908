//! Audit records and results of the vertical loops.

use crate::feedback::FeedbackTrace;
use mpp_bundle::{json, Bundle};
use mpp_core::{MppError, QaResult, RunContext};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// One loop iteration. Append-only within a single loop call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerticalStep {
    pub iteration: usize,
    pub output: Option<Value>,
    /// `blake3:<hex>` of the canonical output.
    pub digest: Option<String>,
    pub qa_result: Option<QaResult>,
    pub qa_passed: Option<bool>,
    pub error: Option<String>,
}

impl VerticalStep {
    pub fn output(iteration: usize, output: Value) -> Self {
        Self {
            iteration,
            digest: Some(json::digest(&output)),
            output: Some(output),
            qa_result: None,
            qa_passed: None,
            error: None,
        }
    }

    pub fn failed(iteration: usize, output: Option<Value>, error: impl Into<String>) -> Self {
        Self {
            iteration,
            digest: output.as_ref().map(json::digest),
            output,
            qa_result: None,
            qa_passed: None,
            error: Some(error.into()),
        }
    }

    pub fn with_qa(mut self, result: &QaResult) -> Self {
        self.qa_passed = Some(result.passed());
        self.qa_result = Some(result.clone());
        self
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Output of the architect stabilization loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleResult {
    pub bundle: Bundle,
    pub iterations: usize,
    pub stable: bool,
    pub steps: Vec<VerticalStep>,
}

impl BundleResult {
    pub fn refinements(&self) -> usize {
        self.iterations.saturating_sub(1)
    }

    /// Error of the final step, when the loop ended on a failed attempt.
    pub fn trailing_error(&self) -> Option<&VerticalStep> {
        self.steps.last().filter(|step| step.is_error())
    }
}

/// Output of the executor stabilization loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Also known as the decoded bundle.
    pub final_response: String,
    pub reasoning: Option<String>,
    pub iterations: usize,
    pub stable: bool,
    pub qa_result: Option<QaResult>,
    pub qa_passed: Option<bool>,
    pub steps: Vec<VerticalStep>,
}

impl ExecutionResult {
    pub fn refinements(&self) -> usize {
        self.iterations.saturating_sub(1)
    }

    /// `qa_passed` in open world; `stable` and not QA-failed in closed world.
    pub fn succeeded(&self, open_world: bool) -> bool {
        if open_world {
            self.qa_passed == Some(true)
        } else {
            self.stable && self.qa_passed != Some(false)
        }
    }

    /// False when every executor call failed before producing text.
    pub fn produced_response(&self) -> bool {
        self.steps.iter().any(|step| step.output.is_some())
    }

    pub fn errors(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().filter_map(|step| step.error.as_deref())
    }
}

/// An executor loop that stopped on a fatal error, with the steps run and
/// the last response it produced.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct ExecutionFailure {
    #[source]
    pub error: MppError,
    pub last_response: Option<String>,
    /// Iteration the loop stopped at; `0` when no call was made.
    pub iterations: usize,
    pub steps: Vec<VerticalStep>,
}

/// Execution mode for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    /// QA gates every executor iteration.
    pub open_world: bool,
    /// The executor must return reasoning alongside its response.
    pub expect_reasoning: bool,
}

impl RunOptions {
    pub fn open_world() -> Self {
        Self {
            open_world: true,
            expect_reasoning: false,
        }
    }

    pub fn closed_world() -> Self {
        Self::default()
    }

    pub fn with_reasoning(mut self, expect: bool) -> Self {
        self.expect_reasoning = expect;
        self
    }
}

/// Final result of a run that produced a bundle and a response.
#[derive(Debug, Clone, Serialize)]
pub struct VerticalOutcome {
    pub context: RunContext,
    pub bundle: BundleResult,
    pub execution: ExecutionResult,
    pub open_world: bool,
    pub success: bool,
    pub cycles: usize,
    pub feedback: FeedbackTrace,
    pub bundle_refinements_total: usize,
    pub executor_refinements_total: usize,
}

/// A run that stopped on a fatal error, with everything produced so far.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct PipelineFailure {
    #[source]
    pub error: MppError,
    pub context: RunContext,
    pub last_bundle: Option<Bundle>,
    pub last_response: Option<String>,
    pub cycles: usize,
    pub feedback: FeedbackTrace,
    pub bundle_refinements_total: usize,
    pub executor_refinements_total: usize,
}
