//! Executor stabilization loop and its QA gate.

use crate::scope::FeedbackScope;
use crate::step::{ExecutionFailure, ExecutionResult, RunOptions, VerticalStep};
use mpp_bundle::json::{canonical_json, strip_code_fences};
use mpp_bundle::Bundle;
use mpp_core::{
    FeedbackSink, Generator, GeneratorInput, MppError, Prediction, QaFeedback, QaResult, Role,
};
use serde_json::Value;
use tracing::{debug, info, warn};

const RESPONSE_FIELDS: [&str; 2] = ["final_response", "decoded_bundle"];
const REASONING_FIELDS: [&str; 2] = ["reasoning", "rationale"];

/// Response text, from `final_response` or else `decoded_bundle`.
pub fn response_text(prediction: &Prediction) -> Result<String, MppError> {
    RESPONSE_FIELDS
        .iter()
        .find_map(|field| prediction.text(field))
        .ok_or_else(|| MppError::MissingField {
            role: Role::Executor,
            field: RESPONSE_FIELDS[0].to_string(),
        })
}

pub fn extract_reasoning(prediction: &Prediction) -> Option<String> {
    REASONING_FIELDS.iter().find_map(|field| {
        prediction
            .text(field)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
    })
}

/// Comparable form of a response.
///
/// JSON responses lose their top-level reasoning fields and are re-encoded
/// canonically; anything else has its whitespace collapsed.
pub fn normalize_response(response: &str) -> String {
    let text = response.trim();
    if text.is_empty() {
        return String::new();
    }

    let stripped = strip_code_fences(text);
    for candidate in [stripped.as_str(), text] {
        if let Ok(parsed) = serde_json::from_str::<Value>(candidate) {
            return canonical_json(&drop_reasoning(parsed));
        }
    }
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn drop_reasoning(value: Value) -> Value {
    match value {
        Value::Object(mut map) => {
            for field in REASONING_FIELDS {
                map.remove(field);
            }
            Value::Object(map)
        }
        other => other,
    }
}

async fn review(qa: &dyn Generator, bundle: &Bundle, response: &str) -> Result<QaResult, MppError> {
    let input = GeneratorInput::Qa {
        bundle: bundle.clone(),
        final_response: response.to_string(),
    };
    let prediction = qa.generate(&input).await?;
    QaResult::from_prediction(&prediction)
}

/// What the loop has produced so far; survives a fatal exit.
#[derive(Default)]
struct LoopState {
    steps: Vec<VerticalStep>,
    last_response: Option<String>,
    reasoning: Option<String>,
    qa_result: Option<QaResult>,
    qa_passed: Option<bool>,
    stable: bool,
    iterations: usize,
}

impl LoopState {
    fn into_result(self) -> ExecutionResult {
        ExecutionResult {
            final_response: self.last_response.unwrap_or_default(),
            reasoning: self.reasoning,
            iterations: self.iterations,
            stable: self.stable,
            qa_result: self.qa_result,
            qa_passed: self.qa_passed,
            steps: self.steps,
        }
    }

    fn into_failure(self, error: MppError) -> ExecutionFailure {
        ExecutionFailure {
            error,
            last_response: self.last_response,
            iterations: self.iterations,
            steps: self.steps,
        }
    }
}

pub(crate) async fn execute_bundle(
    executor: &dyn Generator,
    qa: Option<&dyn Generator>,
    sink: Option<&dyn FeedbackSink>,
    bundle: &Bundle,
    options: RunOptions,
    max_iters: usize,
) -> Result<ExecutionResult, ExecutionFailure> {
    let mut state = LoopState::default();
    let scope = FeedbackScope::new(sink);
    let outcome = run_loop(executor, qa, &scope, bundle, options, max_iters, &mut state).await;
    drop(scope);
    match outcome {
        Ok(()) => Ok(state.into_result()),
        Err(error) => Err(state.into_failure(error)),
    }
}

async fn run_loop(
    executor: &dyn Generator,
    qa: Option<&dyn Generator>,
    scope: &FeedbackScope<'_>,
    bundle: &Bundle,
    options: RunOptions,
    max_iters: usize,
    state: &mut LoopState,
) -> Result<(), MppError> {
    let gate = match (options.open_world, qa) {
        (true, None) => return Err(MppError::QaNotConfigured),
        (true, Some(qa)) => Some(qa),
        (false, _) => None,
    };

    let mut qa_feedback: Option<QaFeedback> = None;
    let mut last_comparable: Option<String> = None;
    state.iterations = max_iters;

    for iteration in 1..=max_iters {
        if gate.is_some() {
            scope.publish(qa_feedback.as_ref());
        }

        let input = GeneratorInput::Executor {
            bundle: bundle.clone(),
            qa_feedback: qa_feedback.clone(),
        };
        let prediction = match executor.generate(&input).await {
            Ok(prediction) => prediction,
            Err(e) => {
                warn!(iteration, error = %e, "executor call failed");
                state.steps.push(VerticalStep::failed(iteration, None, e.to_string()));
                continue;
            }
        };

        let response = match response_text(&prediction) {
            Ok(response) => response,
            Err(e) => {
                state.iterations = iteration;
                state.steps.push(VerticalStep::failed(iteration, None, e.to_string()));
                return Err(e);
            }
        };
        state.reasoning = extract_reasoning(&prediction);
        if options.expect_reasoning && state.reasoning.is_none() {
            let error = MppError::MissingReasoning;
            state.iterations = iteration;
            state
                .steps
                .push(VerticalStep::failed(iteration, Some(Value::String(response.clone())), error.to_string()));
            state.last_response = Some(response);
            return Err(error);
        }

        // Open world: only a QA pass ends the loop.
        if let Some(qa) = gate {
            state.last_response = Some(response.clone());
            match review(qa, bundle, &response).await {
                Ok(result) => {
                    let passed = result.passed();
                    state
                        .steps
                        .push(VerticalStep::output(iteration, Value::String(response.clone())).with_qa(&result));
                    state.qa_passed = Some(passed);
                    if passed {
                        info!(iteration, "QA passed executor response");
                        state.stable = true;
                        state.iterations = iteration;
                        state.qa_result = Some(result);
                        return Ok(());
                    }
                    debug!(iteration, issues = result.issues.len(), "QA rejected executor response");
                    qa_feedback = Some(result.feedback(&response));
                    state.qa_result = Some(result);
                }
                Err(MppError::Generation(e)) => {
                    warn!(iteration, error = %e, "QA call failed");
                    state.qa_passed = Some(false);
                    state
                        .steps
                        .push(VerticalStep::failed(iteration, Some(Value::String(response)), e.to_string()));
                }
                Err(e) => {
                    state.iterations = iteration;
                    state
                        .steps
                        .push(VerticalStep::failed(iteration, Some(Value::String(response)), e.to_string()));
                    return Err(e);
                }
            }
            continue;
        }

        let comparable = normalize_response(&response);
        state.steps.push(VerticalStep::output(iteration, Value::String(response.clone())));
        let converged = last_comparable.as_deref() == Some(comparable.as_str());
        state.last_response = Some(response);
        last_comparable = Some(comparable);
        if converged {
            info!(iteration, "executor response stabilized");
            state.stable = true;
            state.iterations = iteration;
            break;
        }
    }

    // Closed world: a configured QA generator gates the final response once.
    if gate.is_none() {
        if let (Some(qa), Some(response)) = (qa, state.last_response.as_deref()) {
            match review(qa, bundle, response).await {
                Ok(result) => {
                    state.qa_passed = Some(result.passed());
                    state.qa_result = Some(result);
                }
                Err(MppError::Generation(e)) => {
                    warn!(error = %e, "final QA call failed");
                    state.qa_passed = Some(false);
                }
                Err(e) => return Err(e),
            }
        }
    }
    Ok(())
}
