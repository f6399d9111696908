//! Architect stabilization loop.
//!
//! Drafts bundles until two consecutive valid drafts are equal. Invalid
//! drafts are kept as context for the next attempt together with the
//! violation text.

use crate::step::{BundleResult, VerticalStep};
use mpp_bundle::{normalize, Bundle, BUNDLE_FIELDS};
use mpp_core::{Generator, GeneratorInput, MppError, Prediction, Role};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

/// Optional starting state for a bundle loop.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BundleRequest {
    /// Bundle from an earlier cycle. When it validates, an architect that
    /// returns it unchanged stabilizes immediately.
    pub previous_bundle: Option<Value>,
    /// Feedback text shown with the first draft request.
    pub refinement_context: Option<String>,
    /// Overrides the configured cap.
    pub max_iters: Option<usize>,
}

/// Prompt for one architect attempt.
pub fn refinement_prompt(user_goal: &str, previous: Option<&Value>, feedback: Option<&str>) -> String {
    let mut parts = vec![format!("<RAW_USER_GOAL>\n{}\n</RAW_USER_GOAL>", user_goal)];
    if let Some(bundle) = previous {
        let pretty = serde_json::to_string_pretty(bundle).unwrap_or_else(|_| bundle.to_string());
        parts.push(format!("Previous bundle:\n{}", pretty));
    }
    if let Some(text) = feedback.filter(|t| !t.trim().is_empty()) {
        parts.push(format!("Refinement feedback:\n{}", text));
    }
    parts.push(
        "Refine for stability and correctness. If the previous bundle is valid and \
         addresses the feedback, return it verbatim."
            .to_string(),
    );
    parts.join("\n\n")
}

/// Collects the three bundle fields from an architect prediction.
pub fn assemble_bundle(prediction: &Prediction) -> Result<Value, MppError> {
    let mut bundle = Map::new();
    for field in BUNDLE_FIELDS {
        let value = prediction.require(Role::Architect, field)?;
        bundle.insert(field.to_string(), value.clone());
    }
    Ok(Value::Object(bundle))
}

pub(crate) async fn refine_bundle(
    architect: &dyn Generator,
    user_goal: &str,
    request: &BundleRequest,
    max_iters: usize,
) -> Result<BundleResult, MppError> {
    let mut last_attempt = request.previous_bundle.clone();
    let mut last_valid = request
        .previous_bundle
        .as_ref()
        .and_then(|previous| Bundle::from_value(&normalize(previous.clone())).ok());
    let mut last_error = request.refinement_context.clone();
    let mut steps = Vec::new();

    for iteration in 1..=max_iters {
        let input = GeneratorInput::Architect {
            user_goal: refinement_prompt(user_goal, last_attempt.as_ref(), last_error.as_deref()),
        };

        let prediction = match architect.generate(&input).await {
            Ok(prediction) => prediction,
            Err(e) => {
                warn!(iteration, error = %e, "architect call failed");
                let message = e.to_string();
                steps.push(VerticalStep::failed(iteration, None, message.clone()));
                last_error = Some(message);
                continue;
            }
        };

        let raw = normalize(assemble_bundle(&prediction)?);
        match Bundle::from_value(&raw) {
            Err(violation) => {
                debug!(iteration, rule = %violation.rule, field = %violation.field, "bundle rejected");
                let message = violation.to_string();
                steps.push(VerticalStep::failed(iteration, Some(raw.clone()), message.clone()));
                last_attempt = Some(raw);
                last_error = Some(message);
            }
            Ok(bundle) => {
                steps.push(VerticalStep::output(iteration, raw.clone()));
                if last_valid.as_ref() == Some(&bundle) {
                    info!(iteration, "bundle stabilized");
                    return Ok(BundleResult {
                        bundle,
                        iterations: iteration,
                        stable: true,
                        steps,
                    });
                }
                last_attempt = Some(raw);
                last_valid = Some(bundle);
                last_error = None;
            }
        }
    }

    match last_valid {
        Some(bundle) => {
            warn!(max_iters, "bundle did not stabilize, keeping last valid draft");
            Ok(BundleResult {
                bundle,
                iterations: max_iters,
                stable: false,
                steps,
            })
        }
        None => Err(MppError::ArchitectExhausted {
            iterations: max_iters,
            last_error,
            last_attempt,
        }),
    }
}
