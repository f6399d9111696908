//! Per-case summary of one vertical run, the unit every metric scores.

use mpp_pipeline::{PipelineFailure, VerticalOutcome};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LongitudinalTrace {
    /// Case name.
    pub case: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_world: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bundle_stable: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub executor_stable: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub qa_passed: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bundle_refinements: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub executor_refinements: Option<usize>,

    /// Issues raised by the last QA verdict.
    #[serde(default)]
    pub issues: Vec<String>,

    /// Generator failures recorded along the way, or the fatal error.
    #[serde(default)]
    pub errors: Vec<String>,
}

impl LongitudinalTrace {
    pub fn new(case: impl Into<String>) -> Self {
        Self {
            case: case.into(),
            ..Default::default()
        }
    }

    pub fn from_outcome(case: impl Into<String>, outcome: &VerticalOutcome) -> Self {
        let execution = &outcome.execution;
        let errors = outcome
            .bundle
            .steps
            .iter()
            .filter_map(|step| step.error.clone())
            .chain(execution.errors().map(str::to_string))
            .collect();

        Self {
            case: case.into(),
            open_world: Some(outcome.open_world),
            bundle_stable: Some(outcome.bundle.stable),
            executor_stable: Some(execution.stable),
            qa_passed: execution.qa_passed,
            bundle_refinements: Some(outcome.bundle_refinements_total),
            executor_refinements: Some(outcome.executor_refinements_total),
            issues: execution
                .qa_result
                .as_ref()
                .map(|qa| qa.issues.clone())
                .unwrap_or_default(),
            errors,
        }
    }

    /// A failed run carries no stability flags, only its refinement totals and the error.
    pub fn from_failure(case: impl Into<String>, failure: &PipelineFailure) -> Self {
        Self {
            case: case.into(),
            bundle_refinements: Some(failure.bundle_refinements_total),
            executor_refinements: Some(failure.executor_refinements_total),
            errors: vec![failure.error.to_string()],
            ..Default::default()
        }
    }

    pub fn issue_count(&self) -> usize {
        self.issues.len()
    }

    pub fn total_refinements(&self) -> usize {
        self.bundle_refinements.unwrap_or(0) + self.executor_refinements.unwrap_or(0)
    }

    pub fn with_flags(mut self, bundle_stable: bool, executor_stable: bool, qa_passed: Option<bool>) -> Self {
        self.bundle_stable = Some(bundle_stable);
        self.executor_stable = Some(executor_stable);
        self.qa_passed = qa_passed;
        self
    }

    pub fn with_refinements(mut self, bundle: usize, executor: usize) -> Self {
        self.bundle_refinements = Some(bundle);
        self.executor_refinements = Some(executor);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_refinements_treats_missing_as_zero() {
        let trace = LongitudinalTrace {
            case: "c".to_string(),
            bundle_refinements: Some(2),
            ..Default::default()
        };
        assert_eq!(trace.total_refinements(), 2);
        assert_eq!(trace.issue_count(), 0);
    }

    #[test]
    fn test_serialization_skips_unknown_flags() {
        let trace = LongitudinalTrace::new("c").with_refinements(1, 0);
        let value = serde_json::to_value(&trace).unwrap();
        assert!(value.get("qa_passed").is_none());
        assert_eq!(value["bundle_refinements"], 1);
    }
}
