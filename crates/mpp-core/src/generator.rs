//! Generator contract shared by the architect, executor and QA stages.
use crate::backend::GenerationError;
use crate::error::MppError;
use async_trait::async_trait;
use mpp_bundle::Bundle;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Stage a generator plays in the vertical pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Architect,
    Executor,
    Qa,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Architect => "architect",
            Role::Executor => "executor",
            Role::Qa => "qa",
        }
    }

    /// Output fields a generator of this role must produce.
    pub fn output_fields(&self) -> &'static [&'static str] {
        match self {
            Role::Architect => &mpp_bundle::BUNDLE_FIELDS,
            Role::Executor => &["decoded_bundle"],
            Role::Qa => &["verdict", "issues", "repair_examples"],
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = MppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "architect" => Ok(Role::Architect),
            "executor" => Ok(Role::Executor),
            "qa" => Ok(Role::Qa),
            other => Err(MppError::Config(format!("unknown role: {}", other))),
        }
    }
}

/// Structured feedback handed to the next executor attempt after a QA fail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaFeedback {
    pub verdict: String,
    pub issues: Vec<String>,
    pub previous_response: String,
}

/// Parsed QA verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaResult {
    pub verdict: String,
    pub issues: Vec<String>,
    #[serde(default)]
    pub repair_examples: Vec<String>,
}

impl QaResult {
    pub fn passed(&self) -> bool {
        self.verdict.trim().eq_ignore_ascii_case("pass")
    }

    /// Reads `verdict` and `issues` (required) and `repair_examples` (optional).
    pub fn from_prediction(prediction: &Prediction) -> Result<Self, MppError> {
        let verdict = prediction.require(Role::Qa, "verdict")?;
        let issues = prediction.require(Role::Qa, "issues")?;
        Ok(Self {
            verdict: value_text(verdict).trim().to_lowercase(),
            issues: string_items(issues),
            repair_examples: prediction
                .get("repair_examples")
                .map(string_items)
                .unwrap_or_default(),
        })
    }

    pub fn feedback(&self, previous_response: &str) -> QaFeedback {
        QaFeedback {
            verdict: self.verdict.clone(),
            issues: self.issues.clone(),
            previous_response: previous_response.to_string(),
        }
    }
}

/// Keyword input for one generator call.
#[derive(Debug, Clone, PartialEq)]
pub enum GeneratorInput {
    Architect {
        user_goal: String,
    },
    Executor {
        bundle: Bundle,
        qa_feedback: Option<QaFeedback>,
    },
    Qa {
        bundle: Bundle,
        final_response: String,
    },
}

impl GeneratorInput {
    pub fn role(&self) -> Role {
        match self {
            GeneratorInput::Architect { .. } => Role::Architect,
            GeneratorInput::Executor { .. } => Role::Executor,
            GeneratorInput::Qa { .. } => Role::Qa,
        }
    }

    /// Keyword fields in the order a prompt should present them.
    pub fn fields(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        match self {
            GeneratorInput::Architect { user_goal } => {
                fields.insert("user_goal".to_string(), Value::String(user_goal.clone()));
            }
            GeneratorInput::Executor {
                bundle,
                qa_feedback,
            } => {
                insert_bundle(&mut fields, bundle);
                if let Some(feedback) = qa_feedback {
                    fields.insert(
                        "qa_feedback".to_string(),
                        serde_json::json!({
                            "verdict": feedback.verdict,
                            "issues": feedback.issues,
                            "previous_response": feedback.previous_response,
                        }),
                    );
                }
            }
            GeneratorInput::Qa {
                bundle,
                final_response,
            } => {
                insert_bundle(&mut fields, bundle);
                fields.insert(
                    "final_response".to_string(),
                    Value::String(final_response.clone()),
                );
            }
        }
        fields
    }
}

fn insert_bundle(fields: &mut Map<String, Value>, bundle: &Bundle) {
    if let Value::Object(parts) = bundle.to_value() {
        fields.extend(parts);
    }
}

/// Named output fields of a generator call. `null` counts as absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Prediction(Map<String, Value>);

impl Prediction {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// `None` unless `value` is a JSON object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self(fields)),
            _ => None,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field).filter(|v| !v.is_null())
    }

    pub fn require(&self, role: Role, field: &str) -> Result<&Value, MppError> {
        self.get(field).ok_or_else(|| MppError::MissingField {
            role,
            field: field.to_string(),
        })
    }

    /// Field as text: strings verbatim, other JSON compactly encoded.
    pub fn text(&self, field: &str) -> Option<String> {
        self.get(field).map(value_text)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: Value) {
        self.0.insert(field.into(), value);
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Prediction {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn string_items(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().map(value_text).collect(),
        Value::Null => Vec::new(),
        Value::String(s) if s.trim().is_empty() => Vec::new(),
        other => vec![value_text(other)],
    }
}

/// One pipeline stage backed by a model, a script or anything else.
#[async_trait]
pub trait Generator: Send + Sync {
    fn role(&self) -> Role;

    async fn generate(&self, input: &GeneratorInput) -> Result<Prediction, GenerationError>;
}

/// Receives the QA feedback for the executor's next attempt, or `None` when
/// the execution loop ends.
pub trait FeedbackSink: Send + Sync {
    fn set_feedback(&self, feedback: Option<QaFeedback>);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_role_round_trip() {
        for role in [Role::Architect, Role::Executor, Role::Qa] {
            assert_eq!(role.to_string().parse::<Role>().unwrap(), role);
        }
        assert!("critic".parse::<Role>().is_err());
    }

    #[test]
    fn test_prediction_null_is_missing() {
        let prediction = Prediction::from_value(json!({"reasoning": null, "final_response": "ok"})).unwrap();
        assert!(prediction.get("reasoning").is_none());
        assert_eq!(prediction.text("final_response").unwrap(), "ok");
        let err = prediction.require(Role::Executor, "reasoning").unwrap_err();
        assert!(matches!(err, MppError::MissingField { role: Role::Executor, .. }));
    }

    #[test]
    fn test_qa_result_coerces_fields() {
        let prediction = Prediction::from_value(json!({
            "verdict": " PASS ",
            "issues": "",
            "repair_examples": ["a", 2]
        }))
        .unwrap();
        let result = QaResult::from_prediction(&prediction).unwrap();
        assert!(result.passed());
        assert!(result.issues.is_empty());
        assert_eq!(result.repair_examples, vec!["a", "2"]);
    }

    #[test]
    fn test_qa_result_requires_issues() {
        let prediction = Prediction::from_value(json!({"verdict": "fail"})).unwrap();
        assert!(QaResult::from_prediction(&prediction).is_err());
    }
}
