//! Model-backed generators for the architect, executor and QA roles.

use async_trait::async_trait;
use mpp_bundle::json::parse_json_object;
use mpp_core::{
    ChatMessage, GenerationError, GenerationParams, Generator, GeneratorInput, Prediction, Role,
    TextGenerator, MPP_VERSION,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Condensed protocol description used when no specification text is given.
pub const DEFAULT_PROTOCOL_SUMMARY: &str = "\
A derivative protocol bundle has three parts. `meta_protocol_version` names the \
meta-protocol revision. `derivative_protocol_specification` is a mapping with \
protocol_name, abstract, core_tag_library (tag name to definition), \
tag_definition_schema (field names every tag definition carries), \
processor_semantics (processor name to behaviour), guiding_principles and the \
optional payload_order and processor_pipeline lists. \
`derivative_protocol_payload` maps tag names to content. Every payload tag must \
be defined in the tag library, every required tag must appear, every tag names \
a defined processor, and payload_order / processor_pipeline, when present, must \
match the payload exactly.";

/// Standing instructions for a role, prepended to its system prompt.
pub fn role_primer(role: Role) -> String {
    match role {
        Role::Architect => format!(
            "You design derivative protocol bundles (meta-protocol {}). Turn the user goal \
             into a specification and a payload that a separate executor can decode without \
             further context. Keep tag names short, give every tag a processor and order the \
             payload the way it should be read.",
            MPP_VERSION
        ),
        Role::Executor => "You decode derivative protocol bundles. Apply each processor to its \
             tags in pipeline order, follow the guiding principles, and answer the user goal \
             the bundle encodes. When QA feedback is present, fix every listed issue while \
             keeping what already worked."
            .to_string(),
        Role::Qa => "You review an executor's answer against the bundle it decoded. The verdict \
             is `pass` only when every required tag was honoured and the answer meets the \
             goal; otherwise it is `fail` with one concrete issue per problem and, where \
             useful, a short repair example."
            .to_string(),
    }
}

pub struct LlmGenerator {
    role: Role,
    backend: Arc<dyn TextGenerator>,
    params: GenerationParams,
    protocol: String,
    primer: String,
    instructions: Option<String>,
    expect_reasoning: bool,
}

impl LlmGenerator {
    pub fn new(role: Role, backend: Arc<dyn TextGenerator>, params: GenerationParams) -> Self {
        Self {
            role,
            backend,
            params,
            protocol: DEFAULT_PROTOCOL_SUMMARY.to_string(),
            primer: role_primer(role),
            instructions: None,
            expect_reasoning: false,
        }
    }

    pub fn architect(backend: Arc<dyn TextGenerator>, params: GenerationParams) -> Self {
        Self::new(Role::Architect, backend, params)
    }

    pub fn executor(backend: Arc<dyn TextGenerator>, params: GenerationParams) -> Self {
        Self::new(Role::Executor, backend, params)
    }

    pub fn qa(backend: Arc<dyn TextGenerator>, params: GenerationParams) -> Self {
        Self::new(Role::Qa, backend, params)
    }

    /// Full protocol specification text replacing the built-in summary.
    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = protocol.into();
        self
    }

    pub fn with_primer(mut self, primer: impl Into<String>) -> Self {
        self.primer = primer.into();
        self
    }

    /// Extra instructions, e.g. a tuned primer block. Blank text is ignored.
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        let instructions = instructions.into();
        self.instructions = Some(instructions).filter(|i| !i.trim().is_empty());
        self
    }

    /// Ask the model for a `reasoning` field ahead of its answer.
    pub fn with_reasoning(mut self, expect_reasoning: bool) -> Self {
        self.expect_reasoning = expect_reasoning;
        self
    }

    pub fn output_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.expect_reasoning {
            fields.push("reasoning");
        }
        fields.extend_from_slice(self.role.output_fields());
        fields
    }

    pub fn system_prompt(&self) -> String {
        let mut sections = vec![self.primer.clone()];
        sections.push(format!("Protocol specification:\n{}", self.protocol.trim()));
        if let Some(instructions) = &self.instructions {
            sections.push(format!("Instructions:\n{}", instructions.trim()));
        }
        let keys = self
            .output_fields()
            .iter()
            .map(|f| format!("\"{}\"", f))
            .collect::<Vec<_>>()
            .join(", ");
        sections.push(format!(
            "Respond with one JSON object with exactly these keys: {}. Do not write anything outside the JSON object.",
            keys
        ));
        sections.join("\n\n")
    }

    /// One `## field` section per input field, in input order.
    pub fn user_message(input: &GeneratorInput) -> String {
        input
            .fields()
            .iter()
            .map(|(name, value)| format!("## {}\n{}", name, field_text(value)))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

fn field_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

#[async_trait]
impl Generator for LlmGenerator {
    fn role(&self) -> Role {
        self.role
    }

    async fn generate(&self, input: &GeneratorInput) -> Result<Prediction, GenerationError> {
        let messages = [
            ChatMessage::system(self.system_prompt()),
            ChatMessage::user(Self::user_message(input)),
        ];
        let reply = self.backend.complete(&messages, &self.params).await?;
        debug!(role = %self.role, chars = reply.len(), "Generator reply");

        parse_json_object(&reply)
            .map(Prediction::new)
            .ok_or_else(|| {
                GenerationError::MalformedOutput(format!(
                    "{} reply is not a JSON object",
                    self.role
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mpp_core::testing::ScriptedBackend;
    use mpp_core::MessageRole;

    #[test]
    fn test_output_fields_per_role() {
        let backend = Arc::new(ScriptedBackend::new());
        let architect = LlmGenerator::architect(backend.clone(), GenerationParams::default());
        assert_eq!(architect.output_fields(), mpp_bundle::BUNDLE_FIELDS.to_vec());

        let executor = LlmGenerator::executor(backend, GenerationParams::default()).with_reasoning(true);
        assert_eq!(executor.output_fields(), vec!["reasoning", "decoded_bundle"]);
    }

    #[test]
    fn test_system_prompt_sections() {
        let generator = LlmGenerator::qa(Arc::new(ScriptedBackend::new()), GenerationParams::default())
            .with_protocol("PROTO TEXT")
            .with_instructions("Be terse.");
        let prompt = generator.system_prompt();
        assert!(prompt.starts_with("You review"));
        assert!(prompt.contains("Protocol specification:\nPROTO TEXT"));
        assert!(prompt.contains("Instructions:\nBe terse."));
        assert!(prompt.contains("\"verdict\", \"issues\", \"repair_examples\""));
    }

    #[test]
    fn test_blank_instructions_ignored() {
        let generator = LlmGenerator::qa(Arc::new(ScriptedBackend::new()), GenerationParams::default())
            .with_instructions("  \n");
        assert!(!generator.system_prompt().contains("Instructions:"));
    }

    #[tokio::test]
    async fn test_generate_parses_fenced_reply() {
        let backend = Arc::new(ScriptedBackend::new().reply("```json\n{\"verdict\": \"pass\", \"issues\": []}\n```"));
        let generator = LlmGenerator::architect(backend.clone(), GenerationParams::new("m"));
        let prediction = generator
            .generate(&GeneratorInput::Architect {
                user_goal: "Summarize the report".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(prediction.text("verdict").unwrap(), "pass");

        let conversations = backend.conversations();
        assert_eq!(conversations.len(), 1);
        let (messages, params) = &conversations[0];
        assert_eq!(params.model, "m");
        assert_eq!(messages[0].role, MessageRole::System);
        assert_eq!(messages[1].content, "## user_goal\nSummarize the report");
    }

    #[tokio::test]
    async fn test_generate_rejects_prose() {
        let backend = Arc::new(ScriptedBackend::new().reply("I cannot help with that."));
        let generator = LlmGenerator::executor(backend, GenerationParams::default());
        let err = generator
            .generate(&GeneratorInput::Architect {
                user_goal: "x".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::MalformedOutput(_)));
    }

    #[tokio::test]
    async fn test_generate_propagates_backend_error() {
        let backend = Arc::new(ScriptedBackend::new().fail(GenerationError::Network("reset".to_string())));
        let generator = LlmGenerator::qa(backend, GenerationParams::default());
        let err = generator
            .generate(&GeneratorInput::Architect {
                user_goal: "x".to_string(),
            })
            .await
            .unwrap_err();
        assert_eq!(err, GenerationError::Network("reset".to_string()));
    }
}
