//! Builds model-backed vertical pipelines from tuned template blocks.

use crate::config::{RoleModels, ServiceConfig};
use mpp_core::{MppError, RefinementConfig, Role, TextGenerator};
use mpp_llm::{BackendConfig, LlmGenerator};
use mpp_longitudinal::{Case, ProgramFactory};
use mpp_pipeline::VerticalPipeline;
use mpp_template::Blocks;
use std::sync::Arc;

/// Block holding extra instructions for each role.
pub fn primer_block(role: Role) -> &'static str {
    match role {
        Role::Architect => "architect_primer",
        Role::Executor => "executor_primer",
        Role::Qa => "qa_primer",
    }
}

pub struct LlmProgramFactory {
    backend: Arc<dyn TextGenerator>,
    backend_config: BackendConfig,
    models: RoleModels,
    refinement: RefinementConfig,
    protocol: Option<String>,
}

impl LlmProgramFactory {
    pub fn new(backend: Arc<dyn TextGenerator>, config: &ServiceConfig) -> Self {
        Self {
            backend,
            backend_config: config.backend.clone(),
            models: config.models.clone(),
            refinement: config.refinement,
            protocol: config.protocol.clone(),
        }
    }

    fn generator(&self, role: Role, blocks: &Blocks) -> LlmGenerator {
        let model = match role {
            Role::Architect => self.models.architect.as_deref(),
            Role::Executor => self.models.executor.as_deref(),
            Role::Qa => self.models.qa.as_deref(),
        };
        let mut generator = LlmGenerator::new(role, self.backend.clone(), self.backend_config.params(model));
        if let Some(protocol) = &self.protocol {
            generator = generator.with_protocol(protocol.clone());
        }
        match blocks.get(primer_block(role)) {
            Some(primer) => generator.with_instructions(primer.clone()),
            None => generator,
        }
    }
}

impl ProgramFactory for LlmProgramFactory {
    fn build(&self, blocks: &Blocks, case: &Case) -> Result<VerticalPipeline, MppError> {
        let architect = self.generator(Role::Architect, blocks);
        let executor = self.generator(Role::Executor, blocks).with_reasoning(case.use_cot);
        let qa = self.generator(Role::Qa, blocks);
        Ok(VerticalPipeline::new(Arc::new(architect), Arc::new(executor))
            .with_qa(Arc::new(qa))
            .with_config(self.refinement))
    }
}
