//! Shared handler state.

use crate::config::ServiceConfig;
use crate::factory::LlmProgramFactory;
use crate::metrics::ApiMetrics;
use mpp_core::{MppError, TextGenerator};
use mpp_llm::HttpTextGenerator;
use mpp_longitudinal::{DefaultMutator, PipelineScorer};
use mpp_quality::{LongitudinalMetric, SuccessGate, TraceCostMetric};
use std::sync::Arc;

pub struct AppState {
    pub config: ServiceConfig,
    pub backend: Arc<dyn TextGenerator>,
    pub metrics: ApiMetrics,
}

impl AppState {
    pub fn new(config: ServiceConfig, backend: Arc<dyn TextGenerator>) -> Result<Self, MppError> {
        config.validate()?;
        let metrics = ApiMetrics::new().map_err(|e| MppError::Config(format!("metrics: {}", e)))?;
        Ok(Self {
            config,
            backend,
            metrics,
        })
    }

    /// State backed by the configured HTTP backend.
    pub fn from_config(config: ServiceConfig) -> Result<Self, MppError> {
        let backend = HttpTextGenerator::new(&config.backend)?;
        Self::new(config, Arc::new(backend))
    }

    pub fn factory(&self) -> LlmProgramFactory {
        LlmProgramFactory::new(self.backend.clone(), &self.config)
    }

    pub fn gate(&self) -> SuccessGate {
        SuccessGate::new(self.config.scoring.clone())
    }

    pub fn scorer(&self) -> PipelineScorer {
        let metric: Box<dyn LongitudinalMetric> =
            match mpp_quality::metric_for(&self.config.metric, self.config.scoring.clone()) {
                Some(metric) => metric,
                None => Box::new(TraceCostMetric::with_profile(self.config.scoring.clone())),
            };
        PipelineScorer::new(Arc::new(self.factory())).with_metric(metric)
    }

    pub fn mutator(&self) -> DefaultMutator {
        let params = self.config.backend.params(self.config.models.mutator.as_deref());
        DefaultMutator::new(self.backend.clone(), params)
            .with_allowed_keys(self.config.mutable_keys.iter().cloned())
            .with_max_sentences(self.config.max_sentences)
    }
}
