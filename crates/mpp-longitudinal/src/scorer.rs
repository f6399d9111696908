//! Scoring a template by running every case through a vertical pipeline.

use crate::case::Case;
use crate::refiner::{LongitudinalScore, ScoreFunction};
use async_trait::async_trait;
use mpp_core::{MppError, RunContext};
use mpp_pipeline::{RunOptions, VerticalPipeline};
use mpp_quality::{LongitudinalMetric, LongitudinalTrace, TraceCostMetric};
use mpp_template::Blocks;
use std::sync::Arc;
use tracing::{debug, warn};

/// Builds the pipeline a case runs on, with role instructions taken from the blocks.
pub trait ProgramFactory: Send + Sync {
    fn build(&self, blocks: &Blocks, case: &Case) -> Result<VerticalPipeline, MppError>;
}

/// Goal text sent to the architect: entry prompt, strategy guidance, then the user goal.
pub fn compose_goal(blocks: &Blocks, user_goal: &str) -> String {
    let section = |name: &str| {
        blocks
            .get(name)
            .map(|text| text.trim())
            .filter(|text| !text.is_empty())
    };

    let mut parts = Vec::new();
    if let Some(entry) = section("entry_prompt") {
        parts.push(entry.to_string());
    }
    if let Some(strategy) = section("strategy_payload") {
        parts.push(format!("Strategy guidance:\n{}", strategy));
    }
    parts.push(format!("User goal:\n{}", user_goal));
    parts.join("\n\n")
}

pub struct PipelineScorer {
    factory: Arc<dyn ProgramFactory>,
    metric: Box<dyn LongitudinalMetric>,
}

impl PipelineScorer {
    pub fn new(factory: Arc<dyn ProgramFactory>) -> Self {
        Self {
            factory,
            metric: Box::new(TraceCostMetric::default()),
        }
    }

    pub fn with_metric(mut self, metric: Box<dyn LongitudinalMetric>) -> Self {
        self.metric = metric;
        self
    }

    /// Runs cases one after another; traces come back in case order.
    pub async fn run_cases(&self, cases: &[Case], blocks: &Blocks) -> Result<Vec<LongitudinalTrace>, MppError> {
        let mut traces = Vec::with_capacity(cases.len());
        for case in cases {
            let pipeline = self.factory.build(blocks, case)?;
            let options = RunOptions {
                open_world: case.open_world,
                expect_reasoning: case.use_cot,
            };
            let goal = compose_goal(blocks, &case.user_goal);
            let trace = match pipeline
                .run_with_context(&goal, options, RunContext::for_case(case.name.as_str()))
                .await
            {
                Ok(outcome) => {
                    debug!(case = %case.name, success = outcome.success, cycles = outcome.cycles, "case finished");
                    LongitudinalTrace::from_outcome(case.name.as_str(), &outcome)
                }
                Err(failure) => {
                    warn!(case = %case.name, error = %failure, "case failed");
                    LongitudinalTrace::from_failure(case.name.as_str(), &failure)
                }
            };
            traces.push(trace);
        }
        Ok(traces)
    }
}

#[async_trait]
impl ScoreFunction for PipelineScorer {
    async fn score(&self, _template: &str, cases: &[Case], blocks: &Blocks) -> Result<LongitudinalScore, MppError> {
        let traces = self.run_cases(cases, blocks).await?;
        Ok(LongitudinalScore {
            score: self.metric.score(&traces),
            traces,
        })
    }
}
