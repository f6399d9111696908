//! Vertical pipeline: architect ↔ executor cycles over one user goal.

use crate::architect::{refine_bundle, BundleRequest};
use crate::executor::execute_bundle;
use crate::feedback::{FeedbackEvent, FeedbackTrace};
use crate::step::{
    BundleResult, ExecutionFailure, ExecutionResult, PipelineFailure, RunOptions, VerticalOutcome,
};
use mpp_bundle::Bundle;
use mpp_core::{FeedbackSink, Generator, MppError, RefinementConfig, RunContext};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, info_span, Instrument};

pub struct VerticalPipeline {
    architect: Arc<dyn Generator>,
    executor: Arc<dyn Generator>,
    qa: Option<Arc<dyn Generator>>,
    feedback_sink: Option<Arc<dyn FeedbackSink>>,
    config: RefinementConfig,
}

impl VerticalPipeline {
    pub fn new(architect: Arc<dyn Generator>, executor: Arc<dyn Generator>) -> Self {
        Self {
            architect,
            executor,
            qa: None,
            feedback_sink: None,
            config: RefinementConfig::default(),
        }
    }

    pub fn with_qa(mut self, qa: Arc<dyn Generator>) -> Self {
        self.qa = Some(qa);
        self
    }

    /// Receives QA feedback before each open-world executor call and `None`
    /// when the execution loop ends.
    pub fn with_feedback_sink(mut self, sink: Arc<dyn FeedbackSink>) -> Self {
        self.feedback_sink = Some(sink);
        self
    }

    pub fn with_config(mut self, config: RefinementConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &RefinementConfig {
        &self.config
    }

    pub fn has_qa(&self) -> bool {
        self.qa.is_some()
    }

    /// Runs the architect loop once.
    pub async fn build_bundle(
        &self,
        user_goal: &str,
        request: &BundleRequest,
    ) -> Result<BundleResult, MppError> {
        let max_iters = request.max_iters.unwrap_or(self.config.architect_max_iters);
        refine_bundle(self.architect.as_ref(), user_goal, request, max_iters).await
    }

    /// Runs the executor loop once over a validated bundle.
    pub async fn execute(
        &self,
        bundle: &Bundle,
        options: RunOptions,
    ) -> Result<ExecutionResult, ExecutionFailure> {
        execute_bundle(
            self.executor.as_ref(),
            self.qa.as_deref(),
            self.feedback_sink.as_deref(),
            bundle,
            options,
            self.config.executor_max_iters,
        )
        .await
    }

    pub async fn run(
        &self,
        user_goal: &str,
        options: RunOptions,
    ) -> Result<VerticalOutcome, PipelineFailure> {
        self.run_with_context(user_goal, options, RunContext::new()).await
    }

    /// Architect/executor cycles until the execution succeeds or the cycle
    /// cap is reached. Each failed cycle appends to the feedback trace that
    /// the next architect loop sees.
    pub async fn run_with_context(
        &self,
        user_goal: &str,
        options: RunOptions,
        context: RunContext,
    ) -> Result<VerticalOutcome, PipelineFailure> {
        let span = info_span!(
            "vertical_run",
            run_id = %context.run_id,
            case = context.case.as_deref().unwrap_or("-"),
            open_world = options.open_world,
        );
        self.cycle(user_goal, options, context).instrument(span).await
    }

    async fn cycle(
        &self,
        user_goal: &str,
        options: RunOptions,
        context: RunContext,
    ) -> Result<VerticalOutcome, PipelineFailure> {
        let max_cycles = self.config.architect_cycles.max(1);
        let mut progress = Progress::default();
        let mut previous: Option<Value> = None;
        let mut cycle = 0;

        loop {
            cycle += 1;
            let request = BundleRequest {
                previous_bundle: previous.take(),
                refinement_context: (!progress.feedback.is_empty())
                    .then(|| progress.feedback.to_refinement_context()),
                max_iters: None,
            };

            let bundle = match self.build_bundle(user_goal, &request).await {
                Ok(result) => result,
                Err(error) => {
                    if let MppError::ArchitectExhausted { iterations, .. } = &error {
                        progress.architect_iterations += iterations;
                    }
                    return Err(progress.fail(error, context, cycle));
                }
            };
            progress.architect_iterations += bundle.iterations;
            progress.last_bundle = Some(bundle.bundle.clone());

            let execution = match self.execute(&bundle.bundle, options).await {
                Ok(result) => result,
                Err(failure) => {
                    progress.executor_iterations += failure.iterations;
                    if failure.last_response.is_some() {
                        progress.last_response = failure.last_response;
                    }
                    return Err(progress.fail(failure.error, context, cycle));
                }
            };
            progress.executor_iterations += execution.iterations;
            if execution.produced_response() {
                progress.last_response = Some(execution.final_response.clone());
            }

            let success = execution.succeeded(options.open_world);
            if success || cycle >= max_cycles {
                info!(cycle, success, elapsed_ms = context.elapsed_ms(), "vertical run finished");
                return Ok(progress.finish(context, bundle, execution, options.open_world, success, cycle));
            }

            if let Some(error) = bundle.trailing_error().and_then(|step| step.error.as_deref()) {
                progress.feedback = progress.feedback.append(FeedbackEvent::bundle_invalid(error));
            }
            let event = FeedbackEvent::from_execution(&execution);
            info!(cycle, kind = ?event.kind, "execution failed, re-running architect with feedback");
            progress.feedback = progress.feedback.append(event);
            previous = Some(bundle.bundle.to_value());
        }
    }
}

/// State accumulated across cycles.
#[derive(Default)]
struct Progress {
    feedback: FeedbackTrace,
    last_bundle: Option<Bundle>,
    last_response: Option<String>,
    architect_iterations: usize,
    executor_iterations: usize,
}

impl Progress {
    fn fail(self, error: MppError, context: RunContext, cycles: usize) -> PipelineFailure {
        PipelineFailure {
            error,
            context,
            last_bundle: self.last_bundle,
            last_response: self.last_response,
            cycles,
            feedback: self.feedback,
            bundle_refinements_total: self.architect_iterations.saturating_sub(1),
            executor_refinements_total: self.executor_iterations.saturating_sub(1),
        }
    }

    fn finish(
        self,
        context: RunContext,
        bundle: BundleResult,
        execution: ExecutionResult,
        open_world: bool,
        success: bool,
        cycles: usize,
    ) -> VerticalOutcome {
        VerticalOutcome {
            context,
            bundle,
            execution,
            open_world,
            success,
            cycles,
            feedback: self.feedback,
            bundle_refinements_total: self.architect_iterations.saturating_sub(1),
            executor_refinements_total: self.executor_iterations.saturating_sub(1),
        }
    }
}
