//! API Handlers
use crate::state::AppState;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use mpp_bundle::{normalize, Bundle};
use mpp_core::{MppError, RunContext};
use mpp_longitudinal::{compose_goal, Case, LongitudinalConfig, LongitudinalRefiner, ProgramFactory};
use mpp_pipeline::{PipelineFailure, RunOptions};
use mpp_quality::{LongitudinalTrace, TraceSummary};
use mpp_template::{block_names, flatten, list_blocks, render, Blocks};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

type Shared = State<Arc<AppState>>;

#[derive(Debug, Deserialize)]
pub struct TemplateRequest {
    pub template: String,
}

#[derive(Debug, Deserialize)]
pub struct RenderRequest {
    pub template: String,
    #[serde(default)]
    pub blocks: Blocks,
    /// Strip the region markers from the result.
    #[serde(default)]
    pub flatten: bool,
}

#[derive(Debug, Deserialize)]
pub struct RefineRequest {
    pub user_goal: String,
    #[serde(default)]
    pub case: Option<String>,
    #[serde(default)]
    pub open_world: bool,
    #[serde(default)]
    pub use_cot: bool,
    /// Tuned blocks: entry prompt, strategy and role primers.
    #[serde(default)]
    pub blocks: Blocks,
}

#[derive(Debug, Deserialize)]
pub struct OptimizeRequest {
    pub template: String,
    pub cases: Vec<Case>,
    #[serde(default)]
    pub initial_overrides: Option<Blocks>,
    #[serde(default)]
    pub config: Option<LongitudinalConfig>,
}

pub fn error_code(error: &MppError) -> &'static str {
    match error {
        MppError::MalformedTemplate(_) => "malformed_template",
        MppError::NoMutableBlocks => "no_mutable_blocks",
        MppError::BundleInvalid(_) => "bundle_invalid",
        MppError::MissingField { .. } => "missing_field",
        MppError::MissingReasoning => "missing_reasoning",
        MppError::ArchitectExhausted { .. } => "architect_exhausted",
        MppError::QaNotConfigured => "qa_not_configured",
        MppError::Generation(_) => "generation_failed",
        MppError::Config(_) => "invalid_config",
        MppError::Serialization(_) => "serialization",
    }
}

pub fn error_status(error: &MppError) -> StatusCode {
    match error {
        MppError::MalformedTemplate(_)
        | MppError::NoMutableBlocks
        | MppError::BundleInvalid(_)
        | MppError::Config(_) => StatusCode::UNPROCESSABLE_ENTITY,
        MppError::Generation(_)
        | MppError::MissingField { .. }
        | MppError::MissingReasoning
        | MppError::ArchitectExhausted { .. } => StatusCode::BAD_GATEWAY,
        MppError::QaNotConfigured | MppError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_body(error: &MppError) -> Value {
    json!({ "code": error_code(error), "message": error.to_string() })
}

fn error_response(error: &MppError) -> (StatusCode, Json<Value>) {
    (error_status(error), Json(json!({ "error": error_body(error) })))
}

pub async fn health(State(state): Shared) -> (StatusCode, Json<Value>) {
    state.metrics.hit("health");
    (
        StatusCode::OK,
        Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") })),
    )
}

/// Normalizes and validates a bundle. An invalid bundle is a normal answer.
pub async fn validate_bundle(State(state): Shared, Json(payload): Json<Value>) -> (StatusCode, Json<Value>) {
    state.metrics.hit("bundle_validate");
    let normalized = normalize(payload);
    match Bundle::from_value(&normalized) {
        Ok(bundle) => (
            StatusCode::OK,
            Json(json!({
                "valid": true,
                "digest": bundle.digest(),
                "bundle": bundle.to_value(),
            })),
        ),
        Err(violation) => (
            StatusCode::OK,
            Json(json!({
                "valid": false,
                "message": violation.to_string(),
                "violation": violation,
            })),
        ),
    }
}

pub async fn template_blocks(State(state): Shared, Json(req): Json<TemplateRequest>) -> (StatusCode, Json<Value>) {
    state.metrics.hit("template_blocks");
    let listed = list_blocks(&req.template).and_then(|blocks| Ok((blocks, block_names(&req.template)?)));
    match listed {
        Ok((blocks, names)) => (StatusCode::OK, Json(json!({ "names": names, "blocks": blocks }))),
        Err(e) => error_response(&MppError::from(e)),
    }
}

pub async fn template_render(State(state): Shared, Json(req): Json<RenderRequest>) -> (StatusCode, Json<Value>) {
    state.metrics.hit("template_render");
    let rendered = render(&req.template, &req.blocks).and_then(|text| {
        if req.flatten {
            flatten(&text)
        } else {
            Ok(text)
        }
    });
    match rendered {
        Ok(text) => (StatusCode::OK, Json(json!({ "template": text }))),
        Err(e) => error_response(&MppError::from(e)),
    }
}

/// One vertical run for a single goal.
pub async fn refine(State(state): Shared, Json(req): Json<RefineRequest>) -> (StatusCode, Json<Value>) {
    state.metrics.hit("refine");
    let case = Case {
        name: req.case.unwrap_or_else(|| "adhoc".to_string()),
        user_goal: req.user_goal,
        open_world: req.open_world,
        use_cot: req.use_cot,
    };
    let pipeline = match state.factory().build(&req.blocks, &case) {
        Ok(pipeline) => pipeline,
        Err(e) => return error_response(&e),
    };
    let options = RunOptions {
        open_world: case.open_world,
        expect_reasoning: case.use_cot,
    };
    let goal = compose_goal(&req.blocks, &case.user_goal);

    match pipeline
        .run_with_context(&goal, options, RunContext::for_case(case.name.as_str()))
        .await
    {
        Ok(outcome) => {
            let label = if outcome.success { "success" } else { "unsuccessful" };
            state.metrics.vertical_runs.with_label_values(&[label]).inc();
            let trace = LongitudinalTrace::from_outcome(case.name.as_str(), &outcome);
            let gate = state.gate().evaluate(&trace);
            info!(case = %case.name, success = outcome.success, verdict = %gate.verdict, "vertical run finished");
            (
                StatusCode::OK,
                Json(json!({ "outcome": outcome, "trace": trace, "gate": gate })),
            )
        }
        Err(failure) => {
            state.metrics.vertical_runs.with_label_values(&["failed"]).inc();
            warn!(case = %case.name, error = %failure, "vertical run failed");
            let trace = LongitudinalTrace::from_failure(case.name.as_str(), &failure);
            (error_status(&failure.error), Json(failure_body(&failure, &trace)))
        }
    }
}

fn failure_body(failure: &PipelineFailure, trace: &LongitudinalTrace) -> Value {
    json!({
        "error": error_body(&failure.error),
        "run_id": failure.context.run_id,
        "last_bundle": failure.last_bundle.as_ref().map(Bundle::to_value),
        "last_response": failure.last_response,
        "cycles": failure.cycles,
        "feedback": failure.feedback.to_value(),
        "trace": trace,
    })
}

/// Longitudinal refinement of a template over a case set.
pub async fn optimize(State(state): Shared, Json(req): Json<OptimizeRequest>) -> (StatusCode, Json<Value>) {
    state.metrics.hit("optimize");
    if req.cases.is_empty() {
        return error_response(&MppError::Config("cases must not be empty".to_string()));
    }
    let config = req.config.unwrap_or_else(|| state.config.longitudinal.clone());
    if let Err(e) = config.validate() {
        return error_response(&e);
    }

    let refiner = LongitudinalRefiner::new(Arc::new(state.mutator()), Arc::new(state.scorer())).with_config(config);
    match refiner
        .refine(&req.template, &req.cases, req.initial_overrides.as_ref())
        .await
    {
        Ok(result) => {
            state.metrics.optimize_runs.with_label_values(&["completed"]).inc();
            state.metrics.last_optimize_score.set(result.score);
            let summary = TraceSummary::from_traces(&result.traces, &state.gate());
            info!(
                score = result.score,
                iterations = result.iterations,
                passed = summary.passed,
                "longitudinal run finished"
            );
            let mut body = json!(result);
            body["summary"] = json!(summary);
            (StatusCode::OK, Json(body))
        }
        Err(e) => {
            state.metrics.optimize_runs.with_label_values(&["failed"]).inc();
            warn!(error = %e, "longitudinal run failed");
            error_response(&e)
        }
    }
}

pub async fn metrics(State(state): Shared) -> Response {
    match state.metrics.encode() {
        Ok(text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}
