//! HTTP handler tests
//!
//! The router runs in-process through `oneshot`; every model call goes to a
//! scripted backend so each test fixes the exact reply sequence.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use mpp_api::{create_app, AppState, ServiceConfig};
use mpp_core::testing::ScriptedBackend;
use mpp_core::GenerationError;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

// =============================================================================
// Fixtures
// =============================================================================

fn bundle_json() -> Value {
    json!({
        "meta_protocol_version": "1.0",
        "derivative_protocol_specification": {
            "protocol_name": "P",
            "abstract": "A",
            "tag_definition_schema": ["description"],
            "core_tag_library": {"$task": {"description": "d"}},
            "processor_semantics": {},
            "guiding_principles": {}
        },
        "derivative_protocol_payload": {"$task": "x"}
    })
}

fn app_with(backend: Arc<ScriptedBackend>) -> Router {
    let state = AppState::new(ServiceConfig::default(), backend).unwrap();
    create_app(Arc::new(state))
}

fn app() -> Router {
    app_with(Arc::new(ScriptedBackend::new()))
}

async fn send(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };
    let resp = app.oneshot(request).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).to_string()));
    (status, value)
}

// =============================================================================
// Health and metrics
// =============================================================================

#[tokio::test]
async fn test_health() {
    let (status, body) = send(app(), "GET", "/v1/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_metrics_count_requests() {
    let app = app();
    send(app.clone(), "GET", "/v1/health", None).await;
    let (status, body) = send(app, "GET", "/metrics", None).await;
    assert_eq!(status, StatusCode::OK);
    let text = body.as_str().unwrap();
    assert!(text.contains("mpp_requests_total{route=\"health\"} 1"));
}

// =============================================================================
// Bundles and templates
// =============================================================================

#[tokio::test]
async fn test_validate_accepts_stringified_bundle() {
    let mut bundle = bundle_json();
    bundle["derivative_protocol_payload"] = json!("```json\n{\"$task\": \"x\"}\n```");

    let (status, body) = send(app(), "POST", "/v1/bundle/validate", Some(bundle)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], true);
    assert!(body["digest"].as_str().unwrap().starts_with("blake3:"));
    assert_eq!(body["bundle"]["derivative_protocol_payload"]["$task"], "x");
}

#[tokio::test]
async fn test_validate_reports_violation() {
    let mut bundle = bundle_json();
    bundle["derivative_protocol_payload"]["$unknown"] = json!("z");

    let (status, body) = send(app(), "POST", "/v1/bundle/validate", Some(bundle)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], false);
    assert_eq!(body["violation"]["rule"], "unknown_payload_tags");
}

#[tokio::test]
async fn test_template_blocks_lists_occurrences() {
    let template = "A {{MPP_MUTABLE:x}}one{{/MPP_MUTABLE}} B {{MPP_MUTABLE:y}}two{{/MPP_MUTABLE}}";
    let (status, body) = send(app(), "POST", "/v1/template/blocks", Some(json!({ "template": template }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["names"], json!(["x", "y"]));
    assert_eq!(body["blocks"][1]["content"], "two");
}

#[tokio::test]
async fn test_template_blocks_malformed() {
    let (status, body) = send(
        app(),
        "POST",
        "/v1/template/blocks",
        Some(json!({ "template": "{{MPP_MUTABLE:x}}never closed" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "malformed_template");
    assert!(body["error"]["message"].as_str().unwrap().starts_with("TEMPLATE/MISSING_END"));
}

#[tokio::test]
async fn test_template_render_and_flatten() {
    let template = "Hi {{MPP_MUTABLE:x}}old{{/MPP_MUTABLE}}!";
    let (_, kept) = send(
        app(),
        "POST",
        "/v1/template/render",
        Some(json!({ "template": template, "blocks": {"x": "new"} })),
    )
    .await;
    assert_eq!(kept["template"], "Hi {{MPP_MUTABLE:x}}new{{/MPP_MUTABLE}}!");

    let (_, flat) = send(
        app(),
        "POST",
        "/v1/template/render",
        Some(json!({ "template": template, "blocks": {"x": "new"}, "flatten": true })),
    )
    .await;
    assert_eq!(flat["template"], "Hi new!");
}

// =============================================================================
// Refinement
// =============================================================================

#[tokio::test]
async fn test_refine_open_world_run() {
    let bundle = bundle_json().to_string();
    let backend = Arc::new(
        ScriptedBackend::new()
            .reply(bundle.clone())
            .reply(bundle)
            .reply(r#"{"decoded_bundle": "4"}"#)
            .reply(r#"{"verdict": "pass", "issues": []}"#),
    );
    let (status, body) = send(
        app_with(backend.clone()),
        "POST",
        "/v1/refine",
        Some(json!({
            "user_goal": "Add 2 and 2",
            "open_world": true,
            "blocks": {"executor_primer": "Answer with digits."}
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"]["success"], true);
    assert_eq!(body["outcome"]["execution"]["final_response"], "4");
    assert_eq!(body["trace"]["case"], "adhoc");
    assert_eq!(body["gate"]["verdict"], "PASS");

    let conversations = backend.conversations();
    assert_eq!(conversations.len(), 4);
    assert!(conversations[0].0[1].content.contains("User goal:\nAdd 2 and 2"));
    assert!(conversations[2].0[0].content.contains("Instructions:\nAnswer with digits."));
}

#[tokio::test]
async fn test_refine_architect_exhaustion_is_reported() {
    let backend = Arc::new(ScriptedBackend::new().reply("not json at all"));
    let mut config = ServiceConfig::default();
    config.refinement = config.refinement.with_architect_max_iters(2);
    let state = AppState::new(config, backend).unwrap();

    let (status, body) = send(
        create_app(Arc::new(state)),
        "POST",
        "/v1/refine",
        Some(json!({ "user_goal": "Add 2 and 2", "case": "sum" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["code"], "architect_exhausted");
    assert_eq!(body["trace"]["case"], "sum");
    assert!(body["last_bundle"].is_null());
}

#[tokio::test]
async fn test_optimize_keeps_baseline_when_mutation_is_a_no_op() {
    let bundle = bundle_json().to_string();
    let backend = Arc::new(
        ScriptedBackend::new()
            .reply(bundle.clone())
            .reply(bundle)
            .reply(r#"{"decoded_bundle": "4"}"#)
            .reply(r#"{"decoded_bundle": "4"}"#)
            .reply(r#"{"verdict": "pass", "issues": []}"#)
            .reply(r#"{"executor_primer": "Be brief."}"#),
    );
    let (status, body) = send(
        app_with(backend.clone()),
        "POST",
        "/v1/optimize",
        Some(json!({
            "template": "{{MPP_MUTABLE:executor_primer}}Be brief.{{/MPP_MUTABLE}}",
            "cases": [{"name": "sum", "user_goal": "Add 2 and 2"}],
            "config": {"max_iters": 1}
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let score = body["score"].as_f64().unwrap();
    assert!((score - 4.0 / 7.0).abs() < 1e-9, "{}", score);
    assert_eq!(body["iterations"], 1);
    assert_eq!(body["history"].as_array().unwrap().len(), 2);
    assert_eq!(body["history"][1]["accepted"], false);
    assert_eq!(body["traces"][0]["case"], "sum");
    assert_eq!(body["summary"]["case_count"], 1);
    assert_eq!(body["summary"]["passed"], 1);
    assert_eq!(body["summary"]["average_executor_refinements"], 1.0);
    assert_eq!(backend.conversations().len(), 6);
}

#[tokio::test]
async fn test_optimize_requires_cases() {
    let (status, body) = send(
        app(),
        "POST",
        "/v1/optimize",
        Some(json!({ "template": "{{MPP_MUTABLE:x}}a{{/MPP_MUTABLE}}", "cases": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "invalid_config");
}

#[tokio::test]
async fn test_optimize_backend_failure_during_baseline_is_scored_not_fatal() {
    let backend = Arc::new(
        ScriptedBackend::new().fail(GenerationError::Forbidden {
            status: 403,
            model: "gpt-4o-mini".to_string(),
        }),
    );
    let mut config = ServiceConfig::default();
    config.refinement = config.refinement.with_architect_max_iters(1);
    config.longitudinal.max_iters = 0;
    let state = AppState::new(config, backend).unwrap();

    let (status, body) = send(
        create_app(Arc::new(state)),
        "POST",
        "/v1/optimize",
        Some(json!({
            "template": "{{MPP_MUTABLE:strategy_payload}}Plan.{{/MPP_MUTABLE}}",
            "cases": [{"name": "sum", "user_goal": "Add 2 and 2"}]
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["score"], 0.0);
    assert_eq!(body["iterations"], 0);
}
