//! End-to-end longitudinal refinement over scripted pipelines.
//!
//! The factory makes QA pass only when the executor primer mentions "good",
//! so the refiner has one concrete improvement to find.

use mpp_core::testing::{ScriptedBackend, ScriptedGenerator};
use mpp_core::{GenerationParams, GeneratorInput, MppError, RefinementConfig, Role};
use mpp_longitudinal::{
    Case, DefaultMutator, LongitudinalConfig, LongitudinalRefiner, PipelineScorer,
    ProgramFactory, ScoreFunction,
};
use mpp_pipeline::VerticalPipeline;
use mpp_quality::AllPassMetric;
use mpp_template::Blocks;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

const TEMPLATE: &str = "\
[ENTRY_PROMPT]
{{MPP_MUTABLE:entry_prompt}}Follow the user goal precisely.{{/MPP_MUTABLE}}
[STRATEGY_PAYLOAD]
{{MPP_MUTABLE:strategy_payload}}Keep it minimal.{{/MPP_MUTABLE}}
[EXECUTOR_PRIMER]
{{MPP_MUTABLE:executor_primer}}Be vague.{{/MPP_MUTABLE}}
";

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

#[derive(Default)]
struct PrimerFactory {
    architects: Mutex<Vec<Arc<ScriptedGenerator>>>,
}

impl PrimerFactory {
    fn architect_goals(&self) -> Vec<String> {
        self.architects
            .lock()
            .unwrap()
            .iter()
            .flat_map(|a| a.inputs())
            .filter_map(|input| match input {
                GeneratorInput::Architect { user_goal } => Some(user_goal),
                _ => None,
            })
            .collect()
    }
}

impl ProgramFactory for PrimerFactory {
    fn build(&self, blocks: &Blocks, _case: &Case) -> Result<VerticalPipeline, MppError> {
        let good = blocks.get("executor_primer").is_some_and(|p| p.contains("good"));
        let verdict = if good { "pass" } else { "fail" };

        let architect = Arc::new(ScriptedGenerator::new(Role::Architect).repeat(bundle_json()));
        self.architects.lock().unwrap().push(architect.clone());
        let executor = Arc::new(ScriptedGenerator::new(Role::Executor).repeat(json!({"final_response": "4"})));
        let qa = Arc::new(ScriptedGenerator::new(Role::Qa).repeat(json!({"verdict": verdict, "issues": []})));

        Ok(VerticalPipeline::new(architect, executor)
            .with_qa(qa)
            .with_config(
                RefinementConfig::default()
                    .with_executor_max_iters(1)
                    .with_architect_cycles(1),
            ))
    }
}

fn cases() -> Vec<Case> {
    vec![
        Case::new("sum", "What is 2+2?").open_world(),
        Case::new("product", "What is 2*2?").open_world(),
    ]
}

// =============================================================================
// Scoring
// =============================================================================

#[tokio::test]
async fn test_scorer_keeps_case_order() {
    let factory = Arc::new(PrimerFactory::default());
    let scorer = PipelineScorer::new(factory.clone());
    let blocks = mpp_template::extract(TEMPLATE).unwrap();
    let scored = scorer.score(TEMPLATE, &cases(), &blocks).await.unwrap();

    assert_eq!(scored.score, 0.0);
    let names: Vec<&str> = scored.traces.iter().map(|t| t.case.as_str()).collect();
    assert_eq!(names, ["sum", "product"]);
    assert!(scored.traces.iter().all(|t| t.qa_passed == Some(false)));

    let goals = factory.architect_goals();
    assert!(goals[0].contains(
        "Follow the user goal precisely.\n\nStrategy guidance:\nKeep it minimal.\n\nUser goal:\nWhat is 2+2?"
    ));
}

#[tokio::test]
async fn test_scorer_with_custom_metric() {
    let blocks: Blocks = [("executor_primer".to_string(), "Be good.".to_string())]
        .into_iter()
        .collect();
    let scorer = PipelineScorer::new(Arc::new(PrimerFactory::default()))
        .with_metric(Box::new(AllPassMetric::default()));
    let scored = scorer.score("", &cases(), &blocks).await.unwrap();
    assert_eq!(scored.score, 1.0);
}

// =============================================================================
// Refinement
// =============================================================================

#[tokio::test]
async fn test_refiner_finds_better_primer() {
    let backend = Arc::new(
        ScriptedBackend::new()
            .reply("{\"executor_primer\": \"Be good. Answer in JSON.\", \"entry_prompt\": \"ignored\"}"),
    );
    let mutator = DefaultMutator::new(backend.clone(), GenerationParams::default());
    let scorer = PipelineScorer::new(Arc::new(PrimerFactory::default()));
    let refiner = LongitudinalRefiner::new(Arc::new(mutator), Arc::new(scorer))
        .with_config(LongitudinalConfig::default().with_max_iters(3).with_patience(Some(0)));

    let result = refiner.refine(TEMPLATE, &cases(), None).await.unwrap();

    assert!((result.score - 4.0 / 6.0).abs() < 1e-9);
    assert_eq!(result.blocks["executor_primer"], "Be good. Answer in JSON.");
    assert_eq!(result.blocks["entry_prompt"], "Follow the user goal precisely.");
    assert!(result.template.contains("{{MPP_MUTABLE:executor_primer}}Be good. Answer in JSON.{{/MPP_MUTABLE}}"));

    // Baseline, the accepted candidate, then one failed mutation exceeds a
    // patience of zero and ends the run.
    assert_eq!(result.iterations, 2);
    assert_eq!(result.history.len(), 3);
    assert!(result.history[1].accepted);
    assert!(!result.history[2].accepted);

    let conversations = backend.conversations();
    assert_eq!(conversations.len(), 2);
    let second_prompt = &conversations[1].0[0].content;
    assert!(second_prompt.contains("Recent vertical traces:\n- sum: refinements=1, qa_passed=true"));
    assert!(second_prompt.contains("Longitudinal score history: last_score=0.67, best_score=0.67, delta=0.67"));
}

#[tokio::test]
async fn test_initial_overrides_apply_before_baseline() {
    let backend = Arc::new(ScriptedBackend::new());
    let mutator = DefaultMutator::new(backend, GenerationParams::default());
    let refiner = LongitudinalRefiner::new(
        Arc::new(mutator),
        Arc::new(PipelineScorer::new(Arc::new(PrimerFactory::default()))),
    )
    .with_config(LongitudinalConfig::default().with_max_iters(1));

    let overrides: Blocks = [("executor_primer".to_string(), "Stay good.".to_string())]
        .into_iter()
        .collect();
    let result = refiner.refine(TEMPLATE, &cases(), Some(&overrides)).await.unwrap();

    assert!(result.history[0].score > 0.0);
    assert_eq!(result.score, result.history[0].score);
    assert!(result.template.contains("Stay good."));
}
