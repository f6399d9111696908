//! Single-candidate hill climbing over a template's mutable blocks.

use crate::case::Case;
use crate::config::LongitudinalConfig;
use crate::mutation::{MutationPolicy, MutationRequest};
use async_trait::async_trait;
use mpp_core::MppError;
use mpp_quality::LongitudinalTrace;
use mpp_template::{extract, render, Blocks};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Score of one rendered template over the whole case set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LongitudinalScore {
    pub score: f64,
    /// One trace per case, in case order.
    #[serde(default)]
    pub traces: Vec<LongitudinalTrace>,
}

impl From<f64> for LongitudinalScore {
    fn from(score: f64) -> Self {
        Self {
            score,
            traces: Vec::new(),
        }
    }
}

#[async_trait]
pub trait ScoreFunction: Send + Sync {
    async fn score(&self, template: &str, cases: &[Case], blocks: &Blocks) -> Result<LongitudinalScore, MppError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LongitudinalStep {
    pub iteration: usize,
    pub template: String,
    pub score: f64,
    /// Whether this candidate became the new best.
    pub accepted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LongitudinalResult {
    pub template: String,
    pub score: f64,
    /// Mutation rounds actually run.
    pub iterations: usize,
    pub history: Vec<LongitudinalStep>,
    /// Winning block contents, keyed by block name.
    pub blocks: Blocks,
    /// Traces behind the winning score, one per case.
    #[serde(default)]
    pub traces: Vec<LongitudinalTrace>,
}

pub struct LongitudinalRefiner {
    mutator: Arc<dyn MutationPolicy>,
    scorer: Arc<dyn ScoreFunction>,
    config: LongitudinalConfig,
}

impl LongitudinalRefiner {
    pub fn new(mutator: Arc<dyn MutationPolicy>, scorer: Arc<dyn ScoreFunction>) -> Self {
        Self {
            mutator,
            scorer,
            config: LongitudinalConfig::default(),
        }
    }

    pub fn with_config(mut self, config: LongitudinalConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &LongitudinalConfig {
        &self.config
    }

    pub async fn refine(
        &self,
        template: &str,
        cases: &[Case],
        initial_overrides: Option<&Blocks>,
    ) -> Result<LongitudinalResult, MppError> {
        let mut current = extract(template)?;
        if current.is_empty() {
            return Err(MppError::NoMutableBlocks);
        }
        for (name, content) in initial_overrides.into_iter().flatten() {
            match current.get_mut(name) {
                Some(slot) => *slot = content.clone(),
                None => warn!(block = %name, "ignoring override for a block the template does not contain"),
            }
        }

        let mut best_template = render(template, &current)?;
        let baseline = self.scorer.score(&best_template, cases, &current).await?;
        let mut best_score = baseline.score;
        let mut traces = baseline.traces;
        info!(score = best_score, cases = cases.len(), "baseline template scored");

        let mut history = vec![LongitudinalStep {
            iteration: 0,
            template: best_template.clone(),
            score: best_score,
            accepted: true,
        }];
        let mut rejected_in_a_row = 0;

        for iteration in 1..=self.config.max_iters {
            let request = MutationRequest {
                blocks: &current,
                cases,
                traces: &traces,
                history: &history,
            };
            let proposal = match self.mutator.propose(&request).await {
                Ok(proposal) => proposal,
                Err(e) => {
                    warn!(iteration, error = %e, "mutation failed, keeping current blocks");
                    Blocks::new()
                }
            };

            let mut merged = current.clone();
            for (name, content) in proposal {
                if merged.contains_key(&name) {
                    merged.insert(name, content);
                } else {
                    debug!(iteration, block = %name, "ignoring proposal for unknown block");
                }
            }

            let accepted = if merged == current {
                debug!(iteration, "empty proposal");
                history.push(LongitudinalStep {
                    iteration,
                    template: best_template.clone(),
                    score: best_score,
                    accepted: false,
                });
                false
            } else {
                let candidate = render(template, &merged)?;
                let scored = self.scorer.score(&candidate, cases, &merged).await?;
                let accepted = self.config.is_better(scored.score, best_score);
                info!(iteration, score = scored.score, best = best_score, accepted, "candidate scored");
                history.push(LongitudinalStep {
                    iteration,
                    template: candidate.clone(),
                    score: scored.score,
                    accepted,
                });
                if accepted {
                    best_template = candidate;
                    best_score = scored.score;
                    traces = scored.traces;
                    current = merged;
                }
                accepted
            };

            if accepted {
                rejected_in_a_row = 0;
            } else {
                rejected_in_a_row += 1;
                if self.config.patience.is_some_and(|limit| rejected_in_a_row > limit) {
                    info!(iteration, rejected_in_a_row, "patience exhausted, stopping early");
                    break;
                }
            }
        }

        Ok(LongitudinalResult {
            template: best_template,
            score: best_score,
            iterations: history.len() - 1,
            history,
            blocks: current,
            traces,
        })
    }
}
