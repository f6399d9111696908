//! Longitudinal metrics over trace sets
//!
//! A metric maps the traces of one scoring pass to a scalar where higher is
//! better. Empty trace sets score `0.0`.

use super::gate::SuccessGate;
use super::profile::ScoringProfile;
use super::trace::LongitudinalTrace;
use serde::{Deserialize, Serialize};

pub trait LongitudinalMetric: Send + Sync {
    fn name(&self) -> &str;

    fn score(&self, traces: &[LongitudinalTrace]) -> f64;
}

/// Rewards successful traces and discounts them by their refinements.
///
/// Architect refinements weigh `final / m`, executor refinements `final / m²`,
/// so early-stage churn costs more than late-stage polishing.
#[derive(Debug, Clone)]
pub struct TraceCostMetric {
    pub final_weight: f64,
    pub architect_weight: f64,
    pub executor_weight: f64,
    gate: SuccessGate,
}

impl TraceCostMetric {
    pub fn new() -> Self {
        Self::with_profile(ScoringProfile::strict())
    }

    pub fn with_profile(profile: ScoringProfile) -> Self {
        Self {
            final_weight: profile.final_weight,
            architect_weight: profile.architect_weight(),
            executor_weight: profile.executor_weight(),
            gate: SuccessGate::new(profile),
        }
    }

    pub fn with_weights(mut self, final_weight: f64, architect_weight: f64, executor_weight: f64) -> Self {
        self.final_weight = final_weight;
        self.architect_weight = architect_weight;
        self.executor_weight = executor_weight;
        self
    }

    pub fn case_score(&self, trace: &LongitudinalTrace) -> f64 {
        if !self.gate.passes(trace) {
            return 0.0;
        }
        let refinements = self.architect_weight * trace.bundle_refinements.unwrap_or(0) as f64
            + self.executor_weight * trace.executor_refinements.unwrap_or(0) as f64;
        self.final_weight / (self.final_weight + refinements)
    }
}

impl Default for TraceCostMetric {
    fn default() -> Self {
        Self::new()
    }
}

impl LongitudinalMetric for TraceCostMetric {
    fn name(&self) -> &str {
        "trace_cost"
    }

    fn score(&self, traces: &[LongitudinalTrace]) -> f64 {
        if traces.is_empty() {
            return 0.0;
        }
        traces.iter().map(|t| self.case_score(t)).sum::<f64>() / traces.len() as f64
    }
}

/// Fraction of traces that pass the gate, ignoring cost.
#[derive(Debug, Clone, Default)]
pub struct AllPassMetric {
    gate: SuccessGate,
}

impl AllPassMetric {
    pub fn new(profile: ScoringProfile) -> Self {
        Self {
            gate: SuccessGate::new(profile),
        }
    }
}

impl LongitudinalMetric for AllPassMetric {
    fn name(&self) -> &str {
        "all_pass"
    }

    fn score(&self, traces: &[LongitudinalTrace]) -> f64 {
        if traces.is_empty() {
            return 0.0;
        }
        let passed = traces.iter().filter(|t| self.gate.passes(t)).count();
        passed as f64 / traces.len() as f64
    }
}

/// Aggregate view of one scoring pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceSummary {
    pub case_count: usize,
    pub passed: usize,
    pub pass_rate: f64,
    pub average_bundle_refinements: f64,
    pub average_executor_refinements: f64,
    pub total_issues: usize,
    pub total_errors: usize,
}

impl TraceSummary {
    pub fn from_traces(traces: &[LongitudinalTrace], gate: &SuccessGate) -> Self {
        let count = traces.len();
        let average = |f: fn(&LongitudinalTrace) -> usize| {
            if count == 0 {
                0.0
            } else {
                traces.iter().map(f).sum::<usize>() as f64 / count as f64
            }
        };
        let passed = traces.iter().filter(|t| gate.passes(t)).count();

        Self {
            case_count: count,
            passed,
            pass_rate: if count == 0 { 0.0 } else { passed as f64 / count as f64 },
            average_bundle_refinements: average(|t| t.bundle_refinements.unwrap_or(0)),
            average_executor_refinements: average(|t| t.executor_refinements.unwrap_or(0)),
            total_issues: traces.iter().map(LongitudinalTrace::issue_count).sum(),
            total_errors: traces.iter().map(|t| t.errors.len()).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trace(bundle: usize, executor: usize, qa_passed: Option<bool>) -> LongitudinalTrace {
        LongitudinalTrace::new("case")
            .with_flags(true, true, qa_passed)
            .with_refinements(bundle, executor)
    }

    #[test]
    fn test_empty_scores_zero() {
        assert_eq!(TraceCostMetric::new().score(&[]), 0.0);
        assert_eq!(AllPassMetric::default().score(&[]), 0.0);
    }

    #[test]
    fn test_failure_scores_zero() {
        let metric = TraceCostMetric::new();
        assert_eq!(metric.score(&[trace(0, 0, Some(false))]), 0.0);
    }

    #[test]
    fn test_weights_refinements() {
        let metric = TraceCostMetric::new();
        let expected = 4.0 / (4.0 + 2.0 * 1.0 + 1.0 * 2.0);
        assert!((metric.score(&[trace(1, 2, Some(true))]) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_architect_churn_costs_more() {
        let metric = TraceCostMetric::new();
        let architect_heavy = metric.score(&[trace(2, 0, Some(true))]);
        let executor_heavy = metric.score(&[trace(0, 2, Some(true))]);
        assert!(architect_heavy < executor_heavy);
        assert_eq!(metric.score(&[trace(0, 0, Some(true))]), 1.0);
    }

    #[test]
    fn test_lenient_profile_scores_closed_world() {
        let closed = trace(0, 1, None);
        assert_eq!(TraceCostMetric::new().score(&[closed.clone()]), 0.0);
        let lenient = TraceCostMetric::with_profile(ScoringProfile::lenient());
        assert!((lenient.score(&[closed]) - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_default_metric_scores_closed_world_without_qa() {
        let closed = LongitudinalTrace {
            open_world: Some(false),
            ..trace(0, 1, None)
        };
        assert!((TraceCostMetric::default().score(&[closed]) - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_average_over_traces() {
        let metric = AllPassMetric::default();
        let traces = [trace(0, 0, Some(true)), trace(0, 0, Some(false))];
        assert_eq!(metric.score(&traces), 0.5);
    }

    #[test]
    fn test_summary() {
        let traces = [trace(2, 0, Some(true)), trace(0, 2, Some(false))];
        let summary = TraceSummary::from_traces(&traces, &SuccessGate::default());
        assert_eq!(summary.case_count, 2);
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.pass_rate, 0.5);
        assert_eq!(summary.average_bundle_refinements, 1.0);
        assert_eq!(summary.average_executor_refinements, 1.0);
    }
}
