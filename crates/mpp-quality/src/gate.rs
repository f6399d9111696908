//! Success gate over vertical traces
//!
//! Evaluates a trace against a scoring profile and produces
//! a verdict (PASS, FAIL).

use super::profile::ScoringProfile;
use super::trace::LongitudinalTrace;
use serde::{Deserialize, Serialize};

/// Single check result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Check {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    pub impact: i32, // Score impact (negative)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckStatus {
    Ok,
    Warn,
    Fail,
}

/// Overall gate verdict
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateVerdict {
    /// Overall verdict
    pub verdict: String, // "PASS" | "FAIL"

    /// Numeric score (0-100)
    pub score: u32,

    /// Individual check results
    pub checks: Vec<Check>,

    /// Profile used for evaluation
    pub profile: String,

    /// Summary message
    pub summary: String,
}

impl GateVerdict {
    pub fn passed(&self) -> bool {
        self.verdict == "PASS"
    }
}

/// Gate deciding whether a trace counts as a successful run
#[derive(Debug, Clone)]
pub struct SuccessGate {
    profile: ScoringProfile,
}

impl SuccessGate {
    pub fn new(profile: ScoringProfile) -> Self {
        Self { profile }
    }

    pub fn for_mode(mode: &str) -> Self {
        Self::new(ScoringProfile::for_mode(mode))
    }

    pub fn profile(&self) -> &ScoringProfile {
        &self.profile
    }

    pub fn passes(&self, trace: &LongitudinalTrace) -> bool {
        self.evaluate(trace).passed()
    }

    pub fn evaluate(&self, trace: &LongitudinalTrace) -> GateVerdict {
        let mut checks = Vec::new();

        // === Stability ===
        checks.push(self.flag_check(
            "bundle_stable",
            trace.bundle_stable,
            self.profile.require_bundle_stable,
            "bundle",
        ));
        checks.push(self.flag_check(
            "executor_stable",
            trace.executor_stable,
            self.profile.require_executor_stable,
            "executor response",
        ));

        // === QA ===
        checks.push(match trace.qa_passed {
            Some(true) => Check {
                name: "qa_passed".to_string(),
                status: CheckStatus::Ok,
                message: "QA passed".to_string(),
                impact: 0,
            },
            Some(false) => Check {
                name: "qa_passed".to_string(),
                status: CheckStatus::Fail,
                message: format!("QA failed with {} issue(s)", trace.issue_count()),
                impact: -40,
            },
            None if self.profile.require_qa_passed && trace.open_world != Some(false) => Check {
                name: "qa_passed".to_string(),
                status: CheckStatus::Fail,
                message: "No QA verdict recorded".to_string(),
                impact: -40,
            },
            // Closed-world runs converge on stability alone.
            None => Check {
                name: "qa_passed".to_string(),
                status: CheckStatus::Ok,
                message: "QA not evaluated".to_string(),
                impact: 0,
            },
        });

        // === Errors ===
        if !trace.errors.is_empty() {
            let status = if self.profile.fail_on_errors {
                CheckStatus::Fail
            } else {
                CheckStatus::Warn
            };
            checks.push(Check {
                name: "errors".to_string(),
                status,
                message: format!("{} error(s) recorded: {}", trace.errors.len(), trace.errors.join("; ")),
                impact: -10,
            });
        }

        // === Refinement Budget ===
        if let Some(max) = self.profile.max_refinements {
            let total = trace.total_refinements();
            if total > max {
                checks.push(Check {
                    name: "refinement_budget".to_string(),
                    status: CheckStatus::Warn,
                    message: format!("{} refinements (limit: {})", total, max),
                    impact: -10,
                });
            } else {
                checks.push(Check {
                    name: "refinement_budget".to_string(),
                    status: CheckStatus::Ok,
                    message: format!("{}/{} refinements", total, max),
                    impact: 0,
                });
            }
        }

        let score = (100 + checks.iter().map(|c| c.impact).sum::<i32>()).max(0);
        let failed: Vec<&str> = checks
            .iter()
            .filter(|c| c.status == CheckStatus::Fail)
            .map(|c| c.name.as_str())
            .collect();
        let warned: Vec<&str> = checks
            .iter()
            .filter(|c| c.status == CheckStatus::Warn)
            .map(|c| c.name.as_str())
            .collect();

        let (verdict, summary) = if !failed.is_empty() {
            ("FAIL", format!("{}: failed {}", trace.case, failed.join(", ")))
        } else if !warned.is_empty() {
            ("PASS", format!("{}: passed with warnings: {}", trace.case, warned.join(", ")))
        } else {
            ("PASS", format!("{}: all checks passed", trace.case))
        };

        GateVerdict {
            verdict: verdict.to_string(),
            score: score as u32,
            checks,
            profile: self.profile.name.clone(),
            summary,
        }
    }

    fn flag_check(&self, name: &str, flag: Option<bool>, required: bool, subject: &str) -> Check {
        match (flag, required) {
            (Some(true), _) => Check {
                name: name.to_string(),
                status: CheckStatus::Ok,
                message: format!("{} stabilized", subject),
                impact: 0,
            },
            (_, true) => Check {
                name: name.to_string(),
                status: CheckStatus::Fail,
                message: format!("{} did not stabilize", subject),
                impact: -30,
            },
            (_, false) => Check {
                name: name.to_string(),
                status: CheckStatus::Warn,
                message: format!("{} did not stabilize", subject),
                impact: -10,
            },
        }
    }
}

impl Default for SuccessGate {
    fn default() -> Self {
        Self::new(ScoringProfile::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn successful() -> LongitudinalTrace {
        LongitudinalTrace::new("sum").with_flags(true, true, Some(true)).with_refinements(1, 0)
    }

    #[test]
    fn test_passing_trace() {
        let verdict = SuccessGate::for_mode("strict").evaluate(&successful());
        assert_eq!(verdict.verdict, "PASS");
        assert_eq!(verdict.score, 100);
        assert_eq!(verdict.profile, "strict@1.0");
    }

    #[test]
    fn test_qa_failure_blocks() {
        let trace = LongitudinalTrace {
            issues: vec!["wrong format".to_string()],
            ..successful().with_flags(true, true, Some(false))
        };
        let verdict = SuccessGate::for_mode("lenient").evaluate(&trace);
        assert_eq!(verdict.verdict, "FAIL");
        assert!(verdict.summary.contains("qa_passed"));
    }

    #[test]
    fn test_missing_qa_depends_on_profile() {
        let trace = successful().with_flags(true, true, None);
        assert!(!SuccessGate::for_mode("strict").passes(&trace));
        assert!(SuccessGate::for_mode("lenient").passes(&trace));
    }

    #[test]
    fn test_closed_world_needs_no_qa_verdict() {
        let trace = LongitudinalTrace {
            open_world: Some(false),
            ..successful().with_flags(true, true, None)
        };
        let verdict = SuccessGate::for_mode("strict").evaluate(&trace);
        assert!(verdict.passed());
        assert_eq!(verdict.score, 100);

        let open = LongitudinalTrace {
            open_world: Some(true),
            ..trace.clone()
        };
        assert!(!SuccessGate::for_mode("strict").passes(&open));

        let unstable = LongitudinalTrace {
            open_world: Some(false),
            ..successful().with_flags(true, false, None)
        };
        assert!(!SuccessGate::for_mode("strict").passes(&unstable));
    }

    #[test]
    fn test_unstable_bundle_warns_when_lenient() {
        let trace = successful().with_flags(false, true, Some(true));
        let verdict = SuccessGate::for_mode("lenient").evaluate(&trace);
        assert!(verdict.passed());
        assert_eq!(verdict.score, 90);
        assert!(verdict.summary.contains("warnings: bundle_stable"));
    }

    #[test]
    fn test_refinement_budget() {
        let profile = ScoringProfile {
            max_refinements: Some(1),
            ..ScoringProfile::strict()
        };
        let trace = successful().with_refinements(2, 1);
        let verdict = SuccessGate::new(profile).evaluate(&trace);
        assert!(verdict.passed());
        assert!(verdict
            .checks
            .iter()
            .any(|c| c.name == "refinement_budget" && c.status == CheckStatus::Warn));
    }

    #[test]
    fn test_errors_fail_when_configured() {
        let trace = LongitudinalTrace {
            errors: vec!["GENERATION/NETWORK: reset".to_string()],
            ..successful()
        };
        assert!(SuccessGate::for_mode("strict").passes(&trace));
        let profile = ScoringProfile {
            fail_on_errors: true,
            ..ScoringProfile::strict()
        };
        assert!(!SuccessGate::new(profile).passes(&trace));
    }
}
