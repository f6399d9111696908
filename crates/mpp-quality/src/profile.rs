//! Scoring profiles for strict and lenient evaluation.
//!
//! A profile decides which success flags a trace must carry and how heavily
//! refinements weigh against a successful run.

use mpp_core::MppError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringProfile {
    /// Profile name (e.g., "strict@1.0", "lenient@1.0")
    pub name: String,

    /// Operating mode
    pub mode: String,

    // === Success Requirements ===

    /// Bundle loop must stabilize
    pub require_bundle_stable: bool,

    /// Executor loop must stabilize
    pub require_executor_stable: bool,

    /// QA must return an explicit pass unless the trace is closed-world
    /// (an explicit fail always fails)
    pub require_qa_passed: bool,

    /// Recorded generator failures fail the trace instead of warning
    pub fail_on_errors: bool,

    /// Refinement budget per trace, warning only
    pub max_refinements: Option<usize>,

    // === Cost Weights ===

    /// Weight of a successful final response
    pub final_weight: f64,

    /// Ratio between adjacent stage weights
    pub weight_multiplier: f64,

    /// Override for the architect refinement weight
    pub architect_weight: Option<f64>,

    /// Override for the executor refinement weight
    pub executor_weight: Option<f64>,
}

impl ScoringProfile {
    /// Every success flag that applies to the run mode must hold.
    pub fn strict() -> Self {
        Self {
            name: "strict@1.0".to_string(),
            mode: "strict".to_string(),
            require_bundle_stable: true,
            require_executor_stable: true,
            require_qa_passed: true,
            fail_on_errors: false,
            max_refinements: None,
            final_weight: 4.0,
            weight_multiplier: 2.0,
            architect_weight: None,
            executor_weight: None,
        }
    }

    /// Unstable-but-valid bundles and traces without a QA verdict still count.
    pub fn lenient() -> Self {
        Self {
            name: "lenient@1.0".to_string(),
            mode: "lenient".to_string(),
            require_bundle_stable: false,
            require_executor_stable: true,
            require_qa_passed: false,
            ..Self::strict()
        }
    }

    /// Load profile from YAML; omitted keys fall back to the strict preset.
    pub fn from_yaml(yaml: &str) -> Result<Self, MppError> {
        let profile: Self = serde_yaml::from_str(yaml).map_err(|e| MppError::Config(e.to_string()))?;
        profile.validate()?;
        Ok(profile)
    }

    pub fn validate(&self) -> Result<(), MppError> {
        if self.final_weight <= 0.0 {
            return Err(MppError::Config("final_weight must be positive".to_string()));
        }
        if self.weight_multiplier <= 0.0 {
            return Err(MppError::Config("weight_multiplier must be positive".to_string()));
        }
        Ok(())
    }

    /// Get profile by mode name
    pub fn for_mode(mode: &str) -> Self {
        match mode {
            "strict" => Self::strict(),
            "lenient" => Self::lenient(),
            _ => Self::strict(),
        }
    }

    pub fn architect_weight(&self) -> f64 {
        self.architect_weight
            .unwrap_or(self.final_weight / self.weight_multiplier)
    }

    pub fn executor_weight(&self) -> f64 {
        self.executor_weight
            .unwrap_or(self.final_weight / (self.weight_multiplier * self.weight_multiplier))
    }
}

impl Default for ScoringProfile {
    fn default() -> Self {
        Self::strict()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strict_requirements() {
        let profile = ScoringProfile::strict();
        assert!(profile.require_bundle_stable);
        assert!(profile.require_qa_passed);
        assert_eq!(profile.architect_weight(), 2.0);
        assert_eq!(profile.executor_weight(), 1.0);
    }

    #[test]
    fn test_lenient_requirements() {
        let profile = ScoringProfile::lenient();
        assert!(!profile.require_bundle_stable);
        assert!(!profile.require_qa_passed);
        assert!(profile.require_executor_stable);
        assert_eq!(profile.final_weight, 4.0);
    }

    #[test]
    fn test_unknown_mode_defaults_to_strict() {
        assert_eq!(ScoringProfile::for_mode("genius"), ScoringProfile::strict());
    }

    #[test]
    fn test_from_yaml_overrides() {
        let profile = ScoringProfile::from_yaml("mode: custom\nweight_multiplier: 4.0\nexecutor_weight: 0.5\n").unwrap();
        assert_eq!(profile.mode, "custom");
        assert_eq!(profile.architect_weight(), 1.0);
        assert_eq!(profile.executor_weight(), 0.5);
        assert!(profile.require_qa_passed);
    }

    #[test]
    fn test_from_yaml_rejects_zero_weight() {
        let err = ScoringProfile::from_yaml("final_weight: 0").unwrap_err();
        assert!(err.to_string().starts_with("CONFIG/"));
    }
}
