//! Longitudinal loop settings.

use mpp_core::MppError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LongitudinalConfig {
    /// Mutation rounds after the baseline score.
    pub max_iters: usize,
    /// Consecutive rejected candidates tolerated; one more stops the run. `None` never stops.
    pub patience: Option<usize>,
    /// Margin a candidate must beat the best score by.
    pub min_delta: f64,
    pub maximize: bool,
}

impl LongitudinalConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, MppError> {
        let config: Self = serde_yaml::from_str(yaml).map_err(|e| MppError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), MppError> {
        if self.min_delta < 0.0 || self.min_delta.is_nan() {
            return Err(MppError::Config("min_delta must be a non-negative number".to_string()));
        }
        Ok(())
    }

    pub fn with_max_iters(mut self, iters: usize) -> Self {
        self.max_iters = iters;
        self
    }

    pub fn with_patience(mut self, patience: Option<usize>) -> Self {
        self.patience = patience;
        self
    }

    pub fn with_min_delta(mut self, min_delta: f64) -> Self {
        self.min_delta = min_delta;
        self
    }

    pub fn minimizing(mut self) -> Self {
        self.maximize = false;
        self
    }

    pub(crate) fn is_better(&self, candidate: f64, best: f64) -> bool {
        if self.maximize {
            candidate > best + self.min_delta
        } else {
            candidate < best - self.min_delta
        }
    }
}

impl Default for LongitudinalConfig {
    fn default() -> Self {
        Self {
            max_iters: 5,
            patience: Some(2),
            min_delta: 0.0,
            maximize: true,
        }
    }
}
