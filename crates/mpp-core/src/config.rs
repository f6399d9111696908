//! Iteration caps for the vertical pipeline.

use crate::error::MppError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefinementConfig {
    /// Attempts per bundle loop.
    pub architect_max_iters: usize,
    /// Attempts per execution loop.
    pub executor_max_iters: usize,
    /// Architect/executor round trips per run.
    pub architect_cycles: usize,
}

impl RefinementConfig {
    /// Load caps from YAML; omitted keys keep their defaults.
    pub fn from_yaml(yaml: &str) -> Result<Self, MppError> {
        let config: Self = serde_yaml::from_str(yaml).map_err(|e| MppError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), MppError> {
        if self.architect_cycles == 0 {
            return Err(MppError::Config("architect_cycles must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn with_architect_max_iters(mut self, iters: usize) -> Self {
        self.architect_max_iters = iters;
        self
    }

    pub fn with_executor_max_iters(mut self, iters: usize) -> Self {
        self.executor_max_iters = iters;
        self
    }

    pub fn with_architect_cycles(mut self, cycles: usize) -> Self {
        self.architect_cycles = cycles;
        self
    }
}

impl Default for RefinementConfig {
    fn default() -> Self {
        Self {
            architect_max_iters: 10,
            executor_max_iters: 10,
            architect_cycles: 3,
        }
    }
}
