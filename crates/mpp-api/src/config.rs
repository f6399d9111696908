//! Service configuration: YAML file plus environment overrides.

use mpp_core::{MppError, RefinementConfig};
use mpp_llm::BackendConfig;
use mpp_longitudinal::{LongitudinalConfig, DEFAULT_MUTABLE_KEYS};
use mpp_quality::ScoringProfile;
use serde::{Deserialize, Serialize};

pub const DEFAULT_ADDR: &str = "0.0.0.0:8080";

/// Model per role; `None` falls back to the backend model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleModels {
    pub architect: Option<String>,
    pub executor: Option<String>,
    pub qa: Option<String>,
    pub mutator: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub addr: String,
    pub backend: BackendConfig,
    pub models: RoleModels,
    pub refinement: RefinementConfig,
    pub longitudinal: LongitudinalConfig,
    pub scoring: ScoringProfile,
    /// `trace_cost` or `all_pass`.
    pub metric: String,
    pub mutable_keys: Vec<String>,
    pub max_sentences: usize,
    /// Protocol specification text given to every role.
    pub protocol: Option<String>,
}

impl ServiceConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, MppError> {
        let config: Self = serde_yaml::from_str(yaml).map_err(|e| MppError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), MppError> {
        self.backend.validate()?;
        self.refinement.validate()?;
        self.longitudinal.validate()?;
        self.scoring.validate()?;
        if mpp_quality::metric_for(&self.metric, self.scoring.clone()).is_none() {
            return Err(MppError::Config(format!("unknown metric: {}", self.metric)));
        }
        Ok(())
    }

    /// Reads `MPP_CONFIG` (YAML path, optional), then applies `MPP_ADDR`
    /// and `MPP_API_KEY`.
    pub fn from_env() -> Result<Self, MppError> {
        let mut config = match std::env::var("MPP_CONFIG") {
            Ok(path) => {
                let yaml = std::fs::read_to_string(&path)
                    .map_err(|e| MppError::Config(format!("{}: {}", path, e)))?;
                Self::from_yaml(&yaml)?
            }
            Err(_) => Self::default(),
        };
        if let Ok(addr) = std::env::var("MPP_ADDR") {
            config.addr = addr;
        }
        if let Ok(key) = std::env::var("MPP_API_KEY") {
            config.backend.api_key = Some(key);
        }
        Ok(config)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            backend: BackendConfig::default(),
            models: RoleModels::default(),
            refinement: RefinementConfig::default(),
            longitudinal: LongitudinalConfig::default(),
            scoring: ScoringProfile::strict(),
            metric: "trace_cost".to_string(),
            mutable_keys: DEFAULT_MUTABLE_KEYS.iter().map(|k| k.to_string()).collect(),
            max_sentences: 3,
            protocol: None,
        }
    }
}
