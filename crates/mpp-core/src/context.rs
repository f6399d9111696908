//! Run context: identity and start time of one vertical run
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunContext {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    /// Dataset case this run scores, when driven by the longitudinal refiner.
    pub case: Option<String>,
}

impl RunContext {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            case: None,
        }
    }

    pub fn for_case(case: impl Into<String>) -> Self {
        Self {
            case: Some(case.into()),
            ..Self::new()
        }
    }

    /// Milliseconds since the run started.
    pub fn elapsed_ms(&self) -> i64 {
        (Utc::now() - self.started_at).num_milliseconds()
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}
