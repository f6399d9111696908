use serde::{Deserialize, Serialize};

/// One goal in the dataset a template is refined against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Case {
    pub name: String,
    pub user_goal: String,
    #[serde(default)]
    pub open_world: bool,
    /// Executor must return chain-of-thought reasoning.
    #[serde(default)]
    pub use_cot: bool,
}

impl Case {
    pub fn new(name: impl Into<String>, user_goal: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            user_goal: user_goal.into(),
            open_world: false,
            use_cot: false,
        }
    }

    pub fn open_world(mut self) -> Self {
        self.open_world = true;
        self
    }

    pub fn with_cot(mut self) -> Self {
        self.use_cot = true;
        self
    }
}
