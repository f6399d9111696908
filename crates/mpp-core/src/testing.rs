//! Scripted collaborators for tests.
//!
//! Enabled with the `testing` feature so dependent crates can drive the
//! pipeline without a model.

use crate::backend::{ChatMessage, GenerationError, GenerationParams, TextGenerator};
use crate::generator::{FeedbackSink, Generator, GeneratorInput, Prediction, QaFeedback, Role};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn prediction(fields: Value) -> Prediction {
    Prediction::from_value(fields).unwrap_or_default()
}

/// Replays queued replies in order, then the `repeat` reply forever.
pub struct ScriptedGenerator {
    role: Role,
    script: Mutex<VecDeque<Result<Prediction, GenerationError>>>,
    fallback: Option<Prediction>,
    inputs: Mutex<Vec<GeneratorInput>>,
}

impl ScriptedGenerator {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            script: Mutex::new(VecDeque::new()),
            fallback: None,
            inputs: Mutex::new(Vec::new()),
        }
    }

    pub fn reply(self, fields: Value) -> Self {
        lock(&self.script).push_back(Ok(prediction(fields)));
        self
    }

    pub fn fail(self, error: GenerationError) -> Self {
        lock(&self.script).push_back(Err(error));
        self
    }

    pub fn repeat(mut self, fields: Value) -> Self {
        self.fallback = Some(prediction(fields));
        self
    }

    pub fn calls(&self) -> usize {
        lock(&self.inputs).len()
    }

    pub fn inputs(&self) -> Vec<GeneratorInput> {
        lock(&self.inputs).clone()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    fn role(&self) -> Role {
        self.role
    }

    async fn generate(&self, input: &GeneratorInput) -> Result<Prediction, GenerationError> {
        lock(&self.inputs).push(input.clone());
        let next = lock(&self.script).pop_front();
        match next {
            Some(reply) => reply,
            None => self
                .fallback
                .clone()
                .ok_or_else(|| GenerationError::Exhausted(format!("{} script exhausted", self.role))),
        }
    }
}

/// Records every feedback update.
#[derive(Default)]
pub struct RecordingFeedbackSink {
    updates: Mutex<Vec<Option<QaFeedback>>>,
}

impl RecordingFeedbackSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn updates(&self) -> Vec<Option<QaFeedback>> {
        lock(&self.updates).clone()
    }

    /// Latest value, `None` when cleared or never set.
    pub fn current(&self) -> Option<QaFeedback> {
        lock(&self.updates).last().cloned().flatten()
    }
}

impl FeedbackSink for RecordingFeedbackSink {
    fn set_feedback(&self, feedback: Option<QaFeedback>) {
        lock(&self.updates).push(feedback);
    }
}

/// Backend that replays canned completions and records the conversations.
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<Result<String, GenerationError>>>,
    conversations: Mutex<Vec<(Vec<ChatMessage>, GenerationParams)>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            conversations: Mutex::new(Vec::new()),
        }
    }

    pub fn reply(self, text: impl Into<String>) -> Self {
        lock(&self.replies).push_back(Ok(text.into()));
        self
    }

    pub fn fail(self, error: GenerationError) -> Self {
        lock(&self.replies).push_back(Err(error));
        self
    }

    pub fn conversations(&self) -> Vec<(Vec<ChatMessage>, GenerationParams)> {
        lock(&self.conversations).clone()
    }
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TextGenerator for ScriptedBackend {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> Result<String, GenerationError> {
        lock(&self.conversations).push((messages.to_vec(), params.clone()));
        lock(&self.replies)
            .pop_front()
            .unwrap_or_else(|| Err(GenerationError::Exhausted("backend script exhausted".to_string())))
    }
}
