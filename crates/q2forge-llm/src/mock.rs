//! Scripted model for tests and offline runs.

use crate::{LanguageModel, LlmError};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Replays a fixed list of replies, cycling when the list is exhausted, and
/// records every prompt it receives.
pub struct ScriptedModel {
    name: String,
    responses: Vec<String>,
    response_idx: AtomicUsize,
    prompts: Mutex<Vec<String>>,
    delay: Option<Duration>,
    failure: Option<String>,
}

impl ScriptedModel {
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            name: "scripted".to_string(),
            responses,
            response_idx: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
            delay: None,
            failure: None,
        }
    }

    pub fn always(response: &str) -> Self {
        Self::new(vec![response.to_string()])
    }

    /// A model whose every call fails with a network error.
    pub fn failing(message: &str) -> Self {
        let mut m = Self::new(Vec::new());
        m.failure = Some(message.to_string());
        m
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Sleep before answering (simulates a slow oracle).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of completed or attempted calls.
    pub fn calls(&self) -> usize {
        self.lock_prompts().len()
    }

    /// Every prompt received, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.lock_prompts().clone()
    }

    fn lock_prompts(&self) -> std::sync::MutexGuard<'_, Vec<String>> {
        match self.prompts.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        self.lock_prompts().push(prompt.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(msg) = &self.failure {
            return Err(LlmError::Network(msg.clone()));
        }
        if self.responses.is_empty() {
            return Ok(String::new());
        }
        let idx = self.response_idx.fetch_add(1, Ordering::SeqCst);
        Ok(self.responses[idx % self.responses.len()].clone())
    }
}
