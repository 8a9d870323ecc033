//! Generation oracle boundary for Q2Forge.
//!
//! The pipeline treats every language model as a black box with one
//! operation: prompt in, text out. This crate provides:
//!
//! - the [`LanguageModel`] trait the pipeline is written against,
//! - HTTP clients for OpenAI-compatible, Anthropic and Ollama endpoints,
//! - a [`ScriptedModel`] that replays canned replies (tests, dry runs),
//! - best-effort extraction of a JSON object embedded in model prose.

pub mod error;
pub mod json;
pub mod mock;
pub mod providers;

pub use error::{ConfigError, LlmError};
pub use json::{parse_json_object, JsonError};
pub use mock::ScriptedModel;
pub use providers::{AnthropicClient, ModelConfig, OllamaClient, OpenAiClient, Provider};

use async_trait::async_trait;
use std::sync::Arc;

/// A text-generation oracle.
///
/// Implementations must be safe to share across concurrent runs; each call is
/// independent and carries no conversation state.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Short label used in logs (`provider:model`).
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<String, LlmError>;
}

#[async_trait]
impl<T: LanguageModel + ?Sized> LanguageModel for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        (**self).generate(prompt).await
    }
}
