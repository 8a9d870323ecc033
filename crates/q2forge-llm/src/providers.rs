//! LLM API providers.
//!
//! Concrete clients for OpenAI-compatible chat completions, Anthropic
//! messages, and Ollama's native `/api/chat`. Keys are read from the
//! environment only; configuration files name the provider and model.

use crate::{ConfigError, LanguageModel, LlmError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const ANTHROPIC_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";
pub const OLLAMA_HOST_ENV: &str = "OLLAMA_HOST";

const OPENAI_DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const ANTHROPIC_DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const OLLAMA_DEFAULT_HOST: &str = "http://127.0.0.1:11434";
const DEFAULT_MAX_TOKENS: u32 = 4096;

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[serde(rename = "openai")]
    OpenAi,
    Anthropic,
    Ollama,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
            Provider::Ollama => "ollama",
        }
    }
}

/// One model endpoint as named in the pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub provider: Provider,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ModelConfig {
    pub fn new(provider: Provider, model: &str) -> Self {
        Self {
            provider,
            model: model.to_string(),
            base_url: None,
            temperature: None,
            max_tokens: None,
        }
    }

    /// `provider:model`, used as the client name in logs.
    pub fn label(&self) -> String {
        format!("{}:{}", self.provider.as_str(), self.model)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "{} model name is empty",
                self.provider.as_str()
            )));
        }
        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(ConfigError::Invalid(format!(
                    "temperature {t} is outside 0.0..=2.0"
                )));
            }
        }
        Ok(())
    }

    /// Build a client, reading API keys from the process environment.
    pub fn build(&self, timeout: Duration) -> Result<Arc<dyn LanguageModel>, LlmError> {
        self.build_with_env(timeout, |name| std::env::var(name).ok())
    }

    /// Build a client with an explicit environment lookup.
    pub fn build_with_env(
        &self,
        timeout: Duration,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Arc<dyn LanguageModel>, LlmError> {
        self.validate()?;
        let key = |var: &str| -> Result<String, ConfigError> {
            env(var)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingApiKey {
                    provider: self.provider.as_str().to_string(),
                    var: var.to_string(),
                })
        };
        let model: Arc<dyn LanguageModel> = match self.provider {
            Provider::OpenAi => Arc::new(OpenAiClient::new(
                self.clone(),
                key(OPENAI_API_KEY_ENV)?,
                timeout,
            )?),
            Provider::Anthropic => Arc::new(AnthropicClient::new(
                self.clone(),
                key(ANTHROPIC_API_KEY_ENV)?,
                timeout,
            )?),
            Provider::Ollama => {
                let host = self
                    .base_url
                    .clone()
                    .or_else(|| env(OLLAMA_HOST_ENV))
                    .unwrap_or_else(|| OLLAMA_DEFAULT_HOST.to_string());
                Arc::new(OllamaClient::new(self.clone(), &host, timeout)?)
            }
        };
        Ok(model)
    }
}

fn http_client(timeout: Duration) -> Result<Client, LlmError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ConfigError::Invalid(format!("failed to build http client: {e}")).into())
}

/// Send a JSON request and decode a JSON response, mapping transport and
/// status failures onto [`LlmError`].
async fn send_json(request: reqwest::RequestBuilder, timeout: Duration) -> Result<Value, LlmError> {
    let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            LlmError::Timeout {
                secs: timeout.as_secs(),
            }
        } else {
            LlmError::Network(e.to_string())
        }
    })?;

    let status = response.status();
    if status.as_u16() == 429 {
        let retry_after_secs = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(60);
        return Err(LlmError::RateLimited {
            retry_after_ms: retry_after_secs * 1000,
        });
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(LlmError::Api {
            status: status.as_u16(),
            body,
        });
    }

    response
        .json::<Value>()
        .await
        .map_err(|e| LlmError::InvalidResponse(e.to_string()))
}

fn text_at<'a>(data: &'a Value, pointer: &str) -> Result<&'a str, LlmError> {
    data.pointer(pointer)
        .and_then(Value::as_str)
        .ok_or_else(|| LlmError::InvalidResponse(format!("missing {pointer} in response")))
}

// ============================================================================
// OpenAI Provider
// ============================================================================

pub struct OpenAiClient {
    client: Client,
    config: ModelConfig,
    api_key: String,
    label: String,
    timeout: Duration,
}

impl OpenAiClient {
    pub fn new(config: ModelConfig, api_key: String, timeout: Duration) -> Result<Self, LlmError> {
        Ok(Self {
            client: http_client(timeout)?,
            label: config.label(),
            config,
            api_key,
            timeout,
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAiClient {
    fn name(&self) -> &str {
        &self.label
    }

    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        let base = self
            .config
            .base_url
            .as_deref()
            .unwrap_or(OPENAI_DEFAULT_BASE_URL)
            .trim_end_matches('/');
        let url = format!("{base}/chat/completions");

        let mut body = json!({
            "model": self.config.model,
            "messages": [{ "role": "user", "content": prompt }],
        });
        if let Some(max_tokens) = self.config.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if let Some(temp) = self.config.temperature {
            body["temperature"] = json!(temp);
        }

        debug!(model = %self.label, url = %url, "calling chat completions");
        let request = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body);
        let data = send_json(request, self.timeout).await?;
        Ok(text_at(&data, "/choices/0/message/content")?.to_string())
    }
}

// ============================================================================
// Anthropic Provider
// ============================================================================

pub struct AnthropicClient {
    client: Client,
    config: ModelConfig,
    api_key: String,
    label: String,
    timeout: Duration,
}

impl AnthropicClient {
    pub fn new(config: ModelConfig, api_key: String, timeout: Duration) -> Result<Self, LlmError> {
        Ok(Self {
            client: http_client(timeout)?,
            label: config.label(),
            config,
            api_key,
            timeout,
        })
    }
}

#[async_trait]
impl LanguageModel for AnthropicClient {
    fn name(&self) -> &str {
        &self.label
    }

    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        let base = self
            .config
            .base_url
            .as_deref()
            .unwrap_or(ANTHROPIC_DEFAULT_BASE_URL)
            .trim_end_matches('/');
        let url = format!("{base}/v1/messages");

        let mut body = json!({
            "model": self.config.model,
            "messages": [{ "role": "user", "content": prompt }],
            "max_tokens": self.config.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        });
        if let Some(temp) = self.config.temperature {
            body["temperature"] = json!(temp);
        }

        debug!(model = %self.label, url = %url, "calling messages API");
        let request = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body);
        let data = send_json(request, self.timeout).await?;
        Ok(text_at(&data, "/content/0/text")?.to_string())
    }
}

// ============================================================================
// Ollama Provider
// ============================================================================

pub struct OllamaClient {
    client: Client,
    config: ModelConfig,
    host: String,
    label: String,
    timeout: Duration,
}

/// Accept `localhost:11434`, `http://host:11434/` and similar spellings.
pub fn normalize_ollama_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{host}")
    }
}

impl OllamaClient {
    pub fn new(config: ModelConfig, host: &str, timeout: Duration) -> Result<Self, LlmError> {
        Ok(Self {
            client: http_client(timeout)?,
            label: config.label(),
            host: normalize_ollama_host(host),
            config,
            timeout,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }
}

#[async_trait]
impl LanguageModel for OllamaClient {
    fn name(&self) -> &str {
        &self.label
    }

    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        let url = format!("{}/api/chat", self.host);
        let body = json!({
            "model": self.config.model,
            "stream": false,
            "messages": [{ "role": "user", "content": prompt }],
            "options": { "temperature": self.config.temperature.unwrap_or(0.0) },
        });

        debug!(model = %self.label, url = %url, "calling ollama");
        let request = self.client.post(&url).json(&body);
        let data = send_json(request, self.timeout).await.map_err(|e| match e {
            LlmError::Network(msg) => LlmError::Network(format!(
                "failed to reach ollama at {url} (is it running?) ({msg}). Try `ollama serve` or set {OLLAMA_HOST_ENV}"
            )),
            other => other,
        })?;
        Ok(text_at(&data, "/message/content")?.to_string())
    }
}

// ============================================================================
// Tests
// ============================================================================
