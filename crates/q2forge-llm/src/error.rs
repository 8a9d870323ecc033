//! Error types for model clients.

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API error (HTTP {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{provider} requires the {var} environment variable")]
    MissingApiKey { provider: String, var: String },

    #[error("Invalid model configuration: {0}")]
    Invalid(String),
}
