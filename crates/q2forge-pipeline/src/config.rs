//! Pipeline configuration.
//!
//! One immutable [`PipelineConfig`] is built at start-up (file, then
//! environment overrides, then [`PipelineConfig::validate`]) and shared by
//! every run. Nothing in the pipeline reads process-wide state after that.

use crate::error::ConfigError;
use q2forge_llm::ModelConfig;
use q2forge_sparql::PrefixTable;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const Q2FORGE_MAX_ATTEMPTS_ENV: &str = "Q2FORGE_MAX_ATTEMPTS";
pub const Q2FORGE_ORACLE_TIMEOUT_SECS_ENV: &str = "Q2FORGE_ORACLE_TIMEOUT_SECS";
pub const Q2FORGE_RUN_TIMEOUT_SECS_ENV: &str = "Q2FORGE_RUN_TIMEOUT_SECS";

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const MIN_GRADE: u8 = 1;
pub const MAX_GRADE: u8 = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KgConfig {
    pub full_name: String,
    #[serde(default)]
    pub description: String,
    pub sparql_endpoint_url: String,
    /// Where identifier metadata lives; the KG endpoint when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ontologies_endpoint_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JudgingConfig {
    /// Minimum grade accepted outright.
    pub retry_threshold: u8,
    /// Minimum grade still executed once the attempt budget is spent.
    pub run_threshold: u8,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub oracle_secs: u64,
    pub endpoint_secs: u64,
    pub lookup_secs: u64,
    pub run_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            oracle_secs: 120,
            endpoint_secs: 60,
            lookup_secs: 15,
            run_secs: 900,
        }
    }
}

impl TimeoutConfig {
    pub fn oracle(&self) -> Duration {
        Duration::from_secs(self.oracle_secs)
    }

    pub fn endpoint(&self) -> Duration {
        Duration::from_secs(self.endpoint_secs)
    }

    pub fn lookup(&self) -> Duration {
        Duration::from_secs(self.lookup_secs)
    }

    pub fn run(&self) -> Duration {
        Duration::from_secs(self.run_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelsConfig {
    pub generate: ModelConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub judge: Option<ModelConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpret: Option<ModelConfig>,
}

impl ModelsConfig {
    pub fn generate(&self) -> &ModelConfig {
        &self.generate
    }

    pub fn judge(&self) -> &ModelConfig {
        self.judge.as_ref().unwrap_or(&self.generate)
    }

    pub fn interpret(&self) -> &ModelConfig {
        self.interpret.as_ref().unwrap_or(&self.generate)
    }
}

fn default_metadata_properties() -> Vec<String> {
    vec![
        "rdfs:label".to_string(),
        "rdfs:comment".to_string(),
        "skos:altLabel".to_string(),
    ]
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub kg: KgConfig,
    #[serde(default = "PrefixTable::with_defaults")]
    pub prefixes: PrefixTable,
    /// Properties fetched for every referenced identifier (qnames or `<iri>`).
    #[serde(default = "default_metadata_properties")]
    pub metadata_properties: Vec<String>,
    pub judging: JudgingConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    pub models: ModelsConfig,
    /// Ask the oracle whether the question fits the KG before synthesis.
    #[serde(default = "default_true")]
    pub validate_question: bool,
}

impl PipelineConfig {
    /// Read, apply environment overrides, validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut cfg: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        cfg.apply_env_overrides(|name| std::env::var(name).ok())?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let cfg: Self = serde_json::from_str(text).map_err(|source| ConfigError::Parse {
            path: "<inline>".into(),
            source,
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Apply `Q2FORGE_*` overrides. Empty values are ignored.
    pub fn apply_env_overrides(
        &mut self,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(v) = env_u64(&env, Q2FORGE_MAX_ATTEMPTS_ENV)? {
            self.judging.max_attempts = u32::try_from(v).map_err(|_| ConfigError::Env {
                var: Q2FORGE_MAX_ATTEMPTS_ENV.to_string(),
                value: v.to_string(),
                expected: "attempt count",
            })?;
        }
        if let Some(v) = env_u64(&env, Q2FORGE_ORACLE_TIMEOUT_SECS_ENV)? {
            self.timeouts.oracle_secs = v;
        }
        if let Some(v) = env_u64(&env, Q2FORGE_RUN_TIMEOUT_SECS_ENV)? {
            self.timeouts.run_secs = v;
        }
        Ok(())
    }

    /// Fail fast on settings that would make the decision table unreachable
    /// or the endpoints unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let j = &self.judging;
        for (name, value) in [("retry_threshold", j.retry_threshold), ("run_threshold", j.run_threshold)] {
            if !(MIN_GRADE..=MAX_GRADE).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "judging.{name}={value} is outside {MIN_GRADE}..={MAX_GRADE}"
                )));
            }
        }
        if j.run_threshold > j.retry_threshold {
            return Err(ConfigError::Invalid(format!(
                "judging.run_threshold ({}) exceeds judging.retry_threshold ({}); the force-run fallback would be unreachable",
                j.run_threshold, j.retry_threshold
            )));
        }
        if j.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "judging.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.kg.sparql_endpoint_url.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "kg.sparql_endpoint_url is empty".to_string(),
            ));
        }
        if let Some(url) = &self.kg.ontologies_endpoint_url {
            if url.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "kg.ontologies_endpoint_url is empty (omit it to reuse the KG endpoint)"
                        .to_string(),
                ));
            }
        }
        let t = &self.timeouts;
        if t.oracle_secs == 0 || t.endpoint_secs == 0 || t.lookup_secs == 0 || t.run_secs == 0 {
            return Err(ConfigError::Invalid("timeouts must be non-zero".to_string()));
        }
        for model in [self.models.generate(), self.models.judge(), self.models.interpret()] {
            model
                .validate()
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        }
        Ok(())
    }

    pub fn ontologies_endpoint_url(&self) -> &str {
        self.kg
            .ontologies_endpoint_url
            .as_deref()
            .unwrap_or(&self.kg.sparql_endpoint_url)
    }
}

fn env_u64(
    env: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<u64>, ConfigError> {
    let Some(raw) = env(name) else {
        return Ok(None);
    };
    let v = raw.trim();
    if v.is_empty() {
        return Ok(None);
    }
    v.parse::<u64>().map(Some).map_err(|_| ConfigError::Env {
        var: name.to_string(),
        value: v.to_string(),
        expected: "non-negative integer",
    })
}
