//! Errors that end a run without a terminal judgement.
//!
//! Expected outcomes of untrusted input (no query, bad syntax, unparsable
//! grade, low score, failed execution) are status values on the run state,
//! never variants here.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid {var}={value:?} (expected {expected})")]
    Env {
        var: String,
        value: String,
        expected: &'static str,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Oracle-facing stage, used to say which call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OracleStage {
    QuestionCheck,
    Generate,
    Judge,
    Interpret,
}

impl std::fmt::Display for OracleStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            OracleStage::QuestionCheck => "question check",
            OracleStage::Generate => "generation",
            OracleStage::Judge => "judging",
            OracleStage::Interpret => "interpretation",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to build client: {0}")]
    Client(String),

    #[error("{stage} oracle failed: {source}")]
    Oracle {
        stage: OracleStage,
        #[source]
        source: q2forge_llm::LlmError,
    },

    #[error("{stage} oracle did not answer within {secs}s")]
    OracleTimeout { stage: OracleStage, secs: u64 },

    #[error("run cancelled")]
    Cancelled,

    #[error("run exceeded its {secs}s deadline")]
    DeadlineExceeded { secs: u64 },
}

impl PipelineError {
    /// Map a guard interrupt raised while `stage` was waiting.
    pub(crate) fn interrupted(
        interrupt: crate::cancel::Interrupt,
        stage: OracleStage,
        run_budget: std::time::Duration,
    ) -> Self {
        use crate::cancel::Interrupt;
        match interrupt {
            Interrupt::Cancelled => PipelineError::Cancelled,
            Interrupt::Deadline => PipelineError::DeadlineExceeded {
                secs: run_budget.as_secs(),
            },
            Interrupt::Timeout(limit) => PipelineError::OracleTimeout {
                stage,
                secs: limit.as_secs(),
            },
        }
    }

    /// Map a guard interrupt raised outside an oracle call (enrichment,
    /// execution). Those stages turn their own timeouts into values, so only
    /// cancellation and the deadline reach here.
    pub(crate) fn run_interrupted(
        interrupt: crate::cancel::Interrupt,
        run_budget: std::time::Duration,
    ) -> Self {
        match interrupt {
            crate::cancel::Interrupt::Cancelled => PipelineError::Cancelled,
            _ => PipelineError::DeadlineExceeded {
                secs: run_budget.as_secs(),
            },
        }
    }
}
