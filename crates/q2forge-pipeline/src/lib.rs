//! Q2Forge pipeline: natural-language question → judged SPARQL query →
//! results → interpretation.
//!
//! ## Architecture
//!
//! ```text
//! question ──► question gate ──► ┌──────────── retry controller ────────────┐
//!                                │                                          │
//!                                │  generate ─► validate ─► enrich ─► grade │
//!                                │      ▲                              │    │
//!                                │      └──────── regenerate ◄─────────┘    │
//!                                └──────────────────┬───────────────────────┘
//!                                                   │ accepted query
//!                                                   ▼
//!                                   execute ─► interpret (rows only)
//! ```
//!
//! ## Failure model
//! - Malformed generations, unparsable grades and low scores are recorded
//!   as [`JudgementStatus`] values and recovered by regeneration until the
//!   attempt budget is spent.
//! - Endpoint failures degrade enrichment per identifier and end execution
//!   as [`ExecutionResult::Failed`].
//! - Oracle transport errors, timeouts, cancellation and the run deadline
//!   are [`PipelineError`]s and never leave a terminal status behind.

pub mod cancel;
pub mod config;
pub mod controller;
pub mod enricher;
pub mod error;
pub mod executor;
pub mod interpreter;
pub mod judge;
mod oracle;
pub mod pipeline;
pub mod prompts;
pub mod question;
pub mod state;
pub mod validator;

pub use cancel::{CancelToken, Interrupt, RunGuard};
pub use config::{
    JudgingConfig, KgConfig, ModelsConfig, PipelineConfig, TimeoutConfig, DEFAULT_MAX_ATTEMPTS,
};
pub use controller::{decide, ControlOutcome, NextAction, RetryController};
pub use enricher::{Enrichment, IdentifierEnricher};
pub use error::{ConfigError, OracleStage, PipelineError};
pub use executor::QueryExecutor;
pub use interpreter::Interpretation;
pub use judge::{apply_grade, parse_judge_reply, JudgeGrade};
pub use pipeline::{Oracles, Pipeline, RunOutcome, RunReport};
pub use question::QuestionVerdict;
pub use state::{
    ClassDescription, ClassProperty, ExecutionError, ExecutionResult, Judgement, JudgementStatus,
    RunContext, RunState,
};
pub use validator::{validate_candidate, NO_QUERY_MESSAGE};
