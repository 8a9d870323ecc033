//! Result interpreter.

use crate::cancel::RunGuard;
use crate::config::PipelineConfig;
use crate::error::{OracleStage, PipelineError};
use crate::oracle;
use crate::prompts;
use q2forge_llm::LanguageModel;
use q2forge_sparql::SparqlResults;
use tracing::{info, warn};

/// What interpretation produced for an executed query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interpretation {
    /// No rows. The oracle was not called.
    NoRows,
    Summary(String),
    /// The rows could not be rendered for the oracle.
    Unrenderable(String),
}

/// Summarise `results` for the user.
pub async fn interpret(
    model: &dyn LanguageModel,
    config: &PipelineConfig,
    question: &str,
    results: &SparqlResults,
    guard: &RunGuard,
) -> Result<Interpretation, PipelineError> {
    if results.is_empty() {
        info!("query returned no rows; skipping interpretation");
        return Ok(Interpretation::NoRows);
    }
    let csv = match results.to_csv() {
        Ok(csv) => config.prefixes.compact(&csv),
        Err(err) => {
            warn!(error = %err, "could not render results as CSV; skipping interpretation");
            return Ok(Interpretation::Unrenderable(err.to_string()));
        }
    };
    let prompt = prompts::interpretation_prompt(config, question, &csv);
    let text = oracle::ask(
        model,
        OracleStage::Interpret,
        &prompt,
        guard,
        config.timeouts.oracle(),
    )
    .await?;
    info!(chars = text.len(), "results interpreted");
    Ok(Interpretation::Summary(text))
}
