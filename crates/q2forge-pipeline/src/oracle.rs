//! Guarded oracle calls shared by every stage that talks to a model.

use crate::cancel::RunGuard;
use crate::error::{OracleStage, PipelineError};
use q2forge_llm::LanguageModel;
use std::time::Duration;
use tracing::debug;

/// Send `prompt` to `model` under the run guard. Transport failures,
/// timeouts, cancellation and the run deadline all end the run.
pub(crate) async fn ask(
    model: &dyn LanguageModel,
    stage: OracleStage,
    prompt: &str,
    guard: &RunGuard,
    timeout: Duration,
) -> Result<String, PipelineError> {
    debug!(stage = %stage, model = model.name(), prompt = %prompt, "oracle prompt");
    let reply = guard
        .call(timeout, model.generate(prompt))
        .await
        .map_err(|i| PipelineError::interrupted(i, stage, guard.budget()))?
        .map_err(|source| PipelineError::Oracle { stage, source })?;
    debug!(stage = %stage, reply = %reply, "oracle reply");
    Ok(reply)
}
