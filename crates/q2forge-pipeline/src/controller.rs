//! Retry controller: the bounded generate → validate → grade loop.
//!
//! Every pass of the loop records exactly one judgement, right after
//! validation, and then settles that judgement's status in place as
//! enrichment and grading complete. An interrupted pass therefore leaves a
//! non-terminal status (`ValidSyntax`) behind rather than a misleading one.
//!
//! The decision table lives in [`decide`], a pure function, so the loop body
//! only performs the I/O each action needs.

use crate::cancel::RunGuard;
use crate::config::{JudgingConfig, PipelineConfig};
use crate::enricher::IdentifierEnricher;
use crate::error::{OracleStage, PipelineError};
use crate::judge::apply_grade;
use crate::oracle;
use crate::prompts;
use crate::state::{JudgementStatus, RunState};
use crate::validator::validate_candidate;
use q2forge_llm::LanguageModel;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// What the controller does next for the current judgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextAction {
    /// Valid syntax: enrich identifiers and ask the grader.
    Grade,
    /// Regenerate with the previous answer and its failure cause.
    Retry,
    /// High score: hand the candidate to the executor.
    Accept,
    /// Budget spent but the grade clears the run threshold.
    ForceRun,
    Abort,
}

/// The transition table. `grade` is only consulted for low scores.
pub fn decide(
    status: JudgementStatus,
    grade: Option<u8>,
    attempts_remaining: bool,
    judging: &JudgingConfig,
) -> NextAction {
    use JudgementStatus::*;
    match status {
        ValidSyntax => NextAction::Grade,
        HighScore => NextAction::Accept,
        LowScoreForceRun => NextAction::ForceRun,
        LowScoreAbort => NextAction::Abort,
        NoQueryFound | InvalidSyntax | UnparsableGrade => {
            if attempts_remaining {
                NextAction::Retry
            } else {
                NextAction::Abort
            }
        }
        LowScoreRetry => {
            if attempts_remaining {
                NextAction::Retry
            } else if grade.is_some_and(|g| g >= judging.run_threshold) {
                NextAction::ForceRun
            } else {
                NextAction::Abort
            }
        }
    }
}

/// How the judging phase ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "decision")]
pub enum ControlOutcome {
    /// `RunState::accepted_query` is set.
    Accepted { status: JudgementStatus },
    /// Budget spent without an acceptable candidate. `status` is the last
    /// judgement's status; `None` only when the budget allowed no attempt.
    Aborted { status: Option<JudgementStatus> },
}

pub struct RetryController<'a> {
    config: &'a PipelineConfig,
    generator: &'a dyn LanguageModel,
    grader: &'a dyn LanguageModel,
    enricher: &'a IdentifierEnricher,
}

impl<'a> RetryController<'a> {
    pub fn new(
        config: &'a PipelineConfig,
        generator: &'a dyn LanguageModel,
        grader: &'a dyn LanguageModel,
        enricher: &'a IdentifierEnricher,
    ) -> Self {
        Self {
            config,
            generator,
            grader,
            enricher,
        }
    }

    /// Drive `state` until a candidate is accepted or the budget is spent.
    pub async fn run(
        &self,
        state: &mut RunState,
        guard: &RunGuard,
    ) -> Result<ControlOutcome, PipelineError> {
        let oracle_timeout = self.config.timeouts.oracle();
        // (previous raw output, failure cause) once an attempt has failed
        let mut retry_with: Option<(String, String)> = None;

        while state.attempts_remaining() {
            let attempt = state.attempt_count() + 1;
            info!(attempt, max_attempts = state.max_attempts(), "generating candidate query");

            let prompt = match &retry_with {
                None => prompts::generation_prompt(self.config, state.context(), state.question()),
                Some((last_answer, cause)) => prompts::regeneration_prompt(
                    self.config,
                    state.context(),
                    state.question(),
                    last_answer,
                    cause,
                ),
            };
            let raw = oracle::ask(
                self.generator,
                OracleStage::Generate,
                &prompt,
                guard,
                oracle_timeout,
            )
            .await?;

            let judgement = validate_candidate(&raw, &self.config.prefixes);
            info!(attempt, status = %judgement.status, "candidate validated");
            if !state.record_attempt(judgement) {
                break;
            }

            loop {
                let Some(current) = state.current() else {
                    return Ok(ControlOutcome::Aborted { status: None });
                };
                let status = current.status;
                let action = decide(
                    status,
                    current.grade,
                    state.attempts_remaining(),
                    &self.config.judging,
                );
                debug!(attempt, status = %status, action = ?action, "decision");

                match action {
                    NextAction::Grade => self.grade_current(state, guard).await?,
                    NextAction::Retry => {
                        let cause = current.failure_detail.clone().unwrap_or_default();
                        retry_with = Some((current.raw_model_output.clone(), cause));
                        info!(attempt, status = %status, "retrying");
                        break;
                    }
                    NextAction::Accept | NextAction::ForceRun => {
                        return Ok(self.accept_current(state, action));
                    }
                    NextAction::Abort => {
                        let status = self.abort_current(state);
                        return Ok(ControlOutcome::Aborted { status: Some(status) });
                    }
                }
            }
        }

        let status = state.current().map(|j| j.status);
        warn!(status = ?status, "attempt budget exhausted");
        Ok(ControlOutcome::Aborted { status })
    }

    /// Enrich and grade the current `ValidSyntax` judgement in place.
    async fn grade_current(
        &self,
        state: &mut RunState,
        guard: &RunGuard,
    ) -> Result<(), PipelineError> {
        let query = state
            .current()
            .and_then(|j| j.candidate_query.clone())
            .unwrap_or_default();

        let enrichment = self
            .enricher
            .enrich(&query, guard)
            .await
            .map_err(|i| PipelineError::run_interrupted(i, guard.budget()))?;

        let prompt = prompts::judge_prompt(state.question(), &query, &enrichment.render());
        if let Some(current) = state.current_mut() {
            current.referenced_identifiers = enrichment.identifiers;
            current.identifier_context = enrichment.context;
        }

        let reply = oracle::ask(
            self.grader,
            OracleStage::Judge,
            &prompt,
            guard,
            self.config.timeouts.oracle(),
        )
        .await?;

        if let Some(current) = state.current_mut() {
            apply_grade(current, &reply, self.config.judging.retry_threshold);
        }
        Ok(())
    }

    fn accept_current(&self, state: &mut RunState, action: NextAction) -> ControlOutcome {
        let mut status = JudgementStatus::HighScore;
        let mut query = None;
        if let Some(current) = state.current_mut() {
            if action == NextAction::ForceRun {
                current.status = JudgementStatus::LowScoreForceRun;
            }
            status = current.status;
            query = current.candidate_query.clone();
        }
        if let Some(q) = query {
            state.accept(q);
        }
        info!(status = %status, attempts = state.attempt_count(), "candidate accepted");
        ControlOutcome::Accepted { status }
    }

    fn abort_current(&self, state: &mut RunState) -> JudgementStatus {
        let attempts = state.attempt_count();
        let Some(current) = state.current_mut() else {
            return JudgementStatus::NoQueryFound;
        };
        if current.status == JudgementStatus::LowScoreRetry {
            current.status = JudgementStatus::LowScoreAbort;
        }
        warn!(status = %current.status, grade = ?current.grade, attempts, "run aborted");
        current.status
    }
}
