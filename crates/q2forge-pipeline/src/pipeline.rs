//! End-to-end run: question gate, judging loop, execution, interpretation.

use crate::cancel::{CancelToken, RunGuard};
use crate::config::PipelineConfig;
use crate::controller::{ControlOutcome, RetryController};
use crate::enricher::IdentifierEnricher;
use crate::error::{OracleStage, PipelineError};
use crate::executor::QueryExecutor;
use crate::interpreter::{self, Interpretation};
use crate::oracle;
use crate::prompts;
use crate::question::QuestionVerdict;
use crate::state::{ExecutionResult, JudgementStatus, RunContext, RunState};
use chrono::{DateTime, Utc};
use q2forge_llm::LanguageModel;
use q2forge_sparql::{HttpSparqlEndpoint, SparqlService};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

/// The three oracle roles. Any of them may share one model.
#[derive(Clone)]
pub struct Oracles {
    pub generate: Arc<dyn LanguageModel>,
    pub judge: Arc<dyn LanguageModel>,
    pub interpret: Arc<dyn LanguageModel>,
}

impl Oracles {
    /// One model for every role.
    pub fn single(model: Arc<dyn LanguageModel>) -> Self {
        Self {
            generate: model.clone(),
            judge: model.clone(),
            interpret: model,
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum RunOutcome {
    /// Rows returned and interpreted.
    Answered,
    /// The accepted query ran and matched nothing. No interpretation.
    EmptyResults,
    ExecutionFailed,
    /// Rows returned but could not be rendered for interpretation.
    InterpretationFailed { reason: String },
    /// Attempt budget spent without an acceptable candidate.
    Aborted { status: Option<JudgementStatus> },
    QuestionRejected { verdict: QuestionVerdict },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub question: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// `None` when the question gate is disabled.
    pub question_verdict: Option<QuestionVerdict>,
    pub outcome: RunOutcome,
    pub state: RunState,
    pub interpretation: Option<String>,
}

impl RunReport {
    pub fn accepted_query(&self) -> Option<&str> {
        self.state.accepted_query()
    }

    /// Status of the last recorded judgement.
    pub fn final_status(&self) -> Option<JudgementStatus> {
        self.state.current().map(|j| j.status)
    }
}

/// Shared, immutable pipeline. Each call to [`answer`](Self::answer) owns
/// its own run state and identifier cache, so runs may proceed concurrently.
pub struct Pipeline {
    config: Arc<PipelineConfig>,
    oracles: Oracles,
    kg: Arc<dyn SparqlService>,
    ontologies: Arc<dyn SparqlService>,
}

impl Pipeline {
    pub fn new(
        config: Arc<PipelineConfig>,
        oracles: Oracles,
        kg: Arc<dyn SparqlService>,
        ontologies: Arc<dyn SparqlService>,
    ) -> Self {
        Self {
            config,
            oracles,
            kg,
            ontologies,
        }
    }

    /// Build HTTP model clients and endpoints from configuration.
    pub fn from_config(config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        let oracle_timeout = config.timeouts.oracle();
        let build = |model: &q2forge_llm::ModelConfig| {
            model
                .build(oracle_timeout)
                .map_err(|e| PipelineError::Client(format!("{}: {e}", model.label())))
        };
        let oracles = Oracles {
            generate: build(config.models.generate())?,
            judge: build(config.models.judge())?,
            interpret: build(config.models.interpret())?,
        };

        let endpoint = |url: &str| -> Result<Arc<dyn SparqlService>, PipelineError> {
            let ep = HttpSparqlEndpoint::new(url, config.timeouts.endpoint())
                .map_err(|e| PipelineError::Client(e.to_string()))?;
            Ok(Arc::new(ep))
        };
        let kg = endpoint(&config.kg.sparql_endpoint_url)?;
        let ontologies = if config.ontologies_endpoint_url() == config.kg.sparql_endpoint_url {
            kg.clone()
        } else {
            endpoint(config.ontologies_endpoint_url())?
        };

        Ok(Self::new(Arc::new(config), oracles, kg, ontologies))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub async fn answer(
        &self,
        question: &str,
        context: RunContext,
    ) -> Result<RunReport, PipelineError> {
        self.answer_with_cancel(question, context, CancelToken::new())
            .await
    }

    /// Like [`answer`](Self::answer), abandoning the run when `cancel` fires.
    /// A cancelled run returns [`PipelineError::Cancelled`].
    pub async fn answer_with_cancel(
        &self,
        question: &str,
        context: RunContext,
        cancel: CancelToken,
    ) -> Result<RunReport, PipelineError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("run", run_id = %run_id);
        self.run(run_id, question, context, cancel)
            .instrument(span)
            .await
    }

    async fn run(
        &self,
        run_id: Uuid,
        question: &str,
        context: RunContext,
        cancel: CancelToken,
    ) -> Result<RunReport, PipelineError> {
        let started_at = Utc::now();
        let config = self.config.as_ref();
        let guard = RunGuard::new(cancel, config.timeouts.run());
        let mut state = RunState::new(question, config.judging.max_attempts, context);
        info!(question = %question, "run started");

        let report = |state: RunState,
                      verdict: Option<QuestionVerdict>,
                      outcome: RunOutcome,
                      interpretation: Option<String>| {
            info!(outcome = ?outcome, attempts = state.attempt_count(), "run finished");
            RunReport {
                run_id,
                question: question.to_string(),
                started_at,
                finished_at: Utc::now(),
                question_verdict: verdict,
                outcome,
                state,
                interpretation,
            }
        };

        let verdict = if config.validate_question {
            let prompt = prompts::question_check_prompt(config, question);
            let reply = oracle::ask(
                self.oracles.generate.as_ref(),
                OracleStage::QuestionCheck,
                &prompt,
                &guard,
                config.timeouts.oracle(),
            )
            .await?;
            let verdict = QuestionVerdict::classify(&reply);
            info!(verdict = %verdict, "question checked");
            if !verdict.proceeds() {
                return Ok(report(
                    state,
                    Some(verdict),
                    RunOutcome::QuestionRejected { verdict },
                    None,
                ));
            }
            Some(verdict)
        } else {
            None
        };

        let enricher = IdentifierEnricher::new(
            self.ontologies.clone(),
            config.prefixes.clone(),
            config.metadata_properties.clone(),
            config.timeouts.lookup(),
        );
        let controller = RetryController::new(
            config,
            self.oracles.generate.as_ref(),
            self.oracles.judge.as_ref(),
            &enricher,
        );
        if let ControlOutcome::Aborted { status } = controller.run(&mut state, &guard).await? {
            return Ok(report(state, verdict, RunOutcome::Aborted { status }, None));
        }
        let Some(query) = state.accepted_query().map(str::to_string) else {
            let status = state.current().map(|j| j.status);
            return Ok(report(state, verdict, RunOutcome::Aborted { status }, None));
        };

        let executor = QueryExecutor::new(
            self.kg.clone(),
            config.prefixes.clone(),
            config.timeouts.endpoint(),
        );
        let result = executor
            .execute(&query, &guard)
            .await
            .map_err(|i| PipelineError::run_interrupted(i, guard.budget()))?;
        state.set_execution_result(result.clone());

        let (outcome, interpretation) = match &result {
            ExecutionResult::Failed(_) => (RunOutcome::ExecutionFailed, None),
            ExecutionResult::Rows(rows) if rows.is_empty() => (RunOutcome::EmptyResults, None),
            ExecutionResult::Rows(rows) => interpreted_outcome(
                interpreter::interpret(
                    self.oracles.interpret.as_ref(),
                    config,
                    question,
                    rows,
                    &guard,
                )
                .await?,
            ),
        };
        Ok(report(state, verdict, outcome, interpretation))
    }
}

fn interpreted_outcome(interpretation: Interpretation) -> (RunOutcome, Option<String>) {
    match interpretation {
        Interpretation::NoRows => (RunOutcome::EmptyResults, None),
        Interpretation::Summary(text) => (RunOutcome::Answered, Some(text)),
        Interpretation::Unrenderable(reason) => (RunOutcome::InterpretationFailed { reason }, None),
    }
}
