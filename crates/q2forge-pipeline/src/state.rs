//! Run state and judgements.
//!
//! [`RunState`] is the single record threaded through a run. Its mutators are
//! crate-private: only the retry controller and the pipeline write to it, and
//! they do so in a fixed order (append judgement, bump attempt count, then
//! settle the judgement's status).

use q2forge_sparql::{PrefixTable, SparqlResults};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JudgementStatus {
    NoQueryFound,
    InvalidSyntax,
    ValidSyntax,
    UnparsableGrade,
    LowScoreRetry,
    LowScoreForceRun,
    LowScoreAbort,
    HighScore,
}

impl JudgementStatus {
    /// The machine leaves the judging phase after one of these.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JudgementStatus::LowScoreForceRun
                | JudgementStatus::LowScoreAbort
                | JudgementStatus::HighScore
        )
    }

    /// Terminal statuses that hand a query to the executor.
    pub fn is_accepted(self) -> bool {
        matches!(
            self,
            JudgementStatus::LowScoreForceRun | JudgementStatus::HighScore
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JudgementStatus::NoQueryFound => "no_query_found",
            JudgementStatus::InvalidSyntax => "invalid_syntax",
            JudgementStatus::ValidSyntax => "valid_syntax",
            JudgementStatus::UnparsableGrade => "unparsable_grade",
            JudgementStatus::LowScoreRetry => "low_score_retry",
            JudgementStatus::LowScoreForceRun => "low_score_force_run",
            JudgementStatus::LowScoreAbort => "low_score_abort",
            JudgementStatus::HighScore => "high_score",
        }
    }
}

impl fmt::Display for JudgementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of validating (and possibly grading) one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Judgement {
    pub status: JudgementStatus,
    /// Full generation oracle response for this attempt.
    pub raw_model_output: String,
    pub candidate_query: Option<String>,
    /// Why this attempt failed; echoed into the next regeneration prompt.
    pub failure_detail: Option<String>,
    pub referenced_identifiers: Vec<String>,
    pub identifier_context: BTreeMap<String, String>,
    pub grade: Option<u8>,
    pub justification: Option<String>,
    /// Full grader response, when the candidate reached grading.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grader_output: Option<String>,
}

impl Judgement {
    pub fn new(status: JudgementStatus, raw_model_output: impl Into<String>) -> Self {
        Self {
            status,
            raw_model_output: raw_model_output.into(),
            candidate_query: None,
            failure_detail: None,
            referenced_identifiers: Vec::new(),
            identifier_context: BTreeMap::new(),
            grade: None,
            justification: None,
            grader_output: None,
        }
    }
}

/// Typed failure of the graph store while executing the accepted query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionError {
    pub endpoint: String,
    pub message: String,
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.endpoint, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum ExecutionResult {
    Rows(SparqlResults),
    Failed(ExecutionError),
}

impl ExecutionResult {
    pub fn rows(&self) -> Option<&SparqlResults> {
        match self {
            ExecutionResult::Rows(r) => Some(r),
            ExecutionResult::Failed(_) => None,
        }
    }
}

/// A class selected for the question: `(iri, label, description)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassDescription {
    pub iri: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// How instances of a class use a property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassProperty {
    pub class: String,
    pub property: String,
    #[serde(default)]
    pub property_label: Option<String>,
    #[serde(default)]
    pub value_type: Option<String>,
}

/// Schema context and few-shot examples produced before synthesis starts.
/// Read-only for the whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunContext {
    pub selected_classes: Vec<ClassDescription>,
    pub class_properties: Vec<ClassProperty>,
    pub example_queries: Vec<String>,
}

impl RunContext {
    pub fn from_json_str(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn is_empty(&self) -> bool {
        self.selected_classes.is_empty()
            && self.class_properties.is_empty()
            && self.example_queries.is_empty()
    }

    /// One block per class, IRIs compacted to qnames.
    pub fn render_classes(&self, prefixes: &PrefixTable) -> String {
        let mut out = String::new();
        for c in &self.selected_classes {
            out.push_str(&format!("Class '{}':\n", prefixes.compact(&c.iri)));
            if let Some(label) = &c.label {
                out.push_str(&format!("  - Label: '{label}'\n"));
            }
            if let Some(descr) = &c.description {
                out.push_str(&format!("  - Description: '{descr}'\n"));
            }
        }
        out
    }

    /// One sentence per class/property pair, IRIs compacted to qnames.
    pub fn render_properties(&self, prefixes: &PrefixTable) -> String {
        let mut out = String::new();
        for p in &self.class_properties {
            out.push_str(&format!(
                "Instances of class '{}' have property '{}'",
                prefixes.compact(&p.class),
                prefixes.compact(&p.property)
            ));
            if let Some(label) = &p.property_label {
                out.push_str(&format!(" ({label})"));
            }
            if let Some(vt) = &p.value_type {
                out.push_str(&format!(" with value type '{}'", prefixes.compact(vt)));
            }
            out.push_str(".\n");
        }
        out
    }

    pub fn render_examples(&self) -> String {
        self.example_queries
            .iter()
            .map(|q| format!("```sparql\n{}\n```\n", q.trim()))
            .collect()
    }
}

/// The record threaded through one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunState {
    question: String,
    max_attempts: u32,
    attempt_count: u32,
    judgement_history: Vec<Judgement>,
    accepted_query: Option<String>,
    execution_result: Option<ExecutionResult>,
    context: RunContext,
}

impl RunState {
    pub fn new(question: impl Into<String>, max_attempts: u32, context: RunContext) -> Self {
        Self {
            question: question.into(),
            max_attempts,
            attempt_count: 0,
            judgement_history: Vec::new(),
            accepted_query: None,
            execution_result: None,
            context,
        }
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    pub fn attempts_remaining(&self) -> bool {
        self.attempt_count < self.max_attempts
    }

    pub fn judgements(&self) -> &[Judgement] {
        &self.judgement_history
    }

    /// The current (last) judgement.
    pub fn current(&self) -> Option<&Judgement> {
        self.judgement_history.last()
    }

    pub fn accepted_query(&self) -> Option<&str> {
        self.accepted_query.as_deref()
    }

    pub fn execution_result(&self) -> Option<&ExecutionResult> {
        self.execution_result.as_ref()
    }

    pub fn context(&self) -> &RunContext {
        &self.context
    }

    /// Record a new attempt's judgement. Returns `false` (and records
    /// nothing) once the budget is spent.
    pub(crate) fn record_attempt(&mut self, judgement: Judgement) -> bool {
        if !self.attempts_remaining() {
            return false;
        }
        self.judgement_history.push(judgement);
        self.attempt_count += 1;
        true
    }

    pub(crate) fn current_mut(&mut self) -> Option<&mut Judgement> {
        self.judgement_history.last_mut()
    }

    /// Set the accepted query. Only the first call has an effect.
    pub(crate) fn accept(&mut self, query: String) {
        if self.accepted_query.is_none() {
            self.accepted_query = Some(query);
        }
    }

    pub(crate) fn set_execution_result(&mut self, result: ExecutionResult) {
        self.execution_result = Some(result);
    }
}
