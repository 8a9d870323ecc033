//! Integration tests for the complete Q2Forge pipeline
//!
//! These tests drive `Pipeline::answer` end to end with scripted oracles and
//! scripted SPARQL endpoints:
//! - question gate → judging loop → execution → interpretation
//! - attempt budget, force-run and abort fallbacks
//! - cancellation, deadlines and oracle failures
//! - independence of concurrent runs
//!
//! Run with: cargo test --test integration_tests

use q2forge_llm::{LanguageModel, ScriptedModel};
use q2forge_pipeline::{
    CancelToken, ExecutionResult, JudgementStatus, OracleStage, Oracles, Pipeline,
    PipelineConfig, PipelineError, QuestionVerdict, RunContext, RunOutcome, NO_QUERY_MESSAGE,
};
use q2forge_sparql::{RdfTerm, Row, ScriptedEndpoint, SparqlResults};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Fixtures
// ============================================================================

const QUESTION: &str = "Which things are in the graph?";

fn config_json(validate_question: bool, run_secs: u64) -> String {
    format!(
        r#"{{
          "kg": {{
            "full_name": "Test KG",
            "description": "A tiny graph of things.",
            "sparql_endpoint_url": "http://kg.test/sparql",
            "ontologies_endpoint_url": "http://ontologies.test/sparql"
          }},
          "prefixes": [
            {{ "prefix": "ex", "namespace": "http://example.org/" }},
            {{ "prefix": "rdfs", "namespace": "http://www.w3.org/2000/01/rdf-schema#" }}
          ],
          "metadata_properties": ["rdfs:label"],
          "judging": {{ "retry_threshold": 8, "run_threshold": 5, "max_attempts": 3 }},
          "timeouts": {{ "oracle_secs": 30, "endpoint_secs": 30, "lookup_secs": 5, "run_secs": {run_secs} }},
          "models": {{ "generate": {{ "provider": "ollama", "model": "test" }} }},
          "validate_question": {validate_question}
        }}"#
    )
}

fn config(validate_question: bool) -> PipelineConfig {
    PipelineConfig::from_json_str(&config_json(validate_question, 60)).unwrap()
}

fn answer(var: &str) -> String {
    format!("Here is the query:\n```sparql\nSELECT ?{var} WHERE {{ ?{var} a ex:Thing }}\n```\nHope it helps.")
}

fn grade(g: u8) -> String {
    format!("```json\n{{\"grade\": {g}, \"justification\": \"grade {g} because reasons\"}}\n```")
}

fn thing_rows() -> SparqlResults {
    SparqlResults {
        vars: vec!["s".into()],
        rows: vec![Row::from([(
            "s".to_string(),
            RdfTerm::iri("http://example.org/widget"),
        )])],
    }
}

fn label_rows() -> SparqlResults {
    SparqlResults {
        vars: vec!["p0".into()],
        rows: vec![Row::from([("p0".to_string(), RdfTerm::literal("Thing"))])],
    }
}

struct Harness {
    generator: Arc<ScriptedModel>,
    grader: Arc<ScriptedModel>,
    interpreter: Arc<ScriptedModel>,
    kg: Arc<ScriptedEndpoint>,
    ontologies: Arc<ScriptedEndpoint>,
    pipeline: Pipeline,
}

fn harness(
    config: PipelineConfig,
    generator: ScriptedModel,
    grader: ScriptedModel,
    kg: ScriptedEndpoint,
) -> Harness {
    let generator = Arc::new(generator);
    let grader = Arc::new(grader);
    let interpreter = Arc::new(ScriptedModel::always("There is one widget."));
    let kg = Arc::new(kg.named("kg"));
    let ontologies = Arc::new(ScriptedEndpoint::always(label_rows()).named("ontologies"));

    let generate: Arc<dyn LanguageModel> = generator.clone();
    let judge: Arc<dyn LanguageModel> = grader.clone();
    let interpret: Arc<dyn LanguageModel> = interpreter.clone();
    let pipeline = Pipeline::new(
        Arc::new(config),
        Oracles {
            generate,
            judge,
            interpret,
        },
        kg.clone(),
        ontologies.clone(),
    );
    Harness {
        generator,
        grader,
        interpreter,
        kg,
        ontologies,
        pipeline,
    }
}

fn statuses(report: &q2forge_pipeline::RunReport) -> Vec<JudgementStatus> {
    report.state.judgements().iter().map(|j| j.status).collect()
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_happy_path_high_score_executes_and_interprets() {
    let h = harness(
        config(false),
        ScriptedModel::always(&answer("s")),
        ScriptedModel::always(&grade(9)),
        ScriptedEndpoint::always(thing_rows()),
    );

    let report = h.pipeline.answer(QUESTION, RunContext::default()).await.unwrap();

    assert_eq!(report.outcome, RunOutcome::Answered);
    assert_eq!(statuses(&report), vec![JudgementStatus::HighScore]);
    assert_eq!(
        report.accepted_query(),
        Some("SELECT ?s WHERE { ?s a ex:Thing }")
    );
    assert_eq!(report.interpretation.as_deref(), Some("There is one widget."));
    assert_eq!(h.kg.calls(), 1);
    assert!(h.kg.queries()[0].contains("PREFIX ex: <http://example.org/>"));

    let j = &report.state.judgements()[0];
    assert_eq!(j.grade, Some(9));
    assert_eq!(j.referenced_identifiers, vec!["ex:Thing".to_string()]);
    assert_eq!(j.identifier_context.get("ex:Thing").map(String::as_str), Some("rdfs:label: Thing"));
    assert!(h.grader.prompts()[0].contains("rdfs:label: Thing"));
    assert!(h.interpreter.prompts()[0].contains("ex:widget"));
}

#[tokio::test]
async fn test_force_run_after_three_low_grades() {
    let h = harness(
        config(false),
        ScriptedModel::new(vec![answer("a"), answer("b"), answer("c")]),
        ScriptedModel::always(&grade(6)),
        ScriptedEndpoint::always(thing_rows()),
    );

    let report = h.pipeline.answer(QUESTION, RunContext::default()).await.unwrap();

    assert_eq!(
        statuses(&report),
        vec![
            JudgementStatus::LowScoreRetry,
            JudgementStatus::LowScoreRetry,
            JudgementStatus::LowScoreForceRun,
        ]
    );
    assert_eq!(report.state.attempt_count(), 3);
    assert_eq!(
        report.accepted_query(),
        Some("SELECT ?c WHERE { ?c a ex:Thing }")
    );
    assert_eq!(report.outcome, RunOutcome::Answered);
    assert_eq!(h.kg.calls(), 1);
    // Same identifier in every attempt: looked up once per run.
    assert_eq!(h.ontologies.calls(), 1);

    // Retries carry the previous answer and the grader's justification.
    let prompts = h.generator.prompts();
    assert_eq!(prompts.len(), 3);
    assert!(prompts[1].contains(&answer("a")));
    assert!(prompts[1].contains("grade 6 because reasons"));
    assert!(prompts[2].contains(&answer("b")));
}

#[tokio::test]
async fn test_hard_abort_after_three_very_low_grades() {
    let h = harness(
        config(false),
        ScriptedModel::always(&answer("s")),
        ScriptedModel::always(&grade(3)),
        ScriptedEndpoint::always(thing_rows()),
    );

    let report = h.pipeline.answer(QUESTION, RunContext::default()).await.unwrap();

    assert_eq!(
        report.outcome,
        RunOutcome::Aborted {
            status: Some(JudgementStatus::LowScoreAbort)
        }
    );
    assert_eq!(report.final_status(), Some(JudgementStatus::LowScoreAbort));
    assert_eq!(report.accepted_query(), None);
    assert!(report.state.execution_result().is_none());
    assert_eq!(h.kg.calls(), 0);
    assert_eq!(h.interpreter.calls(), 0);
}

#[tokio::test]
async fn test_no_query_ever_aborts_without_grading() {
    let h = harness(
        config(false),
        ScriptedModel::always("I am not sure how to write that query."),
        ScriptedModel::always(&grade(10)),
        ScriptedEndpoint::always(thing_rows()),
    );

    let report = h.pipeline.answer(QUESTION, RunContext::default()).await.unwrap();

    assert_eq!(
        report.outcome,
        RunOutcome::Aborted {
            status: Some(JudgementStatus::NoQueryFound)
        }
    );
    assert_eq!(statuses(&report), vec![JudgementStatus::NoQueryFound; 3]);
    for j in report.state.judgements() {
        assert_eq!(j.failure_detail.as_deref(), Some(NO_QUERY_MESSAGE));
    }
    assert_eq!(h.grader.calls(), 0);
    assert_eq!(h.ontologies.calls(), 0);
    assert_eq!(h.kg.calls(), 0);
    assert!(h.generator.prompts()[1].contains(NO_QUERY_MESSAGE));
}

#[tokio::test]
async fn test_empty_results_skip_interpretation() {
    let empty = SparqlResults {
        vars: vec!["s".into()],
        rows: Vec::new(),
    };
    let h = harness(
        config(false),
        ScriptedModel::always(&answer("s")),
        ScriptedModel::always(&grade(9)),
        ScriptedEndpoint::always(empty),
    );

    let report = h.pipeline.answer(QUESTION, RunContext::default()).await.unwrap();

    assert_eq!(report.outcome, RunOutcome::EmptyResults);
    assert_eq!(report.interpretation, None);
    assert_eq!(h.interpreter.calls(), 0);
    assert!(matches!(
        report.state.execution_result(),
        Some(ExecutionResult::Rows(r)) if r.is_empty()
    ));
}

// ============================================================================
// Attempt budget
// ============================================================================

#[tokio::test]
async fn test_four_invalid_answers_stop_after_three_attempts() {
    let invalid = "```sparql\nSELECT ?s WHERE { ?s a ex:Thing\n```".to_string();
    let h = harness(
        config(false),
        ScriptedModel::new(vec![invalid; 4]),
        ScriptedModel::always(&grade(9)),
        ScriptedEndpoint::always(thing_rows()),
    );

    let report = h.pipeline.answer(QUESTION, RunContext::default()).await.unwrap();

    assert_eq!(
        report.outcome,
        RunOutcome::Aborted {
            status: Some(JudgementStatus::InvalidSyntax)
        }
    );
    assert_eq!(report.state.judgements().len(), 3);
    assert_eq!(report.state.attempt_count(), 3);
    assert_eq!(h.generator.calls(), 3);
    for j in report.state.judgements() {
        assert!(j.failure_detail.as_deref().is_some_and(|d| !d.is_empty()));
    }
}

#[tokio::test]
async fn test_history_grows_by_one_per_cycle_across_statuses() {
    let h = harness(
        config(false),
        ScriptedModel::new(vec![
            "no query here".to_string(),
            "```sparql\nSELECT WHERE\n```".to_string(),
            answer("s"),
        ]),
        ScriptedModel::always(&grade(8)),
        ScriptedEndpoint::always(thing_rows()),
    );

    let report = h.pipeline.answer(QUESTION, RunContext::default()).await.unwrap();

    assert_eq!(
        statuses(&report),
        vec![
            JudgementStatus::NoQueryFound,
            JudgementStatus::InvalidSyntax,
            JudgementStatus::HighScore,
        ]
    );
    assert_eq!(report.state.attempt_count() as usize, report.state.judgements().len());
    assert_eq!(h.grader.calls(), 1);
    assert!(h.generator.prompts()[2].contains("SELECT WHERE"));
}

#[tokio::test]
async fn test_unparsable_grade_is_retried() {
    let h = harness(
        config(false),
        ScriptedModel::always(&answer("s")),
        ScriptedModel::new(vec!["Looks great to me!".to_string(), grade(9)]),
        ScriptedEndpoint::always(thing_rows()),
    );

    let report = h.pipeline.answer(QUESTION, RunContext::default()).await.unwrap();

    assert_eq!(
        statuses(&report),
        vec![JudgementStatus::UnparsableGrade, JudgementStatus::HighScore]
    );
    assert_eq!(report.state.judgements()[0].grade, None);
    assert!(h.generator.prompts()[1].contains("Looks great to me!"));
}

// ============================================================================
// Execution and the question gate
// ============================================================================

#[tokio::test]
async fn test_execution_failure_is_reported_not_raised() {
    let h = harness(
        config(false),
        ScriptedModel::always(&answer("s")),
        ScriptedModel::always(&grade(9)),
        ScriptedEndpoint::unreachable(),
    );

    let report = h.pipeline.answer(QUESTION, RunContext::default()).await.unwrap();

    assert_eq!(report.outcome, RunOutcome::ExecutionFailed);
    assert!(matches!(
        report.state.execution_result(),
        Some(ExecutionResult::Failed(_))
    ));
    assert_eq!(h.interpreter.calls(), 0);
}

#[tokio::test]
async fn test_question_gate_rejects_before_synthesis() {
    let h = harness(
        config(true),
        ScriptedModel::always("false"),
        ScriptedModel::always(&grade(9)),
        ScriptedEndpoint::always(thing_rows()),
    );

    let report = h.pipeline.answer("What is the airspeed of a swallow?", RunContext::default()).await.unwrap();

    assert_eq!(
        report.outcome,
        RunOutcome::QuestionRejected {
            verdict: QuestionVerdict::Invalid
        }
    );
    assert_eq!(report.state.attempt_count(), 0);
    assert_eq!(h.generator.calls(), 1);
    assert_eq!(h.grader.calls(), 0);
}

#[tokio::test]
async fn test_question_gate_treats_mixed_answer_as_ambiguous() {
    let h = harness(
        config(true),
        ScriptedModel::always("It could be true, or false."),
        ScriptedModel::always(&grade(9)),
        ScriptedEndpoint::always(thing_rows()),
    );

    let report = h.pipeline.answer(QUESTION, RunContext::default()).await.unwrap();
    assert_eq!(report.question_verdict, Some(QuestionVerdict::Ambiguous));
    assert_eq!(report.state.judgements().len(), 0);
}

#[tokio::test]
async fn test_question_gate_pass_continues_to_answer() {
    let h = harness(
        config(true),
        ScriptedModel::new(vec!["true".to_string(), answer("s")]),
        ScriptedModel::always(&grade(9)),
        ScriptedEndpoint::always(thing_rows()),
    );

    let report = h.pipeline.answer(QUESTION, RunContext::default()).await.unwrap();
    assert_eq!(report.question_verdict, Some(QuestionVerdict::Valid));
    assert_eq!(report.outcome, RunOutcome::Answered);
}

// ============================================================================
// Failures, cancellation and deadlines
// ============================================================================

#[tokio::test]
async fn test_oracle_transport_failure_is_an_error() {
    let h = harness(
        config(false),
        ScriptedModel::failing("connection reset"),
        ScriptedModel::always(&grade(9)),
        ScriptedEndpoint::always(thing_rows()),
    );

    let err = h.pipeline.answer(QUESTION, RunContext::default()).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Oracle {
            stage: OracleStage::Generate,
            ..
        }
    ));
}

#[tokio::test]
async fn test_cancellation_during_grading_returns_cancelled() {
    let h = harness(
        config(false),
        ScriptedModel::always(&answer("s")),
        ScriptedModel::always(&grade(9)).with_delay(Duration::from_secs(30)),
        ScriptedEndpoint::always(thing_rows()),
    );
    let token = CancelToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let err = h
        .pipeline
        .answer_with_cancel(QUESTION, RunContext::default(), token)
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Cancelled));
    assert_eq!(h.kg.calls(), 0);
}

#[tokio::test]
async fn test_run_deadline_bounds_a_stuck_oracle() {
    let cfg = PipelineConfig::from_json_str(&config_json(false, 1)).unwrap();
    let h = harness(
        cfg,
        ScriptedModel::always(&answer("s")).with_delay(Duration::from_secs(30)),
        ScriptedModel::always(&grade(9)),
        ScriptedEndpoint::always(thing_rows()),
    );

    let err = h.pipeline.answer(QUESTION, RunContext::default()).await.unwrap_err();
    assert!(matches!(err, PipelineError::DeadlineExceeded { secs: 1 }));
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test]
async fn test_concurrent_runs_do_not_share_state() {
    let h = harness(
        config(false),
        ScriptedModel::always(&answer("s")),
        ScriptedModel::always(&grade(9)),
        ScriptedEndpoint::always(thing_rows()),
    );

    let (a, b) = tokio::join!(
        h.pipeline.answer("First question?", RunContext::default()),
        h.pipeline.answer("Second question?", RunContext::default()),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_ne!(a.run_id, b.run_id);
    assert_eq!(a.question, "First question?");
    assert_eq!(b.question, "Second question?");
    assert_eq!(a.state.judgements().len(), 1);
    assert_eq!(b.state.judgements().len(), 1);
    // Each run owns its identifier cache.
    assert_eq!(h.ontologies.calls(), 2);
    assert_eq!(h.kg.calls(), 2);
}

#[tokio::test]
async fn test_report_serializes_to_json() {
    let h = harness(
        config(false),
        ScriptedModel::always(&answer("s")),
        ScriptedModel::always(&grade(9)),
        ScriptedEndpoint::always(thing_rows()),
    );
    let report = h.pipeline.answer(QUESTION, RunContext::default()).await.unwrap();

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["outcome"]["outcome"], "answered");
    assert_eq!(json["state"]["judgement_history"][0]["status"], "high_score");
}
