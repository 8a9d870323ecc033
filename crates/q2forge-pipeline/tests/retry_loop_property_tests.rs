//! Property tests for the judging loop.
//!
//! 1. `attempt_count` never exceeds `max_attempts`, and history grows by one
//!    judgement per attempt
//! 2. The outcome of a run of valid candidates is fully determined by the
//!    sequence of grades and the two thresholds
//! 3. Validation and grading are replayable: same input, same status

use proptest::prelude::*;
use q2forge_llm::ScriptedModel;
use q2forge_pipeline::{
    apply_grade, validate_candidate, CancelToken, ControlOutcome, IdentifierEnricher,
    JudgementStatus, PipelineConfig, RetryController, RunContext, RunGuard, RunState,
};
use q2forge_sparql::{ScriptedEndpoint, SparqlResults};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Fixtures
// ============================================================================

const VALID_ANSWER: &str = "Here you go:\n```sparql\nSELECT ?s WHERE { ?s a ex:Thing }\n```";
const INVALID_ANSWER: &str = "```sparql\nSELECT ?s WHERE { ?s a ex:Thing \n```";

fn config(max_attempts: u32, retry_threshold: u8, run_threshold: u8) -> PipelineConfig {
    PipelineConfig::from_json_str(&format!(
        r#"{{
          "kg": {{ "full_name": "Test KG", "sparql_endpoint_url": "http://kg.test/sparql" }},
          "prefixes": [ {{ "prefix": "ex", "namespace": "http://example.org/" }},
                        {{ "prefix": "rdfs", "namespace": "http://www.w3.org/2000/01/rdf-schema#" }} ],
          "metadata_properties": ["rdfs:label"],
          "judging": {{ "retry_threshold": {retry_threshold}, "run_threshold": {run_threshold},
                        "max_attempts": {max_attempts} }},
          "models": {{ "generate": {{ "provider": "ollama", "model": "test" }} }}
        }}"#
    ))
    .unwrap()
}

fn grade_reply(grade: u8) -> String {
    format!("```json\n{{\"grade\": {grade}, \"justification\": \"graded {grade}\"}}\n```")
}

/// Run the controller to completion on a fresh state.
fn run_loop(
    cfg: &PipelineConfig,
    generator: &ScriptedModel,
    grader: &ScriptedModel,
) -> (ControlOutcome, RunState) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    rt.block_on(async {
        let endpoint = Arc::new(ScriptedEndpoint::always(SparqlResults::default()));
        let enricher = IdentifierEnricher::new(
            endpoint,
            cfg.prefixes.clone(),
            cfg.metadata_properties.clone(),
            Duration::from_secs(1),
        );
        let controller = RetryController::new(cfg, generator, grader, &enricher);
        let guard = RunGuard::new(CancelToken::new(), Duration::from_secs(30));
        let mut state = RunState::new("What is a thing?", cfg.judging.max_attempts, RunContext::default());
        let outcome = controller.run(&mut state, &guard).await.unwrap();
        (outcome, state)
    })
}

// ============================================================================
// Attempt budget
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn invalid_forever_stops_at_the_budget(max_attempts in 1u32..6) {
        let cfg = config(max_attempts, 8, 5);
        let generator = ScriptedModel::always(INVALID_ANSWER);
        let grader = ScriptedModel::always(&grade_reply(10));

        let (outcome, state) = run_loop(&cfg, &generator, &grader);

        prop_assert_eq!(outcome, ControlOutcome::Aborted { status: Some(JudgementStatus::InvalidSyntax) });
        prop_assert_eq!(state.attempt_count(), max_attempts);
        prop_assert_eq!(state.judgements().len() as u32, max_attempts);
        prop_assert_eq!(generator.calls() as u32, max_attempts);
        prop_assert_eq!(grader.calls(), 0);
        prop_assert!(state.accepted_query().is_none());
    }

    #[test]
    fn grades_decide_the_outcome(
        max_attempts in 1u32..5,
        grades in proptest::collection::vec(1u8..=10, 5),
        retry_threshold in 2u8..=10,
        run_offset in 0u8..5,
    ) {
        let run_threshold = retry_threshold.saturating_sub(run_offset).max(1);
        let cfg = config(max_attempts, retry_threshold, run_threshold);
        let generator = ScriptedModel::always(VALID_ANSWER);
        let grader = ScriptedModel::new(grades.iter().map(|g| grade_reply(*g)).collect());

        let (outcome, state) = run_loop(&cfg, &generator, &grader);

        let budget = &grades[..max_attempts as usize];
        let expected_attempts = budget
            .iter()
            .position(|g| *g >= retry_threshold)
            .map(|i| i + 1)
            .unwrap_or(budget.len());
        let last = budget[expected_attempts - 1];
        let expected_status = if last >= retry_threshold {
            JudgementStatus::HighScore
        } else if last >= run_threshold {
            JudgementStatus::LowScoreForceRun
        } else {
            JudgementStatus::LowScoreAbort
        };

        prop_assert_eq!(state.attempt_count() as usize, expected_attempts);
        prop_assert_eq!(state.judgements().len(), expected_attempts);
        prop_assert_eq!(state.current().map(|j| j.status), Some(expected_status));
        prop_assert_eq!(state.current().and_then(|j| j.grade), Some(last));
        prop_assert_eq!(state.accepted_query().is_some(), expected_status.is_accepted());
        match outcome {
            ControlOutcome::Accepted { status } => prop_assert_eq!(status, expected_status),
            ControlOutcome::Aborted { status } => {
                prop_assert_eq!(status, Some(JudgementStatus::LowScoreAbort));
                prop_assert_eq!(expected_status, JudgementStatus::LowScoreAbort);
            }
        }
        // Every judgement before the last was a retried low score.
        for j in &state.judgements()[..expected_attempts - 1] {
            prop_assert_eq!(j.status, JudgementStatus::LowScoreRetry);
        }
    }
}

// ============================================================================
// Replayability
// ============================================================================

fn prose() -> impl Strategy<Value = String> {
    proptest::string::string_regex("[A-Za-z0-9 ,.:;?\n{}]{0,60}").unwrap()
}

fn raw_output() -> impl Strategy<Value = String> {
    let body = prop_oneof![
        Just("SELECT ?s WHERE { ?s a ex:Thing }".to_string()),
        Just("SELECT ?s WHERE { ?s a ex:Thing".to_string()),
        Just("ASK { ex:a ex:b ex:c }".to_string()),
        proptest::string::string_regex("[A-Za-z?:{} ]{0,40}").unwrap(),
    ];
    (prose(), proptest::option::of(body), prose())
        .prop_map(|(before, body, after)| match body {
            Some(b) => format!("{before}\n```sparql\n{b}\n```\n{after}"),
            None => format!("{before}{after}"),
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn validation_is_replayable(raw in raw_output()) {
        let cfg = config(3, 8, 5);
        let a = validate_candidate(&raw, &cfg.prefixes);
        let b = validate_candidate(&raw, &cfg.prefixes);
        prop_assert_eq!(a, b);
    }

    #[test]
    fn grading_is_replayable(grade in 0i64..12, threshold in 1u8..=10) {
        let reply = format!("{{\"grade\": {grade}, \"justification\": \"j\"}}");
        let cfg = config(3, 8, 5);
        let mut a = validate_candidate(VALID_ANSWER, &cfg.prefixes);
        let mut b = a.clone();
        apply_grade(&mut a, &reply, threshold);
        apply_grade(&mut b, &reply, threshold);
        prop_assert_eq!(&a, &b);
        let in_range = (1..=10).contains(&grade);
        prop_assert_eq!(a.status == JudgementStatus::UnparsableGrade, !in_range);
    }
}
