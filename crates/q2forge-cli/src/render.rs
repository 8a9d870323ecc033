//! Human-readable run output.

use colored::{ColoredString, Colorize};
use q2forge_pipeline::{
    ExecutionResult, Judgement, JudgementStatus, RunOutcome, RunReport,
};

fn status_label(status: JudgementStatus) -> ColoredString {
    let text = status.as_str();
    match status {
        JudgementStatus::HighScore => text.green().bold(),
        JudgementStatus::LowScoreForceRun | JudgementStatus::ValidSyntax => text.yellow().bold(),
        JudgementStatus::LowScoreRetry => text.yellow(),
        _ => text.red().bold(),
    }
}

/// One line per attempt, plus the failure detail when there is one.
pub fn judgement_lines(attempt: usize, judgement: &Judgement) -> Vec<String> {
    let mut head = format!("attempt {attempt}: {}", status_label(judgement.status));
    if let Some(grade) = judgement.grade {
        head.push_str(&format!(" (grade {grade})"));
    }
    let mut lines = vec![head];
    if let Some(detail) = &judgement.failure_detail {
        let first = detail.lines().next().unwrap_or("");
        lines.push(format!("    {first}"));
    }
    lines
}

pub fn print_judgement(attempt: usize, judgement: &Judgement) {
    for line in judgement_lines(attempt, judgement) {
        println!("{line}");
    }
    if let Some(query) = &judgement.candidate_query {
        println!("\n{}", query.cyan());
    }
}

pub fn print_report(report: &RunReport) {
    println!("{} {}", "run".bold(), report.run_id);
    if let Some(verdict) = report.question_verdict {
        println!("  {} question {verdict}", "→".cyan());
    }
    for (i, j) in report.state.judgements().iter().enumerate() {
        for line in judgement_lines(i + 1, j) {
            println!("  {line}");
        }
    }
    if let Some(query) = report.accepted_query() {
        println!("\n{}\n{}", "Accepted query:".bold(), query.cyan());
    }

    match &report.outcome {
        RunOutcome::Answered => {
            if let Some(rows) = report.state.execution_result().and_then(ExecutionResult::rows) {
                println!("\n{} {} row(s)", "→".cyan(), rows.len());
            }
            if let Some(text) = &report.interpretation {
                println!("\n{text}");
            }
        }
        RunOutcome::EmptyResults => {
            println!("\n{} the query returned no results", "→".yellow());
        }
        RunOutcome::ExecutionFailed => {
            if let Some(ExecutionResult::Failed(err)) = report.state.execution_result() {
                println!("\n{} execution failed: {err}", "error:".red().bold());
            }
        }
        RunOutcome::InterpretationFailed { reason } => {
            if let Some(rows) = report.state.execution_result().and_then(ExecutionResult::rows) {
                println!("\n{} {} row(s)", "→".cyan(), rows.len());
            }
            println!("\n{} could not interpret the results: {reason}", "error:".red().bold());
        }
        RunOutcome::Aborted { status } => {
            let status = status.map(|s| s.as_str()).unwrap_or("no attempt");
            println!(
                "\n{} no acceptable query after {} attempt(s) (last status: {status})",
                "aborted:".red().bold(),
                report.state.attempt_count()
            );
        }
        RunOutcome::QuestionRejected { verdict } => {
            println!(
                "\n{} the question was judged {verdict} for this knowledge graph",
                "rejected:".red().bold()
            );
        }
    }
}
