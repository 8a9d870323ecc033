//! Judging oracle invoker.
//!
//! The grader is asked for `{"grade": <1-10>, "justification": "..."}` in a
//! ```json fence. The first such fence is parsed when present, otherwise the
//! whole reply. Integral floats and numeric strings (`9.0`, `"9"`) count as
//! whole grades. Anything that does not yield a whole grade in range is an
//! unparsable grade, never an error.

use crate::config::{MAX_GRADE, MIN_GRADE};
use crate::state::{Judgement, JudgementStatus};
use q2forge_llm::parse_json_object;
use q2forge_sparql::{find_fenced_blocks, JSON_FENCE_TAG};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

/// A well-formed grader verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JudgeGrade {
    pub grade: u8,
    pub justification: String,
}

#[derive(Deserialize)]
struct RawGrade {
    grade: Value,
    #[serde(default)]
    justification: String,
}

/// Whole-number grade from `9`, `9.0` or `"9"`.
fn integral_grade(value: &Value) -> Option<i64> {
    let whole = |f: f64| (f.is_finite() && f.fract() == 0.0).then_some(f as i64);
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(whole)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| s.parse::<f64>().ok().and_then(whole))
        }
        _ => None,
    }
}

/// Parse a grader reply. `Err` carries a short reason for logs.
pub fn parse_judge_reply(reply: &str) -> Result<JudgeGrade, String> {
    let blocks = find_fenced_blocks(reply, JSON_FENCE_TAG);
    let payload = blocks.first().unwrap_or(reply);
    let raw: RawGrade = parse_json_object(payload).map_err(|e| e.to_string())?;
    let number = integral_grade(&raw.grade)
        .ok_or_else(|| format!("grade {} is not a whole number", raw.grade))?;
    let grade = u8::try_from(number)
        .ok()
        .filter(|g| (MIN_GRADE..=MAX_GRADE).contains(g))
        .ok_or_else(|| format!("grade {number} is outside {MIN_GRADE}..={MAX_GRADE}"))?;
    Ok(JudgeGrade {
        grade,
        justification: raw.justification,
    })
}

/// Settle a `ValidSyntax` judgement from the grader's reply:
/// `HighScore` at or above `retry_threshold`, `LowScoreRetry` below it,
/// `UnparsableGrade` when no grade can be read. Whether a low score is
/// retried, force-run or aborted is decided by the controller.
pub fn apply_grade(judgement: &mut Judgement, reply: &str, retry_threshold: u8) {
    judgement.grader_output = Some(reply.to_string());
    match parse_judge_reply(reply) {
        Ok(g) => {
            debug!(grade = g.grade, justification = %g.justification, "grader verdict");
            judgement.status = if g.grade >= retry_threshold {
                info!(grade = g.grade, "query passed judging");
                JudgementStatus::HighScore
            } else {
                info!(grade = g.grade, threshold = retry_threshold, "query did not pass judging");
                JudgementStatus::LowScoreRetry
            };
            judgement.failure_detail = (judgement.status == JudgementStatus::LowScoreRetry)
                .then(|| g.justification.clone());
            judgement.grade = Some(g.grade);
            judgement.justification = Some(g.justification);
        }
        Err(reason) => {
            info!(reason = %reason, "grader reply is not a valid grade");
            judgement.status = JudgementStatus::UnparsableGrade;
            judgement.grade = None;
            judgement.justification = None;
            judgement.failure_detail = Some(reply.to_string());
        }
    }
}
