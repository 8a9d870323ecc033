//! Graph query validator: raw oracle text in, judgement out.
//!
//! Pure and infallible. Parser failures become `InvalidSyntax` judgements
//! carrying the parser message; nothing here returns an error. CONSTRUCT and
//! DESCRIBE parse but cannot be executed into result rows, so they are
//! rejected the same way.

use crate::state::{Judgement, JudgementStatus};
use q2forge_sparql::{
    check_syntax, find_fenced_blocks, PrefixTable, QueryForm, SPARQL_FENCE_TAG,
};
use tracing::{debug, info, warn};

/// Failure detail recorded when the oracle answered without a query block.
pub const NO_QUERY_MESSAGE: &str = "The last answer did not contain a SPARQL query.";

fn unsupported_form_message(form: QueryForm) -> String {
    format!(
        "The query is a {} query. Only SELECT and ASK queries can be executed.",
        form.keyword()
    )
}

/// Locate the first fenced query in `raw` and check it against the grammar
/// (with `prefixes` prepended).
pub fn validate_candidate(raw: &str, prefixes: &PrefixTable) -> Judgement {
    let blocks = find_fenced_blocks(raw, SPARQL_FENCE_TAG);
    let Some(query) = blocks.first() else {
        info!("{NO_QUERY_MESSAGE}");
        let mut j = Judgement::new(JudgementStatus::NoQueryFound, raw);
        j.failure_detail = Some(NO_QUERY_MESSAGE.to_string());
        return j;
    };
    if blocks.len() > 1 {
        warn!(
            blocks = blocks.len(),
            "query generation produced several SPARQL blocks; using the first"
        );
    }
    debug!(query = %query, "candidate query");

    match check_syntax(query, prefixes) {
        Ok(form) if !form.returns_solutions() => {
            warn!(form = ?form, "candidate query is not a SELECT or ASK query");
            let mut j = Judgement::new(JudgementStatus::InvalidSyntax, raw);
            j.candidate_query = Some(query.to_string());
            j.failure_detail = Some(unsupported_form_message(form));
            j
        }
        Ok(form) => {
            info!(form = ?form, "candidate query is syntactically valid");
            let mut j = Judgement::new(JudgementStatus::ValidSyntax, raw);
            j.candidate_query = Some(query.to_string());
            j
        }
        Err(err) => {
            warn!(error = %err, "candidate query is invalid");
            let mut j = Judgement::new(JudgementStatus::InvalidSyntax, raw);
            j.candidate_query = Some(query.to_string());
            j.failure_detail = Some(err.message);
            j
        }
    }
}
