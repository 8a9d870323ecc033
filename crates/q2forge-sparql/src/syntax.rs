//! Grammar check for candidate queries.
//!
//! Candidates are parsed with the configured prefix table prepended, so a
//! model may use `rdfs:label` without declaring `rdfs`. Only read queries
//! parse; SPARQL Update text is reported like any other syntax error. Which
//! read forms a caller can run is its own decision, see
//! [`QueryForm::returns_solutions`].

use crate::prefixes::PrefixTable;
use spargebra::Query;

/// Parser rejection, carrying the parser's message verbatim.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct SyntaxError {
    pub message: String,
}

/// Query form of a syntactically valid candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryForm {
    Select,
    Ask,
    Construct,
    Describe,
}

impl QueryForm {
    pub fn keyword(self) -> &'static str {
        match self {
            QueryForm::Select => "SELECT",
            QueryForm::Ask => "ASK",
            QueryForm::Construct => "CONSTRUCT",
            QueryForm::Describe => "DESCRIBE",
        }
    }

    /// SELECT and ASK answer with SPARQL JSON results; CONSTRUCT and
    /// DESCRIBE answer with an RDF graph.
    pub fn returns_solutions(self) -> bool {
        matches!(self, QueryForm::Select | QueryForm::Ask)
    }
}

/// Parse `query` (with `prefixes` prepended) against the SPARQL 1.1 grammar.
pub fn check_syntax(query: &str, prefixes: &PrefixTable) -> Result<QueryForm, SyntaxError> {
    let full = prefixes.prepend_to(query);
    let parsed = Query::parse(&full, None).map_err(|e| SyntaxError {
        message: e.to_string(),
    })?;
    Ok(match parsed {
        Query::Select { .. } => QueryForm::Select,
        Query::Ask { .. } => QueryForm::Ask,
        Query::Construct { .. } => QueryForm::Construct,
        Query::Describe { .. } => QueryForm::Describe,
    })
}
