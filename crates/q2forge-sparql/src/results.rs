//! SPARQL 1.1 Query Results (JSON) model.
//!
//! Only the tabular shape matters downstream: an ordered variable list and a
//! sequence of rows. ASK results are folded into that shape as a single row
//! binding the variable `boolean`, so callers never special-case them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

const XSD_BOOLEAN: &str = "http://www.w3.org/2001/XMLSchema#boolean";

#[derive(Debug, thiserror::Error)]
pub enum ResultsError {
    #[error("invalid SPARQL JSON results: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV rendering failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("CSV output was not UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TermKind {
    Uri,
    Literal,
    /// Pre-standard spelling still emitted by some stores (Virtuoso).
    TypedLiteral,
    Bnode,
}

/// One bound value, as it appears in a `results.bindings` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RdfTerm {
    #[serde(rename = "type")]
    pub kind: TermKind,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datatype: Option<String>,
    #[serde(default, rename = "xml:lang", skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
}

impl RdfTerm {
    pub fn iri(value: impl Into<String>) -> Self {
        Self {
            kind: TermKind::Uri,
            value: value.into(),
            datatype: None,
            lang: None,
        }
    }

    pub fn literal(value: impl Into<String>) -> Self {
        Self {
            kind: TermKind::Literal,
            value: value.into(),
            datatype: None,
            lang: None,
        }
    }

    pub fn is_iri(&self) -> bool {
        self.kind == TermKind::Uri
    }

    /// Rendering used in W3C CSV output: plain lexical value, `_:` for bnodes.
    fn csv_value(&self) -> String {
        match self.kind {
            TermKind::Bnode => format!("_:{}", self.value),
            _ => self.value.clone(),
        }
    }
}

impl fmt::Display for RdfTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.kind, &self.lang) {
            (TermKind::Uri, _) => write!(f, "<{}>", self.value),
            (TermKind::Bnode, _) => write!(f, "_:{}", self.value),
            (_, Some(lang)) => write!(f, "\"{}\"@{}", self.value, lang),
            _ => write!(f, "\"{}\"", self.value),
        }
    }
}

pub type Row = BTreeMap<String, RdfTerm>;

/// Tabular query results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SparqlResults {
    pub vars: Vec<String>,
    pub rows: Vec<Row>,
}

#[derive(Deserialize)]
struct WireResults {
    #[serde(default)]
    head: WireHead,
    results: Option<WireBindings>,
    boolean: Option<bool>,
}

#[derive(Default, Deserialize)]
struct WireHead {
    #[serde(default)]
    vars: Vec<String>,
}

#[derive(Deserialize)]
struct WireBindings {
    #[serde(default)]
    bindings: Vec<Row>,
}

impl SparqlResults {
    /// Parse an `application/sparql-results+json` document.
    pub fn from_json(body: &str) -> Result<Self, ResultsError> {
        let wire: WireResults = serde_json::from_str(body)?;
        if let Some(b) = wire.boolean {
            return Ok(Self::from_boolean(b));
        }
        let rows = wire.results.map(|r| r.bindings).unwrap_or_default();
        Ok(Self {
            vars: wire.head.vars,
            rows,
        })
    }

    pub fn from_boolean(value: bool) -> Self {
        let term = RdfTerm {
            kind: TermKind::Literal,
            value: value.to_string(),
            datatype: Some(XSD_BOOLEAN.to_string()),
            lang: None,
        };
        Self {
            vars: vec!["boolean".to_string()],
            rows: vec![Row::from([("boolean".to_string(), term)])],
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Values bound to `var`, skipping rows where it is unbound.
    pub fn column<'a>(&'a self, var: &'a str) -> impl Iterator<Item = &'a RdfTerm> + 'a {
        self.rows.iter().filter_map(move |r| r.get(var))
    }

    /// W3C SPARQL 1.1 CSV results: header row of variable names, CRLF line
    /// endings, unbound cells left empty.
    pub fn to_csv(&self) -> Result<String, ResultsError> {
        let mut wtr = csv::WriterBuilder::new()
            .terminator(csv::Terminator::CRLF)
            .from_writer(Vec::new());
        wtr.write_record(&self.vars)?;
        for row in &self.rows {
            let record: Vec<String> = self
                .vars
                .iter()
                .map(|v| row.get(v).map(RdfTerm::csv_value).unwrap_or_default())
                .collect();
            wtr.write_record(&record)?;
        }
        let bytes = wtr
            .into_inner()
            .map_err(|e| csv::Error::from(e.into_error()))?;
        Ok(String::from_utf8(bytes)?)
    }
}
