//! Identifiers referenced by a candidate query.
//!
//! Extraction is textual and deliberately scoped to the query's graph pattern
//! (the `WHERE { ... }` block) so that projected variables, solution
//! modifiers and prefix declarations do not contribute noise. String literals
//! are blanked before tokenizing so that `"10:30"` is not read as a qname.

use crate::prefixes::PrefixTable;
use regex::Regex;
use std::collections::HashSet;
use std::fmt;
use std::sync::OnceLock;

/// A schema identifier as written in the query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identifier {
    /// `prefix:local`
    Qname(String),
    /// `<http://...>`, brackets included.
    Iri(String),
}

impl Identifier {
    pub fn as_str(&self) -> &str {
        match self {
            Identifier::Qname(s) | Identifier::Iri(s) => s,
        }
    }

    /// Full IRI (no angle brackets). Qnames with an unknown prefix have none.
    pub fn full_iri(&self, prefixes: &PrefixTable) -> Option<String> {
        match self {
            Identifier::Iri(s) => Some(s.trim_start_matches('<').trim_end_matches('>').to_string()),
            Identifier::Qname(q) => prefixes.expand(q),
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn identifier_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    // IRI alternative first so `<http://x/a:b>` is consumed whole.
    // Local names may contain `-` and `.` but never end with `.`.
    RE.get_or_init(|| {
        Regex::new(
            r"<[^<>\s]+>|\b[A-Za-z0-9_][A-Za-z0-9_\-]*:[A-Za-z0-9_](?:[A-Za-z0-9_.\-]*[A-Za-z0-9_\-])?",
        )
        .ok()
    })
    .as_ref()
}

fn string_literal_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""(?:[^"\\\n]|\\.)*"|'(?:[^'\\\n]|\\.)*'"#).ok())
        .as_ref()
}

/// Body of the query's `WHERE { ... }` block, braces excluded.
///
/// The keyword is optional in SPARQL (`ASK { ... }`, `SELECT * { ... }`), so
/// when no `WHERE {` is present the first top-level `{ ... }` block is used.
/// Returns `None` when no balanced block exists.
pub fn extract_where_clause(query: &str) -> Option<&str> {
    let upper = query.to_ascii_uppercase();
    let mut search_from = 0;
    while let Some(rel) = upper[search_from..].find("WHERE") {
        let kw = search_from + rel;
        let after = kw + "WHERE".len();
        let preceded_ok = kw == 0
            || !query[..kw]
                .chars()
                .next_back()
                .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_' || c == '?' || c == '$');
        let rest = &query[after..];
        let trimmed = rest.trim_start();
        if preceded_ok && trimmed.starts_with('{') {
            let open = after + (rest.len() - trimmed.len());
            if let Some(body) = balanced_block(query, open) {
                return Some(body);
            }
        }
        search_from = after;
    }
    let open = query.find('{')?;
    balanced_block(query, open)
}

/// Content between the `{` at byte `open` and its matching `}`.
fn balanced_block(text: &str, open: usize) -> Option<&str> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in text[open..].char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&text[open + 1..open + i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Qnames and IRIs referenced in the query's graph pattern, deduplicated in
/// first-seen order. Blank node labels (`_:b0`) are not identifiers.
pub fn extract_identifiers(query: &str) -> Vec<Identifier> {
    let Some(clause) = extract_where_clause(query) else {
        return Vec::new();
    };
    let (Some(ident_re), Some(literal_re)) = (identifier_regex(), string_literal_regex()) else {
        return Vec::new();
    };
    let blanked = literal_re.replace_all(clause, |caps: &regex::Captures<'_>| {
        " ".repeat(caps[0].len())
    });

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for m in ident_re.find_iter(&blanked) {
        let text = m.as_str();
        let id = if text.starts_with('<') {
            Identifier::Iri(text.to_string())
        } else if text.starts_with("_:") {
            continue;
        } else {
            Identifier::Qname(text.to_string())
        };
        if seen.insert(id.clone()) {
            out.push(id);
        }
    }
    out
}
