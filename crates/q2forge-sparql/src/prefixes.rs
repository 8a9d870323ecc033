//! Namespace prefix table.
//!
//! The table is configured once per knowledge graph and used in three places:
//! prepended to candidate queries before parsing (so bare qnames resolve),
//! prepended to metadata lookups, and used to compact full IRIs into qnames
//! when rendering prompt context.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefixDecl {
    pub prefix: String,
    pub namespace: String,
}

/// Ordered `prefix -> namespace` table. Declaration order is preserved so the
/// rendered header is stable across runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrefixTable {
    decls: Vec<PrefixDecl>,
}

fn declared_prefix_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\bPREFIX\s+([A-Za-z0-9_.\-]*):\s*<([^<>\s]*)>").ok()
    })
    .as_ref()
}

impl PrefixTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Common vocabularies most knowledge graphs rely on.
    pub fn with_defaults() -> Self {
        let mut t = Self::new();
        t.insert("rdf", "http://www.w3.org/1999/02/22-rdf-syntax-ns#");
        t.insert("rdfs", "http://www.w3.org/2000/01/rdf-schema#");
        t.insert("owl", "http://www.w3.org/2002/07/owl#");
        t.insert("xsd", "http://www.w3.org/2001/XMLSchema#");
        t.insert("skos", "http://www.w3.org/2004/02/skos/core#");
        t
    }

    /// Insert or replace a declaration. Replacing keeps the original position.
    pub fn insert(&mut self, prefix: impl Into<String>, namespace: impl Into<String>) {
        let prefix = prefix.into();
        let namespace = namespace.into();
        if let Some(existing) = self.decls.iter_mut().find(|d| d.prefix == prefix) {
            existing.namespace = namespace;
        } else {
            self.decls.push(PrefixDecl { prefix, namespace });
        }
    }

    pub fn namespace(&self, prefix: &str) -> Option<&str> {
        self.decls
            .iter()
            .find(|d| d.prefix == prefix)
            .map(|d| d.namespace.as_str())
    }

    pub fn len(&self) -> usize {
        self.decls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PrefixDecl> {
        self.decls.iter()
    }

    /// `PREFIX p: <ns>` lines for every declaration, followed by a blank line.
    pub fn sparql_header(&self) -> String {
        self.header_excluding(&BTreeSet::new())
    }

    fn header_excluding(&self, skip: &BTreeSet<String>) -> String {
        let mut out = String::new();
        for d in &self.decls {
            if skip.contains(&d.prefix) {
                continue;
            }
            out.push_str(&format!("PREFIX {}: <{}>\n", d.prefix, d.namespace));
        }
        if !out.is_empty() {
            out.push('\n');
        }
        out
    }

    /// `PREFIX p: <ns>` declarations written in `query`, in order. A prefix
    /// declared twice keeps its last namespace.
    pub fn declared_in(query: &str) -> Self {
        let mut t = Self::new();
        if let Some(re) = declared_prefix_regex() {
            for caps in re.captures_iter(query) {
                if let (Some(p), Some(ns)) = (caps.get(1), caps.get(2)) {
                    t.insert(p.as_str(), ns.as_str());
                }
            }
        }
        t
    }

    /// This table with the query's own declarations laid over it, which is
    /// how the parser resolves the query's qnames after [`prepend_to`].
    ///
    /// [`prepend_to`]: Self::prepend_to
    pub fn overlaid_with(&self, query: &str) -> Self {
        let mut t = self.clone();
        for d in Self::declared_in(query).decls {
            t.insert(d.prefix, d.namespace);
        }
        t
    }

    /// Prepend the table to `query`, skipping prefixes the query already
    /// declares itself. The query's own declaration wins.
    pub fn prepend_to(&self, query: &str) -> String {
        let declared: BTreeSet<String> = Self::declared_in(query)
            .decls
            .into_iter()
            .map(|d| d.prefix)
            .collect();
        let mut out = self.header_excluding(&declared);
        out.push_str(query);
        out
    }

    /// Replace every known namespace occurring in `text` with its prefix.
    ///
    /// Both `<ns#local>` and bare `ns#local` spellings are rewritten.
    pub fn compact(&self, text: &str) -> String {
        let mut out = text.to_string();
        // Longest namespace first so nested namespaces compact to the most
        // specific prefix.
        let mut decls: Vec<&PrefixDecl> = self.decls.iter().collect();
        decls.sort_by(|a, b| b.namespace.len().cmp(&a.namespace.len()));
        for d in decls {
            if d.namespace.is_empty() {
                continue;
            }
            out = compact_bracketed(&out, &d.namespace, &d.prefix);
            out = compact_bare(&out, &d.namespace, &d.prefix);
        }
        out
    }

    /// Expand a qname (`p:local`) into a full IRI. Returns `None` for unknown
    /// prefixes and for inputs that are not qnames.
    pub fn expand(&self, qname: &str) -> Option<String> {
        let (prefix, local) = qname.split_once(':')?;
        if local.starts_with("//") {
            return None;
        }
        self.namespace(prefix).map(|ns| format!("{ns}{local}"))
    }
}

fn compact_bracketed(text: &str, namespace: &str, prefix: &str) -> String {
    let needle = format!("<{namespace}");
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find(&needle) {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + needle.len()..];
        match after.find('>') {
            Some(end) if is_local_name(&after[..end]) => {
                out.push_str(prefix);
                out.push(':');
                out.push_str(&after[..end]);
                rest = &after[end + 1..];
            }
            _ => {
                out.push_str(&needle);
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Rewrite bare occurrences only; anything still inside `<...>` after
/// [`compact_bracketed`] is an IRI that has no qname form.
fn compact_bare(text: &str, namespace: &str, prefix: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find(namespace) {
        let bracketed = rest[..pos].ends_with('<');
        out.push_str(&rest[..pos]);
        if bracketed {
            out.push_str(namespace);
        } else {
            out.push_str(prefix);
            out.push(':');
        }
        rest = &rest[pos + namespace.len()..];
    }
    out.push_str(rest);
    out
}

fn is_local_name(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
}

impl FromIterator<(String, String)> for PrefixTable {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut t = PrefixTable::new();
        for (p, ns) in iter {
            t.insert(p, ns);
        }
        t
    }
}
