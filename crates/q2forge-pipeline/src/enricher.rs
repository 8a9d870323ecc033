//! Identifier context enricher.
//!
//! For every identifier a candidate references, one lookup query asks the
//! metadata endpoint for the configured descriptive properties, each inside
//! its own `OPTIONAL` so a missing property never hides the others. Lookups
//! run concurrently, each under its own timeout. A failed or empty lookup
//! leaves that identifier with empty context and a warning; the stage itself
//! only fails when the run is cancelled or out of time.
//!
//! One enricher serves one run. Its cache remembers every lookup outcome,
//! failures included, so later attempts of the same run never re-query an
//! identifier.

use crate::cancel::{Interrupt, RunGuard};
use q2forge_sparql::{extract_identifiers, Identifier, PrefixTable, SparqlService};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
enum LookupOutcome {
    Found(String),
    Failed(String),
}

impl LookupOutcome {
    fn context(&self) -> &str {
        match self {
            LookupOutcome::Found(text) => text,
            LookupOutcome::Failed(_) => "",
        }
    }
}

/// Identifiers referenced by a candidate and their descriptive context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Enrichment {
    /// First-seen order.
    pub identifiers: Vec<String>,
    pub context: BTreeMap<String, String>,
}

impl Enrichment {
    /// `identifier:\n<context>` blocks in identifier order, for the grader.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for id in &self.identifiers {
            let ctx = self.context.get(id).map(String::as_str).unwrap_or("");
            if ctx.is_empty() {
                out.push_str(&format!("{id}: (no metadata found)\n"));
            } else {
                out.push_str(&format!("{id}:\n{ctx}\n"));
            }
        }
        out
    }
}

pub struct IdentifierEnricher {
    service: Arc<dyn SparqlService>,
    prefixes: PrefixTable,
    properties: Vec<String>,
    lookup_timeout: Duration,
    cache: Mutex<HashMap<String, LookupOutcome>>,
}

impl IdentifierEnricher {
    pub fn new(
        service: Arc<dyn SparqlService>,
        prefixes: PrefixTable,
        properties: Vec<String>,
        lookup_timeout: Duration,
    ) -> Self {
        Self {
            service,
            prefixes,
            properties,
            lookup_timeout,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Number of identifiers with a cached outcome.
    pub fn cached(&self) -> usize {
        self.lock_cache().len()
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, HashMap<String, LookupOutcome>> {
        match self.cache.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Look up every identifier `query` references. Qnames resolve through
    /// the configured table with the query's own `PREFIX` declarations laid
    /// over it, the same resolution the grammar check applies.
    pub async fn enrich(&self, query: &str, guard: &RunGuard) -> Result<Enrichment, Interrupt> {
        let identifiers = extract_identifiers(query);
        info!(count = identifiers.len(), "extracted identifiers from candidate");
        let resolver = self.prefixes.overlaid_with(query);

        let keyed: Vec<(Identifier, String)> = identifiers
            .into_iter()
            .map(|id| {
                let key = cache_key(&id, &resolver);
                (id, key)
            })
            .collect();

        let pending: Vec<Lookup> = {
            let cache = self.lock_cache();
            let mut queued = HashSet::new();
            keyed
                .iter()
                .filter(|(_, key)| !cache.contains_key(key) && queued.insert(key.clone()))
                .map(|(id, key)| Lookup {
                    label: id.as_str().to_string(),
                    key: key.clone(),
                    iri: id.full_iri(&resolver),
                })
                .collect()
        };

        let fetched = guard.run(self.fetch_all(pending)).await?;
        {
            let mut cache = self.lock_cache();
            for (key, outcome) in fetched {
                cache.insert(key, outcome);
            }
        }

        let cache = self.lock_cache();
        let mut enrichment = Enrichment::default();
        for (id, key) in keyed {
            let label = id.as_str().to_string();
            let ctx = cache.get(&key).map(|o| o.context().to_string()).unwrap_or_default();
            debug!(identifier = %label, iri = %key, context = %ctx, "identifier context");
            enrichment.context.insert(label.clone(), ctx);
            enrichment.identifiers.push(label);
        }
        Ok(enrichment)
    }

    async fn fetch_all(&self, pending: Vec<Lookup>) -> Vec<(String, LookupOutcome)> {
        let mut out = Vec::with_capacity(pending.len());
        let mut tasks = JoinSet::new();
        for Lookup { label, key, iri } in pending {
            let Some(iri) = iri else {
                warn!(identifier = %label, "identifier has an unknown prefix; skipping lookup");
                out.push((key, LookupOutcome::Failed("unknown prefix".to_string())));
                continue;
            };
            let Some(query) = lookup_query(&iri, &self.prefixes, &self.properties) else {
                out.push((key, LookupOutcome::Found(String::new())));
                continue;
            };
            let service = Arc::clone(&self.service);
            let properties = self.properties.clone();
            let timeout = self.lookup_timeout;
            tasks.spawn(async move {
                let outcome = match tokio::time::timeout(timeout, service.select(&query)).await {
                    Ok(Ok(results)) => {
                        let text = format_lookup(&properties, &results);
                        if text.is_empty() {
                            warn!(identifier = %label, endpoint = %service.endpoint(), "no metadata found for identifier");
                        }
                        LookupOutcome::Found(text)
                    }
                    Ok(Err(err)) => {
                        warn!(identifier = %label, endpoint = %service.endpoint(), error = %err, "identifier lookup failed");
                        LookupOutcome::Failed(err.to_string())
                    }
                    Err(_) => {
                        warn!(identifier = %label, endpoint = %service.endpoint(), timeout_secs = timeout.as_secs(), "identifier lookup timed out");
                        LookupOutcome::Failed("timed out".to_string())
                    }
                };
                (key, outcome)
            });
        }
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(pair) => out.push(pair),
                Err(err) => warn!(error = %err, "identifier lookup task failed"),
            }
        }
        out
    }
}

/// One identifier awaiting lookup.
struct Lookup {
    /// As written in the query, for logs.
    label: String,
    key: String,
    iri: Option<String>,
}

/// `<iri>` once resolved; qnames whose prefix is unknown keep their text.
fn cache_key(id: &Identifier, prefixes: &PrefixTable) -> String {
    match id.full_iri(prefixes) {
        Some(iri) => format!("<{iri}>"),
        None => id.as_str().to_string(),
    }
}

/// `<iri>` for bare IRIs, unchanged for qnames and bracketed IRIs.
fn property_term(property: &str) -> String {
    let p = property.trim();
    if !p.starts_with('<') && p.contains("://") {
        format!("<{p}>")
    } else {
        p.to_string()
    }
}

/// One `SELECT ?p0 ?p1 ...` query about `iri` with an `OPTIONAL` per
/// property, or `None` when there is nothing to fetch. `prefixes` supplies the
/// header the configured properties are written against.
pub fn lookup_query(iri: &str, prefixes: &PrefixTable, properties: &[String]) -> Option<String> {
    if properties.is_empty() {
        return None;
    }
    let vars: Vec<String> = (0..properties.len()).map(|i| format!("?p{i}")).collect();
    let mut q = prefixes.sparql_header();
    q.push_str(&format!("SELECT {} WHERE {{\n", vars.join(" ")));
    for (i, p) in properties.iter().enumerate() {
        q.push_str(&format!("  OPTIONAL {{ <{iri}> {} ?p{i} . }}\n", property_term(p)));
    }
    q.push('}');
    Some(q)
}

/// `property: value` lines, deduplicated in first-seen order.
fn format_lookup(properties: &[String], results: &q2forge_sparql::SparqlResults) -> String {
    let mut lines: Vec<String> = Vec::new();
    for row in &results.rows {
        for (i, p) in properties.iter().enumerate() {
            if let Some(term) = row.get(&format!("p{i}")) {
                let line = format!("{p}: {}", term.value);
                if !lines.contains(&line) {
                    lines.push(line);
                }
            }
        }
    }
    lines.join("\n")
}
