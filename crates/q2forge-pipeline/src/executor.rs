//! Query executor.
//!
//! Endpoint failures and per-call timeouts become [`ExecutionResult::Failed`];
//! only cancellation and the run deadline escape as interrupts.

use crate::cancel::{Interrupt, RunGuard};
use crate::state::{ExecutionError, ExecutionResult};
use q2forge_sparql::{PrefixTable, SparqlService};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub struct QueryExecutor {
    service: Arc<dyn SparqlService>,
    prefixes: PrefixTable,
    timeout: Duration,
}

impl QueryExecutor {
    pub fn new(service: Arc<dyn SparqlService>, prefixes: PrefixTable, timeout: Duration) -> Self {
        Self {
            service,
            prefixes,
            timeout,
        }
    }

    /// Submit `query` (configured prefixes prepended) to the graph store.
    pub async fn execute(&self, query: &str, guard: &RunGuard) -> Result<ExecutionResult, Interrupt> {
        let full = self.prefixes.prepend_to(query);
        let endpoint = self.service.endpoint().to_string();
        info!(endpoint = %endpoint, "executing accepted query");

        match guard.call(self.timeout, self.service.select(&full)).await {
            Ok(Ok(results)) => {
                info!(endpoint = %endpoint, rows = results.len(), "query executed");
                Ok(ExecutionResult::Rows(results))
            }
            Ok(Err(err)) => {
                warn!(endpoint = %endpoint, error = %err, "query execution failed");
                Ok(ExecutionResult::Failed(ExecutionError {
                    endpoint,
                    message: err.to_string(),
                }))
            }
            Err(Interrupt::Timeout(limit)) => {
                warn!(endpoint = %endpoint, secs = limit.as_secs(), "query execution timed out");
                Ok(ExecutionResult::Failed(ExecutionError {
                    endpoint,
                    message: format!("no response within {}s", limit.as_secs()),
                }))
            }
            Err(other) => Err(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelToken;
    use q2forge_sparql::{RdfTerm, ScriptedEndpoint, SparqlResults};

    fn guard() -> RunGuard {
        RunGuard::new(CancelToken::new(), Duration::from_secs(5))
    }

    fn prefixes() -> PrefixTable {
        let mut t = PrefixTable::new();
        t.insert("ex", "http://example.org/");
        t
    }

    #[tokio::test]
    async fn prefixes_are_prepended_and_rows_returned() {
        let mut results = SparqlResults::default();
        results.vars = vec!["s".into()];
        results.rows.push([("s".to_string(), RdfTerm::iri("http://example.org/a"))].into());
        let ep = Arc::new(ScriptedEndpoint::always(results.clone()));
        let exec = QueryExecutor::new(ep.clone(), prefixes(), Duration::from_secs(1));

        let out = exec.execute("SELECT ?s WHERE { ?s a ex:Thing }", &guard()).await.unwrap();
        assert_eq!(out, ExecutionResult::Rows(results));
        let sent = ep.queries();
        assert!(sent[0].starts_with("PREFIX ex: <http://example.org/>"));
    }

    #[tokio::test]
    async fn endpoint_error_is_a_value() {
        let ep = Arc::new(ScriptedEndpoint::unreachable().named("kg"));
        let exec = QueryExecutor::new(ep, prefixes(), Duration::from_secs(1));
        let out = exec.execute("ASK {}", &guard()).await.unwrap();
        assert!(matches!(out, ExecutionResult::Failed(ref e) if e.message.contains("connection refused")));
    }

    #[tokio::test]
    async fn slow_endpoint_times_out_as_failure() {
        let ep = Arc::new(
            ScriptedEndpoint::always(SparqlResults::from_boolean(true))
                .with_delay(Duration::from_secs(5)),
        );
        let exec = QueryExecutor::new(ep, prefixes(), Duration::from_millis(20));
        let out = exec.execute("ASK {}", &guard()).await.unwrap();
        assert!(matches!(out, ExecutionResult::Failed(_)));
    }
}
