//! In-memory endpoint for tests and offline runs.

use crate::endpoint::{EndpointError, SparqlService};
use crate::results::SparqlResults;
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

type Responder = dyn Fn(&str) -> Result<SparqlResults, EndpointError> + Send + Sync;

/// Answers every query with a caller-supplied function and records the
/// queries it receives.
pub struct ScriptedEndpoint {
    name: String,
    respond: Box<Responder>,
    queries: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl ScriptedEndpoint {
    pub fn new(
        respond: impl Fn(&str) -> Result<SparqlResults, EndpointError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: "scripted".to_string(),
            respond: Box::new(respond),
            queries: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Same results for every query.
    pub fn always(results: SparqlResults) -> Self {
        Self::new(move |_| Ok(results.clone()))
    }

    /// Every query fails as if the endpoint were unreachable.
    pub fn unreachable() -> Self {
        Self::new(|_| {
            Err(EndpointError::Transport {
                endpoint: "scripted".to_string(),
                message: "connection refused".to_string(),
            })
        })
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every query received, in arrival order.
    pub fn queries(&self) -> Vec<String> {
        self.lock_queries().clone()
    }

    pub fn calls(&self) -> usize {
        self.lock_queries().len()
    }

    fn lock_queries(&self) -> std::sync::MutexGuard<'_, Vec<String>> {
        match self.queries.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl SparqlService for ScriptedEndpoint {
    fn endpoint(&self) -> &str {
        &self.name
    }

    async fn select(&self, query: &str) -> Result<SparqlResults, EndpointError> {
        self.lock_queries().push(query.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.respond)(query)
    }
}
