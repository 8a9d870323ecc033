//! SPARQL protocol client.
//!
//! Queries are sent as `POST` with an `application/sparql-query` body and
//! results are requested as `application/sparql-results+json`. Every request
//! carries the timeout the endpoint was built with.

use crate::results::{ResultsError, SparqlResults};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

const SPARQL_QUERY_CONTENT_TYPE: &str = "application/sparql-query";
const SPARQL_RESULTS_JSON: &str = "application/sparql-results+json";

/// Longest response body kept in an [`EndpointError::Status`].
const MAX_ERROR_BODY_CHARS: usize = 500;

#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    #[error("request to {endpoint} timed out after {secs}s")]
    Timeout { endpoint: String, secs: u64 },

    #[error("endpoint {endpoint} returned HTTP {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("request to {endpoint} failed: {message}")]
    Transport { endpoint: String, message: String },

    #[error("endpoint {endpoint} returned unreadable results: {source}")]
    Results {
        endpoint: String,
        #[source]
        source: ResultsError,
    },

    #[error("invalid endpoint configuration: {0}")]
    Config(String),
}

/// Anything that can evaluate a SPARQL query and return tabular results.
#[async_trait]
pub trait SparqlService: Send + Sync {
    /// Endpoint identifier used in logs and errors.
    fn endpoint(&self) -> &str;

    async fn select(&self, query: &str) -> Result<SparqlResults, EndpointError>;
}

/// SPARQL 1.1 protocol endpoint reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpSparqlEndpoint {
    url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpSparqlEndpoint {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, EndpointError> {
        let url = url.into();
        if url.trim().is_empty() {
            return Err(EndpointError::Config("endpoint URL is empty".to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EndpointError::Config(e.to_string()))?;
        Ok(Self {
            url,
            timeout,
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn transport_error(&self, err: reqwest::Error) -> EndpointError {
        if err.is_timeout() {
            EndpointError::Timeout {
                endpoint: self.url.clone(),
                secs: self.timeout.as_secs(),
            }
        } else {
            EndpointError::Transport {
                endpoint: self.url.clone(),
                message: err.to_string(),
            }
        }
    }
}

#[async_trait]
impl SparqlService for HttpSparqlEndpoint {
    fn endpoint(&self) -> &str {
        &self.url
    }

    async fn select(&self, query: &str) -> Result<SparqlResults, EndpointError> {
        debug!(endpoint = %self.url, "sending SPARQL query");
        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, SPARQL_QUERY_CONTENT_TYPE)
            .header(reqwest::header::ACCEPT, SPARQL_RESULTS_JSON)
            .body(query.to_string())
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.transport_error(e))?;
        if !status.is_success() {
            return Err(EndpointError::Status {
                endpoint: self.url.clone(),
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        SparqlResults::from_json(&body).map_err(|source| EndpointError::Results {
            endpoint: self.url.clone(),
            source,
        })
    }
}
