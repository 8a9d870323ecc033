//! SPARQL boundary for Q2Forge.
//!
//! This crate sits at the **interop boundary** between untrusted model output
//! and the graph store:
//!
//! - It locates candidate queries embedded in free-form model text.
//! - It checks candidates against the SPARQL 1.1 grammar (via `spargebra`).
//! - It extracts the identifiers (qnames / IRIs) a candidate references.
//! - It talks to SPARQL endpoints over HTTP and models their JSON results.
//! - It offers an in-memory [`ScriptedEndpoint`] for offline runs and tests.
//!
//! Nothing here decides *what to do* with a candidate; that is the job of the
//! pipeline crate.

pub mod endpoint;
pub mod fence;
pub mod identifiers;
pub mod mock;
pub mod prefixes;
pub mod results;
pub mod syntax;

pub use endpoint::{EndpointError, HttpSparqlEndpoint, SparqlService};
pub use fence::{find_fenced_blocks, FencedBlocks};
pub use identifiers::{extract_identifiers, extract_where_clause, Identifier};
pub use mock::ScriptedEndpoint;
pub use prefixes::{PrefixDecl, PrefixTable};
pub use results::{RdfTerm, ResultsError, Row, SparqlResults, TermKind};
pub use syntax::{check_syntax, QueryForm, SyntaxError};

/// Fence tag models use for SPARQL code blocks.
pub const SPARQL_FENCE_TAG: &str = "sparql";

/// Fence tag models use for JSON code blocks.
pub const JSON_FENCE_TAG: &str = "json";
