//! Error types for the swagger-conform crate.

use thiserror::Error;

use crate::scheduler::ExecutionOutcome;
use crate::spec::HttpMethod;

/// The loaded specification cannot drive a run.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SpecError {
    #[error("specification is missing required field `{field}`")]
    MissingField { field: &'static str },

    #[error("{method} {path}: placeholder `{{{name}}}` has no required path parameter")]
    UnboundPlaceholder {
        method: HttpMethod,
        path: String,
        name: String,
    },

    #[error("{method} {path}: more than one body parameter")]
    DuplicateBody { method: HttpMethod, path: String },

    #[error("{method} {path}: `parameters` must be an array")]
    InvalidParameters { method: HttpMethod, path: String },

    #[error("unresolved reference `{reference}`")]
    UnresolvedReference { reference: String },

    #[error("failed to read specification from {location}")]
    Read {
        location: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to fetch specification from {location}")]
    Fetch {
        location: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("invalid JSON in specification")]
    InvalidJson(#[source] serde_json::Error),
}

/// A method name outside the seven a Swagger path item can declare.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown HTTP method `{0}`")]
pub struct UnknownMethod(pub String);

/// A request could not be sent or its response could not be read.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
    #[error("HTTP request failed")]
    RequestFailed(#[source] reqwest::Error),

    #[error("failed to read response body")]
    ResponseRead(#[source] reqwest::Error),

    #[error("invalid header `{name}`")]
    InvalidHeader { name: String },

    #[error("failed to build HTTP client")]
    Client(#[source] reqwest::Error),
}

/// Conditions that stop a conformance run.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RunError {
    #[error("specification is malformed")]
    SpecMalformed(#[from] SpecError),

    #[error("{method} {path} still returned 404 after being postponed")]
    RetryExhausted {
        method: HttpMethod,
        path: String,
        outcome: Box<ExecutionOutcome>,
    },
}
