//! Check a live HTTP API against its Swagger 2.0 contract.
//!
//! Parses a Swagger JSON document into a `Specification`, synthesizes one
//! valid example request per operation, sends them in method order (creates
//! before reads, deletes last) and checks every response against the
//! declared status codes and response shapes.
//!
//! # Usage
//!
//! ```no_run
//! use swagger_conform::{run, HttpTransport, RunConfig, Specification, Summary};
//! use swagger_conform::reqwest::blocking::Client;
//!
//! let doc: serde_json::Value = serde_json::from_str(r#"{
//!     "schemes": ["http"], "host": "localhost:8080", "basePath": "/", "paths": {}
//! }"#).unwrap();
//! let spec = Specification::from_swagger(&doc).unwrap();
//! let config = RunConfig::new("http://localhost:8080");
//! let transport = HttpTransport::new(Client::new());
//!
//! let mut summary = Summary::default();
//! for outcome in run(&spec, &config, &transport).unwrap() {
//!     summary.record(&outcome.unwrap());
//! }
//! println!("{summary}");
//! ```

pub mod builder;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod load;
pub mod matcher;
pub mod report;
pub mod resolver;
pub mod scheduler;
pub mod spec;

pub use builder::{build_request, PreparedRequest, RequestBody};
pub use config::{MethodOrder, RunConfig};
pub use dispatch::{HttpTransport, RawResponse, Transport};
pub use error::{RunError, SpecError, TransportError};
pub use load::{load_document, load_specification};
pub use matcher::DefinitionMatcher;
pub use report::{format_outcome, to_json_line, Summary};
pub use resolver::{resolve_parameters, ParamValue, ResolvedParams};
pub use scheduler::{
    run, run_to_completion, Attempt, ExecutionOutcome, Failure, RunContext, Scheduler, Verdict,
};
pub use spec::{
    HttpMethod, Operation, ParamLocation, ParameterSpec, ResponseKey, ScalarType, Shape,
    Specification, TypeDefinition,
};

// Re-export dependencies for downstream crates
pub use reqwest;
