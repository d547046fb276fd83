//! Reading a Swagger document from disk or over HTTP.

use std::fs;

use reqwest::blocking::Client;
use serde_json::Value;
use tracing::debug;

use crate::error::SpecError;
use crate::spec::Specification;

/// `true` for `http://` and `https://` locations.
pub fn is_remote(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

/// Fetch or read `location` and parse it as JSON.
pub fn load_document(client: &Client, location: &str) -> Result<Value, SpecError> {
    let text = if is_remote(location) {
        debug!(location, "fetching specification");
        client
            .get(location)
            .send()
            .and_then(|resp| resp.error_for_status())
            .and_then(|resp| resp.text())
            .map_err(|source| SpecError::Fetch {
                location: location.to_string(),
                source,
            })?
    } else {
        debug!(location, "reading specification");
        fs::read_to_string(location).map_err(|source| SpecError::Read {
            location: location.to_string(),
            source,
        })?
    };
    serde_json::from_str(&text).map_err(SpecError::InvalidJson)
}

/// Load and parse a Swagger 2.0 specification.
pub fn load_specification(client: &Client, location: &str) -> Result<Specification, SpecError> {
    Specification::from_swagger(&load_document(client, location)?)
}
