//! Resolved parameters → transport-ready request
//!
//! Substitutes path placeholders, collects the query string, encodes the
//! body as JSON or multipart form fields, and assembles the header list.

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::resolver::{FileAttachment, ParamValue, ResolvedParams};
use crate::spec::{HttpMethod, Operation, ParamLocation};

pub const CONTENT_TYPE: &str = "Content-Type";
pub const JSON_CONTENT_TYPE: &str = "application/json";
pub const MULTIPART_CONTENT_TYPE: &str = "multipart/form-data";

/// Encoded request payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum RequestBody {
    Empty,
    /// JSON text of the body parameter.
    Json(String),
    /// Non-file `formData` fields; attachments travel in `PreparedRequest::files`.
    Form(Vec<(String, String)>),
}

/// A `formData` parameter sent as a file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilePart {
    pub field: String,
    #[serde(flatten)]
    pub file: FileAttachment,
}

/// Everything the transport needs to issue one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreparedRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
    pub files: Vec<FilePart>,
}

impl PreparedRequest {
    /// First header named `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_multipart(&self) -> bool {
        matches!(self.body, RequestBody::Form(_))
    }
}

/// Build the request for `op` from its resolved parameter values.
///
/// `extra_headers` go last so a caller-supplied `Content-Type` is never
/// shadowed by the default one. Multipart requests are the exception: the
/// transport always sends its own boundary-carrying content type.
pub fn build_request(
    base_url: &str,
    op: &Operation,
    values: &ResolvedParams,
    extra_headers: &[(String, String)],
) -> PreparedRequest {
    let mut path = op.path.clone();
    let mut query: Vec<(String, String)> = Vec::new();
    let mut headers = vec![(CONTENT_TYPE.to_string(), JSON_CONTENT_TYPE.to_string())];
    let mut body_value: Option<&Value> = None;
    let mut form: Option<Vec<(String, String)>> = None;
    let mut files = Vec::new();

    for (name, param) in &op.parameters {
        let value = values.get(name);
        let json = value.and_then(ParamValue::as_json);

        match param.location {
            ParamLocation::Path => {
                let text = json.map(stringify).unwrap_or_default();
                path = path.replace(&format!("{{{name}}}"), &urlencoding::encode(&text));
            }
            ParamLocation::Query => {
                if let Some(v) = json.filter(|v| !v.is_null()) {
                    query.push((name.clone(), query_value(v)));
                }
            }
            ParamLocation::Body => body_value = json,
            ParamLocation::FormData => {
                let fields = form.get_or_insert_with(Vec::new);
                match value {
                    Some(ParamValue::File(file)) => files.push(FilePart {
                        field: name.clone(),
                        file: file.clone(),
                    }),
                    Some(ParamValue::Json(v)) => fields.push((name.clone(), stringify(v))),
                    None => {}
                }
                // The first header is always the content type.
                headers[0].1 = MULTIPART_CONTENT_TYPE.to_string();
            }
            ParamLocation::Header => {
                let header_value = json
                    .filter(|v| !v.is_null())
                    .or(param.default.as_ref())
                    .map(stringify)
                    .unwrap_or_default();
                headers.push((name.clone(), header_value));
            }
        }
    }

    let mut url = format!("{}{}", base_url.trim_end_matches('/'), path);
    if !query.is_empty() {
        let encoded: Vec<String> = query
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect();
        url.push('?');
        url.push_str(&encoded.join("&"));
    }

    let body = match form {
        Some(fields) => RequestBody::Form(fields),
        None => encode_json_body(op, body_value),
    };

    headers.extend(extra_headers.iter().cloned());

    PreparedRequest {
        method: op.method,
        url,
        headers,
        body,
        files,
    }
}

fn encode_json_body(op: &Operation, value: Option<&Value>) -> RequestBody {
    let Some(value) = value.filter(|v| !v.is_null()) else {
        return RequestBody::Empty;
    };
    match serde_json::to_string(value) {
        Ok(text) => RequestBody::Json(text),
        Err(err) => {
            warn!(method = %op.method, path = %op.path, "cannot encode body: {err}");
            RequestBody::Empty
        }
    }
}

/// Text form of a value as it appears in a URL, header or form field.
fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn query_value(value: &Value) -> String {
    match value {
        Value::Array(items) => items.iter().map(stringify).collect::<Vec<_>>().join(","),
        other => stringify(other),
    }
}
