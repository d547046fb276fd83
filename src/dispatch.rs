//! PreparedRequest → HTTP exchange
//!
//! The scheduler reaches the network only through `Transport`, so a run can
//! be driven by any implementation; `HttpTransport` is the blocking
//! `reqwest` one.

use std::borrow::Cow;
use std::time::Duration;

use reqwest::blocking::{multipart, Client};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use serde_json::Value;
use tracing::debug;

use crate::builder::{PreparedRequest, RequestBody, MULTIPART_CONTENT_TYPE};
use crate::error::TransportError;
use crate::spec::HttpMethod;

/// Status code and raw payload of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Body as JSON; non-JSON text becomes a string value, no body `null`.
    pub fn json(&self) -> Value {
        let text = self.text();
        if text.trim().is_empty() {
            return Value::Null;
        }
        serde_json::from_str(&text).unwrap_or_else(|_| Value::String(text.into_owned()))
    }
}

/// Sends one request and waits for the full response.
pub trait Transport {
    fn send(&self, request: &PreparedRequest) -> Result<RawResponse, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn send(&self, request: &PreparedRequest) -> Result<RawResponse, TransportError> {
        (**self).send(request)
    }
}

/// Blocking `reqwest` transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Transport whose requests give up after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(TransportError::Client)?;
        Ok(Self::new(client))
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: &PreparedRequest) -> Result<RawResponse, TransportError> {
        let mut req = self
            .client
            .request(to_reqwest_method(request.method), &request.url)
            .headers(collect_headers(request)?);

        match &request.body {
            RequestBody::Empty => {}
            RequestBody::Json(text) => req = req.body(text.clone()),
            RequestBody::Form(fields) => {
                let mut form = multipart::Form::new();
                for (name, value) in fields {
                    form = form.text(name.clone(), value.clone());
                }
                for part in &request.files {
                    form = form.part(
                        part.field.clone(),
                        multipart::Part::bytes(part.file.contents.clone())
                            .file_name(part.file.filename.clone()),
                    );
                }
                req = req.multipart(form);
            }
        }

        let resp = req.send().map_err(TransportError::RequestFailed)?;
        let status = resp.status().as_u16();
        let body = resp.bytes().map_err(TransportError::ResponseRead)?;
        Ok(RawResponse::new(status, body.to_vec()))
    }
}

/// Later entries replace earlier ones with the same name.
///
/// Multipart bodies drop every `Content-Type`, caller-supplied ones included:
/// reqwest writes its own, carrying the boundary.
fn collect_headers(request: &PreparedRequest) -> Result<HeaderMap, TransportError> {
    let mut headers = HeaderMap::new();
    for (name, value) in &request.headers {
        if request.is_multipart() && name.eq_ignore_ascii_case(CONTENT_TYPE.as_str()) {
            if value != MULTIPART_CONTENT_TYPE {
                debug!(header = %value, "ignoring content type on multipart request");
            }
            continue;
        }
        let invalid = || TransportError::InvalidHeader { name: name.clone() };
        let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
        let header_value = HeaderValue::from_str(value).map_err(|_| invalid())?;
        headers.insert(header_name, header_value);
    }
    Ok(headers)
}

fn to_reqwest_method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Post => Method::POST,
        HttpMethod::Delete => Method::DELETE,
        HttpMethod::Options => Method::OPTIONS,
        HttpMethod::Head => Method::HEAD,
        HttpMethod::Patch => Method::PATCH,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{FilePart, JSON_CONTENT_TYPE};
    use crate::resolver::FileAttachment;
    use serde_json::json;

    fn request(method: HttpMethod, url: String, body: RequestBody) -> PreparedRequest {
        PreparedRequest {
            method,
            url,
            headers: vec![("Content-Type".into(), JSON_CONTENT_TYPE.into())],
            body,
            files: Vec::new(),
        }
    }

    #[test]
    fn send_posts_json_body() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/widgets")
            .match_header("content-type", "application/json")
            .match_body(mockito::Matcher::Json(json!({"name": "demo"})))
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":1,"name":"demo"}"#)
            .create();

        let req = request(
            HttpMethod::Post,
            format!("{}/widgets", server.url()),
            RequestBody::Json(r#"{"name":"demo"}"#.into()),
        );
        let resp = HttpTransport::new(Client::new()).send(&req).unwrap();

        assert_eq!(resp.status, 201);
        assert_eq!(resp.json()["name"], "demo");
        mock.assert();
    }

    #[test]
    fn send_returns_error_statuses_as_responses() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("GET", "/widgets/42")
            .with_status(404)
            .with_body("not found")
            .create();

        let req = request(
            HttpMethod::Get,
            format!("{}/widgets/42", server.url()),
            RequestBody::Empty,
        );
        let resp = HttpTransport::new(Client::new()).send(&req).unwrap();

        assert_eq!(resp.status, 404);
        assert_eq!(resp.json(), Value::String("not found".into()));
    }

    #[test]
    fn send_lets_later_headers_win() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("DELETE", "/widgets/1")
            .match_header("content-type", "text/plain")
            .match_header("x-api-key", "secret")
            .with_status(204)
            .create();

        let mut req = request(
            HttpMethod::Delete,
            format!("{}/widgets/1", server.url()),
            RequestBody::Empty,
        );
        req.headers.push(("X-Api-Key".into(), "secret".into()));
        req.headers.push(("Content-Type".into(), "text/plain".into()));

        let resp = HttpTransport::new(Client::new()).send(&req).unwrap();
        assert_eq!(resp.status, 204);
        assert_eq!(resp.json(), Value::Null);
        mock.assert();
    }

    #[test]
    fn send_uploads_multipart_form() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/pets/1/uploadImage")
            .match_header(
                "content-type",
                mockito::Matcher::Regex("^multipart/form-data; boundary=".into()),
            )
            .match_body(mockito::Matcher::AllOf(vec![
                mockito::Matcher::Regex(r#"name="additionalMetadata""#.into()),
                mockito::Matcher::Regex(r#"filename="file.txt""#.into()),
            ]))
            .with_status(200)
            .create();

        let mut req = request(
            HttpMethod::Post,
            format!("{}/pets/1/uploadImage", server.url()),
            RequestBody::Form(vec![("additionalMetadata".into(), "string".into())]),
        );
        req.headers[0].1 = MULTIPART_CONTENT_TYPE.into();
        req.files.push(FilePart {
            field: "file".into(),
            file: FileAttachment::new("file.txt", b"hello".to_vec()),
        });

        let resp = HttpTransport::new(Client::new()).send(&req).unwrap();
        assert_eq!(resp.status, 200);
        mock.assert();
    }

    #[test]
    fn multipart_drops_caller_content_type() {
        let mut req = request(
            HttpMethod::Post,
            "http://h/pets/1/uploadImage".into(),
            RequestBody::Form(vec![("additionalMetadata".into(), "string".into())]),
        );
        req.headers[0].1 = MULTIPART_CONTENT_TYPE.into();
        req.headers.push(("content-type".into(), "application/json".into()));
        req.headers.push(("X-Api-Key".into(), "secret".into()));

        let headers = collect_headers(&req).unwrap();
        assert_eq!(headers.get_all(CONTENT_TYPE).iter().count(), 0);
        assert_eq!(headers.get("x-api-key").and_then(|v| v.to_str().ok()), Some("secret"));
    }

    #[test]
    fn with_timeout_builds_client() {
        let transport = HttpTransport::with_timeout(Duration::from_secs(3)).unwrap();
        let req = request(HttpMethod::Get, "http://127.0.0.1:1/".into(), RequestBody::Empty);
        assert!(matches!(
            transport.send(&req).unwrap_err(),
            TransportError::RequestFailed(_)
        ));
    }

    #[test]
    fn send_rejects_invalid_header_name() {
        let mut req = request(HttpMethod::Get, "http://127.0.0.1:1/".into(), RequestBody::Empty);
        req.headers.push(("bad header".into(), "v".into()));

        let err = HttpTransport::new(Client::new()).send(&req).unwrap_err();
        assert!(matches!(err, TransportError::InvalidHeader { ref name } if name == "bad header"));
    }

    #[test]
    fn send_reports_connection_failure() {
        let req = request(HttpMethod::Get, "http://127.0.0.1:1/".into(), RequestBody::Empty);
        let err = HttpTransport::new(Client::new()).send(&req).unwrap_err();
        assert!(matches!(err, TransportError::RequestFailed(_)));
    }

    #[test]
    fn raw_response_json_handles_text_and_empty() {
        assert_eq!(RawResponse::new(200, "").json(), Value::Null);
        assert_eq!(RawResponse::new(200, "  \n").json(), Value::Null);
        assert_eq!(RawResponse::new(200, "[1,2]").json(), json!([1, 2]));
        assert_eq!(RawResponse::new(500, "oops").json(), json!("oops"));
    }
}
