//! Request and response messages.
//!
//! The pipeline speaks plain `http` types with a fully buffered
//! `Full<Bytes>` body. [`RequestMessage`] is the buffered, shareable view of
//! the inbound request that every pipeline component resolves from the
//! request scope.

use std::fmt::{self, Write as _};

use bytes::Bytes;
use http::header::{HeaderName, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue, Method, StatusCode, Uri, Version};
use http_body_util::{BodyExt, Full};
use mime::Mime;
use parking_lot::Mutex;

/// The HTTP request type accepted by the pipeline.
pub type Request = http::Request<Full<Bytes>>;

/// The HTTP response type produced by the pipeline.
pub type Response = http::Response<Full<Bytes>>;

/// A custom reason phrase, carried as a response extension.
///
/// HTTP/1.1 hosts write it on the status line in place of the canonical
/// phrase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReasonPhrase(pub String);

/// Extension trait for building and annotating responses.
pub trait ResponseExt {
    /// Creates an empty response with the given status code.
    fn with_status(status: StatusCode) -> Response;

    /// Creates a `text/plain` response.
    fn text(status: StatusCode, body: impl Into<String>) -> Response;

    /// The custom reason phrase, if one was set.
    fn reason_phrase(&self) -> Option<&str>;

    /// Sets a custom reason phrase.
    fn set_reason_phrase(&mut self, phrase: impl Into<String>);

    /// The custom reason phrase, or the canonical one for the status.
    fn reason_phrase_or_canonical(&self) -> &str;
}

impl ResponseExt for Response {
    fn with_status(status: StatusCode) -> Response {
        let mut response = http::Response::new(Full::new(Bytes::new()));
        *response.status_mut() = status;
        response
    }

    fn text(status: StatusCode, body: impl Into<String>) -> Response {
        let mut response = http::Response::new(Full::new(Bytes::from(body.into())));
        *response.status_mut() = status;
        response.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        response
    }

    fn reason_phrase(&self) -> Option<&str> {
        self.extensions()
            .get::<ReasonPhrase>()
            .map(|phrase| phrase.0.as_str())
    }

    fn set_reason_phrase(&mut self, phrase: impl Into<String>) {
        self.extensions_mut().insert(ReasonPhrase(phrase.into()));
    }

    fn reason_phrase_or_canonical(&self) -> &str {
        self.reason_phrase()
            .or_else(|| self.status().canonical_reason())
            .unwrap_or("")
    }
}

/// The buffered inbound request.
///
/// Created once per request by the invoker and registered in the request
/// scope; readers, binders and behaviors share it through an `Arc`.
pub struct RequestMessage {
    parts: http::request::Parts,
    body: Bytes,
}

impl RequestMessage {
    /// Buffers the body of `request`.
    pub async fn from_request(request: Request) -> Self {
        let (parts, body) = request.into_parts();
        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(never) => match never {},
        };
        Self { parts, body }
    }

    /// Builds a message from already buffered parts.
    pub fn from_parts(parts: http::request::Parts, body: Bytes) -> Self {
        Self { parts, body }
    }

    /// The request method.
    pub fn method(&self) -> &Method {
        &self.parts.method
    }

    /// The request URI.
    pub fn uri(&self) -> &Uri {
        &self.parts.uri
    }

    /// The request path.
    pub fn path(&self) -> &str {
        self.parts.uri.path()
    }

    /// The raw querystring, without the leading `?`.
    pub fn query(&self) -> Option<&str> {
        self.parts.uri.query()
    }

    /// The HTTP version.
    pub fn version(&self) -> Version {
        self.parts.version
    }

    /// The request headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.parts.headers
    }

    /// A header value, if present and valid UTF-8.
    pub fn header(&self, name: impl AsRef<str>) -> Option<&str> {
        self.parts
            .headers
            .get(name.as_ref())
            .and_then(|value| value.to_str().ok())
    }

    /// The parsed `Content-Type`, if present and well formed.
    pub fn content_type(&self) -> Option<Mime> {
        self.header(CONTENT_TYPE.as_str())
            .and_then(|value| value.parse().ok())
    }

    /// The buffered body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Request extensions set by the host.
    pub fn extensions(&self) -> &http::Extensions {
        &self.parts.extensions
    }

    /// Renders the request in HTTP/1.1 wire format for diagnostics.
    ///
    /// Non UTF-8 bodies are summarized by their length.
    pub fn to_raw_string(&self) -> String {
        let mut raw = String::new();
        let _ = writeln!(
            raw,
            "{} {} {:?}",
            self.parts.method, self.parts.uri, self.parts.version
        );
        for (name, value) in &self.parts.headers {
            let _ = writeln!(
                raw,
                "{}: {}",
                name,
                value.to_str().unwrap_or("<binary>")
            );
        }
        raw.push('\n');
        match std::str::from_utf8(&self.body) {
            Ok(text) => raw.push_str(text),
            Err(_) => {
                let _ = write!(raw, "<{} bytes of binary content>", self.body.len());
            }
        }
        raw
    }
}

impl fmt::Debug for RequestMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestMessage")
            .field("method", &self.parts.method)
            .field("uri", &self.parts.uri)
            .field("body_len", &self.body.len())
            .finish()
    }
}

/// The pre-allocated response of a request.
///
/// Registered in the request scope. Behaviors that run before the terminal
/// behavior mutate it in place with [`with_response`](Self::with_response);
/// the terminal behavior takes it and builds on what they set. It can be
/// taken exactly once, later takers receive a fresh `200 OK` response.
#[derive(Debug)]
pub struct ResponseMessage {
    response: Mutex<Option<Response>>,
}

impl Default for ResponseMessage {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseMessage {
    /// Allocates an empty `200 OK` response.
    pub fn new() -> Self {
        Self {
            response: Mutex::new(Some(Response::with_status(StatusCode::OK))),
        }
    }

    /// Runs `f` on the pre-allocated response.
    ///
    /// After the response was taken, `f` sees a fresh `200 OK` response that
    /// the next [`take`](Self::take) returns.
    pub fn with_response<R>(&self, f: impl FnOnce(&mut Response) -> R) -> R {
        let mut response = self.response.lock();
        f(response.get_or_insert_with(|| Response::with_status(StatusCode::OK)))
    }

    /// Takes the pre-allocated response.
    pub fn take(&self) -> Response {
        self.response
            .lock()
            .take()
            .unwrap_or_else(|| Response::with_status(StatusCode::OK))
    }
}

/// Response headers accumulated by pipeline components.
///
/// The invoker appends the collected headers to whatever response the
/// chain produces, including error responses.
#[derive(Debug, Default)]
pub struct ResponseHeaderCollection {
    headers: Mutex<HeaderMap>,
}

impl ResponseHeaderCollection {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a header, keeping existing values with the same name.
    pub fn append(&self, name: HeaderName, value: HeaderValue) {
        self.headers.lock().append(name, value);
    }

    /// Sets a header, replacing existing values with the same name.
    pub fn insert(&self, name: HeaderName, value: HeaderValue) {
        self.headers.lock().insert(name, value);
    }

    /// Number of collected header values.
    pub fn len(&self) -> usize {
        self.headers.lock().len()
    }

    /// Returns `true` if nothing was collected.
    pub fn is_empty(&self) -> bool {
        self.headers.lock().is_empty()
    }

    /// A copy of the collected headers.
    pub fn snapshot(&self) -> HeaderMap {
        self.headers.lock().clone()
    }

    /// Appends every collected header to `response`.
    pub fn apply_to(&self, response: &mut Response) {
        let headers = std::mem::take(&mut *self.headers.lock());
        let mut current = None;
        for (name, value) in headers {
            if let Some(name) = name {
                current = Some(name);
            }
            if let Some(name) = &current {
                response.headers_mut().append(name.clone(), value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_test_request() -> Request {
        http::Request::builder()
            .method(Method::POST)
            .uri("/users/42?verbose=true")
            .header(CONTENT_TYPE, "application/json; charset=utf-8")
            .body(Full::new(Bytes::from(r#"{"name":"ada"}"#)))
            .unwrap()
    }

    #[tokio::test]
    async fn test_request_message_buffers_body() {
        let message = RequestMessage::from_request(make_test_request()).await;

        assert_eq!(message.method(), Method::POST);
        assert_eq!(message.path(), "/users/42");
        assert_eq!(message.query(), Some("verbose=true"));
        assert_eq!(message.body().as_ref(), br#"{"name":"ada"}"#);
        assert_eq!(
            message.content_type().map(|m| m.essence_str().to_string()),
            Some("application/json".to_string())
        );
    }

    #[test]
    fn test_request_message_raw_string() {
        let message = tokio_test::block_on(RequestMessage::from_request(make_test_request()));
        let raw = message.to_raw_string();

        assert!(raw.starts_with("POST /users/42?verbose=true HTTP/1.1\n"));
        assert!(raw.contains("content-type: application/json; charset=utf-8\n"));
        assert!(raw.ends_with("\n\n{\"name\":\"ada\"}"));
    }

    #[test]
    fn test_reason_phrase_extension() {
        let mut response = Response::with_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.reason_phrase(), None);
        assert_eq!(response.reason_phrase_or_canonical(), "Bad Request");

        response.set_reason_phrase("Invalid id");
        assert_eq!(response.reason_phrase(), Some("Invalid id"));
        assert_eq!(response.reason_phrase_or_canonical(), "Invalid id");
    }

    #[test]
    fn test_response_message_take_once() {
        let message = ResponseMessage::new();
        let mut first = message.take();
        *first.status_mut() = StatusCode::CREATED;

        let second = message.take();
        assert_eq!(second.status(), StatusCode::OK);
    }

    #[test]
    fn test_response_message_mutated_in_place() {
        let message = ResponseMessage::new();
        message.with_response(|response| {
            response
                .headers_mut()
                .insert("x-trace", HeaderValue::from_static("abc"));
            response.extensions_mut().insert(7_u32);
        });
        let status = message.with_response(|response| response.status());
        assert_eq!(status, StatusCode::OK);

        let response = message.take();
        assert_eq!(response.headers()["x-trace"], "abc");
        assert_eq!(response.extensions().get::<u32>(), Some(&7));

        message.with_response(|response| *response.status_mut() = StatusCode::ACCEPTED);
        assert_eq!(message.take().status(), StatusCode::ACCEPTED);
    }

    #[test]
    fn test_header_collection_apply() {
        let headers = ResponseHeaderCollection::new();
        let vary = HeaderName::from_static("vary");
        headers.append(vary.clone(), HeaderValue::from_static("accept"));
        headers.append(vary.clone(), HeaderValue::from_static("origin"));
        assert_eq!(headers.len(), 2);

        let mut response = Response::text(StatusCode::OK, "body");
        headers.apply_to(&mut response);

        let values: Vec<_> = response.headers().get_all(&vary).iter().collect();
        assert_eq!(values.len(), 2);
        assert!(headers.is_empty());
    }
}
