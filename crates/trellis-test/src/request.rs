//! Test request building.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use http::{header, HeaderMap, HeaderName, HeaderValue, Method, Uri};
use http_body_util::Full;
use serde::Serialize;
use trellis_core::Request;

use crate::error::TestError;

/// Fluent builder for an in-memory request.
///
/// Invalid input is remembered and reported by [`build`](Self::build), so
/// the chain never panics halfway.
///
/// ```
/// use trellis_test::TestRequestBuilder;
/// use http::Method;
///
/// let request = TestRequestBuilder::new(Method::GET, "/users?page=2")
///     .accept("application/json")
///     .bearer_token("t0ken")
///     .build()
///     .unwrap();
///
/// assert_eq!(request.uri().query(), Some("page=2"));
/// assert_eq!(request.headers()["authorization"], "Bearer t0ken");
/// ```
#[derive(Debug)]
#[must_use]
pub struct TestRequestBuilder {
    method: Method,
    uri: String,
    headers: HeaderMap,
    body: Bytes,
    error: Option<TestError>,
}

impl TestRequestBuilder {
    /// Creates a builder for `method` on `uri`.
    pub fn new(method: Method, uri: impl AsRef<str>) -> Self {
        Self {
            method,
            uri: uri.as_ref().to_string(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            error: None,
        }
    }

    /// Appends a header; repeated names produce repeated headers.
    pub fn header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        let name = name.as_ref();
        match (
            HeaderName::try_from(name),
            HeaderValue::try_from(value.as_ref()),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            _ => self.fail(TestError::InvalidHeader(name.to_string())),
        }
        self
    }

    /// Sets `Content-Type`.
    pub fn content_type(self, content_type: impl AsRef<str>) -> Self {
        self.header(header::CONTENT_TYPE.as_str(), content_type)
    }

    /// Sets `Accept`.
    pub fn accept(self, accept: impl AsRef<str>) -> Self {
        self.header(header::ACCEPT.as_str(), accept)
    }

    /// Sets `Authorization: Bearer <token>`.
    pub fn bearer_token(self, token: impl AsRef<str>) -> Self {
        self.header(
            header::AUTHORIZATION.as_str(),
            format!("Bearer {}", token.as_ref()),
        )
    }

    /// Sets `Authorization: Basic <base64(username:password)>`.
    pub fn basic_auth(self, username: &str, password: &str) -> Self {
        let encoded = STANDARD.encode(format!("{username}:{password}"));
        self.header(header::AUTHORIZATION.as_str(), format!("Basic {encoded}"))
    }

    /// Sets a raw body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets a JSON body and `Content-Type: application/json`.
    pub fn json<T: Serialize>(mut self, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(bytes) => self.body = Bytes::from(bytes),
            Err(e) => self.fail(TestError::Json(e)),
        }
        self.content_type("application/json")
    }

    /// Sets a urlencoded form body.
    pub fn form<T: Serialize>(mut self, value: &T) -> Self {
        match serde_urlencoded::to_string(value) {
            Ok(encoded) => self.body = Bytes::from(encoded),
            Err(e) => self.fail(TestError::RequestBuild(format!("form encoding failed: {e}"))),
        }
        self.content_type("application/x-www-form-urlencoded")
    }

    /// Builds the request.
    ///
    /// # Errors
    ///
    /// Returns the first error recorded while building, or
    /// `TestError::RequestBuild` for an invalid URI.
    pub fn build(self) -> Result<Request, TestError> {
        if let Some(error) = self.error {
            return Err(error);
        }

        let uri: Uri = self
            .uri
            .parse()
            .map_err(|e| TestError::RequestBuild(format!("Invalid URI: {e}")))?;

        let mut request = http::Request::new(Full::new(self.body));
        *request.method_mut() = self.method;
        *request.uri_mut() = uri;
        *request.headers_mut() = self.headers;
        Ok(request)
    }

    pub(crate) fn default_header(self, name: &str, value: &str) -> Self {
        if self.headers.contains_key(name) {
            self
        } else {
            self.header(name, value)
        }
    }

    fn fail(&mut self, error: TestError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use serde_json::json;

    #[tokio::test]
    async fn test_json_body() {
        let request = TestRequestBuilder::new(Method::POST, "/users")
            .json(&json!({ "name": "Ada" }))
            .build()
            .unwrap();

        assert_eq!(request.headers()["content-type"], "application/json");
        let body = request.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, Bytes::from(r#"{"name":"Ada"}"#));
    }

    #[test]
    fn test_form_body() {
        let request = TestRequestBuilder::new(Method::POST, "/login")
            .form(&[("user", "ada"), ("remember", "true")])
            .build()
            .unwrap();

        assert_eq!(
            request.headers()["content-type"],
            "application/x-www-form-urlencoded"
        );
    }

    #[test]
    fn test_basic_auth() {
        let request = TestRequestBuilder::new(Method::GET, "/")
            .basic_auth("ada", "lovelace")
            .build()
            .unwrap();

        assert_eq!(request.headers()["authorization"], "Basic YWRhOmxvdmVsYWNl");
    }

    #[test]
    fn test_invalid_header_reported_on_build() {
        let result = TestRequestBuilder::new(Method::GET, "/")
            .header("bad header", "x")
            .accept("application/json")
            .build();

        assert!(matches!(result, Err(TestError::InvalidHeader(name)) if name == "bad header"));
    }

    #[test]
    fn test_invalid_uri() {
        let result = TestRequestBuilder::new(Method::GET, "http://[::1").build();
        assert!(matches!(result, Err(TestError::RequestBuild(_))));
    }

    #[test]
    fn test_default_header_does_not_override() {
        let request = TestRequestBuilder::new(Method::GET, "/")
            .accept("text/plain")
            .default_header("accept", "application/json")
            .default_header("x-tenant", "acme")
            .build()
            .unwrap();

        assert_eq!(request.headers()["accept"], "text/plain");
        assert_eq!(request.headers()["x-tenant"], "acme");
    }
}
