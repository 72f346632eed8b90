//! In-memory host for a built runtime.

use http::Method;
use serde::Serialize;
use trellis::Runtime;
use trellis_core::RequestCancellation;

use crate::error::TestError;
use crate::request::TestRequestBuilder;
use crate::response::TestResponse;

/// Sends requests straight into [`Runtime::handle_with_cancellation`].
///
/// Routing, the behavior chain and the outermost catch all run exactly as
/// they would behind a server; no socket is opened.
#[must_use]
pub struct TestHost {
    runtime: Runtime,
    default_headers: Vec<(String, String)>,
}

impl TestHost {
    /// Hosts `runtime`.
    pub fn new(runtime: Runtime) -> Self {
        Self {
            runtime,
            default_headers: Vec::new(),
        }
    }

    /// Adds a header to every request that does not set it itself.
    pub fn with_default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }

    /// The hosted runtime.
    #[must_use]
    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Starts a GET request.
    pub fn get(&self, uri: impl AsRef<str>) -> TestHostRequest<'_> {
        self.request(Method::GET, uri)
    }

    /// Starts a POST request.
    pub fn post(&self, uri: impl AsRef<str>) -> TestHostRequest<'_> {
        self.request(Method::POST, uri)
    }

    /// Starts a PUT request.
    pub fn put(&self, uri: impl AsRef<str>) -> TestHostRequest<'_> {
        self.request(Method::PUT, uri)
    }

    /// Starts a DELETE request.
    pub fn delete(&self, uri: impl AsRef<str>) -> TestHostRequest<'_> {
        self.request(Method::DELETE, uri)
    }

    /// Starts a request with any method.
    pub fn request(&self, method: Method, uri: impl AsRef<str>) -> TestHostRequest<'_> {
        TestHostRequest {
            host: self,
            builder: TestRequestBuilder::new(method, uri),
            cancellation: RequestCancellation::none(),
        }
    }
}

/// A request being built against a [`TestHost`].
#[must_use]
pub struct TestHostRequest<'a> {
    host: &'a TestHost,
    builder: TestRequestBuilder,
    cancellation: RequestCancellation,
}

impl TestHostRequest<'_> {
    /// Appends a header.
    pub fn header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.builder = self.builder.header(name, value);
        self
    }

    /// Sets `Accept`.
    pub fn accept(mut self, accept: impl AsRef<str>) -> Self {
        self.builder = self.builder.accept(accept);
        self
    }

    /// Sets `Authorization: Bearer <token>`.
    pub fn bearer_token(mut self, token: impl AsRef<str>) -> Self {
        self.builder = self.builder.bearer_token(token);
        self
    }

    /// Sets `Authorization: Basic ...`.
    pub fn basic_auth(mut self, username: &str, password: &str) -> Self {
        self.builder = self.builder.basic_auth(username, password);
        self
    }

    /// Sets a raw body with the given content type.
    pub fn body(mut self, content_type: &str, body: impl Into<bytes::Bytes>) -> Self {
        self.builder = self.builder.content_type(content_type).body(body);
        self
    }

    /// Sets a JSON body.
    pub fn json<T: Serialize>(mut self, value: &T) -> Self {
        self.builder = self.builder.json(value);
        self
    }

    /// Sets a urlencoded form body.
    pub fn form<T: Serialize>(mut self, value: &T) -> Self {
        self.builder = self.builder.form(value);
        self
    }

    /// Runs the request under `cancellation`.
    pub fn cancellation(mut self, cancellation: RequestCancellation) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Sends the request, panicking on any error.
    pub async fn send(self) -> TestResponse {
        match self.try_send().await {
            Ok(response) => response,
            Err(error) => panic!("test request failed: {error}"),
        }
    }

    /// Sends the request.
    ///
    /// # Errors
    ///
    /// Returns `TestError::Pipeline` when the runtime returns an error
    /// instead of a response, or a build error for an invalid request.
    pub async fn try_send(self) -> Result<TestResponse, TestError> {
        let mut builder = self.builder;
        for (name, value) in &self.host.default_headers {
            builder = builder.default_header(name, value);
        }
        let request = builder.build()?;

        let response = self
            .host
            .runtime
            .handle_with_cancellation(request, self.cancellation)
            .await?;
        TestResponse::from_response(response).await
    }
}
