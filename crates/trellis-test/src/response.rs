//! Test response wrapper.

use bytes::Bytes;
use http::{header, HeaderMap, StatusCode};
use http_body_util::BodyExt;
use serde::de::DeserializeOwned;
use trellis_core::{Response, ResponseExt};

use crate::error::TestError;

/// A fully buffered response.
#[derive(Debug, Clone)]
pub struct TestResponse {
    status: StatusCode,
    headers: HeaderMap,
    reason_phrase: Option<String>,
    body: Bytes,
}

impl TestResponse {
    /// Buffers a pipeline response.
    ///
    /// # Errors
    ///
    /// Returns `TestError::BodyRead` if the body cannot be collected.
    pub async fn from_response(response: Response) -> Result<Self, TestError> {
        let reason_phrase = response.reason_phrase().map(str::to_string);
        let (parts, body) = response.into_parts();
        let body = body
            .collect()
            .await
            .map_err(|e| TestError::BodyRead(e.to_string()))?
            .to_bytes();

        Ok(Self {
            status: parts.status,
            headers: parts.headers,
            reason_phrase,
            body,
        })
    }

    /// Status code.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Status code as a number.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        self.status.as_u16()
    }

    /// The custom reason phrase, or the canonical one for the status.
    #[must_use]
    pub fn reason_phrase(&self) -> &str {
        self.reason_phrase
            .as_deref()
            .or_else(|| self.status.canonical_reason())
            .unwrap_or("")
    }

    /// All headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// First value of header `name`, if it is valid UTF-8.
    #[must_use]
    pub fn header_str(&self, name: impl AsRef<str>) -> Option<&str> {
        self.headers
            .get(name.as_ref())
            .and_then(|value| value.to_str().ok())
    }

    /// Every value of header `name`, in order.
    #[must_use]
    pub fn header_values(&self, name: impl AsRef<str>) -> Vec<&str> {
        self.headers
            .get_all(name.as_ref())
            .iter()
            .filter_map(|value| value.to_str().ok())
            .collect()
    }

    /// `Content-Type`.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.header_str(header::CONTENT_TYPE.as_str())
    }

    /// Raw body.
    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Body as UTF-8 text.
    pub fn text(&self) -> Result<String, TestError> {
        String::from_utf8(self.body.to_vec())
            .map_err(|e| TestError::BodyRead(format!("Invalid UTF-8: {e}")))
    }

    /// Body deserialized from JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, TestError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Panics unless the status is `expected`.
    pub fn assert_status(&self, expected: StatusCode) -> &Self {
        assert_eq!(
            self.status, expected,
            "Expected status {}, got {} ({})",
            expected,
            self.status,
            self.reason_phrase()
        );
        self
    }

    /// Panics unless header `name` has the value `expected`.
    pub fn assert_header(&self, name: impl AsRef<str>, expected: impl AsRef<str>) -> &Self {
        let name = name.as_ref();
        let actual = self
            .header_str(name)
            .unwrap_or_else(|| panic!("Header '{name}' not found"));
        assert_eq!(actual, expected.as_ref(), "Header '{name}' mismatch");
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::Full;

    #[tokio::test]
    async fn test_from_response() {
        let mut response = Response::text(StatusCode::BAD_REQUEST, "nope");
        response.set_reason_phrase("Missing id");
        response
            .headers_mut()
            .append("www-authenticate", "Basic".parse().unwrap());
        response
            .headers_mut()
            .append("www-authenticate", "Bearer".parse().unwrap());

        let response = TestResponse::from_response(response).await.unwrap();
        response
            .assert_status(StatusCode::BAD_REQUEST)
            .assert_header("content-type", "text/plain; charset=utf-8");
        assert_eq!(response.reason_phrase(), "Missing id");
        assert_eq!(response.text().unwrap(), "nope");
        assert_eq!(response.header_values("www-authenticate"), vec!["Basic", "Bearer"]);
    }

    #[tokio::test]
    async fn test_canonical_reason_and_json() {
        let response = http::Response::new(Full::new(Bytes::from(r#"{"id":7}"#)));
        let response = TestResponse::from_response(response).await.unwrap();

        assert_eq!(response.reason_phrase(), "OK");
        let value: serde_json::Value = response.json().unwrap();
        assert_eq!(value["id"], 7);
    }
}
