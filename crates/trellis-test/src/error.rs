//! Test error types.

use thiserror::Error;
use trellis_core::TrellisError;

/// Errors raised while building a test request or reading its response.
#[derive(Debug, Error)]
pub enum TestError {
    /// The request could not be built.
    #[error("Request build error: {0}")]
    RequestBuild(String),

    /// A header name or value was invalid.
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// The response body could not be read.
    #[error("Body read error: {0}")]
    BodyRead(String),

    /// JSON (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The runtime returned an error instead of a response.
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] TrellisError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = TestError::InvalidHeader("x y".to_string());
        assert_eq!(err.to_string(), "Invalid header: x y");

        let err = TestError::from(TrellisError::Cancelled);
        assert_eq!(err.to_string(), "Pipeline error: Request was cancelled");
    }
}
