//! Error types for Trellis.
//!
//! This module provides the [`TrellisError`] type, which is the standard error
//! type used throughout the request pipeline.
//!
//! # Propagation
//!
//! | Variant | Raised by | Handled by |
//! |---|---|---|
//! | `BadRequest` | binders, readers, handlers | error-handling behavior (400) |
//! | `Configuration` | plugin collections, factory, authentication | nobody, surfaces to the host |
//! | `Injection` | the container | error-handling behavior (500) |
//! | `Cancelled` | anything observing cancellation | nobody, surfaces to the host |
//! | `Internal` | handlers, plugins | error-handling behavior (500) |
//! | `Unhandled` | the behavior chain invoker | the runtime's outermost catch |
//!
//! The invoker wraps every error except `BadRequest` and `Cancelled` exactly
//! once in [`TrellisError::Unhandled`], attaching the action descriptor and
//! the request scope for diagnostics.

use std::fmt;
use std::sync::Arc;

use http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::container::{Container, InjectionError};
use crate::descriptor::ActionDescriptor;

/// Result type alias using [`TrellisError`].
pub type TrellisResult<T> = Result<T, TrellisError>;

/// Categories of errors for classification and handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// The client sent something that could not be bound or read.
    BadRequest,
    /// The framework was configured inconsistently.
    Configuration,
    /// A dependency could not be resolved.
    Injection,
    /// The request was cancelled.
    Cancelled,
    /// Any other failure.
    Internal,
    /// A failure that escaped the behavior chain.
    Unhandled,
}

impl ErrorCategory {
    /// Returns the default HTTP status code for this error category.
    #[must_use]
    pub const fn default_status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::Configuration | Self::Injection | Self::Internal | Self::Unhandled => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            // nginx's "client closed request"
            Self::Cancelled => match StatusCode::from_u16(499) {
                Ok(status) => status,
                Err(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

/// Standard error type for Trellis.
///
/// # Example
///
/// ```
/// use trellis_core::{TrellisError, ErrorCategory};
///
/// fn parse_id(raw: &str) -> Result<u64, TrellisError> {
///     raw.parse()
///         .map_err(|_| TrellisError::bad_request(format!("'{raw}' is not a valid id")))
/// }
///
/// let err = parse_id("abc").unwrap_err();
/// assert_eq!(err.category(), ErrorCategory::BadRequest);
/// assert_eq!(err.to_string(), "'abc' is not a valid id");
/// ```
#[derive(Error, Debug)]
pub enum TrellisError {
    /// The request could not be bound or read. The message becomes the
    /// reason phrase of the 400 response.
    #[error("{message}")]
    BadRequest {
        /// Human-readable error message.
        message: String,
    },

    /// The framework configuration is inconsistent.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Human-readable error message.
        message: String,
    },

    /// A dependency could not be resolved.
    #[error(transparent)]
    Injection(#[from] InjectionError),

    /// The request was cancelled before it completed.
    #[error("Request was cancelled")]
    Cancelled,

    /// Internal error.
    #[error("Internal error: {message}")]
    Internal {
        /// Human-readable error message.
        message: String,
        /// The underlying error (not exposed to clients).
        #[source]
        source: Option<anyhow::Error>,
    },

    /// An error escaped the behavior chain of an action.
    #[error(transparent)]
    Unhandled(Box<UnhandledError>),
}

impl TrellisError {
    /// Creates a bad request error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an internal error with a source error.
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Wraps an error that escaped the behavior chain of `action`.
    ///
    /// Already wrapped errors are returned unchanged so the wrapping happens
    /// exactly once.
    #[must_use]
    pub fn unhandled(action: Arc<ActionDescriptor>, scope: Container, error: Self) -> Self {
        match error {
            Self::Unhandled(_) => error,
            error => Self::Unhandled(Box::new(UnhandledError {
                action,
                scope,
                error,
            })),
        }
    }

    /// Returns the error category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::BadRequest { .. } => ErrorCategory::BadRequest,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Injection(_) => ErrorCategory::Injection,
            Self::Cancelled => ErrorCategory::Cancelled,
            Self::Internal { .. } => ErrorCategory::Internal,
            Self::Unhandled(_) => ErrorCategory::Unhandled,
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        self.category().default_status_code()
    }

    /// Returns `true` for client errors that map to a 400 response.
    #[must_use]
    pub const fn is_bad_request(&self) -> bool {
        matches!(self, Self::BadRequest { .. })
    }

    /// Returns `true` if the request was cancelled.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns the innermost error, looking through an `Unhandled` wrapper.
    #[must_use]
    pub fn inner(&self) -> &Self {
        match self {
            Self::Unhandled(unhandled) => &unhandled.error,
            error => error,
        }
    }
}

/// Diagnostic wrapper for an error that escaped the behavior chain.
///
/// Carries the action that was executing and the request scope, which stays
/// readable for diagnostics even after it has been disposed.
pub struct UnhandledError {
    action: Arc<ActionDescriptor>,
    scope: Container,
    error: TrellisError,
}

impl UnhandledError {
    /// The action whose chain produced the error.
    pub fn action(&self) -> &Arc<ActionDescriptor> {
        &self.action
    }

    /// The request scope the action ran in.
    pub fn scope(&self) -> &Container {
        &self.scope
    }

    /// The original error.
    pub fn error(&self) -> &TrellisError {
        &self.error
    }

    /// Consumes the wrapper, returning the original error.
    pub fn into_error(self) -> TrellisError {
        self.error
    }
}

impl fmt::Display for UnhandledError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Unhandled error in {}: {}",
            self.action.action().full_name(),
            self.error
        )
    }
}

impl fmt::Debug for UnhandledError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnhandledError")
            .field("action", &self.action.action().full_name())
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl std::error::Error for UnhandledError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_request_display_is_message() {
        let err = TrellisError::bad_request("Invalid id");
        assert_eq!(err.to_string(), "Invalid id");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(err.is_bad_request());
    }

    #[test]
    fn test_configuration_error() {
        let err = TrellisError::configuration("no default behavior");
        assert_eq!(err.category(), ErrorCategory::Configuration);
        assert!(err.to_string().contains("no default behavior"));
    }

    #[test]
    fn test_internal_with_source() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        let err = TrellisError::internal_with_source("write failed", io);
        let source = std::error::Error::source(&err).map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("disk on fire"));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_injection_error_converts() {
        struct Missing;
        let err: TrellisError = InjectionError::not_registered::<Missing>().into();
        assert_eq!(err.category(), ErrorCategory::Injection);
        assert!(err.to_string().contains("Missing"));
    }

    #[test]
    fn test_cancelled_status() {
        assert_eq!(TrellisError::Cancelled.status_code().as_u16(), 499);
        assert!(TrellisError::Cancelled.is_cancelled());
    }

    #[test]
    fn test_category_serialization() {
        let json = serde_json::to_string(&ErrorCategory::BadRequest).unwrap();
        assert_eq!(json, "\"bad_request\"");
    }
}
