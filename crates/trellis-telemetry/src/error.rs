//! Telemetry error types.

use thiserror::Error;

/// Errors that can occur during telemetry setup.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The log filter directive does not parse.
    #[error("invalid log filter '{directive}': {reason}")]
    InvalidFilter {
        /// The rejected directive.
        directive: String,
        /// Parser message.
        reason: String,
    },

    /// A global `tracing` subscriber is already installed.
    #[error("failed to install log subscriber: {0}")]
    SubscriberInstall(String),

    /// Metrics are enabled but no duration buckets were configured.
    #[error("metrics are enabled but duration_buckets is empty")]
    EmptyBuckets,

    /// The Prometheus recorder could not be built or installed.
    #[error("failed to install metrics recorder: {0}")]
    RecorderInstall(String),
}
