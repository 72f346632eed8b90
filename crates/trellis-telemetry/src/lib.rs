//! Logging and metrics setup for Trellis services.
//!
//! - **Logging**: structured JSON or pretty output through `tracing-subscriber`
//! - **Metrics**: a Prometheus recorder for the metrics the pipeline emits
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │                Trellis runtime                │
//! │                                               │
//! │   tracing::{debug!, error!}   metrics::{...}  │
//! └──────────────┬──────────────────────┬─────────┘
//!                │                      │
//!                ▼                      ▼
//!        ┌──────────────┐      ┌─────────────────┐
//!        │  EnvFilter + │      │   Prometheus    │
//!        │  fmt layer   │      │    recorder     │
//!        └──────┬───────┘      └────────┬────────┘
//!               ▼                       ▼
//!         stdout/stderr       MetricsRegistry::render()
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use trellis_telemetry::{init_telemetry, TelemetryConfig};
//!
//! let telemetry = init_telemetry(&TelemetryConfig::production())?;
//! if let Some(metrics) = telemetry.metrics() {
//!     println!("{}", metrics.render());
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/trellis-telemetry/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;

pub use config::{TelemetryConfig, TelemetryConfigBuilder};
pub use error::TelemetryError;
pub use logging::{init_logging, LogConfig, LogFormat};
pub use metrics::{init_metrics, MetricsConfig, MetricsRegistry};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Handles to the initialized telemetry subsystems.
#[derive(Debug, Clone)]
pub struct Telemetry {
    metrics: Option<MetricsRegistry>,
}

impl Telemetry {
    /// The metrics registry, if metrics are enabled.
    pub fn metrics(&self) -> Option<&MetricsRegistry> {
        self.metrics.as_ref()
    }
}

/// Initializes logging, then metrics.
///
/// # Errors
///
/// Returns `TelemetryError` if any subsystem fails to initialize.
pub fn init_telemetry(config: &TelemetryConfig) -> TelemetryResult<Telemetry> {
    init_logging(&config.logging)?;
    let metrics = init_metrics(&config.metrics)?;
    Ok(Telemetry { metrics })
}
