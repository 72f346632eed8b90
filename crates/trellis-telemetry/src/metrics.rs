//! Prometheus metrics for Trellis.
//!
//! The pipeline emits its metrics through the `metrics` facade (see
//! `trellis_core::metrics`); this module installs the Prometheus recorder
//! that collects them and renders the text exposition format.
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `trellis_requests_total` | Counter | `action`, `status` | Requests completed with a response |
//! | `trellis_request_duration_seconds` | Histogram | `action` | Time spent in the behavior chain |
//! | `trellis_unhandled_errors_total` | Counter | `action` | Errors that escaped the behavior chain |
//!
//! # Example
//!
//! ```rust,ignore
//! use trellis_telemetry::metrics::{init_metrics, MetricsConfig};
//!
//! let registry = init_metrics(&MetricsConfig::default())?.expect("metrics enabled");
//! println!("{}", registry.render());
//! ```

use std::sync::OnceLock;

use metrics::{describe_counter, describe_histogram, Unit};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use serde::{Deserialize, Serialize};
use trellis_core::metrics::{REQUESTS_TOTAL, REQUEST_DURATION_SECONDS, UNHANDLED_ERRORS_TOTAL};

use crate::error::TelemetryError;
use crate::TelemetryResult;

/// Global metrics handle; a process has at most one recorder.
static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetricsConfig {
    /// Whether metrics are enabled.
    pub enabled: bool,

    /// Histogram buckets for request duration, in seconds.
    pub duration_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            // 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s, 10s
            duration_buckets: vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
            ],
        }
    }
}

/// Renders the metrics collected by the installed recorder.
#[derive(Debug, Clone)]
pub struct MetricsRegistry {
    handle: PrometheusHandle,
}

impl MetricsRegistry {
    /// Wraps a recorder handle.
    #[must_use]
    pub fn new(handle: PrometheusHandle) -> Self {
        Self { handle }
    }

    /// Renders all metrics in Prometheus text format.
    #[must_use]
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Installs the Prometheus recorder.
///
/// Returns `None` when metrics are disabled. Calling it again after a
/// successful installation returns a registry over the existing recorder.
///
/// # Errors
///
/// Returns `TelemetryError::EmptyBuckets` for an empty bucket list and
/// `TelemetryError::RecorderInstall` if another recorder is already installed.
pub fn init_metrics(config: &MetricsConfig) -> TelemetryResult<Option<MetricsRegistry>> {
    if !config.enabled {
        return Ok(None);
    }
    if let Some(handle) = METRICS_HANDLE.get() {
        return Ok(Some(MetricsRegistry::new(handle.clone())));
    }
    if config.duration_buckets.is_empty() {
        return Err(TelemetryError::EmptyBuckets);
    }

    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(REQUEST_DURATION_SECONDS.to_string()),
            &config.duration_buckets,
        )
        .map_err(|e| TelemetryError::RecorderInstall(e.to_string()))?
        .install_recorder()
        .map_err(|e| TelemetryError::RecorderInstall(e.to_string()))?;

    let handle = METRICS_HANDLE.get_or_init(|| handle).clone();
    register_metric_descriptions();
    Ok(Some(MetricsRegistry::new(handle)))
}

/// Renders metrics in Prometheus format.
///
/// Returns `None` if metrics are not initialized.
#[must_use]
pub fn render_metrics() -> Option<String> {
    METRICS_HANDLE.get().map(PrometheusHandle::render)
}

fn register_metric_descriptions() {
    describe_counter!(REQUESTS_TOTAL, "Requests completed with a response");
    describe_histogram!(
        REQUEST_DURATION_SECONDS,
        Unit::Seconds,
        "Time spent in the behavior chain"
    );
    describe_counter!(
        UNHANDLED_ERRORS_TOTAL,
        "Errors that escaped the behavior chain"
    );
}
