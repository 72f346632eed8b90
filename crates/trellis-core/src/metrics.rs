//! Request metrics.
//!
//! Two layers:
//!
//! - lock-free in-process counters ([`Metrics`], [`ActionMetrics`]) that the
//!   runtime exposes for diagnostics;
//! - emission through the `metrics` facade, picked up by whatever recorder
//!   the application installed (see `trellis-telemetry`).
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `trellis_requests_total` | Counter | `action`, `status` | Requests completed with a response |
//! | `trellis_request_duration_seconds` | Histogram | `action` | Time spent in the behavior chain |
//! | `trellis_unhandled_errors_total` | Counter | `action` | Errors that escaped the behavior chain |

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use metrics::{counter, histogram};

/// Name of the request counter.
pub const REQUESTS_TOTAL: &str = "trellis_requests_total";

/// Name of the request duration histogram.
pub const REQUEST_DURATION_SECONDS: &str = "trellis_request_duration_seconds";

/// Name of the unhandled error counter.
pub const UNHANDLED_ERRORS_TOTAL: &str = "trellis_unhandled_errors_total";

/// Process-wide request counters.
///
/// Updated with relaxed atomics; readers may observe values from slightly
/// different instants.
#[derive(Debug, Default)]
pub struct Metrics {
    total_requests: AtomicU64,
    unhandled_errors: AtomicU64,
}

impl Metrics {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one request.
    pub fn increment_total_requests(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts one unhandled error.
    pub fn increment_unhandled_errors(&self) {
        self.unhandled_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Requests seen so far.
    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    /// Unhandled errors seen so far.
    pub fn unhandled_errors(&self) -> u64 {
        self.unhandled_errors.load(Ordering::Relaxed)
    }
}

/// Per-action request count and latency.
///
/// The average is computed from two independent atomics, so a concurrent
/// reader can see a count and a total from different requests. That skew is
/// accepted.
#[derive(Debug, Default)]
pub struct ActionMetrics {
    requests: AtomicU64,
    total_micros: AtomicU64,
}

impl ActionMetrics {
    /// Records one completed request.
    pub fn record(&self, elapsed: Duration) {
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.total_micros.fetch_add(micros, Ordering::Relaxed);
    }

    /// Requests recorded so far.
    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    /// Sum of recorded latencies.
    pub fn total_time(&self) -> Duration {
        Duration::from_micros(self.total_micros.load(Ordering::Relaxed))
    }

    /// Average latency, zero before the first request.
    pub fn average(&self) -> Duration {
        let requests = self.requests();
        if requests == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros(self.total_micros.load(Ordering::Relaxed) / requests)
    }
}

/// Emits the request counter and duration histogram.
pub fn record_request(action: &str, status_code: u16, duration: Duration) {
    counter!(
        REQUESTS_TOTAL,
        "action" => action.to_string(),
        "status" => status_code.to_string()
    )
    .increment(1);

    histogram!(REQUEST_DURATION_SECONDS, "action" => action.to_string())
        .record(duration.as_secs_f64());
}

/// Emits the unhandled error counter.
pub fn record_unhandled_error(action: &str) {
    counter!(UNHANDLED_ERRORS_TOTAL, "action" => action.to_string()).increment(1);
}
