//! Diagnostic error responses.
//!
//! When error details are enabled for a request, 500 responses carry a
//! `text/plain` body made of the raw request followed by the error chain:
//!
//! ```text
//! POST /users HTTP/1.1
//! content-type: application/json
//!
//! {"name":"ada"}
//!
//! Internal error: failed to store user
//!   0: app::store::insert
//!   at ./src/store.rs:42:9
//!   Caused by: database unavailable
//!     Caused by: connection refused
//! ```
//!
//! Each cause is indented one level further than the error it caused.
//! Captured backtraces are rendered beneath the error that owns them.

use std::backtrace::BacktraceStatus;
use std::error::Error as StdError;
use std::fmt::Write as _;

use http::StatusCode;
use trellis_core::{Configuration, RequestMessage, Response, ResponseExt, TrellisError};

const INDENT: &str = "  ";

/// Builds the 500 response for an error that was not handled otherwise.
///
/// The reason phrase is the configured default; the body is only present
/// when error details are enabled for `request`.
pub fn internal_error_response(
    configuration: &Configuration,
    request: &RequestMessage,
    error: &(dyn StdError + 'static),
) -> Response {
    let mut response = if configuration.should_show_error_details(request) {
        Response::text(StatusCode::INTERNAL_SERVER_ERROR, render(request, error))
    } else {
        Response::with_status(StatusCode::INTERNAL_SERVER_ERROR)
    };
    response.set_reason_phrase(configuration.default_error_reason_phrase.clone());
    response
}

/// Renders the raw request followed by the error chain.
pub fn render(request: &RequestMessage, error: &(dyn StdError + 'static)) -> String {
    let mut out = request.to_raw_string();
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out.push('\n');
    out.push_str(&render_error_chain(error));
    out
}

/// Renders `error` and its causes, each cause indented one level further.
pub fn render_error_chain(error: &(dyn StdError + 'static)) -> String {
    let mut out = String::new();
    let mut current = Some(error);
    let mut depth = 0;

    while let Some(error) = current {
        let indent = INDENT.repeat(depth);
        if depth == 0 {
            let _ = writeln!(out, "{error}");
        } else {
            let _ = writeln!(out, "{indent}Caused by: {error}");
        }
        render_backtrace(&mut out, error, &format!("{indent}{INDENT}"));

        current = error.source();
        depth += 1;
    }
    out
}

fn render_backtrace(out: &mut String, error: &(dyn StdError + 'static), indent: &str) {
    let Some(TrellisError::Internal {
        source: Some(source),
        ..
    }) = error.downcast_ref::<TrellisError>()
    else {
        return;
    };

    let backtrace = source.backtrace();
    if backtrace.status() != BacktraceStatus::Captured {
        return;
    }
    for line in backtrace.to_string().lines() {
        let _ = writeln!(out, "{indent}{}", line.trim_start());
    }
}
