//! Default response status and header plugins.
//!
//! | Plugin | Effect |
//! |--------|--------|
//! | [`DefaultResponseStatus`] | `200 OK` with a body, `204 No Content` without |
//! | [`DefaultResponseHeaders`] | `Configuration::default_response_headers` |

use std::sync::Arc;

use http::{HeaderMap, StatusCode};
use trellis_core::{
    Configuration, Container, Resolve, Response, ResponseContext, ResponseHeaders, ResponseStatus,
    TrellisResult,
};

/// Sets `200 OK` when the handler produced a body, `204 No Content` otherwise.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultResponseStatus;

impl Resolve for DefaultResponseStatus {
    fn resolve(_: &Container) -> TrellisResult<Self> {
        Ok(Self)
    }
}

impl ResponseStatus for DefaultResponseStatus {
    fn set_status(&self, context: &ResponseContext, response: &mut Response) {
        *response.status_mut() = if context.has_body {
            StatusCode::OK
        } else {
            StatusCode::NO_CONTENT
        };
    }
}

/// Adds the configured default response headers.
#[derive(Debug, Clone)]
pub struct DefaultResponseHeaders {
    configuration: Arc<Configuration>,
}

impl Resolve for DefaultResponseHeaders {
    fn resolve(container: &Container) -> TrellisResult<Self> {
        Ok(Self {
            configuration: container.resolve::<Configuration>()?,
        })
    }
}

impl ResponseHeaders for DefaultResponseHeaders {
    fn applies(&self, _context: &ResponseContext) -> bool {
        !self.configuration.default_response_headers.is_empty()
    }

    fn headers(&self, _context: &ResponseContext) -> HeaderMap {
        self.configuration.default_response_headers.clone()
    }
}
