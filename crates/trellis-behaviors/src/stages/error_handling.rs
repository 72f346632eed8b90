//! Error-handling behavior.
//!
//! Wraps the rest of the chain and turns errors into responses:
//!
//! | Error | Outcome |
//! |-------|---------|
//! | bad request | `400`, reason phrase = error message, no body |
//! | configuration | propagated |
//! | cancelled | propagated |
//! | anything else | `500`, configured reason phrase, optional diagnostic body |
//!
//! # Pipeline Position
//!
//! Configured first so it encloses every other behavior:
//!
//! ```text
//! [ErrorHandling] → Authentication → ... → DefaultBehavior
//! ```

use std::sync::Arc;

use http::StatusCode;
use tracing::{debug, error};
use trellis_core::{
    Behavior, BehaviorChain, BoxFuture, Configuration, Container, ErrorCategory, RequestMessage,
    Resolve, Response, ResponseExt, TrellisResult,
};

use crate::debug::internal_error_response;

/// Converts errors raised by the rest of the chain into responses.
pub struct ErrorHandlingBehavior {
    configuration: Arc<Configuration>,
    request: Arc<RequestMessage>,
}

impl Resolve for ErrorHandlingBehavior {
    fn resolve(container: &Container) -> TrellisResult<Self> {
        Ok(Self {
            configuration: container.resolve::<Configuration>()?,
            request: container.resolve::<RequestMessage>()?,
        })
    }
}

impl Behavior for ErrorHandlingBehavior {
    fn invoke<'a>(&'a self, chain: &'a dyn BehaviorChain) -> BoxFuture<'a, TrellisResult<Response>> {
        Box::pin(async move {
            let error = match chain.invoke_next().await {
                Ok(response) => return Ok(response),
                Err(error) => error,
            };

            match error.inner().category() {
                ErrorCategory::BadRequest => {
                    debug!(reason = %error, "bad request");
                    let mut response = Response::with_status(StatusCode::BAD_REQUEST);
                    response.set_reason_phrase(error.inner().to_string());
                    Ok(response)
                }
                ErrorCategory::Configuration | ErrorCategory::Cancelled => Err(error),
                _ => {
                    error!(error = %error, "request failed");
                    Ok(internal_error_response(
                        &self.configuration,
                        &self.request,
                        &error,
                    ))
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http_body_util::BodyExt;
    use trellis_core::TrellisError;

    struct Failing(fn() -> TrellisError);

    impl BehaviorChain for Failing {
        fn invoke_next(&self) -> BoxFuture<'_, TrellisResult<Response>> {
            let error = (self.0)();
            Box::pin(async move { Err(error) })
        }
    }

    fn behavior(show_details: bool) -> ErrorHandlingBehavior {
        let mut configuration = Configuration::new();
        configuration.show_error_details(show_details);

        let (parts, ()) = http::Request::builder()
            .uri("/orders/7")
            .body(())
            .unwrap()
            .into_parts();

        let container = Container::new();
        container.register_instance(Arc::new(configuration));
        container.register_instance(Arc::new(RequestMessage::from_parts(parts, Bytes::new())));
        ErrorHandlingBehavior::resolve(&container).unwrap()
    }

    #[tokio::test]
    async fn test_bad_request_becomes_400() {
        let chain = Failing(|| TrellisError::bad_request("Order id must be positive"));
        let response = behavior(false).invoke(&chain).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.reason_phrase(), Some("Order id must be positive"));
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_internal_error_becomes_500() {
        let chain = Failing(|| TrellisError::internal("database down"));
        let response = behavior(false).invoke(&chain).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.reason_phrase(),
            Some("There was a problem processing your request.")
        );
    }

    #[tokio::test]
    async fn test_internal_error_with_details() {
        let chain = Failing(|| TrellisError::internal("database down"));
        let response = behavior(true).invoke(&chain).await.unwrap();

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body = String::from_utf8(body.to_vec()).unwrap();
        assert!(body.starts_with("GET /orders/7 HTTP/1.1"));
        assert!(body.contains("Internal error: database down"));
    }

    #[tokio::test]
    async fn test_configuration_and_cancellation_propagate() {
        let chain = Failing(|| TrellisError::configuration("no authenticators"));
        let err = behavior(true).invoke(&chain).await.unwrap_err();
        assert!(matches!(err, TrellisError::Configuration { .. }));

        let chain = Failing(|| TrellisError::Cancelled);
        let err = behavior(true).invoke(&chain).await.unwrap_err();
        assert!(err.is_cancelled());
    }
}
