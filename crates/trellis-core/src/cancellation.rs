//! Request cancellation.

use tokio_util::sync::CancellationToken;

use crate::error::{TrellisError, TrellisResult};

/// Cancellation signal of a single request.
///
/// Registered in the request scope; readers, binders, the default behavior
/// and writers check it at their suspension points. Cancellation surfaces as
/// [`TrellisError::Cancelled`] and is never translated into a response.
#[derive(Debug, Clone, Default)]
pub struct RequestCancellation {
    token: CancellationToken,
}

impl RequestCancellation {
    /// Wraps a host-provided token.
    pub fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    /// A signal that is never triggered unless [`cancel`](Self::cancel) is called.
    pub fn none() -> Self {
        Self::default()
    }

    /// Triggers cancellation.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Returns `true` once the request was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Fails with [`TrellisError::Cancelled`] if the request was cancelled.
    pub fn check(&self) -> TrellisResult<()> {
        if self.token.is_cancelled() {
            Err(TrellisError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Completes when the request is cancelled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// The underlying token.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl From<CancellationToken> for RequestCancellation {
    fn from(token: CancellationToken) -> Self {
        Self::new(token)
    }
}
