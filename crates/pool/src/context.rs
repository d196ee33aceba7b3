//! Per-call acquire context with cancellation support

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Context for pool operations.
///
/// Passed to [`Pool::acquire`](crate::Pool::acquire) and on to
/// [`Factory::create`](crate::Factory::create) so waits and constructions can
/// be abandoned early.
#[derive(Debug, Clone, Default)]
pub struct Context {
    /// Cooperative cancellation token; a waiting `acquire` fails with
    /// `Cancelled` once it fires.
    pub cancellation: CancellationToken,
    /// Point in time after which a waiting `acquire` fails with `Timeout`.
    /// Takes precedence over the pool's configured acquire timeout.
    pub deadline: Option<Instant>,
}

impl Context {
    /// Create a context with a fresh cancellation token and no deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the default cancellation token with the provided one.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Set an absolute deadline.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Set a deadline relative to now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Whether the caller has cancelled this context.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}
