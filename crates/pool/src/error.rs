//! Error types for pool operations
use thiserror::Error;

/// Result type for pool operations
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error source carried by collaborator failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error type for pool and collaborator operations
#[derive(Error, Debug)]
pub enum Error {
    /// Pool configuration is invalid
    #[error("Invalid pool configuration: {message}")]
    InvalidConfig {
        /// What is wrong with the configuration
        message: String,
    },

    /// The pool has been shut down
    #[error("Pool '{pool}' is closed")]
    PoolClosed {
        /// The pool name
        pool: String,
    },

    /// A factory failed to construct a resource
    #[error("Failed to create resource '{resource_id}': {reason}")]
    Create {
        /// The factory identifier
        resource_id: String,
        /// The failure reason
        reason: String,
        /// The underlying error
        #[source]
        source: Option<BoxError>,
    },

    /// Closing a resource failed
    #[error("Failed to close resource '{resource_id}': {reason}")]
    Close {
        /// The factory identifier
        resource_id: String,
        /// The failure reason
        reason: String,
        /// The underlying error
        #[source]
        source: Option<BoxError>,
    },

    /// One or more resources failed to close while draining the pool
    #[error("Shutdown of pool '{pool}' left {} close failure(s)", failures.len())]
    Shutdown {
        /// The pool name
        pool: String,
        /// Every close failure observed during the drain, in drain order
        failures: Vec<Error>,
    },

    /// Waiting for a resource exceeded the deadline
    #[error("Acquire on pool '{pool}' timed out after {timeout_ms}ms")]
    Timeout {
        /// The pool name
        pool: String,
        /// The timeout in milliseconds
        timeout_ms: u64,
    },

    /// Waiting for a resource was cancelled by the caller
    #[error("Acquire on pool '{pool}' was cancelled")]
    Cancelled {
        /// The pool name
        pool: String,
    },

    /// A regained resource does not match the pool's accounting
    #[error("Pool '{pool}' cannot take back a resource: {available} available of {active} active")]
    Unbalanced {
        /// The pool name
        pool: String,
        /// Resources currently constructed
        active: usize,
        /// Resources currently idle
        available: usize,
    },
}

impl Error {
    /// Create an invalid configuration error
    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create a pool closed error
    pub fn closed<S: Into<String>>(pool: S) -> Self {
        Self::PoolClosed { pool: pool.into() }
    }

    /// Create a construction error without an underlying source
    pub fn create<I: Into<String>, R: Into<String>>(resource_id: I, reason: R) -> Self {
        Self::Create {
            resource_id: resource_id.into(),
            reason: reason.into(),
            source: None,
        }
    }

    /// Create a construction error wrapping an underlying failure
    pub fn create_with<I, E>(resource_id: I, source: E) -> Self
    where
        I: Into<String>,
        E: Into<BoxError>,
    {
        let source = source.into();
        Self::Create {
            resource_id: resource_id.into(),
            reason: source.to_string(),
            source: Some(source),
        }
    }

    /// Create a close error without an underlying source
    pub fn close<I: Into<String>, R: Into<String>>(resource_id: I, reason: R) -> Self {
        Self::Close {
            resource_id: resource_id.into(),
            reason: reason.into(),
            source: None,
        }
    }

    /// Create a close error wrapping an underlying failure
    pub fn close_with<I, E>(resource_id: I, source: E) -> Self
    where
        I: Into<String>,
        E: Into<BoxError>,
    {
        let source = source.into();
        Self::Close {
            resource_id: resource_id.into(),
            reason: source.to_string(),
            source: Some(source),
        }
    }

    /// Check if the operation may succeed when attempted again
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Cancelled { .. } | Self::Create { .. }
        )
    }

    /// Check if this error reports a shut down pool
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::PoolClosed { .. })
    }

    /// Get the pool name associated with this error (if any)
    #[must_use]
    pub fn pool(&self) -> Option<&str> {
        match self {
            Self::InvalidConfig { .. } | Self::Create { .. } | Self::Close { .. } => None,
            Self::PoolClosed { pool }
            | Self::Shutdown { pool, .. }
            | Self::Timeout { pool, .. }
            | Self::Cancelled { pool }
            | Self::Unbalanced { pool, .. } => Some(pool),
        }
    }
}

/// A resource the pool refused to take back.
///
/// The instance is handed back so the caller can close it; the pool never
/// drops a resource it did not accept.
pub struct Rejected<T> {
    /// Why the pool refused the resource
    pub error: Error,
    /// The refused resource
    pub instance: T,
}

impl<T> Rejected<T> {
    pub(crate) fn new(error: Error, instance: T) -> Self {
        Self { error, instance }
    }

    /// Split into the error and the refused resource.
    pub fn into_parts(self) -> (Error, T) {
        (self.error, self.instance)
    }

    /// Take the refused resource, discarding the error.
    pub fn into_inner(self) -> T {
        self.instance
    }
}

impl<T> std::fmt::Debug for Rejected<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rejected")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl<T> std::fmt::Display for Rejected<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.error, f)
    }
}

impl<T> std::error::Error for Rejected<T> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl<T> From<Rejected<T>> for Error {
    fn from(rejected: Rejected<T>) -> Self {
        rejected.error
    }
}
