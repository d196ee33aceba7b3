//! Collaborator traits: how resources are built and released.
//!
//! A pool is generic over a [`Factory`] that produces instances and over the
//! [`Closable`] instances themselves. Neither trait knows anything about
//! pooling; the pool decides when to call them.

use std::future::Future;

use crate::context::Context;
use crate::error::Result;

/// A resource whose underlying handle must be released explicitly.
pub trait Closable: Send + 'static {
    /// Release the underlying handle.
    ///
    /// Called by the pool exactly once per instance, when the instance is
    /// retired or drained at shutdown.
    fn close(self) -> impl Future<Output = Result<()>> + Send;
}

/// Builds new resource instances on demand.
pub trait Factory: Send + Sync + 'static {
    /// The instance type produced by this factory.
    type Instance: Closable;

    /// Identifier for this kind of resource (e.g. "postgres", "tcp").
    fn id(&self) -> &str;

    /// Build one new, distinct, live instance.
    ///
    /// The pool never calls this more often than it has free capacity.
    /// Errors are returned to the caller of the pool operation unchanged.
    fn create(&self, ctx: &Context) -> impl Future<Output = Result<Self::Instance>> + Send;
}
