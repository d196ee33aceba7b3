//! Validity predicates deciding whether an idle resource may be handed out.
//!
//! The pool is agnostic to *why* a resource is invalid. It asks one
//! [`Validity`] implementation at hand-out time; two stock policies cover the
//! common cases:
//!
//! - [`IdleTimeout`]: time-based, for resources that record when they were
//!   last used ([`Timestamped`]).
//! - [`SignalPolicy`]: signal-based, for resources that raise a one-shot
//!   [`LivenessSignal`] when they detect they are broken ([`Liveness`]).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

/// Decides whether a resource is still usable.
pub trait Validity<T>: Send + Sync + 'static {
    /// Return `false` to have the pool retire the resource instead of
    /// handing it out.
    fn is_valid(&self, instance: &T) -> bool;
}

impl<T, F> Validity<T> for F
where
    F: Fn(&T) -> bool + Send + Sync + 'static,
{
    fn is_valid(&self, instance: &T) -> bool {
        self(instance)
    }
}

/// Policy that accepts every resource.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysValid;

impl<T> Validity<T> for AlwaysValid {
    fn is_valid(&self, _instance: &T) -> bool {
        true
    }
}

// ---------------------------------------------------------------------------
// Time-based policy
// ---------------------------------------------------------------------------

/// A resource that records when it was last active.
pub trait Timestamped {
    /// The last time the resource did useful work.
    fn last_active(&self) -> Instant;
}

/// Time-based policy: a resource idle for longer than the threshold is stale.
#[derive(Debug, Clone, Copy)]
pub struct IdleTimeout {
    threshold: Duration,
}

impl IdleTimeout {
    /// Create a policy rejecting resources idle for longer than `threshold`.
    pub fn new(threshold: Duration) -> Self {
        Self { threshold }
    }

    /// The configured idle threshold.
    pub fn threshold(&self) -> Duration {
        self.threshold
    }
}

impl<T: Timestamped> Validity<T> for IdleTimeout {
    fn is_valid(&self, instance: &T) -> bool {
        instance.last_active().elapsed() <= self.threshold
    }
}

// ---------------------------------------------------------------------------
// Signal-based policy
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct SignalState {
    raised: AtomicBool,
    notify: Notify,
}

/// One-shot liveness signal.
///
/// Clones share state, so a resource can hand a clone to the task that
/// watches its underlying handle and have that task raise it. Once raised it
/// stays raised.
#[derive(Debug, Clone, Default)]
pub struct LivenessSignal {
    state: Arc<SignalState>,
}

impl LivenessSignal {
    /// Create a signal that has not fired.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the resource as no longer usable. Returns `true` if this call
    /// raised the signal, `false` if it had already fired.
    pub fn raise(&self) -> bool {
        let first = !self.state.raised.swap(true, Ordering::AcqRel);
        if first {
            self.state.notify.notify_waiters();
        }
        first
    }

    /// Whether the signal has fired.
    pub fn is_raised(&self) -> bool {
        self.state.raised.load(Ordering::Acquire)
    }

    /// Wait until the signal fires.
    pub async fn raised(&self) {
        loop {
            let notified = self.state.notify.notified();
            if self.is_raised() {
                return;
            }
            notified.await;
        }
    }
}

/// A resource that exposes a liveness signal.
pub trait Liveness {
    /// The signal the resource raises when it stops being usable.
    fn liveness(&self) -> &LivenessSignal;
}

/// Signal-based policy: a resource whose liveness signal fired is dead.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignalPolicy;

impl<T: Liveness> Validity<T> for SignalPolicy {
    fn is_valid(&self, instance: &T) -> bool {
        !instance.liveness().is_raised()
    }
}
