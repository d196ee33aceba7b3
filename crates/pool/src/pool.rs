//! Bounded resource pool.
//!
//! `Pool<F, V>` pre-builds `capacity` instances through the [`Factory`],
//! hands them out under contention, takes them back with [`Pool::regain`]
//! and permanently removes them with [`Pool::retire`]. Instances that fail
//! the [`Validity`] predicate at hand-out are retired and replaced
//! transparently.
//!
//! All shared state (`available`, `active`, `closed`) sits behind a single
//! mutex that is never held across an await point. Blocked acquirers wait on
//! a [`Notify`]: every regain, retirement and released construction slot
//! wakes one of them, shutdown wakes all of them, and each wakeup re-checks
//! the pool state instead of trusting the wakeup itself.

use std::collections::VecDeque;
use std::pin::pin;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::config::PoolConfig;
use crate::context::Context;
use crate::error::{Error, Rejected, Result};
use crate::guard::Pooled;
use crate::resource::{Closable, Factory};
use crate::validity::{AlwaysValid, Validity};

/// Pool statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Total successful acquisitions.
    pub acquisitions: u64,
    /// Total instances handed back through `regain`.
    pub regains: u64,
    /// Total instances removed through `retire`.
    pub retirements: u64,
    /// Instances retired because they failed the validity check.
    pub invalidated: u64,
    /// Total instances ever created.
    pub created: u64,
    /// Total instances ever closed.
    pub closed: u64,
    /// Close calls that returned an error.
    pub close_failures: u64,
    /// Callers currently blocked in `acquire`.
    pub waiting: usize,
}

/// Instantaneous view of the pool's accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolState {
    /// Fixed maximum number of constructed instances.
    pub capacity: usize,
    /// Instances constructed and not yet retired.
    pub active: usize,
    /// Instances idle in the pool.
    pub available: usize,
    /// Whether the pool has been shut down.
    pub closed: bool,
}

impl PoolState {
    /// Instances currently held by callers.
    #[must_use]
    pub fn checked_out(&self) -> usize {
        self.active - self.available
    }
}

struct State<T> {
    available: VecDeque<T>,
    active: usize,
    closed: bool,
}

/// What an acquirer does after inspecting the pool under the lock.
enum Step<T> {
    Ready(T),
    Create,
}

/// Inner shared state for the pool.
struct PoolInner<F: Factory, V> {
    factory: F,
    validity: V,
    config: PoolConfig,
    state: Mutex<State<F::Instance>>,
    stats: Mutex<PoolStats>,
    notify: Notify,
}

impl<F: Factory, V> PoolInner<F, V> {
    fn closed_error(&self) -> Error {
        Error::closed(&self.config.name)
    }

    /// Give back one unit of capacity and wake one waiter.
    fn release_slot(&self) {
        {
            let mut state = self.state.lock();
            debug_assert!(state.active > state.available.len());
            state.active -= 1;
        }
        self.notify.notify_one();
    }

    async fn close_instance(&self, instance: F::Instance) -> Result<()> {
        let result = instance.close().await;
        let mut stats = self.stats.lock();
        stats.closed += 1;
        if let Err(err) = &result {
            stats.close_failures += 1;
            tracing::warn!(
                pool = %self.config.name,
                resource_id = self.factory.id(),
                error = %err,
                "Failed to close resource"
            );
        }
        result
    }
}

/// Capacity reserved for an in-flight construction.
///
/// Released on drop unless committed, so an acquire abandoned while the
/// factory runs cannot shrink the pool.
struct Reservation<'a, F: Factory, V> {
    inner: &'a PoolInner<F, V>,
    committed: bool,
}

impl<'a, F: Factory, V> Reservation<'a, F, V> {
    fn new(inner: &'a PoolInner<F, V>) -> Self {
        Self {
            inner,
            committed: false,
        }
    }

    fn commit(mut self) {
        self.committed = true;
    }
}

impl<F: Factory, V> Drop for Reservation<'_, F, V> {
    fn drop(&mut self) {
        if !self.committed {
            self.inner.release_slot();
        }
    }
}

/// Tracks a caller blocked in `acquire` for [`PoolStats::waiting`].
struct Waiting<'a>(&'a Mutex<PoolStats>);

impl<'a> Waiting<'a> {
    fn enter(stats: &'a Mutex<PoolStats>) -> Self {
        stats.lock().waiting += 1;
        Self(stats)
    }
}

impl Drop for Waiting<'_> {
    fn drop(&mut self) {
        self.0.lock().waiting -= 1;
    }
}

/// Bounded resource pool.
///
/// Cloning a `Pool` is cheap and yields another handle to the same pool.
pub struct Pool<F: Factory, V = AlwaysValid> {
    inner: Arc<PoolInner<F, V>>,
}

impl<F: Factory, V> Clone for Pool<F, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: Factory, V> std::fmt::Debug for Pool<F, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (active, available, closed) = {
            let state = self.inner.state.lock();
            (state.active, state.available.len(), state.closed)
        };
        f.debug_struct("Pool")
            .field("name", &self.inner.config.name)
            .field("resource_id", &self.inner.factory.id())
            .field("capacity", &self.inner.config.capacity)
            .field("active", &active)
            .field("available", &available)
            .field("closed", &closed)
            .finish()
    }
}

impl<F: Factory> Pool<F> {
    /// Create a pool that hands out every instance it holds.
    ///
    /// See [`Pool::with_validity`].
    pub async fn new(factory: F, config: PoolConfig) -> Result<Self> {
        Self::with_validity(factory, AlwaysValid, config).await
    }
}

impl<F: Factory, V: Validity<F::Instance>> Pool<F, V> {
    /// Create a pool and pre-build `config.capacity` instances.
    ///
    /// # Errors
    /// Returns `InvalidConfig` if `config` is invalid. If the factory fails,
    /// every instance built so far is closed and the factory's error is
    /// returned unchanged.
    pub async fn with_validity(factory: F, validity: V, config: PoolConfig) -> Result<Self> {
        config.validate()?;

        let ctx = Context::new();
        let mut available = VecDeque::with_capacity(config.capacity);
        while available.len() < config.capacity {
            match factory.create(&ctx).await {
                Ok(instance) => available.push_back(instance),
                Err(err) => {
                    tracing::debug!(
                        pool = %config.name,
                        built = available.len(),
                        error = %err,
                        "Pre-warm failed, closing built resources"
                    );
                    for instance in available {
                        if let Err(close_err) = instance.close().await {
                            tracing::warn!(
                                pool = %config.name,
                                resource_id = factory.id(),
                                error = %close_err,
                                "Failed to close resource after pre-warm failure"
                            );
                        }
                    }
                    return Err(err);
                }
            }
        }

        tracing::debug!(
            pool = %config.name,
            resource_id = factory.id(),
            capacity = config.capacity,
            "Pool ready"
        );

        let active = available.len();
        Ok(Self {
            inner: Arc::new(PoolInner {
                factory,
                validity,
                state: Mutex::new(State {
                    available,
                    active,
                    closed: false,
                }),
                stats: Mutex::new(PoolStats {
                    created: active as u64,
                    ..PoolStats::default()
                }),
                notify: Notify::new(),
                config,
            }),
        })
    }

    /// Acquire an instance from the pool.
    ///
    /// Waits while every instance is checked out. The returned instance has
    /// passed the validity check and is exclusively owned by the caller until
    /// it is handed to [`regain`](Self::regain) or [`retire`](Self::retire).
    ///
    /// # Errors
    /// - `PoolClosed` if the pool is or becomes shut down.
    /// - The factory's error, unchanged, if building a new instance fails.
    /// - `Timeout` once `ctx.deadline` (or the configured acquire timeout)
    ///   passes.
    /// - `Cancelled` once `ctx.cancellation` fires while waiting.
    pub async fn acquire(&self, ctx: &Context) -> Result<F::Instance> {
        let inner = &*self.inner;
        let start = Instant::now();
        let deadline = ctx
            .deadline
            .or_else(|| inner.config.acquire_timeout.map(|timeout| start + timeout));

        let wait = async {
            match deadline {
                Some(deadline) => {
                    match tokio::time::timeout_at(deadline, self.acquire_inner(ctx)).await {
                        Ok(result) => result,
                        Err(_) => Err(Error::Timeout {
                            pool: inner.config.name.clone(),
                            timeout_ms: deadline.saturating_duration_since(start).as_millis()
                                as u64,
                        }),
                    }
                }
                None => self.acquire_inner(ctx).await,
            }
        };

        tokio::select! {
            biased;
            result = wait => result,
            () = ctx.cancellation.cancelled() => Err(Error::Cancelled {
                pool: inner.config.name.clone(),
            }),
        }
    }

    /// Acquire an instance wrapped in a handle that regains it on drop.
    pub async fn get(&self, ctx: &Context) -> Result<Pooled<F, V>> {
        let instance = self.acquire(ctx).await?;
        Ok(Pooled::new(instance, self.clone()))
    }

    async fn acquire_inner(&self, ctx: &Context) -> Result<F::Instance> {
        let inner = &*self.inner;
        loop {
            let instance = match self.next_step().await? {
                Step::Ready(instance) => instance,
                Step::Create => self.create(ctx).await?,
            };

            if inner.validity.is_valid(&instance) {
                inner.stats.lock().acquisitions += 1;
                tracing::trace!(pool = %inner.config.name, "Acquired resource");
                return Ok(instance);
            }

            tracing::debug!(
                pool = %inner.config.name,
                resource_id = inner.factory.id(),
                "Resource failed validity check, retiring"
            );
            inner.stats.lock().invalidated += 1;
            inner.release_slot();
            // Close failures are already logged; replacing the resource
            // takes priority.
            let _ = self.close_detached(instance).await;
        }
    }

    /// Wait until an idle instance or a free slot is available.
    ///
    /// The wakeup registration only lives while this caller is blocked, so
    /// a caller busy building or closing an instance never absorbs a
    /// `notify_one` meant for a blocked one.
    async fn next_step(&self) -> Result<Step<F::Instance>> {
        let inner = &*self.inner;
        loop {
            // Register before inspecting the state so a regain or retirement
            // between the check and the wait is never missed.
            let mut notified = pin!(inner.notify.notified());
            notified.as_mut().enable();

            {
                let mut state = inner.state.lock();
                if state.closed {
                    return Err(inner.closed_error());
                }
                if let Some(instance) = state.available.pop_front() {
                    return Ok(Step::Ready(instance));
                }
                if state.active < inner.config.capacity {
                    state.active += 1;
                    return Ok(Step::Create);
                }
            }

            let _waiting = Waiting::enter(&inner.stats);
            tracing::trace!(pool = %inner.config.name, "Pool exhausted, waiting");
            notified.await;
        }
    }

    /// Build one instance into a slot reserved by the caller.
    async fn create(&self, ctx: &Context) -> Result<F::Instance> {
        let inner = &*self.inner;
        let reservation = Reservation::new(inner);

        let instance = inner.factory.create(ctx).await.inspect_err(|err| {
            tracing::debug!(
                pool = %inner.config.name,
                resource_id = inner.factory.id(),
                error = %err,
                "Factory failed to create resource"
            );
        })?;
        reservation.commit();
        inner.stats.lock().created += 1;

        let closed = inner.state.lock().closed;
        if closed {
            inner.release_slot();
            let _ = self.close_detached(instance).await;
            return Err(inner.closed_error());
        }

        tracing::debug!(
            pool = %inner.config.name,
            resource_id = inner.factory.id(),
            "Created resource"
        );
        Ok(instance)
    }

    /// Close an instance on its own task.
    ///
    /// The caller still waits for the outcome, but dropping the caller (a
    /// timed out or cancelled acquire) no longer drops the instance
    /// mid-close.
    async fn close_detached(&self, instance: F::Instance) -> Result<()> {
        let inner = Arc::clone(&self.inner);
        match tokio::spawn(async move { inner.close_instance(instance).await }).await {
            Ok(result) => result,
            Err(join_err) => Err(Error::close_with(self.inner.factory.id(), join_err)),
        }
    }

    /// Hand a checked-out instance back for reuse.
    ///
    /// Never changes the number of active instances.
    ///
    /// # Errors
    /// Returns the instance inside [`Rejected`] with `PoolClosed` after
    /// shutdown (the caller must close it), or with `Unbalanced` if the pool
    /// has no checked-out instance left to take back.
    pub fn regain(&self, instance: F::Instance) -> std::result::Result<(), Rejected<F::Instance>> {
        let inner = &*self.inner;
        {
            let mut state = inner.state.lock();
            if state.closed {
                return Err(Rejected::new(inner.closed_error(), instance));
            }
            if state.available.len() >= state.active {
                let error = Error::Unbalanced {
                    pool: inner.config.name.clone(),
                    active: state.active,
                    available: state.available.len(),
                };
                return Err(Rejected::new(error, instance));
            }
            state.available.push_back(instance);
        }
        inner.notify.notify_one();
        inner.stats.lock().regains += 1;
        tracing::trace!(pool = %inner.config.name, "Regained resource");
        Ok(())
    }

    /// Permanently remove a checked-out instance and close it.
    ///
    /// The active count drops by one and one waiter is woken before the
    /// instance is closed, whether or not closing succeeds.
    ///
    /// # Errors
    /// - The close error, if closing fails.
    /// - `PoolClosed` after shutdown; the instance is still closed and
    ///   accounted for.
    /// - `Unbalanced` if the pool has no checked-out instance; the instance
    ///   is still closed.
    pub async fn retire(&self, instance: F::Instance) -> Result<()> {
        let inner = &*self.inner;
        let outcome = {
            let mut state = inner.state.lock();
            if state.active > state.available.len() {
                state.active -= 1;
                Ok(state.closed)
            } else {
                Err(Error::Unbalanced {
                    pool: inner.config.name.clone(),
                    active: state.active,
                    available: state.available.len(),
                })
            }
        };

        let closed = match outcome {
            Ok(closed) => {
                inner.notify.notify_one();
                closed
            }
            Err(unbalanced) => {
                let _ = self.close_detached(instance).await;
                return Err(unbalanced);
            }
        };

        inner.stats.lock().retirements += 1;
        tracing::debug!(
            pool = %inner.config.name,
            resource_id = inner.factory.id(),
            "Retiring resource"
        );

        let result = self.close_detached(instance).await;
        if closed {
            return Err(inner.closed_error());
        }
        result
    }

    /// Shut the pool down.
    ///
    /// Marks the pool closed, wakes every waiting acquirer, and closes every
    /// idle instance. Checked-out instances stay with their holders;
    /// `regain` refuses them from now on and `retire` closes them.
    ///
    /// # Errors
    /// - `PoolClosed` if the pool was already shut down (nothing happens).
    /// - `Shutdown` listing every close failure; draining continues past
    ///   failures and the pool is closed regardless.
    pub async fn shutdown(&self) -> Result<()> {
        let inner = &*self.inner;
        let (drained, checked_out) = {
            let mut state = inner.state.lock();
            if state.closed {
                return Err(inner.closed_error());
            }
            state.closed = true;
            let drained: Vec<_> = state.available.drain(..).collect();
            state.active -= drained.len();
            (drained, state.active)
        };
        inner.notify.notify_waiters();

        tracing::debug!(
            pool = %inner.config.name,
            drained = drained.len(),
            checked_out,
            "Shutting down pool"
        );

        let mut failures = Vec::new();
        for instance in drained {
            if let Err(err) = self.close_detached(instance).await {
                failures.push(err);
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::Shutdown {
                pool: inner.config.name.clone(),
                failures,
            })
        }
    }
}

impl<F: Factory, V> Pool<F, V> {
    /// Get current pool statistics.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.inner.stats.lock().clone()
    }

    /// Get the current accounting snapshot.
    #[must_use]
    pub fn state(&self) -> PoolState {
        let state = self.inner.state.lock();
        PoolState {
            capacity: self.inner.config.capacity,
            active: state.active,
            available: state.available.len(),
            closed: state.closed,
        }
    }

    /// Whether the pool has been shut down.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// The fixed capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.config.capacity
    }

    /// The pool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    /// The factory this pool builds instances with.
    #[must_use]
    pub fn factory(&self) -> &F {
        &self.inner.factory
    }
}
