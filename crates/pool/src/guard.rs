//! RAII handle for pooled instances

use crate::error::Result;
use crate::pool::Pool;
use crate::resource::Factory;
use crate::validity::{AlwaysValid, Validity};

/// An instance checked out of a [`Pool`].
///
/// Dropping the handle regains the instance. If the pool was shut down in
/// the meantime, the instance is retired on the current tokio runtime
/// instead, which closes it. Use [`retire`](Self::retire) to remove a broken
/// instance and [`into_inner`](Self::into_inner) to take it out of the
/// handle.
pub struct Pooled<F: Factory, V: Validity<F::Instance> = AlwaysValid> {
    instance: Option<F::Instance>,
    pool: Pool<F, V>,
}

impl<F: Factory, V: Validity<F::Instance>> Pooled<F, V> {
    pub(crate) fn new(instance: F::Instance, pool: Pool<F, V>) -> Self {
        Self {
            instance: Some(instance),
            pool,
        }
    }

    /// Permanently remove the instance from the pool and close it.
    pub async fn retire(mut self) -> Result<()> {
        match self.instance.take() {
            Some(instance) => self.pool.retire(instance).await,
            None => Ok(()),
        }
    }

    /// Take the instance out of the handle without regaining it.
    ///
    /// The instance still counts against the pool's capacity; the caller is
    /// responsible for passing it to [`Pool::regain`] or [`Pool::retire`].
    #[must_use]
    pub fn into_inner(mut self) -> F::Instance {
        self.instance.take().expect("pooled instance used after release")
    }
}

impl<F: Factory, V: Validity<F::Instance>> std::ops::Deref for Pooled<F, V> {
    type Target = F::Instance;

    fn deref(&self) -> &F::Instance {
        self.instance
            .as_ref()
            .expect("pooled instance used after release")
    }
}

impl<F: Factory, V: Validity<F::Instance>> std::ops::DerefMut for Pooled<F, V> {
    fn deref_mut(&mut self) -> &mut F::Instance {
        self.instance
            .as_mut()
            .expect("pooled instance used after release")
    }
}

impl<F: Factory, V: Validity<F::Instance>> Drop for Pooled<F, V> {
    fn drop(&mut self) {
        let Some(instance) = self.instance.take() else {
            return;
        };
        let Err(rejected) = self.pool.regain(instance) else {
            return;
        };

        let instance = rejected.into_inner();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let pool = self.pool.clone();
                drop(handle.spawn(async move {
                    // The pool refused the instance, so retiring reports that
                    // refusal; the instance is closed either way.
                    let _ = pool.retire(instance).await;
                }));
            }
            Err(_) => {
                tracing::warn!(
                    pool = %self.pool.name(),
                    "Dropped pooled instance outside a tokio runtime, resource not closed"
                );
            }
        }
    }
}

impl<F, V> std::fmt::Debug for Pooled<F, V>
where
    F: Factory,
    F::Instance: std::fmt::Debug,
    V: Validity<F::Instance>,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pooled")
            .field("instance", &self.instance)
            .field("pool", &self.pool.name())
            .finish()
    }
}
