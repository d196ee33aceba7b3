//! # Nebula Pool
//!
//! A bounded, concurrent pool of expensive, closable resources such as
//! network connections.
//!
//! A [`Pool`] pre-builds a fixed number of instances through a [`Factory`],
//! hands them out with [`Pool::acquire`], takes them back with
//! [`Pool::regain`] and removes broken ones with [`Pool::retire`]. It never
//! holds more than its capacity, retires instances that fail the configured
//! [`Validity`] predicate before handing them out, and wakes blocked callers
//! whenever an instance or a slot frees up.
//!
//! ```no_run
//! use nebula_pool::{Closable, Context, Factory, Pool, PoolConfig, Result};
//!
//! struct Session(u32);
//!
//! impl Closable for Session {
//!     async fn close(self) -> Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! struct Sessions;
//!
//! impl Factory for Sessions {
//!     type Instance = Session;
//!
//!     fn id(&self) -> &str {
//!         "session"
//!     }
//!
//!     async fn create(&self, _ctx: &Context) -> Result<Session> {
//!         Ok(Session(7))
//!     }
//! }
//!
//! # async fn run() -> Result<()> {
//! let pool = Pool::new(Sessions, PoolConfig::with_capacity(4)).await?;
//! let session = pool.acquire(&Context::new()).await?;
//! pool.regain(session)?;
//! pool.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod guard;
pub mod pool;
pub mod resource;
pub mod validity;

pub use config::PoolConfig;
pub use context::Context;
pub use error::{Error, Rejected, Result};
pub use guard::Pooled;
pub use pool::{Pool, PoolState, PoolStats};
pub use resource::{Closable, Factory};
pub use validity::{
    AlwaysValid, IdleTimeout, Liveness, LivenessSignal, SignalPolicy, Timestamped, Validity,
};
pub use tokio_util::sync::CancellationToken;
