//! End-to-end pool scenarios: blocking hand-off, invalidation, pre-warm
//! failure and repeated shutdown.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use nebula_pool::{
    Closable, Context, Error, Factory, Liveness, LivenessSignal, Pool, PoolConfig, Result,
    SignalPolicy,
};

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Conn {
    id: u32,
    signal: LivenessSignal,
    closes: Arc<AtomicU32>,
}

impl Closable for Conn {
    async fn close(self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl Liveness for Conn {
    fn liveness(&self) -> &LivenessSignal {
        &self.signal
    }
}

/// Factory that fails on the calls whose bit is set in `fail_mask` and takes
/// `delay_ms` to build each instance.
#[derive(Default)]
struct ConnFactory {
    calls: AtomicU32,
    fail_mask: u32,
    delay_ms: AtomicU64,
    closes: Arc<AtomicU32>,
}

impl ConnFactory {
    fn failing_on(fail_mask: u32) -> Self {
        Self {
            fail_mask,
            ..Self::default()
        }
    }
}

impl Factory for ConnFactory {
    type Instance = Conn;

    fn id(&self) -> &str {
        "conn"
    }

    async fn create(&self, _ctx: &Context) -> Result<Conn> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail_mask & (1 << n) != 0 {
            return Err(Error::create("conn", format!("refused on call {n}")));
        }
        Ok(Conn {
            id: n,
            signal: LivenessSignal::new(),
            closes: Arc::clone(&self.closes),
        })
    }
}

/// Route pool logs through the test harness; `RUST_LOG=nebula_pool=debug`
/// shows them for failing tests.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn wait_for_waiters<F: Factory, V: nebula_pool::Validity<F::Instance>>(
    pool: &Pool<F, V>,
    n: usize,
) {
    while pool.stats().waiting < n {
        tokio::task::yield_now().await;
    }
}

// ---------------------------------------------------------------------------
// Scenario A: blocked acquire receives the regained instance
// ---------------------------------------------------------------------------

#[tokio::test]
async fn blocked_acquire_receives_regained_instance() {
    init_tracing();
    let pool = Pool::new(ConnFactory::default(), PoolConfig::with_capacity(2))
        .await
        .unwrap();

    let first = pool.acquire(&Context::new()).await.unwrap();
    let second = pool.acquire(&Context::new()).await.unwrap();
    assert_eq!((first.id, second.id), (0, 1));

    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.acquire(&Context::new()).await })
    };
    wait_for_waiters(&pool, 1).await;
    assert!(!waiter.is_finished(), "third acquire must block");

    pool.regain(first).unwrap();

    let third = tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .expect("blocked acquire should be woken")
        .unwrap()
        .unwrap();
    assert_eq!(third.id, 0, "waiter gets the regained instance");
    assert_eq!(pool.stats().created, 2, "no new instance constructed");
    assert_eq!(pool.stats().waiting, 0);
}

#[tokio::test(start_paused = true)]
async fn slow_construction_does_not_absorb_regain_wakeup() {
    init_tracing();
    let pool = Pool::new(ConnFactory::default(), PoolConfig::with_capacity(2))
        .await
        .unwrap();
    let x = pool.acquire(&Context::new()).await.unwrap();
    let y = pool.acquire(&Context::new()).await.unwrap();
    pool.factory().delay_ms.store(10_000, Ordering::SeqCst);

    // C blocks, is woken by the retirement and starts a slow construction.
    let builder = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.acquire(&Context::new()).await })
    };
    wait_for_waiters(&pool, 1).await;
    pool.retire(y).await.unwrap();
    while pool.factory().calls.load(Ordering::SeqCst) < 3 {
        tokio::task::yield_now().await;
    }
    assert_eq!(pool.stats().waiting, 0);

    // B blocks on a full pool while C is still building.
    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.acquire(&Context::new()).await })
    };
    wait_for_waiters(&pool, 1).await;

    pool.regain(x).unwrap();
    let conn = tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .expect("regain must wake the blocked caller, not the builder")
        .unwrap()
        .unwrap();
    assert_eq!(conn.id, 0);
    assert!(!builder.is_finished(), "builder is still inside the factory");
    assert_eq!(pool.state().available, 0);
}

// ---------------------------------------------------------------------------
// Scenario B: signalled instance is replaced on the next acquire
// ---------------------------------------------------------------------------

#[tokio::test]
async fn signalled_instance_is_replaced() {
    init_tracing();
    let factory = ConnFactory::default();
    let closes = Arc::clone(&factory.closes);
    let pool = Pool::with_validity(factory, SignalPolicy, PoolConfig::with_capacity(1))
        .await
        .unwrap();

    let conn = pool.acquire(&Context::new()).await.unwrap();
    assert_eq!(conn.id, 0);
    conn.liveness().raise();
    pool.regain(conn).unwrap();
    assert_eq!(pool.state().active, 1);

    let fresh = pool.acquire(&Context::new()).await.unwrap();
    assert_eq!(fresh.id, 1, "the dead instance is replaced");
    assert!(!fresh.liveness().is_raised());
    assert_eq!(closes.load(Ordering::SeqCst), 1, "the dead instance is closed");
    assert_eq!(pool.state().active, 1);

    let stats = pool.stats();
    assert_eq!(stats.invalidated, 1);
    assert_eq!(stats.created, 2);
}

// ---------------------------------------------------------------------------
// Scenario C: pre-warm failure closes what was built
// ---------------------------------------------------------------------------

#[tokio::test]
async fn prewarm_failure_closes_built_instances() {
    init_tracing();
    let factory = ConnFactory::failing_on(0b010);
    let closes = Arc::clone(&factory.closes);

    let err = Pool::new(factory, PoolConfig::with_capacity(3))
        .await
        .expect_err("second factory call fails");

    match err {
        Error::Create { reason, .. } => assert_eq!(reason, "refused on call 1"),
        other => panic!("expected the factory's error, got {other:?}"),
    }
    assert_eq!(closes.load(Ordering::SeqCst), 1, "first instance closed");
}

// ---------------------------------------------------------------------------
// Scenario D: second shutdown is a reported no-op
// ---------------------------------------------------------------------------

#[tokio::test]
async fn second_shutdown_reports_closed() {
    init_tracing();
    let factory = ConnFactory::default();
    let closes = Arc::clone(&factory.closes);
    let pool = Pool::new(factory, PoolConfig::with_capacity(2).named("twice"))
        .await
        .unwrap();

    pool.shutdown().await.unwrap();
    let state = pool.state();
    assert!(state.closed);
    assert_eq!(closes.load(Ordering::SeqCst), 2);

    let err = pool.shutdown().await.unwrap_err();
    assert!(matches!(err, Error::PoolClosed { ref pool } if pool == "twice"));
    assert_eq!(pool.state(), state, "second shutdown changes nothing");
    assert_eq!(closes.load(Ordering::SeqCst), 2);
}
