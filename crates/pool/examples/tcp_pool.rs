//! Pool of TCP connections to a local echo server.
//!
//! Run with `RUST_LOG=nebula_pool=debug cargo run --example tcp_pool` to see
//! the pool's structured logs.

use std::net::SocketAddr;
use std::time::Duration;

use nebula_pool::{
    Closable, Context, Error, Factory, IdleTimeout, Pool, PoolConfig, Result, Timestamped,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::Instant;
use tracing_subscriber::EnvFilter;

struct EchoConn {
    stream: TcpStream,
    last_active: Instant,
}

impl EchoConn {
    async fn echo(&mut self, payload: &[u8]) -> Result<Vec<u8>> {
        let io = |e: std::io::Error| Error::create_with("echo", e);
        self.stream.write_all(payload).await.map_err(io)?;
        let mut buf = vec![0; payload.len()];
        self.stream.read_exact(&mut buf).await.map_err(io)?;
        self.last_active = Instant::now();
        Ok(buf)
    }
}

impl Closable for EchoConn {
    async fn close(mut self) -> Result<()> {
        self.stream
            .shutdown()
            .await
            .map_err(|e| Error::close_with("echo", e))
    }
}

impl Timestamped for EchoConn {
    fn last_active(&self) -> Instant {
        self.last_active
    }
}

struct EchoFactory {
    addr: SocketAddr,
}

impl Factory for EchoFactory {
    type Instance = EchoConn;

    fn id(&self) -> &str {
        "echo"
    }

    async fn create(&self, _ctx: &Context) -> Result<EchoConn> {
        let stream = TcpStream::connect(self.addr)
            .await
            .map_err(|e| Error::create_with("echo", e))?;
        tracing::info!(local = ?stream.local_addr().ok(), "connected");
        Ok(EchoConn {
            stream,
            last_active: Instant::now(),
        })
    }
}

async fn serve(listener: TcpListener) {
    loop {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        tokio::spawn(async move {
            let mut buf = [0u8; 1024];
            while let Ok(n) = socket.read(&mut buf).await {
                if n == 0 || socket.write_all(&buf[..n]).await.is_err() {
                    break;
                }
            }
        });
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .map_err(|e| Error::create_with("echo", e))?;
    let addr = listener
        .local_addr()
        .map_err(|e| Error::create_with("echo", e))?;
    tokio::spawn(serve(listener));

    let config = PoolConfig::with_capacity(4)
        .named("echo")
        .acquire_timeout(Duration::from_secs(2));
    let pool = Pool::with_validity(
        EchoFactory { addr },
        IdleTimeout::new(Duration::from_secs(30)),
        config,
    )
    .await?;

    let mut tasks = tokio::task::JoinSet::new();
    for worker in 0..16u32 {
        let pool = pool.clone();
        tasks.spawn(async move {
            let mut conn = pool.get(&Context::new()).await?;
            let reply = conn.echo(format!("hello from {worker}").as_bytes()).await;
            match reply {
                Ok(reply) => {
                    tracing::info!(worker, reply = %String::from_utf8_lossy(&reply), "echoed");
                    Ok(())
                }
                Err(err) => {
                    // A broken connection is not worth keeping.
                    let _ = conn.retire().await;
                    Err(err)
                }
            }
        });
    }
    while let Some(joined) = tasks.join_next().await {
        if let Ok(Err(err)) = joined {
            tracing::warn!(error = %err, "worker failed");
        }
    }

    tracing::info!(stats = ?pool.stats(), state = ?pool.state(), "done");
    pool.shutdown().await
}
