use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use protocol::{Connection, WorkerConnection};
use serde::Deserialize;
use tokio::{net::TcpStream, time};
use tracing::{error, info};

use crate::functions::FunctionRegistry;

pub mod bootstrap;
pub mod execute;

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct WorkerConfig {
    pub master_addr: String,
    pub staging_dir: PathBuf,
    /// Items accepted per batch. Defaults to the available parallelism.
    pub capacity: Option<u32>,
    pub idle_timeout_ms: u64,
    pub handshake_timeout_ms: u64,
    pub reconnect: bool,
    pub log: utils::logger::Config,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            master_addr: "127.0.0.1:45054".to_string(),
            staging_dir: PathBuf::from("./downloaded"),
            capacity: None,
            idle_timeout_ms: 1000,
            handshake_timeout_ms: 10_000,
            reconnect: false,
            log: Default::default(),
        }
    }
}

impl WorkerConfig {
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        serde_json::from_str(&raw).context("parse worker config")
    }

    pub fn capacity(&self) -> u32 {
        self.capacity.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get() as u32)
                .unwrap_or(1)
        })
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

/// Connects, retrying with a growing delay until the master answers.
pub async fn connect_until_success(url: &str) -> WorkerConnection {
    let mut wait = Duration::from_secs(1);
    let max = Duration::from_secs(20);

    loop {
        match TcpStream::connect(url).await {
            Ok(tcp) => {
                info!(%url, "connected to master");
                break Connection::new(tcp);
            }
            Err(err) => {
                error!(%url, %err, "connection error");
                time::sleep(wait).await;
                wait = (wait + Duration::from_secs(2)).min(max);
            }
        }
    }
}

/// One session: bootstrap, then serve batches until the master sends `End`.
pub async fn run_session(
    conn: &mut WorkerConnection,
    cfg: &WorkerConfig,
    registry: &FunctionRegistry,
) -> Result<()> {
    let capacity = cfg.capacity();
    bootstrap::bootstrap(conn, &cfg.staging_dir, capacity, cfg.handshake_timeout())
        .await
        .context("bootstrap")?;
    info!(capacity, "requested work");

    execute::serve(
        conn,
        registry,
        cfg.idle_timeout(),
        cfg.handshake_timeout(),
    )
    .await
}

/// Runs sessions until one ends cleanly, or the first one fails when
/// `reconnect` is off.
pub async fn run(cfg: &WorkerConfig, registry: &FunctionRegistry) -> Result<()> {
    loop {
        let mut conn = connect_until_success(&cfg.master_addr).await;
        match run_session(&mut conn, cfg, registry).await {
            Ok(()) => return Ok(()),
            Err(err) if cfg.reconnect => {
                error!(?err, "worker session failed, reconnecting");
                time::sleep(Duration::from_secs(10)).await;
            }
            Err(err) => return Err(err),
        }
    }
}
