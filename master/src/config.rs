use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct SchedulerConfig {
    pub bind: String,
    /// Directory the required dirs and files are resolved against.
    pub root: PathBuf,
    pub required_dirs: Vec<String>,
    pub required_files: Vec<String>,
    /// Per-frame wait while bootstrapping a new connection. The wait for
    /// `GetWork` after a download also covers the worker writing the last
    /// file to disk.
    pub handshake_timeout_ms: u64,
    /// Deadline for the whole handshake, file transfer included.
    pub bootstrap_timeout_ms: u64,
    /// Longest single wait for any busy worker to answer.
    pub poll_interval_ms: u64,
    /// How long `shutdown` waits for batches still out so their workers can
    /// be sent `End`.
    pub shutdown_grace_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:45054".to_string(),
            root: PathBuf::from("."),
            required_dirs: vec![],
            required_files: vec![],
            handshake_timeout_ms: 10_000,
            bootstrap_timeout_ms: 120_000,
            poll_interval_ms: 3000,
            shutdown_grace_ms: 10_000,
        }
    }
}

impl SchedulerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        serde_json::from_str(&raw).context("parse scheduler config")
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn bootstrap_timeout(&self) -> Duration {
        Duration::from_millis(self.bootstrap_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}
