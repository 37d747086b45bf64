//! Master half of the bootstrap exchange.

use std::{path::PathBuf, time::Duration};

use anyhow::{bail, Context, Result};
use protocol::{Manifest, MasterConnection, MasterMsg, SessionError, WorkerMsg};
use tokio::{
    fs,
    io::{AsyncRead, AsyncWrite},
};
use tracing::debug;
use utils::log_if_err;

use crate::SchedulerConfig;

/// The directories and files every worker must hold, relative to `root`.
#[derive(Debug, Clone, Default)]
pub struct RequiredFiles {
    pub root: PathBuf,
    pub dirs: Vec<String>,
    pub files: Vec<String>,
}

impl From<&SchedulerConfig> for RequiredFiles {
    fn from(cfg: &SchedulerConfig) -> Self {
        Self {
            root: cfg.root.clone(),
            dirs: cfg.required_dirs.clone(),
            files: cfg.required_files.clone(),
        }
    }
}

impl RequiredFiles {
    /// Stats every required file. Fails if any of them cannot be read.
    pub async fn manifest(&self) -> Result<Manifest> {
        let mut files = Vec::with_capacity(self.files.len());
        for name in &self.files {
            let path = self.root.join(name);
            let meta = fs::metadata(&path)
                .await
                .with_context(|| format!("stat required file {}", path.display()))?;
            files.push((name.clone(), meta.len()));
        }
        Ok(Manifest {
            dirs: self.dirs.clone(),
            files,
        })
    }

    async fn send_files<S>(&self, conn: &mut MasterConnection<S>) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        conn.send(MasterMsg::Count(self.dirs.len() as u64)).await?;
        for dir in &self.dirs {
            conn.send(MasterMsg::DirName(dir.clone())).await?;
        }

        conn.send(MasterMsg::Count(self.files.len() as u64)).await?;
        for name in &self.files {
            let path = self.root.join(name);
            let content = fs::read(&path)
                .await
                .with_context(|| format!("read required file {}", path.display()))?;
            conn.send(MasterMsg::FileName(name.clone())).await?;
            conn.send(MasterMsg::FileContent(content)).await?;
        }
        Ok(())
    }
}

/// Runs the handshake on a fresh connection and returns the capacity the
/// worker declared.
///
/// On a protocol violation the worker is told `Unexpected` before the error
/// is returned; the caller closes the connection by dropping it.
pub async fn bootstrap<S>(
    conn: &mut MasterConnection<S>,
    required: &RequiredFiles,
    timeout: Duration,
) -> Result<u32>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let manifest = required.manifest().await?;
    conn.send(MasterMsg::Manifest(manifest)).await?;

    let mut response = conn.recv_timeout(timeout).await?;
    if response.is_download() {
        debug!("sending required files");
        required.send_files(conn).await?;
        response = conn.recv_timeout(timeout).await?;
    }

    let reason = match response {
        WorkerMsg::GetWork { capacity } if capacity >= 1 => return Ok(capacity),
        WorkerMsg::GetWork { .. } => SessionError::InvalidCapacity,
        other => SessionError::Unexpected(other.kind().to_string()),
    };
    log_if_err!(
        conn.send(MasterMsg::Unexpected(reason.to_string())).await,
        "send unexpected notice"
    );
    bail!(reason)
}
