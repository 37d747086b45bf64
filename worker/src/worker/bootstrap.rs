//! Worker half of the bootstrap exchange.

use std::{
    io::ErrorKind,
    path::{Component, Path, PathBuf},
    time::Duration,
};

use anyhow::{bail, Context, Result};
use protocol::{Manifest, MasterMsg, SessionError, WorkerConnection, WorkerMsg};
use tokio::{
    fs,
    io::{AsyncRead, AsyncWrite},
};
use tracing::{debug, info};

/// Receives the manifest, downloads the file set if the staging directory
/// does not match it, then declares `capacity`.
///
/// Returns whether a download happened.
pub async fn bootstrap<S>(
    conn: &mut WorkerConnection<S>,
    staging: &Path,
    capacity: u32,
    timeout: Duration,
) -> Result<bool>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if capacity == 0 {
        bail!(SessionError::InvalidCapacity);
    }

    let manifest = match conn.recv_timeout(timeout).await? {
        MasterMsg::Manifest(m) => m,
        other => bail!(SessionError::Unexpected(other.kind().to_string())),
    };
    debug!(dirs = ?manifest.dirs, files = ?manifest.files, "received manifest");

    let downloaded = if has_all_files(staging, &manifest).await {
        false
    } else {
        info!(staging = %staging.display(), "local files incomplete, downloading");
        conn.send(WorkerMsg::Download).await?;
        download(conn, staging, timeout).await?;
        info!("download complete");
        true
    };

    conn.send(WorkerMsg::GetWork { capacity }).await?;
    Ok(downloaded)
}

/// Every directory exists and every file exists with exactly the advertised
/// size. Unsafe names never count as present.
pub async fn has_all_files(staging: &Path, manifest: &Manifest) -> bool {
    for dir in &manifest.dirs {
        let Ok(path) = staged_path(staging, dir) else {
            return false;
        };
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => {}
            _ => {
                debug!(?path, "directory missing");
                return false;
            }
        }
    }

    for (name, size) in &manifest.files {
        let Ok(path) = staged_path(staging, name) else {
            return false;
        };
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() && meta.len() == *size => {}
            Ok(meta) => {
                debug!(?path, expected = size, actual = meta.len(), "file has wrong size");
                return false;
            }
            Err(_) => {
                debug!(?path, "file missing");
                return false;
            }
        }
    }
    true
}

async fn download<S>(conn: &mut WorkerConnection<S>, staging: &Path, timeout: Duration) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match fs::remove_dir_all(staging).await {
        Ok(()) => {}
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => return Err(err).context("clear staging directory"),
    }
    fs::create_dir_all(staging)
        .await
        .context("create staging directory")?;

    let dir_count = recv_count(conn, timeout).await?;
    for _ in 0..dir_count {
        let name = match conn.recv_timeout(timeout).await? {
            MasterMsg::DirName(name) => name,
            other => bail!(SessionError::Unexpected(other.kind().to_string())),
        };
        let path = staged_path(staging, &name)?;
        fs::create_dir_all(&path)
            .await
            .with_context(|| format!("create directory {}", path.display()))?;
    }

    let file_count = recv_count(conn, timeout).await?;
    for _ in 0..file_count {
        let name = match conn.recv_timeout(timeout).await? {
            MasterMsg::FileName(name) => name,
            other => bail!(SessionError::Unexpected(other.kind().to_string())),
        };
        let content = match conn.recv_timeout(timeout).await? {
            MasterMsg::FileContent(content) => content,
            other => bail!(SessionError::Unexpected(other.kind().to_string())),
        };
        let path = staged_path(staging, &name)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, &content)
            .await
            .with_context(|| format!("write {}", path.display()))?;
        debug!(?path, len = content.len(), "file written");
    }
    Ok(())
}

async fn recv_count<S>(conn: &mut WorkerConnection<S>, timeout: Duration) -> Result<u64>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match conn.recv_timeout(timeout).await? {
        MasterMsg::Count(n) => Ok(n),
        MasterMsg::Unexpected(reason) => bail!(SessionError::Unexpected(reason)),
        other => bail!(SessionError::Unexpected(other.kind().to_string())),
    }
}

/// Joins a name sent by the master onto the staging directory. Only plain
/// relative names are accepted.
pub fn staged_path(staging: &Path, name: &str) -> Result<PathBuf> {
    let rel = Path::new(name);
    let safe = !name.is_empty()
        && rel
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if !safe {
        bail!(SessionError::UnsafePath(name.to_string()));
    }
    Ok(staging.join(rel))
}
