//! Worker half of a session once bootstrap is done: wait for instructions,
//! run batches, send results back.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use protocol::{
    FunctionRef, ItemResult, MasterMsg, SessionError, WorkItem, WorkerConnection, WorkerMsg,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use crate::functions::{FunctionRegistry, RemoteFn};

/// Remembers the last resolved function so repeated batches for the same
/// function skip the lookup.
pub struct Resolver<'a> {
    registry: &'a FunctionRegistry,
    cached: Option<(FunctionRef, RemoteFn)>,
    lookups: usize,
}

impl<'a> Resolver<'a> {
    pub fn new(registry: &'a FunctionRegistry) -> Self {
        Self {
            registry,
            cached: None,
            lookups: 0,
        }
    }

    pub fn resolve(&mut self, name: &FunctionRef) -> Result<RemoteFn> {
        if let Some((cached, f)) = &self.cached {
            if cached == name {
                return Ok(f.clone());
            }
        }

        self.lookups += 1;
        let f = self.registry.get(name)?;
        debug!(function = %name, "resolved function");
        self.cached = Some((name.clone(), f.clone()));
        Ok(f)
    }

    /// Registry lookups performed so far.
    pub fn lookups(&self) -> usize {
        self.lookups
    }
}

/// Runs instructions until the master sends `End`.
///
/// Idle timeouts while waiting for an instruction are retried. Any other
/// failure ends the session with an error.
pub async fn serve<S>(
    conn: &mut WorkerConnection<S>,
    registry: &FunctionRegistry,
    idle_timeout: Duration,
    frame_timeout: Duration,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut resolver = Resolver::new(registry);
    let mut batches = 0usize;

    loop {
        let order = match conn.recv_timeout(idle_timeout).await {
            Ok(order) => order,
            Err(err) if SessionError::is_timeout(&err) => {
                debug!("no task from master");
                continue;
            }
            Err(err) => return Err(err),
        };

        match order {
            MasterMsg::End => {
                info!(batches, "master sent end");
                return Ok(());
            }
            MasterMsg::Compute => {}
            other => {
                warn!(kind = other.kind(), "unexpected message from master");
                bail!(SessionError::Unexpected(other.kind().to_string()));
            }
        }

        let batch = match conn.recv_timeout(frame_timeout).await? {
            MasterMsg::Batch(batch) => batch,
            other => bail!(SessionError::Unexpected(other.kind().to_string())),
        };
        let name = match conn.recv_timeout(frame_timeout).await? {
            MasterMsg::Function(name) => name,
            other => bail!(SessionError::Unexpected(other.kind().to_string())),
        };
        debug!(function = %name, len = batch.len(), "received batch");

        let f = resolver.resolve(&name)?;
        let results = run_batch(f, batch).await?;
        conn.send(WorkerMsg::Results(results)).await?;
        batches += 1;
    }
}

/// Applies `f` off the async runtime and pairs each result with its id.
async fn run_batch(f: RemoteFn, batch: Vec<WorkItem>) -> Result<Vec<ItemResult>> {
    let (ids, args): (Vec<_>, Vec<_>) = batch.into_iter().map(|w| (w.id, w.arg)).unzip();
    let expected = args.len();

    let results = tokio::task::spawn_blocking(move || f(args))
        .await
        .context("batch function panicked")??;

    if results.len() != expected {
        bail!(SessionError::ResultCountMismatch {
            expected,
            returned: results.len(),
        });
    }

    Ok(ids
        .into_iter()
        .zip(results)
        .map(|(id, result)| ItemResult { id, result })
        .collect())
}
