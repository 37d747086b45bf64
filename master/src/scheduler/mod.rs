//! Master side of the worker pool: accepts and bootstraps workers, hands out
//! batches and reconciles their results.

mod dispatch;
mod registry;

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use futures::{future::BoxFuture, stream::FuturesUnordered, FutureExt, StreamExt};
use parking_lot::Mutex;
use protocol::{
    payload::{FromPayload, ToPayload},
    Connection, FunctionRef, ItemId, ItemResult, MasterConnection, MasterMsg, Payload,
    SessionError, WorkItem, WorkerMsg,
};
use serde::{de::DeserializeOwned, Serialize};
use tokio::{
    net::{TcpListener, TcpStream},
    select,
    task::JoinHandle,
    time,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use utils::log_if_err;

use crate::{bootstrap::RequiredFiles, SchedulerConfig};
use dispatch::Cycle;
use registry::{Assignment, Registry};

pub use registry::{WorkerId, WorkerInfo};

/// Called once per completed item, from the dispatching task.
pub type ResultObserver = Box<dyn Fn(ItemId, &[u8]) + Send + Sync>;

type SharedRegistry = Arc<Mutex<Registry>>;

type InFlight = FuturesUnordered<BoxFuture<'static, Reply>>;

pub struct Scheduler {
    registry: SharedRegistry,
    local_addr: SocketAddr,
    poll_interval: Duration,
    shutdown_grace: Duration,
    stop: CancellationToken,
    accept: Option<JoinHandle<()>>,
    observer: Option<ResultObserver>,
    /// Batches still out when their cycle finished.
    in_flight: InFlight,
    cycle_no: u64,
}

impl Scheduler {
    /// Binds `cfg.bind` and starts accepting workers in the background.
    pub async fn start(cfg: &SchedulerConfig) -> Result<Self> {
        let listener = TcpListener::bind(&cfg.bind)
            .await
            .with_context(|| format!("bind {}", cfg.bind))?;
        let local_addr = listener.local_addr()?;
        info!(%local_addr, "scheduler listening");

        let registry = SharedRegistry::default();
        let stop = CancellationToken::new();
        let accept = tokio::spawn(accept_loop(
            listener,
            registry.clone(),
            Arc::new(RequiredFiles::from(cfg)),
            HandshakeLimits {
                per_frame: cfg.handshake_timeout(),
                whole: cfg.bootstrap_timeout(),
            },
            stop.clone(),
        ));

        Ok(Self {
            registry,
            local_addr,
            poll_interval: cfg.poll_interval(),
            shutdown_grace: cfg.shutdown_grace(),
            stop,
            accept: Some(accept),
            observer: None,
            in_flight: InFlight::new(),
            cycle_no: 0,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn worker_count(&self) -> usize {
        self.registry.lock().len()
    }

    pub fn idle_worker_count(&self) -> usize {
        self.registry.lock().idle_len()
    }

    /// Registered workers in registration order.
    pub fn workers(&self) -> Vec<WorkerInfo> {
        self.registry.lock().info()
    }

    pub fn set_result_observer<F>(&mut self, f: F)
    where
        F: Fn(ItemId, &[u8]) + Send + Sync + 'static,
    {
        self.observer = Some(Box::new(f));
    }

    /// Stops accepting new workers. Registered workers stay usable.
    pub fn stop_accepting(&self) {
        self.stop.cancel();
    }

    /// Runs `function` over every argument on the registered workers and
    /// returns one `(id, result)` per argument, in arrival order. Ids are the
    /// argument's position in `args`.
    ///
    /// Blocks until every item has a result; lost workers' items are handed
    /// to other workers.
    pub async fn dispatch(
        &mut self,
        args: Vec<Payload>,
        function: &FunctionRef,
    ) -> Vec<(ItemId, Payload)> {
        self.cycle_no += 1;
        let cycle_no = self.cycle_no;
        let mut cycle = Cycle::new(args);
        let mut in_flight = std::mem::take(&mut self.in_flight);

        // With nothing carried over, any busy worker belongs to a dispatch
        // that was dropped mid-flight and will never be answered.
        if in_flight.is_empty() {
            let orphans = self.registry.lock().purge_orphans();
            if orphans > 0 {
                warn!(orphans, "dropped workers left busy by an abandoned dispatch");
            }
        }
        info!(items = cycle.pending_len(), %function, "dispatch started");

        while !cycle.is_done() {
            if cycle.refill_if_exhausted() {
                debug!(pending = cycle.pending_len(), "cursor refilled");
            }

            let assignments = {
                let mut registry = self.registry.lock();
                cycle.assign(&mut *registry)
            };
            for Assignment { worker, conn, ids } in assignments {
                let batch = cycle.batch(&ids);
                debug!(%worker, len = batch.len(), "sending batch");
                in_flight.push(
                    exchange(cycle_no, worker, conn, ids, batch, function.clone()).boxed(),
                );
            }

            if in_flight.is_empty() {
                debug!("no worker available");
                time::sleep(self.poll_interval).await;
                continue;
            }

            let mut replies = match time::timeout(self.poll_interval, in_flight.next()).await {
                Ok(Some(reply)) => vec![reply],
                Ok(None) | Err(_) => continue,
            };
            while let Some(Some(reply)) = in_flight.next().now_or_never() {
                replies.push(reply);
            }

            self.reconcile(&mut cycle, replies);
        }

        if !in_flight.is_empty() {
            debug!(outstanding = in_flight.len(), "batches still out, results will be discarded");
        }
        self.in_flight = in_flight;

        let results = cycle.into_results();
        info!(results = results.len(), "dispatch finished");
        results
    }

    /// Typed front end to [`dispatch`](Self::dispatch): arguments and results
    /// travel as bincode blobs.
    pub async fn dispatch_typed<A, R>(
        &mut self,
        args: &[A],
        function: &FunctionRef,
    ) -> Result<Vec<(ItemId, R)>>
    where
        A: Serialize,
        R: DeserializeOwned,
    {
        let payloads = args
            .iter()
            .map(|a| a.to_payload())
            .collect::<Result<Vec<_>>>()?;
        self.dispatch(payloads, function)
            .await
            .into_iter()
            .map(|(id, blob)| -> Result<(ItemId, R)> {
                Ok((id, R::from_payload(&blob).context("decode result")?))
            })
            .collect()
    }

    fn reconcile(&self, cycle: &mut Cycle, replies: Vec<Reply>) {
        let mut outcomes = Vec::with_capacity(replies.len());
        {
            let mut registry = self.registry.lock();
            for reply in replies {
                let Reply {
                    cycle_no,
                    worker,
                    conn,
                    ids,
                    outcome,
                } = reply;
                let current = cycle_no == self.cycle_no;
                match outcome {
                    Ok(results) => {
                        registry.release(worker, conn);
                        if current {
                            outcomes.push((worker, ids, Some(results)));
                        } else {
                            debug!(%worker, "discarded reply from an earlier cycle");
                        }
                    }
                    Err(err) => {
                        let addr = registry.remove(worker).map(|w| w.addr);
                        warn!(%worker, ?addr, ?err, "worker lost");
                        drop(conn);
                        if current {
                            outcomes.push((worker, ids, None));
                        }
                    }
                }
            }
        }

        for (worker, ids, results) in outcomes {
            match results {
                Some(results) => {
                    let done = cycle.complete(&ids, results);
                    if let Some(observer) = &self.observer {
                        for (id, result) in cycle.latest(done.len()) {
                            observer(*id, result);
                        }
                    }
                    info!(%worker, received = done.len(), pending = cycle.pending_len(), "received computed data");
                }
                None => {
                    let requeued = cycle.requeue(&ids);
                    if requeued > 0 {
                        info!(%worker, requeued, "requeued items of lost worker");
                    }
                }
            }
        }
    }

    /// Stops accepting, tells every worker to end and closes it.
    ///
    /// Workers still holding a batch get until `shutdown_grace` to answer.
    /// Those that do are ended like the rest; the others are closed without
    /// `End`.
    pub async fn shutdown(mut self) -> Result<()> {
        self.stop.cancel();
        if let Some(accept) = self.accept.take() {
            accept.await.context("accept loop panicked")?;
        }

        // batches left over from the last cycle get until the grace deadline
        // to come back so their workers can be ended cleanly
        let deadline = time::Instant::now() + self.shutdown_grace;
        let mut leftovers = std::mem::take(&mut self.in_flight);
        while !leftovers.is_empty() {
            let Ok(Some(reply)) = time::timeout_at(deadline, leftovers.next()).await else {
                break;
            };
            if reply.outcome.is_ok() {
                self.registry.lock().release(reply.worker, reply.conn);
            }
        }
        if !leftovers.is_empty() {
            warn!(
                outstanding = leftovers.len(),
                "closing workers whose batch did not come back in time"
            );
        }
        drop(leftovers);

        let workers = self.registry.lock().drain();
        for (worker, slot) in workers {
            if let Some(mut conn) = slot.conn {
                log_if_err!(conn.send(MasterMsg::End).await, "send end");
                debug!(%worker, "worker ended");
            }
        }
        info!("scheduler shut down");
        Ok(())
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

struct Reply {
    cycle_no: u64,
    worker: WorkerId,
    conn: MasterConnection,
    ids: Vec<ItemId>,
    outcome: Result<Vec<ItemResult>>,
}

/// Sends one batch and waits for its answer. The connection comes back with
/// the reply either way.
async fn exchange(
    cycle_no: u64,
    worker: WorkerId,
    mut conn: MasterConnection,
    ids: Vec<ItemId>,
    batch: Vec<WorkItem>,
    function: FunctionRef,
) -> Reply {
    let outcome = send_batch(&mut conn, batch, function).await;
    Reply {
        cycle_no,
        worker,
        conn,
        ids,
        outcome,
    }
}

async fn send_batch(
    conn: &mut MasterConnection,
    batch: Vec<WorkItem>,
    function: FunctionRef,
) -> Result<Vec<ItemResult>> {
    conn.send(MasterMsg::Compute).await?;
    conn.send(MasterMsg::Batch(batch)).await?;
    conn.send(MasterMsg::Function(function)).await?;
    match conn.recv().await? {
        WorkerMsg::Results(results) => Ok(results),
        other => bail!(SessionError::Unexpected(other.kind().to_string())),
    }
}

#[derive(Debug, Clone, Copy)]
struct HandshakeLimits {
    per_frame: Duration,
    whole: Duration,
}

async fn accept_loop(
    listener: TcpListener,
    registry: SharedRegistry,
    required: Arc<RequiredFiles>,
    limits: HandshakeLimits,
    stop: CancellationToken,
) {
    loop {
        let (tcp, addr) = select! {
            _ = stop.cancelled() => break,
            res = listener.accept() => match res {
                Ok(accepted) => accepted,
                Err(err) => {
                    warn!(%err, "accept failed");
                    time::sleep(Duration::from_millis(100)).await;
                    continue;
                }
            },
        };
        debug!(%addr, "accepted connection");

        tokio::spawn(register(
            tcp,
            addr,
            registry.clone(),
            required.clone(),
            limits,
            stop.clone(),
        ));
    }
    info!("accept loop stopped");
}

/// Bootstraps one connection and adds it to the registry. Failures only
/// cost this connection.
async fn register(
    tcp: TcpStream,
    addr: SocketAddr,
    registry: SharedRegistry,
    required: Arc<RequiredFiles>,
    limits: HandshakeLimits,
    stop: CancellationToken,
) {
    let mut conn = Connection::new(tcp);
    let handshake = crate::bootstrap::bootstrap(&mut conn, &required, limits.per_frame);
    let capacity = match time::timeout(limits.whole, handshake).await {
        Ok(Ok(capacity)) => capacity,
        Ok(Err(err)) => {
            warn!(%addr, ?err, "bootstrap failed");
            return;
        }
        Err(_) => {
            warn!(%addr, "bootstrap did not finish in time, dropping connection");
            return;
        }
    };

    let rejected = {
        let mut registry = registry.lock();
        if stop.is_cancelled() {
            Some(conn)
        } else {
            let worker = registry.insert(addr, capacity, conn);
            info!(%worker, %addr, capacity, "worker added");
            None
        }
    };
    if let Some(mut conn) = rejected {
        debug!(%addr, "scheduler stopping, ending late worker");
        log_if_err!(conn.send(MasterMsg::End).await, "send end");
    }
}
