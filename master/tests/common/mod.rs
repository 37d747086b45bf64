#![allow(dead_code)]

use std::{net::SocketAddr, path::Path, time::Duration};

use master::{Scheduler, SchedulerConfig};
use protocol::{
    Connection, FunctionRef, ItemId, ItemResult, MasterMsg, WorkItem, WorkerConnection, WorkerMsg,
};
use tokio::net::TcpStream;

pub const POLL: Duration = Duration::from_millis(50);

pub fn config(root: &Path) -> SchedulerConfig {
    SchedulerConfig {
        bind: "127.0.0.1:0".to_string(),
        root: root.to_path_buf(),
        handshake_timeout_ms: 1000,
        bootstrap_timeout_ms: 5000,
        poll_interval_ms: POLL.as_millis() as u64,
        shutdown_grace_ms: 1000,
        ..Default::default()
    }
}

pub async fn wait_for_workers(scheduler: &Scheduler, n: usize) {
    for _ in 0..200 {
        if scheduler.worker_count() >= n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {n} workers, have {}", scheduler.worker_count());
}

pub fn args(values: &[&str]) -> Vec<Vec<u8>> {
    values.iter().map(|v| v.as_bytes().to_vec()).collect()
}

pub fn upper() -> FunctionRef {
    FunctionRef::new("text", "upper")
}

/// A worker driven by hand, speaking the wire protocol directly.
pub struct FakeWorker {
    pub conn: WorkerConnection,
    pub addr: SocketAddr,
}

impl FakeWorker {
    /// Connects and completes bootstrap without downloading anything.
    pub async fn connect(master: SocketAddr, capacity: u32) -> Self {
        let tcp = TcpStream::connect(master).await.unwrap();
        let addr = tcp.local_addr().unwrap();
        let mut conn: WorkerConnection = Connection::new(tcp);
        assert!(conn.recv().await.unwrap().is_manifest());
        conn.send(WorkerMsg::GetWork { capacity }).await.unwrap();
        Self { conn, addr }
    }

    /// The next `Compute` batch, or `None` once the master ends the session.
    pub async fn next_batch(&mut self) -> Option<(Vec<WorkItem>, FunctionRef)> {
        match self.conn.recv().await.ok()? {
            MasterMsg::Compute => {}
            MasterMsg::End => return None,
            other => panic!("unexpected {other:?}"),
        }
        let MasterMsg::Batch(batch) = self.conn.recv().await.unwrap() else {
            panic!("expected batch");
        };
        let MasterMsg::Function(function) = self.conn.recv().await.unwrap() else {
            panic!("expected function");
        };
        Some((batch, function))
    }

    pub async fn reply_upper(&mut self, batch: &[WorkItem]) {
        let results = batch
            .iter()
            .map(|w| ItemResult {
                id: w.id,
                result: w.arg.to_ascii_uppercase(),
            })
            .collect();
        self.conn.send(WorkerMsg::Results(results)).await.unwrap();
    }

    /// Answers every batch until `End`; returns the ids of each round.
    pub async fn serve_upper(mut self) -> Vec<Vec<ItemId>> {
        let mut rounds = vec![];
        while let Some((batch, _)) = self.next_batch().await {
            rounds.push(batch.iter().map(|w| w.id).collect());
            self.reply_upper(&batch).await;
        }
        rounds
    }
}
