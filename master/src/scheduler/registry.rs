//! Live workers, their capacity and whether they hold a batch.

use std::{
    collections::{BTreeMap, VecDeque},
    net::SocketAddr,
};

use derive_more::{Display, From};
use protocol::{ItemId, MasterConnection};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, From)]
#[display(fmt = "worker-{}", _0)]
pub struct WorkerId(u64);

/// A registered worker as seen from outside the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerInfo {
    pub id: WorkerId,
    pub addr: SocketAddr,
    pub capacity: usize,
    pub busy: bool,
}

pub(crate) struct WorkerSlot<C> {
    pub addr: SocketAddr,
    pub capacity: usize,
    /// Set while the worker holds exactly one outstanding batch.
    pub busy: bool,
    /// Lent out to the dispatch routine while `busy`.
    pub conn: Option<C>,
}

/// A batch handed to an idle worker. The connection travels with it and is
/// given back through [`Registry::release`].
pub(crate) struct Assignment<C> {
    pub worker: WorkerId,
    pub conn: C,
    pub ids: Vec<ItemId>,
}

pub(crate) struct Registry<C = MasterConnection> {
    workers: BTreeMap<WorkerId, WorkerSlot<C>>,
    next_id: u64,
}

impl<C> Default for Registry<C> {
    fn default() -> Self {
        Self {
            workers: BTreeMap::new(),
            next_id: 0,
        }
    }
}

impl<C> Registry<C> {
    pub fn insert(&mut self, addr: SocketAddr, capacity: u32, conn: C) -> WorkerId {
        let id = WorkerId(self.next_id);
        self.next_id += 1;
        self.workers.insert(
            id,
            WorkerSlot {
                addr,
                capacity: capacity.max(1) as usize,
                busy: false,
                conn: Some(conn),
            },
        );
        id
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn idle_len(&self) -> usize {
        self.workers.values().filter(|w| !w.busy).count()
    }

    pub fn info(&self) -> Vec<WorkerInfo> {
        self.workers
            .iter()
            .map(|(&id, w)| WorkerInfo {
                id,
                addr: w.addr,
                capacity: w.capacity,
                busy: w.busy,
            })
            .collect()
    }

    /// Hands every idle worker up to `capacity` ids from the front of
    /// `cursor`, in registration order. Ids no longer pending are skipped.
    /// Stops when the cursor runs dry.
    pub fn assign(
        &mut self,
        cursor: &mut VecDeque<ItemId>,
        is_pending: impl Fn(ItemId) -> bool,
    ) -> Vec<Assignment<C>> {
        let mut out = Vec::new();
        for (&worker, slot) in self.workers.iter_mut() {
            if slot.busy {
                continue;
            }

            let mut ids = Vec::with_capacity(slot.capacity.min(cursor.len()));
            while ids.len() < slot.capacity {
                match cursor.pop_front() {
                    Some(id) if is_pending(id) && !ids.contains(&id) => ids.push(id),
                    Some(_) => {}
                    None => break,
                }
            }
            if ids.is_empty() {
                break;
            }

            let Some(conn) = slot.conn.take() else {
                warn!(%worker, "idle worker without a connection");
                ids.into_iter().rev().for_each(|id| cursor.push_front(id));
                continue;
            };
            slot.busy = true;
            out.push(Assignment { worker, conn, ids });
        }
        out
    }

    /// Gives a connection back after its batch was answered.
    pub fn release(&mut self, worker: WorkerId, conn: C) {
        if let Some(slot) = self.workers.get_mut(&worker) {
            slot.busy = false;
            slot.conn = Some(conn);
        }
    }

    pub fn remove(&mut self, worker: WorkerId) -> Option<WorkerSlot<C>> {
        self.workers.remove(&worker)
    }

    /// Drops busy slots whose connection never came back, which only happens
    /// when a dispatch cycle was abandoned mid-flight.
    pub fn purge_orphans(&mut self) -> usize {
        let before = self.workers.len();
        self.workers.retain(|_, w| !(w.busy && w.conn.is_none()));
        before - self.workers.len()
    }

    pub fn drain(&mut self) -> Vec<(WorkerId, WorkerSlot<C>)> {
        std::mem::take(&mut self.workers).into_iter().collect()
    }
}
