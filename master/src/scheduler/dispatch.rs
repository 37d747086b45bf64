//! Bookkeeping for one dispatch cycle.

use std::collections::{BTreeMap, HashSet, VecDeque};

use protocol::{ItemId, ItemResult, Payload, WorkItem};

use super::registry::{Assignment, Registry};

/// Pending items, the rotating send cursor and the results gathered so far.
///
/// An item leaves `pending` only when a result for it arrives.
pub(crate) struct Cycle {
    pending: BTreeMap<ItemId, Payload>,
    cursor: VecDeque<ItemId>,
    results: Vec<(ItemId, Payload)>,
}

impl Cycle {
    pub fn new(args: Vec<Payload>) -> Self {
        let pending: BTreeMap<_, _> = args
            .into_iter()
            .enumerate()
            .map(|(i, arg)| (i as ItemId, arg))
            .collect();
        let cursor = pending.keys().copied().collect();
        Self {
            results: Vec::with_capacity(pending.len()),
            pending,
            cursor,
        }
    }

    pub fn is_done(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Refills the cursor with everything still pending once it runs dry.
    pub fn refill_if_exhausted(&mut self) -> bool {
        if !self.cursor.is_empty() {
            return false;
        }
        self.cursor.extend(self.pending.keys().copied());
        true
    }

    /// Hands idle workers their next batches from the cursor.
    pub fn assign<C>(&mut self, registry: &mut Registry<C>) -> Vec<Assignment<C>> {
        registry.assign(&mut self.cursor, |id| self.pending.contains_key(&id))
    }

    pub fn batch(&self, ids: &[ItemId]) -> Vec<WorkItem> {
        ids.iter()
            .filter_map(|id| {
                self.pending.get(id).map(|arg| WorkItem {
                    id: *id,
                    arg: arg.clone(),
                })
            })
            .collect()
    }

    /// Records a worker's answer to the batch `sent`. Returns the ids that
    /// completed with this answer, in arrival order.
    ///
    /// Unknown or already completed ids are ignored. Ids that were sent but
    /// not answered go back on the cursor.
    pub fn complete(&mut self, sent: &[ItemId], results: Vec<ItemResult>) -> Vec<ItemId> {
        let sent_set: HashSet<_> = sent.iter().copied().collect();
        let mut done = Vec::with_capacity(results.len());
        for ItemResult { id, result } in results {
            if !sent_set.contains(&id) || self.pending.remove(&id).is_none() {
                continue;
            }
            self.results.push((id, result));
            done.push(id);
        }
        self.requeue(sent);
        done
    }

    /// Puts still-pending ids back on the cursor. Returns how many were added.
    pub fn requeue(&mut self, ids: &[ItemId]) -> usize {
        let mut added = 0;
        for &id in ids {
            if self.pending.contains_key(&id) && !self.cursor.contains(&id) {
                self.cursor.push_back(id);
                added += 1;
            }
        }
        added
    }

    /// The `n` most recently completed results.
    pub fn latest(&self, n: usize) -> &[(ItemId, Payload)] {
        &self.results[self.results.len().saturating_sub(n)..]
    }

    pub fn into_results(self) -> Vec<(ItemId, Payload)> {
        self.results
    }
}
