use std::collections::{BTreeSet, HashMap};

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::executor::ExecutorHandle;
use crate::metrics::JOB_DISPATCH;
use crate::model::FileId;
use crate::store::StoreError;

/// Plugin names occupied by running workers. Ordered so that equal sets hash
/// equally regardless of insertion order.
pub type Occupied = BTreeSet<String>;

/// Candidates fetched per store query.
pub const DEFAULT_BATCH_SIZE: usize = 5;

#[derive(Debug)]
enum Batch {
    /// Remaining ids, last element handed out first.
    Pending(Vec<FileId>),
    /// Nothing left; no query until invalidated.
    Exhausted,
}

/// Per-exclusion-set batches of candidate file ids.
pub struct JobDispatcher {
    executor: ExecutorHandle,
    batch_size: usize,
    batches: Mutex<HashMap<Occupied, Batch>>,
}

impl JobDispatcher {
    pub fn new(executor: ExecutorHandle, batch_size: usize) -> Self {
        Self {
            executor,
            batch_size,
            batches: Mutex::new(HashMap::new()),
        }
    }

    /// Next candidate for a worker that must avoid `occupied`, or `None` when
    /// there is no work.
    ///
    /// Never waits for work to appear. The returned id may be stale by the
    /// time the caller resolves it; callers re-check it and ask again.
    pub fn acquire(&self, occupied: &Occupied) -> Result<Option<FileId>, StoreError> {
        // Held across the query so two callers never receive the same id
        let mut batches = self.batches.lock();

        match batches.get_mut(occupied) {
            Some(batch) => {
                let next = match batch {
                    Batch::Pending(ids) => ids.pop().map(|id| (id, ids.is_empty())),
                    Batch::Exhausted => None,
                };
                let Some((id, drained)) = next else {
                    JOB_DISPATCH.with_label_values(&["exhausted"]).inc();
                    return Ok(None);
                };
                if drained {
                    *batch = Batch::Exhausted;
                }
                JOB_DISPATCH.with_label_values(&["hit"]).inc();
                return Ok(Some(id));
            }
            None => {
                // Only the set being asked about is worth keeping around
                batches.clear();
            }
        }

        let exclusion = occupied.clone();
        let limit = self.batch_size;
        let mut ids = self.executor.submit_sync("job_candidates", move |store| {
            store.job_candidates(&exclusion, limit)
        })?;
        trace!(candidates = ids.len(), ?occupied, "Queried job candidates");

        ids.reverse();
        let id = ids.pop();
        let batch = if ids.is_empty() {
            Batch::Exhausted
        } else {
            Batch::Pending(ids)
        };
        batches.insert(occupied.clone(), batch);

        let result = if id.is_some() { "query" } else { "empty" };
        JOB_DISPATCH.with_label_values(&[result]).inc();
        Ok(id)
    }

    /// Forget every batch. Called after any mutation that can change which
    /// files are eligible.
    pub fn invalidate(&self) {
        let mut batches = self.batches.lock();
        if !batches.is_empty() {
            debug!(batches = batches.len(), "Invalidating job batches");
            batches.clear();
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}
