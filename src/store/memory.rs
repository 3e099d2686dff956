//! In-memory document store
//!
//! Batches are staged against a copy of the data and swapped in only when
//! every op succeeded, so a failed batch never leaves partial writes behind.
//! Failure injection lets tests exercise the remote-error paths.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::broadcast;

use super::{Change, ChangeFeed, Document, DocumentStore, Fields, Query, StoreError, WriteOp};

type Collections = HashMap<String, BTreeMap<String, Fields>>;

/// Types of failures that can be simulated.
#[derive(Debug, Clone, Default)]
struct Faults {
    /// Number of upcoming reads that fail with `Unavailable`.
    failing_reads: u32,
    /// Next batch fails after applying this many ops.
    fail_batch_after: Option<usize>,
    /// Every write fails until cleared.
    fail_writes: bool,
}

#[derive(Default)]
struct Inner {
    collections: RwLock<Collections>,
    feed: ChangeFeed,
    faults: Mutex<Faults>,
    reads: Mutex<u64>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` reads fail with a retryable error.
    pub fn fail_next_reads(&self, count: u32) {
        self.inner.faults.lock().failing_reads = count;
    }

    /// Make the next batch fail midway, after `applied` ops have been staged.
    pub fn fail_next_batch_after(&self, applied: usize) {
        self.inner.faults.lock().fail_batch_after = Some(applied);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.faults.lock().fail_writes = fail;
    }

    /// Total reads served or attempted.
    pub fn read_count(&self) -> u64 {
        *self.inner.reads.lock()
    }

    pub fn document_count(&self, collection: &str) -> usize {
        self.inner
            .collections
            .read()
            .get(collection)
            .map_or(0, BTreeMap::len)
    }

    pub fn watcher_count(&self) -> usize {
        self.inner.feed.receiver_count()
    }

    fn begin_read(&self) -> Result<(), StoreError> {
        *self.inner.reads.lock() += 1;
        let mut faults = self.inner.faults.lock();
        if faults.failing_reads > 0 {
            faults.failing_reads -= 1;
            return Err(StoreError::Unavailable("simulated read failure".to_string()));
        }
        Ok(())
    }

    fn apply(staged: &mut Collections, op: WriteOp) -> Result<(), StoreError> {
        match op {
            WriteOp::Check {
                collection,
                id,
                precondition,
            } => {
                let current = staged.get(&collection).and_then(|c| c.get(&id));
                if !precondition.holds(current) {
                    return Err(StoreError::PreconditionFailed(format!(
                        "{}/{}: {:?}",
                        collection, id, precondition
                    )));
                }
            }
            WriteOp::Set {
                collection,
                id,
                fields,
            } => {
                staged.entry(collection).or_default().insert(id, fields);
            }
            WriteOp::Merge {
                collection,
                id,
                fields,
            } => {
                let doc = staged.entry(collection).or_default().entry(id).or_default();
                doc.extend(fields);
            }
            WriteOp::Update {
                collection,
                id,
                fields,
            } => {
                let doc = staged
                    .get_mut(&collection)
                    .and_then(|c| c.get_mut(&id))
                    .ok_or_else(|| StoreError::NotFound {
                        collection: collection.clone(),
                        id: id.clone(),
                    })?;
                doc.extend(fields);
            }
            WriteOp::Delete { collection, id } => {
                if let Some(c) = staged.get_mut(&collection) {
                    c.remove(&id);
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        // Every remote call is a suspension point.
        tokio::task::yield_now().await;
        self.begin_read()?;

        let collections = self.inner.collections.read();
        Ok(collections
            .get(collection)
            .and_then(|c| c.get(id))
            .map(|fields| Document::new(id, fields.clone())))
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        tokio::task::yield_now().await;
        self.begin_read()?;

        let docs = {
            let collections = self.inner.collections.read();
            collections
                .get(&query.collection)
                .map(|c| {
                    c.iter()
                        .filter(|(_, fields)| query.matches(fields))
                        .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
                        .collect()
                })
                .unwrap_or_default()
        };
        Ok(query.finish(docs))
    }

    async fn batch_write(&self, ops: Vec<WriteOp>) -> Result<(), StoreError> {
        tokio::task::yield_now().await;

        let fail_after = {
            let mut faults = self.inner.faults.lock();
            if faults.fail_writes {
                return Err(StoreError::Unavailable("simulated write failure".to_string()));
            }
            faults.fail_batch_after.take()
        };

        let touched: BTreeSet<String> = ops
            .iter()
            .filter(|op| op.is_write())
            .map(|op| op.collection().to_string())
            .collect();

        {
            let mut collections = self.inner.collections.write();
            let mut staged = collections.clone();
            for (applied, op) in ops.into_iter().enumerate() {
                if fail_after == Some(applied) {
                    return Err(StoreError::Unavailable(format!(
                        "simulated failure after {} ops",
                        applied
                    )));
                }
                Self::apply(&mut staged, op)?;
            }
            *collections = staged;
        }

        for collection in &touched {
            self.inner.feed.publish(collection);
        }
        Ok(())
    }

    fn changes(&self) -> broadcast::Receiver<Change> {
        self.inner.feed.subscribe()
    }
}
