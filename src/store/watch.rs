//! Live query subscriptions
//!
//! A subscription re-runs its query whenever the watched collection changes
//! and pushes the full result set to the subscriber. Dropping or cancelling
//! the subscription stops the forwarding task and releases its feed receiver.

use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, instrument};

use super::{Document, DocumentStore, Query, StoreError};

const FEED_CAPACITY: usize = 256;
const SNAPSHOT_BUFFER: usize = 16;

/// A committed write touched this collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub collection: String,
}

/// Broadcast of committed changes shared by a store and its subscribers.
#[derive(Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<Change>,
}

impl ChangeFeed {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(FEED_CAPACITY);
        Self { tx }
    }

    pub fn publish(&self, collection: &str) {
        // No receivers is fine: nobody is watching.
        let _ = self.tx.send(Change {
            collection: collection.to_string(),
        });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Change> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

/// Stream of full query snapshots.
pub struct Subscription<T> {
    rx: mpsc::Receiver<Result<T, StoreError>>,
    task: JoinHandle<()>,
}

impl<T> Subscription<T> {
    /// Wait for the next snapshot. `None` once the subscription has ended.
    pub async fn next_snapshot(&mut self) -> Option<Result<T, StoreError>> {
        self.rx.recv().await
    }

    /// Stop receiving snapshots.
    pub fn cancel(self) {}

    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl<T> Stream for Subscription<T> {
    type Item = Result<T, StoreError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Register interest in `query`, decoding each snapshot with `decode`.
///
/// The first snapshot is delivered immediately; after that one snapshot is
/// delivered per committed change to `query.collection`.
#[instrument(skip(store, decode), fields(collection = %query.collection))]
pub fn subscribe<T, F>(store: Arc<dyn DocumentStore>, query: Query, decode: F) -> Subscription<T>
where
    T: Send + 'static,
    F: Fn(Vec<Document>) -> Result<T, StoreError> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(SNAPSHOT_BUFFER);
    // Subscribe before the first read so no change between the two is lost.
    let mut changes = store.changes();

    let task = tokio::spawn(async move {
        loop {
            let snapshot = store.query(&query).await.and_then(&decode);
            if tx.send(snapshot).await.is_err() {
                debug!(collection = %query.collection, "Subscriber gone, stopping watch");
                return;
            }

            loop {
                match changes.recv().await {
                    Ok(change) if change.collection == query.collection => break,
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Change feed lagged, re-querying");
                        break;
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
        }
    });

    Subscription { rx, task }
}
