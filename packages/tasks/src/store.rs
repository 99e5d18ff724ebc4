//! # Remote task table seam
//!
//! [`TaskStore`] is the async interface to the hosted `tasks` table. The
//! synchronizer is generic over it, so the same reconciliation logic runs
//! against the HTTP backend in production and [`crate::MemoryBackend`] in
//! tests. Five methods: `select`/`insert`/`update`/`delete` for rows, and
//! `subscribe` for the live change feed.
//!
//! Writes return the canonical stored row so callers can fold
//! server-assigned fields (timestamps) back into local state without an
//! extra round-trip.

use std::future::Future;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::StoreError;
use crate::model::{Task, TaskPatch};

/// A change observed on the remote `tasks` table, regardless of author.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TableEvent {
    Inserted(Uuid),
    Updated(Uuid),
    Deleted(Uuid),
}

impl TableEvent {
    /// Id of the affected row.
    pub fn task_id(&self) -> Uuid {
        match self {
            TableEvent::Inserted(id) | TableEvent::Updated(id) | TableEvent::Deleted(id) => *id,
        }
    }
}

/// Aborts the owning background task when dropped.
///
/// Backends that need a worker to produce events (e.g. a poll loop) wrap
/// its [`JoinHandle`] in a guard and attach it to the [`ChangeFeed`], so
/// dropping the feed releases the connection.
pub struct FeedGuard(JoinHandle<()>);

impl FeedGuard {
    pub fn new(handle: JoinHandle<()>) -> Self {
        Self(handle)
    }
}

impl Drop for FeedGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Live subscription to [`TableEvent`]s. A long-lived resource: dropping
/// the feed cancels the subscription.
pub struct ChangeFeed {
    rx: broadcast::Receiver<TableEvent>,
    _guard: Option<FeedGuard>,
}

impl ChangeFeed {
    /// Feed with no background worker (the sender side pushes directly).
    pub fn new(rx: broadcast::Receiver<TableEvent>) -> Self {
        Self { rx, _guard: None }
    }

    /// Feed backed by a worker task that is aborted when the feed drops.
    pub fn with_guard(rx: broadcast::Receiver<TableEvent>, guard: FeedGuard) -> Self {
        Self {
            rx,
            _guard: Some(guard),
        }
    }

    /// Next event, or `None` once the sender side is gone. A lagged
    /// receiver skips ahead; dropped events are harmless because every
    /// event triggers the same full reload.
    pub async fn recv(&mut self) -> Option<TableEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Async interface to the remote task table.
pub trait TaskStore {
    /// Every task visible to the current identity.
    fn select(&self) -> impl Future<Output = Result<Vec<Task>, StoreError>> + Send;
    /// Insert a new row; returns the canonical stored row.
    fn insert(&self, task: &Task) -> impl Future<Output = Result<Task, StoreError>> + Send;
    /// Patch an existing row; returns the canonical stored row.
    fn update(
        &self,
        id: Uuid,
        patch: &TaskPatch,
    ) -> impl Future<Output = Result<Task, StoreError>> + Send;
    /// Delete a row. Deleting an id that is already gone succeeds.
    fn delete(&self, id: Uuid) -> impl Future<Output = Result<(), StoreError>> + Send;
    /// Open the live change feed for the table.
    fn subscribe(&self) -> impl Future<Output = Result<ChangeFeed, StoreError>> + Send;
}
