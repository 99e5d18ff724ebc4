//! # Task synchronizer — optimistic mutation with coarse reconciliation
//!
//! [`TaskSynchronizer`] holds the authoritative in-memory view of the
//! current user's tasks and keeps it aligned with the remote table. It is
//! generic over [`TaskStore`], so the same logic runs against the HTTP
//! backend and [`crate::MemoryBackend`].
//!
//! ## Reconciliation policy
//!
//! | Operation | Optimistic step | On remote success | On remote failure |
//! |-----------|----------------|-------------------|-------------------|
//! | [`create`](TaskSynchronizer::create) | Append the new record | Merge the canonical stored row | Remove the record again |
//! | [`update`](TaskSynchronizer::update) | Merge the patch in place | Merge the canonical stored row | Full [`load_all`](TaskSynchronizer::load_all) |
//! | [`delete`](TaskSynchronizer::delete) | Remove the record | — | Full [`load_all`](TaskSynchronizer::load_all) |
//!
//! The policy is intentionally coarse: it trades occasional redundant full
//! reloads for never having to merge optimistic and authoritative deltas.
//! A failed delete in particular cannot blindly re-add the record (the
//! remote delete may or may not have taken effect), so a full resync is
//! the only safe recovery. Nothing is retried automatically.
//!
//! ## Concurrency
//!
//! Reloads triggered by failure handlers and by remote change events can
//! overlap. Each [`load_all`](TaskSynchronizer::load_all) takes a
//! generation ticket; a result that was overtaken by a newer request is
//! discarded, so the last *requested* reload wins rather than the last one
//! to arrive. Every remote call is bounded by a timeout so the `loading`
//! flag can never spin forever.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{StoreError, TaskError};
use crate::model::{Task, TaskDraft, TaskPatch};
use crate::store::TaskStore;

/// Default deadline for a single remote call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Totals for the overview panel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TaskCounts {
    pub total: usize,
    pub completed: usize,
}

impl TaskCounts {
    pub fn active(&self) -> usize {
        self.total - self.completed
    }
}

struct SyncState {
    tasks: HashMap<Uuid, Task>,
    loading: bool,
}

/// In-memory view of one user's tasks, reconciled against a [`TaskStore`].
pub struct TaskSynchronizer<S> {
    store: S,
    owner: Uuid,
    call_timeout: Duration,
    state: Mutex<SyncState>,
    load_seq: AtomicU64,
}

impl<S: TaskStore> TaskSynchronizer<S> {
    /// Synchronizer for the given owner, empty and `loading` until the
    /// first [`load_all`](TaskSynchronizer::load_all) completes.
    pub fn new(store: S, owner: Uuid) -> Self {
        Self {
            store,
            owner,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            state: Mutex::new(SyncState {
                tasks: HashMap::new(),
                loading: true,
            }),
            load_seq: AtomicU64::new(0),
        }
    }

    /// Builder method to set the per-call deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Whether a first load (or a reload that followed a failure) is still
    /// outstanding.
    pub fn is_loading(&self) -> bool {
        self.state.lock().unwrap().loading
    }

    /// One task by id, as currently held locally.
    pub fn get(&self, id: Uuid) -> Option<Task> {
        self.state.lock().unwrap().tasks.get(&id).cloned()
    }

    /// All tasks, newest first.
    pub fn snapshot(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.state.lock().unwrap().tasks.values().cloned().collect();
        tasks.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        tasks
    }

    /// Overview totals.
    pub fn counts(&self) -> TaskCounts {
        let state = self.state.lock().unwrap();
        TaskCounts {
            total: state.tasks.len(),
            completed: state.tasks.values().filter(|t| t.completed).count(),
        }
    }

    /// Fetch every visible task and replace the entire local mapping. No
    /// pagination, no incremental diffing. Called at startup, after every
    /// remote change event, and as a manual refresh. A result overtaken by
    /// a newer request is discarded.
    pub async fn load_all(&self) -> Result<(), TaskError> {
        let ticket = self.load_seq.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.lock().unwrap().loading = true;

        let result = self.remote(self.store.select()).await;
        let newest = self.load_seq.load(Ordering::SeqCst) == ticket;
        match result {
            Ok(rows) => {
                if newest {
                    let count = rows.len();
                    let mut state = self.state.lock().unwrap();
                    state.tasks = rows.into_iter().map(|t| (t.id, t)).collect();
                    state.loading = false;
                    drop(state);
                    debug!(count, "task list reloaded");
                } else {
                    debug!("discarding reload result overtaken by a newer request");
                }
                Ok(())
            }
            Err(err) => {
                if newest {
                    self.state.lock().unwrap().loading = false;
                }
                warn!(error = %err, "reload failed");
                Err(err.into())
            }
        }
    }

    /// Create a task from a draft. The record is appended locally before
    /// the remote insert; a remote failure removes it again and surfaces
    /// the error for the user to retry.
    pub async fn create(&self, draft: TaskDraft) -> Result<Task, TaskError> {
        let draft = draft.validated()?;
        let task = Task::new(self.owner, draft);
        {
            let mut state = self.state.lock().unwrap();
            state.tasks.insert(task.id, task.clone());
        }
        match self.remote(self.store.insert(&task)).await {
            Ok(canonical) => {
                let mut state = self.state.lock().unwrap();
                state.tasks.insert(canonical.id, canonical.clone());
                Ok(canonical)
            }
            Err(err) => {
                self.state.lock().unwrap().tasks.remove(&task.id);
                warn!(task_id = %task.id, error = %err, "insert failed, optimistic create rolled back");
                Err(err.into())
            }
        }
    }

    /// Patch an existing task. The patch is merged locally before the
    /// remote update; a remote failure discards the optimistic guess by
    /// reloading from the table.
    pub async fn update(&self, id: Uuid, mut patch: TaskPatch) -> Result<Task, TaskError> {
        if let Some(title) = patch.title.as_mut() {
            *title = title.trim().to_string();
            if title.is_empty() {
                return Err(TaskError::Validation("title must not be empty".into()));
            }
        }
        patch.updated_at = Some(Utc::now());
        {
            let mut state = self.state.lock().unwrap();
            let Some(task) = state.tasks.get_mut(&id) else {
                return Err(TaskError::UnknownTask(id));
            };
            task.apply(&patch);
        }
        match self.remote(self.store.update(id, &patch)).await {
            Ok(canonical) => {
                self.state.lock().unwrap().tasks.insert(id, canonical.clone());
                Ok(canonical)
            }
            Err(err) => {
                warn!(task_id = %id, error = %err, "update failed, resynchronizing");
                let _ = self.load_all().await;
                Err(err.into())
            }
        }
    }

    /// Flip the completion flag of an existing task.
    pub async fn toggle_completed(&self, id: Uuid) -> Result<Task, TaskError> {
        let done = {
            let state = self.state.lock().unwrap();
            let Some(task) = state.tasks.get(&id) else {
                return Err(TaskError::UnknownTask(id));
            };
            !task.completed
        };
        self.update(id, TaskPatch::completed(done)).await
    }

    /// Delete a task. The record is removed locally before the remote
    /// delete; on failure the record may or may not still exist remotely,
    /// so the only safe recovery is a full reload.
    pub async fn delete(&self, id: Uuid) -> Result<(), TaskError> {
        self.state.lock().unwrap().tasks.remove(&id);
        match self.remote(self.store.delete(id)).await {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!(task_id = %id, error = %err, "delete failed, resynchronizing");
                let _ = self.load_all().await;
                Err(err.into())
            }
        }
    }

    /// Mark every active task completed. Continues past individual
    /// failures and reports the first error after the sweep; returns the
    /// number of tasks updated.
    pub async fn complete_all(&self) -> Result<usize, TaskError> {
        let active: Vec<Uuid> = {
            let state = self.state.lock().unwrap();
            state
                .tasks
                .values()
                .filter(|t| !t.completed)
                .map(|t| t.id)
                .collect()
        };
        let mut first_err = None;
        let mut done = 0;
        for id in active {
            match self.update(id, TaskPatch::completed(true)).await {
                Ok(_) => done += 1,
                Err(err) if first_err.is_none() => first_err = Some(err),
                Err(_) => {}
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(done),
        }
    }

    async fn remote<T>(
        &self,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        tokio::time::timeout(self.call_timeout, call)
            .await
            .unwrap_or_else(|_| Err(StoreError::Timeout(self.call_timeout.as_millis() as u64)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthGateway, Session};
    use crate::memory::{Fault, MemoryBackend};
    use std::sync::Arc;

    async fn signed_in_backend() -> (MemoryBackend, Session) {
        let backend = MemoryBackend::new();
        backend.sign_up("ada@example.com", "correct horse").await.unwrap();
        let session = backend
            .sign_in_password("ada@example.com", "correct horse")
            .await
            .unwrap();
        (backend, session)
    }

    #[tokio::test]
    async fn test_loading_clears_after_first_load() {
        let (backend, session) = signed_in_backend().await;
        let sync = TaskSynchronizer::new(backend, session.user_id);
        assert!(sync.is_loading());
        sync.load_all().await.unwrap();
        assert!(!sync.is_loading());
        assert_eq!(sync.counts(), TaskCounts::default());
    }

    #[tokio::test]
    async fn test_create_appears_immediately_and_remains() {
        let (backend, session) = signed_in_backend().await;
        let sync = TaskSynchronizer::new(backend, session.user_id);
        sync.load_all().await.unwrap();

        let task = sync
            .create(TaskDraft::new("Buy milk", "").with_priority(crate::model::Priority::Low))
            .await
            .unwrap();
        assert_eq!(sync.counts().total, 1);
        assert_eq!(sync.snapshot()[0].title, "Buy milk");
        assert!(sync.get(task.id).is_some());
    }

    #[tokio::test]
    async fn test_create_merges_canonical_row() {
        let (backend, session) = signed_in_backend().await;
        let sync = TaskSynchronizer::new(backend, session.user_id);
        sync.load_all().await.unwrap();

        let canonical = sync.create(TaskDraft::new("Stamped", "")).await.unwrap();
        let held = sync.get(canonical.id).unwrap();
        assert_eq!(held, canonical);
        assert_eq!(held.created_at, canonical.created_at);
    }

    #[tokio::test]
    async fn test_failed_create_rolls_back() {
        let (backend, session) = signed_in_backend().await;
        let sync = TaskSynchronizer::new(backend.clone(), session.user_id);
        sync.load_all().await.unwrap();

        backend.fail_next(Fault::Insert);
        let err = sync.create(TaskDraft::new("Doomed", "")).await.unwrap_err();
        assert!(matches!(err, TaskError::Store(_)));
        assert_eq!(sync.counts().total, 0);
    }

    #[tokio::test]
    async fn test_empty_title_is_rejected_before_any_remote_call() {
        let (backend, session) = signed_in_backend().await;
        let sync = TaskSynchronizer::new(backend.clone(), session.user_id);
        sync.load_all().await.unwrap();
        let calls = backend.select_calls();

        let err = sync.create(TaskDraft::new("   ", "")).await.unwrap_err();
        assert!(matches!(err, TaskError::Validation(_)));
        assert_eq!(sync.counts().total, 0);
        assert_eq!(backend.select_calls(), calls);
    }

    #[tokio::test]
    async fn test_update_is_optimistic_and_kept_on_success() {
        let (backend, session) = signed_in_backend().await;
        let sync = TaskSynchronizer::new(backend, session.user_id);
        sync.load_all().await.unwrap();
        let task = sync.create(TaskDraft::new("Toggle me", "")).await.unwrap();

        let updated = sync.update(task.id, TaskPatch::completed(true)).await.unwrap();
        assert!(updated.completed);
        assert!(sync.get(task.id).unwrap().completed);
        assert!(updated.updated_at > task.updated_at);
    }

    #[tokio::test]
    async fn test_failed_update_resyncs_from_remote_truth() {
        let (backend, session) = signed_in_backend().await;
        let sync = TaskSynchronizer::new(backend.clone(), session.user_id);
        sync.load_all().await.unwrap();
        let task = sync.create(TaskDraft::new("Stubborn", "")).await.unwrap();

        backend.fail_next(Fault::Update);
        let err = sync
            .update(task.id, TaskPatch::completed(true))
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::Store(_)));
        // The reload restored the remote row, which never saw the patch.
        assert!(!sync.get(task.id).unwrap().completed);
    }

    #[tokio::test]
    async fn test_update_unknown_task() {
        let (backend, session) = signed_in_backend().await;
        let sync = TaskSynchronizer::new(backend, session.user_id);
        sync.load_all().await.unwrap();

        let id = Uuid::new_v4();
        let err = sync.update(id, TaskPatch::completed(true)).await.unwrap_err();
        assert!(matches!(err, TaskError::UnknownTask(got) if got == id));
    }

    #[tokio::test]
    async fn test_toggle_completed_round_trips() {
        let (backend, session) = signed_in_backend().await;
        let sync = TaskSynchronizer::new(backend, session.user_id);
        sync.load_all().await.unwrap();
        let task = sync.create(TaskDraft::new("Flip", "")).await.unwrap();

        assert!(sync.toggle_completed(task.id).await.unwrap().completed);
        assert!(!sync.toggle_completed(task.id).await.unwrap().completed);
    }

    #[tokio::test]
    async fn test_delete_removes_locally_and_remotely() {
        let (backend, session) = signed_in_backend().await;
        let sync = TaskSynchronizer::new(backend, session.user_id);
        sync.load_all().await.unwrap();
        let task = sync.create(TaskDraft::new("Gone", "")).await.unwrap();

        sync.delete(task.id).await.unwrap();
        assert_eq!(sync.counts().total, 0);
        sync.load_all().await.unwrap();
        assert_eq!(sync.counts().total, 0);
    }

    #[tokio::test]
    async fn test_failed_delete_restores_surviving_row() {
        let (backend, session) = signed_in_backend().await;
        let sync = TaskSynchronizer::new(backend.clone(), session.user_id);
        sync.load_all().await.unwrap();
        let task = sync.create(TaskDraft::new("Survivor", "")).await.unwrap();

        backend.fail_next(Fault::Delete);
        let err = sync.delete(task.id).await.unwrap_err();
        assert!(matches!(err, TaskError::Store(_)));
        // The remote delete never happened, so the reload brings it back.
        assert!(sync.get(task.id).is_some());
    }

    #[tokio::test]
    async fn test_complete_all_marks_every_active_task() {
        let (backend, session) = signed_in_backend().await;
        let sync = TaskSynchronizer::new(backend, session.user_id);
        sync.load_all().await.unwrap();

        sync.create(TaskDraft::new("One", "")).await.unwrap();
        sync.create(TaskDraft::new("Two", "")).await.unwrap();
        let done = sync.create(TaskDraft::new("Three", "")).await.unwrap();
        sync.update(done.id, TaskPatch::completed(true)).await.unwrap();

        assert_eq!(sync.complete_all().await.unwrap(), 2);
        let counts = sync.counts();
        assert_eq!(counts.completed, counts.total);
    }

    #[tokio::test]
    async fn test_overtaken_reload_is_discarded() {

        let (backend, session) = signed_in_backend().await;
        let sync = Arc::new(TaskSynchronizer::new(backend.clone(), session.user_id));

        let first = backend
            .insert(&Task::new(session.user_id, TaskDraft::new("First", "")))
            .await
            .unwrap();

        let gate = backend.hold_next_select();
        let slow = tokio::spawn({
            let sync = Arc::clone(&sync);
            async move { sync.load_all().await }
        });
        // Let the slow reload capture the single-row snapshot and park.
        tokio::time::sleep(Duration::from_millis(10)).await;

        backend
            .insert(&Task::new(session.user_id, TaskDraft::new("Second", "")))
            .await
            .unwrap();
        sync.load_all().await.unwrap();
        assert_eq!(sync.counts().total, 2);

        gate.notify_one();
        slow.await.unwrap().unwrap();
        assert_eq!(sync.counts().total, 2);
        assert!(sync.get(first.id).is_some());
    }

    #[tokio::test]
    async fn test_stalled_select_hits_the_call_timeout() {
        let (backend, session) = signed_in_backend().await;
        let sync = TaskSynchronizer::new(backend.clone(), session.user_id)
            .with_timeout(Duration::from_millis(20));

        let _gate = backend.hold_next_select();
        let err = sync.load_all().await.unwrap_err();
        assert!(matches!(err, TaskError::Store(StoreError::Timeout(_))));
        assert!(!sync.is_loading());
    }
}
