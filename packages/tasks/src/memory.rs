//! # In-memory backend
//!
//! [`MemoryBackend`] implements both [`TaskStore`] and [`AuthGateway`]
//! against process-local state. It backs the test suite and serves as an
//! offline fallback; it mirrors the hosted backend's observable behavior:
//!
//! - rows are only visible to the identity that owns them,
//! - writes stamp server-side timestamps and return the canonical row,
//! - deleting an id that is already gone succeeds,
//! - every committed write emits a [`TableEvent`] to all subscribers.
//!
//! Test hooks: [`fail_next`](MemoryBackend::fail_next) makes the next
//! operation of a kind fail, [`hold_next_select`](MemoryBackend::hold_next_select)
//! parks the next `select` after it captured its row snapshot, and
//! [`complete_magic_link`](MemoryBackend::complete_magic_link) plays the
//! out-of-band click on an emailed sign-in link.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::{broadcast, watch, Notify};
use uuid::Uuid;

use crate::auth::{AuthGateway, Session};
use crate::error::{AuthError, StoreError};
use crate::model::{Task, TaskPatch};
use crate::store::{ChangeFeed, TableEvent, TaskStore};

const EVENT_CAPACITY: usize = 64;

/// Operation kinds that can be made to fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Fault {
    Select,
    Insert,
    Update,
    Delete,
}

struct UserRecord {
    id: Uuid,
    password: String,
}

struct Inner {
    rows: Mutex<HashMap<Uuid, Task>>,
    users: Mutex<HashMap<String, UserRecord>>,
    session: Mutex<Option<Session>>,
    session_tx: watch::Sender<Option<Session>>,
    events_tx: broadcast::Sender<TableEvent>,
    faults: Mutex<HashSet<Fault>>,
    select_gate: Mutex<Option<Arc<Notify>>>,
    select_calls: AtomicUsize,
}

/// In-memory task table plus identity provider, for tests and offline use.
#[derive(Clone)]
pub struct MemoryBackend {
    inner: Arc<Inner>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        let (session_tx, _) = watch::channel(None);
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                rows: Mutex::new(HashMap::new()),
                users: Mutex::new(HashMap::new()),
                session: Mutex::new(None),
                session_tx,
                events_tx,
                faults: Mutex::new(HashSet::new()),
                select_gate: Mutex::new(None),
                select_calls: AtomicUsize::new(0),
            }),
        }
    }

    /// Make the next operation of the given kind fail with a remote error.
    pub fn fail_next(&self, fault: Fault) {
        self.inner.faults.lock().unwrap().insert(fault);
    }

    /// Park the next `select` after it captured its row snapshot, until
    /// the returned handle is notified.
    pub fn hold_next_select(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.inner.select_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    /// How many `select` calls this backend has served.
    pub fn select_calls(&self) -> usize {
        self.inner.select_calls.load(Ordering::SeqCst)
    }

    /// Play the out-of-band completion of a magic-link sign-in: installs a
    /// session for the given email and notifies observers.
    pub fn complete_magic_link(&self, email: &str) -> Result<Session, AuthError> {
        let email = normalize(email);
        let user_id = {
            let users = self.inner.users.lock().unwrap();
            users
                .get(&email)
                .map(|u| u.id)
                .ok_or_else(|| AuthError::Remote(format!("no account for {email}")))?
        };
        Ok(self.start_session(user_id, &email))
    }

    #[cfg(test)]
    pub(crate) fn emit(&self, event: TableEvent) {
        let _ = self.inner.events_tx.send(event);
    }

    fn take_fault(&self, fault: Fault) -> Result<(), StoreError> {
        if self.inner.faults.lock().unwrap().remove(&fault) {
            return Err(StoreError::Remote(format!("injected {fault:?} failure")));
        }
        Ok(())
    }

    fn require_session(&self) -> Result<Session, StoreError> {
        self.inner
            .session
            .lock()
            .unwrap()
            .clone()
            .ok_or(StoreError::Unauthorized)
    }

    fn start_session(&self, user_id: Uuid, email: &str) -> Session {
        let session = Session {
            user_id,
            email: email.to_string(),
            access_token: Uuid::new_v4().simple().to_string(),
        };
        *self.inner.session.lock().unwrap() = Some(session.clone());
        self.inner.session_tx.send_replace(Some(session.clone()));
        session
    }
}

fn normalize(email: &str) -> String {
    email.trim().to_lowercase()
}

impl TaskStore for MemoryBackend {
    async fn select(&self) -> Result<Vec<Task>, StoreError> {
        self.inner.select_calls.fetch_add(1, Ordering::SeqCst);
        self.take_fault(Fault::Select)?;
        let session = self.require_session()?;
        let rows: Vec<Task> = self
            .inner
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|t| t.owner == session.user_id)
            .cloned()
            .collect();
        let gate = self.inner.select_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        Ok(rows)
    }

    async fn insert(&self, task: &Task) -> Result<Task, StoreError> {
        self.take_fault(Fault::Insert)?;
        let session = self.require_session()?;
        if task.owner != session.user_id {
            return Err(StoreError::Unauthorized);
        }
        let stored = {
            let mut rows = self.inner.rows.lock().unwrap();
            if rows.contains_key(&task.id) {
                return Err(StoreError::Remote(format!("duplicate id {}", task.id)));
            }
            let mut stored = task.clone();
            let now = Utc::now();
            stored.created_at = now;
            stored.updated_at = now;
            rows.insert(stored.id, stored.clone());
            stored
        };
        let _ = self.inner.events_tx.send(TableEvent::Inserted(stored.id));
        Ok(stored)
    }

    async fn update(&self, id: Uuid, patch: &TaskPatch) -> Result<Task, StoreError> {
        self.take_fault(Fault::Update)?;
        let session = self.require_session()?;
        let stored = {
            let mut rows = self.inner.rows.lock().unwrap();
            let Some(row) = rows.get_mut(&id).filter(|t| t.owner == session.user_id) else {
                return Err(StoreError::Remote(format!("no row with id {id}")));
            };
            row.apply(patch);
            if patch.updated_at.is_none() {
                row.updated_at = Utc::now();
            }
            row.clone()
        };
        let _ = self.inner.events_tx.send(TableEvent::Updated(id));
        Ok(stored)
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        self.take_fault(Fault::Delete)?;
        let session = self.require_session()?;
        let removed = {
            let mut rows = self.inner.rows.lock().unwrap();
            match rows.get(&id) {
                Some(t) if t.owner == session.user_id => {
                    rows.remove(&id);
                    true
                }
                // Deleting a missing row succeeds, as the remote table does.
                _ => false,
            }
        };
        if removed {
            let _ = self.inner.events_tx.send(TableEvent::Deleted(id));
        }
        Ok(())
    }

    async fn subscribe(&self) -> Result<ChangeFeed, StoreError> {
        Ok(ChangeFeed::new(self.inner.events_tx.subscribe()))
    }
}

impl AuthGateway for MemoryBackend {
    async fn current_session(&self) -> Result<Option<Session>, AuthError> {
        Ok(self.inner.session.lock().unwrap().clone())
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<(), AuthError> {
        let email = normalize(email);
        if email.is_empty() || password.is_empty() {
            return Err(AuthError::InvalidCredentials);
        }
        let mut users = self.inner.users.lock().unwrap();
        if users.contains_key(&email) {
            return Err(AuthError::Remote(format!("{email} is already registered")));
        }
        users.insert(
            email,
            UserRecord {
                id: Uuid::new_v4(),
                password: password.to_string(),
            },
        );
        Ok(())
    }

    async fn sign_in_password(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let email = normalize(email);
        let user_id = {
            let users = self.inner.users.lock().unwrap();
            match users.get(&email) {
                Some(user) if !user.password.is_empty() && user.password == password => user.id,
                _ => return Err(AuthError::InvalidCredentials),
            }
        };
        Ok(self.start_session(user_id, &email))
    }

    async fn sign_in_magic_link(&self, email: &str) -> Result<(), AuthError> {
        let email = normalize(email);
        if email.is_empty() {
            return Err(AuthError::InvalidCredentials);
        }
        // First use creates the account, like the hosted provider's OTP flow.
        self.inner
            .users
            .lock()
            .unwrap()
            .entry(email)
            .or_insert_with(|| UserRecord {
                id: Uuid::new_v4(),
                password: String::new(),
            });
        Ok(())
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        *self.inner.session.lock().unwrap() = None;
        self.inner.session_tx.send_replace(None);
        Ok(())
    }

    fn on_change(&self) -> watch::Receiver<Option<Session>> {
        self.inner.session_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TaskDraft;

    #[tokio::test]
    async fn test_sign_up_then_sign_in() {
        let backend = MemoryBackend::new();
        backend.sign_up("Ada@Example.com", "pw").await.unwrap();

        let err = backend
            .sign_in_password("ada@example.com", "wrong")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));

        let session = backend
            .sign_in_password("ada@example.com", "pw")
            .await
            .unwrap();
        assert_eq!(session.email, "ada@example.com");
        assert_eq!(
            backend.current_session().await.unwrap(),
            Some(session.clone())
        );

        backend.sign_out().await.unwrap();
        assert_eq!(backend.current_session().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_duplicate_sign_up_rejected() {
        let backend = MemoryBackend::new();
        backend.sign_up("ada@example.com", "pw").await.unwrap();
        let err = backend.sign_up("ada@example.com", "pw2").await.unwrap_err();
        assert!(matches!(err, AuthError::Remote(_)));
    }

    #[tokio::test]
    async fn test_magic_link_creates_account_and_completes_out_of_band() {
        let backend = MemoryBackend::new();
        backend.sign_in_magic_link("new@example.com").await.unwrap();
        // No session until the emailed link is followed.
        assert_eq!(backend.current_session().await.unwrap(), None);

        let session = backend.complete_magic_link("new@example.com").unwrap();
        assert_eq!(backend.current_session().await.unwrap(), Some(session));

        // Magic-link-only accounts have no password to sign in with.
        let err = backend
            .sign_in_password("new@example.com", "")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_rows_are_scoped_to_their_owner() {
        let backend = MemoryBackend::new();
        backend.sign_up("a@example.com", "pw").await.unwrap();
        backend.sign_up("b@example.com", "pw").await.unwrap();

        let a = backend.sign_in_password("a@example.com", "pw").await.unwrap();
        backend
            .insert(&Task::new(a.user_id, TaskDraft::new("Mine", "")))
            .await
            .unwrap();
        assert_eq!(backend.select().await.unwrap().len(), 1);

        let b = backend.sign_in_password("b@example.com", "pw").await.unwrap();
        assert!(backend.select().await.unwrap().is_empty());

        // Writing into someone else's rows is refused.
        let err = backend
            .insert(&Task::new(a.user_id, TaskDraft::new("Not mine", "")))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Unauthorized));
        let _ = b;
    }

    #[tokio::test]
    async fn test_writes_emit_events() {
        let backend = MemoryBackend::new();
        backend.sign_up("a@example.com", "pw").await.unwrap();
        let session = backend.sign_in_password("a@example.com", "pw").await.unwrap();
        let mut feed = backend.subscribe().await.unwrap();

        let task = backend
            .insert(&Task::new(session.user_id, TaskDraft::new("Evented", "")))
            .await
            .unwrap();
        assert_eq!(feed.recv().await, Some(TableEvent::Inserted(task.id)));

        backend
            .update(task.id, &TaskPatch::completed(true))
            .await
            .unwrap();
        assert_eq!(feed.recv().await, Some(TableEvent::Updated(task.id)));

        backend.delete(task.id).await.unwrap();
        assert_eq!(feed.recv().await, Some(TableEvent::Deleted(task.id)));

        // Idempotent: the second delete succeeds and emits nothing.
        backend.delete(task.id).await.unwrap();
        assert_eq!(backend.select().await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_select_requires_a_session() {
        let backend = MemoryBackend::new();
        let err = backend.select().await.unwrap_err();
        assert!(matches!(err, StoreError::Unauthorized));
    }

    #[tokio::test]
    async fn test_insert_stamps_server_timestamps() {
        let backend = MemoryBackend::new();
        backend.sign_up("a@example.com", "pw").await.unwrap();
        let session = backend.sign_in_password("a@example.com", "pw").await.unwrap();

        let local = Task::new(session.user_id, TaskDraft::new("Stamp", ""));
        let stored = backend.insert(&local).await.unwrap();
        assert_eq!(stored.created_at, stored.updated_at);
        assert!(stored.created_at >= local.created_at);
    }
}
