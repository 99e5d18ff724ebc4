//! # Session lifecycle
//!
//! [`SessionController`] drives the application-level state machine around
//! authentication and owns the task synchronizer's lifetime:
//!
//! ```text
//! Loading ──resolve──▶ SignedOut ◀──sign-out / cleared──┐
//!    │                     │                            │
//!    └──resolve──▶ SignedIn(session) ◀──sign-in─────────┘
//! ```
//!
//! - The initial phase is resolved asynchronously at startup by asking the
//!   provider for an existing session; task operations are unavailable
//!   until then.
//! - Entering `SignedIn` (re)initializes a [`TaskSynchronizer`], performs
//!   the first load, and starts a pump task that resolves every change
//!   feed event with a full reload.
//! - Entering `SignedOut` aborts the pump (dropping the feed cancels the
//!   subscription) and discards local task state, so stale events can
//!   never trigger another reload.
//!
//! All transitions after startup flow through the provider's change
//! channel, which the controller watches from a single background task;
//! sign-in/sign-out calls made through the controller are plain
//! delegations whose effect arrives on that channel.

use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::auth::{AuthGateway, Session};
use crate::error::{AuthError, TaskError};
use crate::store::TaskStore;
use crate::sync::TaskSynchronizer;

/// Everything the controller needs from a backend.
pub trait Backend: TaskStore + AuthGateway + Clone + Send + Sync + 'static {}

impl<T> Backend for T where T: TaskStore + AuthGateway + Clone + Send + Sync + 'static {}

/// Authentication phase of the application.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Phase {
    /// Startup: the existing session is still being resolved.
    #[default]
    Loading,
    SignedOut,
    SignedIn(Session),
}

impl Phase {
    pub fn is_signed_in(&self) -> bool {
        matches!(self, Phase::SignedIn(_))
    }
}

struct Active<B> {
    sync: Arc<TaskSynchronizer<B>>,
    pump: Option<JoinHandle<()>>,
}

impl<B> Drop for Active<B> {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

/// Owns the session state machine and the synchronizer bound to it.
pub struct SessionController<B: Backend> {
    backend: B,
    phase_tx: watch::Sender<Phase>,
    active: Mutex<Option<Active<B>>>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl<B: Backend> SessionController<B> {
    pub fn new(backend: B) -> Self {
        let (phase_tx, _) = watch::channel(Phase::Loading);
        Self {
            backend,
            phase_tx,
            active: Mutex::new(None),
            watcher: Mutex::new(None),
        }
    }

    /// Resolve the startup phase and begin watching for session changes.
    /// A provider failure during resolution is treated as signed out; the
    /// application always ends up in a usable phase.
    pub async fn start(self: Arc<Self>) {
        let initial = match self.backend.current_session().await {
            Ok(session) => session,
            Err(err) => {
                warn!(error = %err, "could not resolve existing session");
                None
            }
        };
        match initial {
            Some(session) => self.enter_signed_in(session).await,
            None => self.enter_signed_out(),
        }

        let mut changes = self.backend.on_change();
        let controller = Arc::downgrade(&self);
        let watcher = tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                let Some(controller) = controller.upgrade() else {
                    break;
                };
                let next = changes.borrow_and_update().clone();
                match next {
                    Some(session) => controller.enter_signed_in(session).await,
                    None => controller.enter_signed_out(),
                }
            }
        });
        *self.watcher.lock().unwrap() = Some(watcher);
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase_tx.borrow().clone()
    }

    /// Channel for observing phase transitions.
    pub fn watch_phase(&self) -> watch::Receiver<Phase> {
        self.phase_tx.subscribe()
    }

    /// The synchronizer for the signed-in user, if any.
    pub fn synchronizer(&self) -> Option<Arc<TaskSynchronizer<B>>> {
        self.active
            .lock()
            .unwrap()
            .as_ref()
            .map(|active| Arc::clone(&active.sync))
    }

    /// Manual refresh. A no-op while signed out.
    pub async fn refresh(&self) -> Result<(), TaskError> {
        match self.synchronizer() {
            Some(sync) => sync.load_all().await,
            None => {
                debug!("refresh ignored while signed out");
                Ok(())
            }
        }
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> Result<(), AuthError> {
        self.backend.sign_up(email, password).await
    }

    /// Password sign-in. The phase transition arrives via the provider's
    /// change channel shortly after this returns.
    pub async fn sign_in_password(&self, email: &str, password: &str) -> Result<(), AuthError> {
        self.backend.sign_in_password(email, password).await.map(|_| ())
    }

    pub async fn sign_in_magic_link(&self, email: &str) -> Result<(), AuthError> {
        self.backend.sign_in_magic_link(email).await
    }

    pub async fn sign_out(&self) -> Result<(), AuthError> {
        self.backend.sign_out().await
    }

    /// Tear down the active session and stop watching for changes.
    pub fn shutdown(&self) {
        if let Some(watcher) = self.watcher.lock().unwrap().take() {
            watcher.abort();
        }
        self.teardown();
    }

    async fn enter_signed_in(&self, session: Session) {
        // Replace any previous session's synchronizer and subscription.
        self.teardown();
        debug!(user = %session.user_id, "entering signed-in phase");

        let sync = Arc::new(TaskSynchronizer::new(self.backend.clone(), session.user_id));
        // Subscribe before the first load so no change slips between them.
        let feed = self.backend.subscribe().await;
        if let Err(err) = sync.load_all().await {
            warn!(error = %err, "initial task load failed");
        }
        let pump = match feed {
            Ok(mut feed) => {
                let sync = Arc::clone(&sync);
                Some(tokio::spawn(async move {
                    while let Some(event) = feed.recv().await {
                        debug!(?event, "remote change, reloading");
                        if let Err(err) = sync.load_all().await {
                            warn!(error = %err, "reload after remote change failed");
                        }
                    }
                }))
            }
            Err(err) => {
                warn!(error = %err, "change subscription failed");
                None
            }
        };

        *self.active.lock().unwrap() = Some(Active { sync, pump });
        self.phase_tx.send_replace(Phase::SignedIn(session));
    }

    fn enter_signed_out(&self) {
        debug!("entering signed-out phase");
        self.teardown();
        self.phase_tx.send_replace(Phase::SignedOut);
    }

    fn teardown(&self) {
        // Dropping Active aborts the pump, which drops the feed and with
        // it the subscription; the synchronizer's state goes with it.
        self.active.lock().unwrap().take();
    }
}
