//! Shared HTTP handle for the hosted backend.

use std::sync::{Arc, RwLock};

use tasks::Session;
use tokio::sync::watch;

use crate::config::BackendConfig;

/// One cheaply-clonable handle to the hosted backend. Implements both
/// [`tasks::TaskStore`] (in `rest`) and [`tasks::AuthGateway`] (in
/// `auth`); all clones share the HTTP connection pool and the current
/// session.
#[derive(Clone)]
pub struct HttpBackend {
    pub(crate) inner: Arc<HttpInner>,
}

pub(crate) struct HttpInner {
    pub(crate) http: reqwest::Client,
    pub(crate) config: BackendConfig,
    pub(crate) session: RwLock<Option<Session>>,
    pub(crate) session_tx: watch::Sender<Option<Session>>,
}

impl HttpBackend {
    pub fn new(config: BackendConfig) -> Result<Self, String> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| format!("could not build HTTP client: {e}"))?;
        let (session_tx, _) = watch::channel(None);
        Ok(Self {
            inner: Arc::new(HttpInner {
                http,
                config,
                session: RwLock::new(None),
                session_tx,
            }),
        })
    }

    /// Backend configured from the environment (see
    /// [`BackendConfig::from_env`]).
    pub fn from_env() -> Result<Self, String> {
        Self::new(BackendConfig::from_env()?)
    }

    pub(crate) fn auth_url(&self, endpoint: &str) -> String {
        format!("{}/auth/v1/{endpoint}", self.inner.config.base_url)
    }

    pub(crate) fn tasks_url(&self) -> String {
        format!("{}/rest/v1/tasks", self.inner.config.base_url)
    }

    /// Bearer token for data requests: the signed-in user's access token,
    /// or the anonymous key before sign-in.
    pub(crate) fn bearer(&self) -> String {
        self.inner
            .session
            .read()
            .unwrap()
            .as_ref()
            .map(|s| s.access_token.clone())
            .unwrap_or_else(|| self.inner.config.anon_key.clone())
    }

    /// Replace the held session and notify observers.
    pub(crate) fn install_session(&self, session: Option<Session>) {
        *self.inner.session.write().unwrap() = session.clone();
        self.inner.session_tx.send_replace(session);
    }

    pub(crate) fn request_timeout_ms(&self) -> u64 {
        self.inner.config.request_timeout.as_millis() as u64
    }
}
