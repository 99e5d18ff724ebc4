//! Backend endpoint configuration from environment variables.

use std::time::Duration;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Connection settings for the hosted backend.
#[derive(Clone, Debug, PartialEq)]
pub struct BackendConfig {
    /// Project base URL, without a trailing slash.
    pub base_url: String,
    /// Public (anonymous) API key, sent with every request.
    pub anon_key: String,
    /// Deadline applied to each HTTP request.
    pub request_timeout: Duration,
    /// How often the change feed samples the table.
    pub poll_interval: Duration,
}

impl BackendConfig {
    pub fn new(base_url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            anon_key: anon_key.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Read the endpoint settings from `TODO_BACKEND_URL` and
    /// `TODO_BACKEND_ANON_KEY` (a `.env` file is honored).
    pub fn from_env() -> Result<Self, String> {
        dotenvy::dotenv().ok();

        let base_url =
            std::env::var("TODO_BACKEND_URL").map_err(|_| "TODO_BACKEND_URL not set")?;
        let anon_key =
            std::env::var("TODO_BACKEND_ANON_KEY").map_err(|_| "TODO_BACKEND_ANON_KEY not set")?;

        Ok(Self::new(base_url, anon_key))
    }

    /// Builder method to set the per-request deadline.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Builder method to set the change feed's sampling interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}
