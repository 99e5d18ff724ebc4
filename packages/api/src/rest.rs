//! Task table endpoints of the hosted backend.
//!
//! CRUD over the backend's row-level REST interface. Row visibility is
//! enforced remotely per authenticated user, so `select` simply asks for
//! everything. Writes request the stored representation back, which lets
//! the synchronizer fold server-assigned timestamps into local state.

use chrono::NaiveDate;
use serde::Serialize;
use tasks::{ChangeFeed, Priority, StoreError, Task, TaskPatch, TaskStore};
use uuid::Uuid;

use crate::backend::HttpBackend;
use crate::feed;

/// Insert payload: everything the client assigns. Timestamps are left to
/// the table defaults.
#[derive(Debug, Serialize)]
struct NewRow<'a> {
    id: Uuid,
    user_id: Uuid,
    title: &'a str,
    description: &'a str,
    completed: bool,
    priority: Priority,
    #[serde(skip_serializing_if = "Option::is_none")]
    deadline: Option<NaiveDate>,
}

impl<'a> NewRow<'a> {
    fn from_task(task: &'a Task) -> Self {
        Self {
            id: task.id,
            user_id: task.owner,
            title: &task.title,
            description: &task.description,
            completed: task.completed,
            priority: task.priority,
            deadline: task.deadline,
        }
    }
}

impl HttpBackend {
    fn store_transport_err(&self, err: reqwest::Error) -> StoreError {
        if err.is_timeout() {
            StoreError::Timeout(self.request_timeout_ms())
        } else {
            StoreError::Remote(err.to_string())
        }
    }
}

async fn ok_or_store(resp: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(StoreError::Unauthorized);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(StoreError::Remote(format!("{status}: {body}")))
}

/// The single row a write touched, out of the returned representation.
fn single(mut rows: Vec<Task>) -> Result<Task, StoreError> {
    if rows.is_empty() {
        return Err(StoreError::Remote("no row returned for write".into()));
    }
    Ok(rows.swap_remove(0))
}

impl TaskStore for HttpBackend {
    async fn select(&self) -> Result<Vec<Task>, StoreError> {
        let resp = self
            .inner
            .http
            .get(self.tasks_url())
            .query(&[("select", "*")])
            .header("apikey", &self.inner.config.anon_key)
            .bearer_auth(self.bearer())
            .send()
            .await
            .map_err(|e| self.store_transport_err(e))?;
        let resp = ok_or_store(resp).await?;
        resp.json().await.map_err(|e| self.store_transport_err(e))
    }

    async fn insert(&self, task: &Task) -> Result<Task, StoreError> {
        let resp = self
            .inner
            .http
            .post(self.tasks_url())
            .header("apikey", &self.inner.config.anon_key)
            .bearer_auth(self.bearer())
            .header("Prefer", "return=representation")
            .json(&NewRow::from_task(task))
            .send()
            .await
            .map_err(|e| self.store_transport_err(e))?;
        let resp = ok_or_store(resp).await?;
        let rows: Vec<Task> = resp.json().await.map_err(|e| self.store_transport_err(e))?;
        single(rows)
    }

    async fn update(&self, id: Uuid, patch: &TaskPatch) -> Result<Task, StoreError> {
        let resp = self
            .inner
            .http
            .patch(self.tasks_url())
            .query(&[("id", &format!("eq.{id}"))])
            .header("apikey", &self.inner.config.anon_key)
            .bearer_auth(self.bearer())
            .header("Prefer", "return=representation")
            .json(patch)
            .send()
            .await
            .map_err(|e| self.store_transport_err(e))?;
        let resp = ok_or_store(resp).await?;
        let rows: Vec<Task> = resp.json().await.map_err(|e| self.store_transport_err(e))?;
        single(rows)
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let resp = self
            .inner
            .http
            .delete(self.tasks_url())
            .query(&[("id", &format!("eq.{id}"))])
            .header("apikey", &self.inner.config.anon_key)
            .bearer_auth(self.bearer())
            .send()
            .await
            .map_err(|e| self.store_transport_err(e))?;
        ok_or_store(resp).await?;
        Ok(())
    }

    async fn subscribe(&self) -> Result<ChangeFeed, StoreError> {
        feed::open(self.clone()).await
    }
}
