//! Change feed over plain HTTP.
//!
//! The provider's realtime socket protocol is its own; this client stays
//! on the REST surface and samples the table instead. Every
//! `poll_interval` the feed fetches `(id, updated_at)` for all visible
//! rows and emits a [`TableEvent`] per difference against the previous
//! sample. Coarse, but every event resolves to a full reload on the
//! consumer side anyway, so per-row fidelity is not required — only that
//! a change eventually produces an event.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tasks::{ChangeFeed, FeedGuard, StoreError, TableEvent};
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::warn;
use uuid::Uuid;

use crate::backend::HttpBackend;

const FEED_CAPACITY: usize = 64;

#[derive(Debug, Deserialize)]
struct RowStamp {
    id: Uuid,
    updated_at: DateTime<Utc>,
}

type Stamps = HashMap<Uuid, DateTime<Utc>>;

/// Open the feed: take a baseline sample, then start the poll loop. Fails
/// fast if the table is unreachable.
pub(crate) async fn open(backend: HttpBackend) -> Result<ChangeFeed, StoreError> {
    let baseline = fetch_stamps(&backend).await?;
    let (tx, rx) = broadcast::channel(FEED_CAPACITY);
    let poll_interval = backend.inner.config.poll_interval;

    let worker = tokio::spawn(async move {
        let mut known = baseline;
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; the baseline already covers it.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match fetch_stamps(&backend).await {
                Ok(next) => {
                    for event in diff_stamps(&known, &next) {
                        let _ = tx.send(event);
                    }
                    known = next;
                }
                Err(err) => warn!(error = %err, "change feed sample failed"),
            }
        }
    });

    Ok(ChangeFeed::with_guard(rx, FeedGuard::new(worker)))
}

async fn fetch_stamps(backend: &HttpBackend) -> Result<Stamps, StoreError> {
    let resp = backend
        .inner
        .http
        .get(backend.tasks_url())
        .query(&[("select", "id,updated_at")])
        .header("apikey", &backend.inner.config.anon_key)
        .bearer_auth(backend.bearer())
        .send()
        .await
        .map_err(|e| StoreError::Remote(e.to_string()))?;
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(StoreError::Remote(format!("{status}: {body}")));
    }
    let rows: Vec<RowStamp> = resp
        .json()
        .await
        .map_err(|e| StoreError::Remote(e.to_string()))?;
    Ok(rows.into_iter().map(|r| (r.id, r.updated_at)).collect())
}

/// Events that turn one sample into the next.
fn diff_stamps(old: &Stamps, new: &Stamps) -> Vec<TableEvent> {
    let mut events = Vec::new();
    for (id, stamp) in new {
        match old.get(id) {
            None => events.push(TableEvent::Inserted(*id)),
            Some(prev) if prev != stamp => events.push(TableEvent::Updated(*id)),
            Some(_) => {}
        }
    }
    for id in old.keys() {
        if !new.contains_key(id) {
            events.push(TableEvent::Deleted(*id));
        }
    }
    events
}
