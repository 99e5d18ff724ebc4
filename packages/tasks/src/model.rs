//! # Domain model for tasks
//!
//! Defines the record type held in the remote `tasks` table and the two
//! input shapes used to mutate it. All types are `Serialize + Deserialize`
//! with the remote table's column names (`user_id`, `inserted_at`), so they
//! can be sent to and parsed from the backend directly.
//!
//! ## Types
//!
//! | Struct | Represents |
//! |--------|-----------|
//! | [`Task`] | A full task row: client-minted `id`, owning user, title/description, completion flag, [`Priority`], optional deadline, and the server-maintained timestamps. |
//! | [`TaskDraft`] | Input for creating a task. Owns title validation via [`TaskDraft::validated`]. |
//! | [`TaskPatch`] | A partial update. Every field is optional; unset fields serialize to nothing so the remote table only touches the listed columns. |
//! | [`Priority`] | `High` / `Medium` / `Low`, lowercase on the wire. |

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TaskError;

/// Task priority bucket.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        };
        write!(f, "{s}")
    }
}

/// A single row in the remote `tasks` table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Client-generated v4 UUID, unique across the whole table, immutable.
    pub id: Uuid,
    /// Id of the user who created the task; set once, never changed.
    #[serde(rename = "user_id")]
    pub owner: Uuid,
    /// Never empty at rest.
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub completed: bool,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub deadline: Option<NaiveDate>,
    /// Server-assigned creation timestamp, immutable.
    #[serde(rename = "inserted_at")]
    pub created_at: DateTime<Utc>,
    /// Refreshed on every mutation.
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Build a new local record from a validated draft. Timestamps are
    /// provisional until the store returns the canonical row.
    pub fn new(owner: Uuid, draft: TaskDraft) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner,
            title: draft.title,
            description: draft.description,
            completed: false,
            priority: draft.priority,
            deadline: draft.deadline,
            created_at: now,
            updated_at: now,
        }
    }

    /// Merge a patch into this task. Unset patch fields leave the current
    /// value untouched.
    pub fn apply(&mut self, patch: &TaskPatch) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(description) = &patch.description {
            self.description = description.clone();
        }
        if let Some(completed) = patch.completed {
            self.completed = completed;
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(deadline) = patch.deadline {
            self.deadline = Some(deadline);
        }
        if let Some(updated_at) = patch.updated_at {
            self.updated_at = updated_at;
        }
    }
}

/// Input for creating a task.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskDraft {
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub deadline: Option<NaiveDate>,
}

impl TaskDraft {
    /// Draft with medium priority and no deadline.
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            ..Self::default()
        }
    }

    /// Builder method to set the priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Builder method to set the deadline.
    pub fn with_deadline(mut self, deadline: NaiveDate) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Trim the title and reject the draft if it is empty. Runs before any
    /// remote call.
    pub fn validated(mut self) -> Result<Self, TaskError> {
        self.title = self.title.trim().to_string();
        if self.title.is_empty() {
            return Err(TaskError::Validation("title must not be empty".into()));
        }
        Ok(self)
    }
}

/// A partial update to an existing task. Unset fields are omitted from the
/// serialized form entirely.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<NaiveDate>,
    /// Stamped by the synchronizer when the patch is sent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl TaskPatch {
    /// Patch that only flips the completion flag.
    pub fn completed(done: bool) -> Self {
        Self {
            completed: Some(done),
            ..Self::default()
        }
    }

    /// Builder method to set the title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}
