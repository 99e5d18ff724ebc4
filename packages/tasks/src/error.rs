//! Error types shared across the task client.

use thiserror::Error;
use uuid::Uuid;

/// Failures reported by the remote task table.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Network, constraint, or backend failure, with the raw message the
    /// remote side reported.
    #[error("remote store error: {0}")]
    Remote(String),
    /// The call did not complete within the configured deadline.
    #[error("remote call timed out after {0}ms")]
    Timeout(u64),
    /// No authenticated identity, or the row belongs to someone else.
    #[error("not authorized")]
    Unauthorized,
}

/// Failures reported by the hosted identity provider.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("auth provider error: {0}")]
    Remote(String),
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("auth call timed out after {0}ms")]
    Timeout(u64),
}

/// Failures surfaced by [`crate::sync::TaskSynchronizer`] operations.
///
/// Validation errors are raised before any remote call is made; store
/// errors mean the optimistic local change was rolled back or the local
/// state was resynchronized from the remote table.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("no task with id {0} in local state")]
    UnknownTask(Uuid),
    #[error(transparent)]
    Store(#[from] StoreError),
}
