//! # Hosted identity seam
//!
//! [`AuthGateway`] is the async interface to the identity provider. The
//! application never inspects credentials or tokens itself; it holds a
//! read-only [`Session`] and reacts to replacement/clearing notifications
//! on the [`AuthGateway::on_change`] channel.

use std::future::Future;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use uuid::Uuid;

use crate::error::AuthError;

/// Opaque handle to an authenticated identity, owned by the provider.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: Uuid,
    pub email: String,
    pub access_token: String,
}

/// Async interface to the hosted identity provider.
pub trait AuthGateway {
    /// The session currently held by the provider, if any.
    fn current_session(&self) -> impl Future<Output = Result<Option<Session>, AuthError>> + Send;
    /// Register a new account. May or may not produce a live session,
    /// depending on the provider's confirmation policy.
    fn sign_up(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = Result<(), AuthError>> + Send;
    /// Password sign-in; installs and returns the new session.
    fn sign_in_password(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = Result<Session, AuthError>> + Send;
    /// Request a passwordless sign-in link. Completion happens out of band
    /// and is observed via [`AuthGateway::on_change`].
    fn sign_in_magic_link(&self, email: &str)
        -> impl Future<Output = Result<(), AuthError>> + Send;
    /// Drop the current session.
    fn sign_out(&self) -> impl Future<Output = Result<(), AuthError>> + Send;
    /// Notifications carrying the replacement session (`None` = signed out).
    fn on_change(&self) -> watch::Receiver<Option<Session>>;
}
