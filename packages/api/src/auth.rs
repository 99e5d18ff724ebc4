//! Identity endpoints of the hosted backend.
//!
//! Plain JSON calls against the provider's auth API: `signup`,
//! `token?grant_type=password`, `otp` (magic link), `logout`. The provider
//! owns every credential check; this module only forwards requests and
//! holds the session it hands back.

use serde::Deserialize;
use serde_json::json;
use tasks::{AuthError, AuthGateway, Session};
use tokio::sync::watch;
use tracing::warn;
use uuid::Uuid;

use crate::backend::HttpBackend;

/// Session payload as the provider returns it.
#[derive(Debug, Deserialize)]
struct WireSession {
    access_token: String,
    user: WireUser,
}

#[derive(Debug, Deserialize)]
struct WireUser {
    id: Uuid,
    email: Option<String>,
}

impl WireSession {
    fn into_session(self) -> Session {
        Session {
            user_id: self.user.id,
            email: self.user.email.unwrap_or_default(),
            access_token: self.access_token,
        }
    }
}

impl HttpBackend {
    fn auth_transport_err(&self, err: reqwest::Error) -> AuthError {
        if err.is_timeout() {
            AuthError::Timeout(self.request_timeout_ms())
        } else {
            AuthError::Remote(err.to_string())
        }
    }
}

async fn ok_or_auth(resp: reqwest::Response) -> Result<reqwest::Response, AuthError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(AuthError::Remote(format!("{status}: {body}")))
}

impl AuthGateway for HttpBackend {
    async fn current_session(&self) -> Result<Option<Session>, AuthError> {
        Ok(self.inner.session.read().unwrap().clone())
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<(), AuthError> {
        let resp = self
            .inner
            .http
            .post(self.auth_url("signup"))
            .header("apikey", &self.inner.config.anon_key)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(|e| self.auth_transport_err(e))?;
        let resp = ok_or_auth(resp).await?;

        // Deployments without email confirmation return a live session.
        let body = resp.text().await.unwrap_or_default();
        if let Ok(wire) = serde_json::from_str::<WireSession>(&body) {
            self.install_session(Some(wire.into_session()));
        }
        Ok(())
    }

    async fn sign_in_password(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let resp = self
            .inner
            .http
            .post(self.auth_url("token"))
            .query(&[("grant_type", "password")])
            .header("apikey", &self.inner.config.anon_key)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(|e| self.auth_transport_err(e))?;

        let status = resp.status();
        if status == reqwest::StatusCode::BAD_REQUEST
            || status == reqwest::StatusCode::UNAUTHORIZED
        {
            return Err(AuthError::InvalidCredentials);
        }
        let resp = ok_or_auth(resp).await?;

        let wire: WireSession = resp
            .json()
            .await
            .map_err(|e| AuthError::Remote(format!("malformed session payload: {e}")))?;
        let session = wire.into_session();
        self.install_session(Some(session.clone()));
        Ok(session)
    }

    async fn sign_in_magic_link(&self, email: &str) -> Result<(), AuthError> {
        let resp = self
            .inner
            .http
            .post(self.auth_url("otp"))
            .header("apikey", &self.inner.config.anon_key)
            .json(&json!({ "email": email, "create_user": true }))
            .send()
            .await
            .map_err(|e| self.auth_transport_err(e))?;
        ok_or_auth(resp).await?;
        Ok(())
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        let token = self.bearer();
        let result = self
            .inner
            .http
            .post(self.auth_url("logout"))
            .header("apikey", &self.inner.config.anon_key)
            .bearer_auth(token)
            .send()
            .await;
        // The local session is dropped regardless of what the provider said.
        self.install_session(None);
        if let Err(err) = result {
            warn!(error = %err, "remote logout failed, session dropped locally");
        }
        Ok(())
    }

    fn on_change(&self) -> watch::Receiver<Option<Session>> {
        self.inner.session_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_session_parses_provider_payload() {
        let body = r#"{
            "access_token": "jwt-token",
            "token_type": "bearer",
            "expires_in": 3600,
            "user": { "id": "a9f6d4f1-9f01-4c6f-8e6c-0d6a3b1f2e55", "email": "ada@example.com" }
        }"#;
        let wire: WireSession = serde_json::from_str(body).unwrap();
        let session = wire.into_session();
        assert_eq!(session.email, "ada@example.com");
        assert_eq!(session.access_token, "jwt-token");
    }

    #[test]
    fn test_wire_session_tolerates_missing_email() {
        let body = r#"{
            "access_token": "jwt",
            "user": { "id": "a9f6d4f1-9f01-4c6f-8e6c-0d6a3b1f2e55" }
        }"#;
        let wire: WireSession = serde_json::from_str(body).unwrap();
        assert_eq!(wire.into_session().email, "");
    }
}
