//! Admin session tracking.
//!
//! The backend holds the authoritative session (cookie based); this keeps
//! a local view of who is logged in so privileged D-Bus calls can be gated
//! without a round trip, and re-checks with the backend on demand.

use chrono::{DateTime, Utc};
use presence_core::{AdminUser, AuthService, ServiceError};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: Uuid,
    pub user: AdminUser,
    pub started_at: DateTime<Utc>,
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("login rejected: {0}")]
    InvalidCredentials(String),
    #[error("no admin session")]
    NotAuthenticated,
    #[error(transparent)]
    Service(#[from] ServiceError),
}

#[derive(Clone)]
pub struct SessionManager {
    auth: Arc<dyn AuthService>,
    current: Arc<Mutex<Option<Session>>>,
}

impl SessionManager {
    pub fn new(auth: Arc<dyn AuthService>) -> Self {
        Self {
            auth,
            current: Arc::new(Mutex::new(None)),
        }
    }

    pub fn current(&self) -> Option<Session> {
        self.current.lock().ok().and_then(|s| s.clone())
    }

    /// The active session, or `NotAuthenticated`.
    pub fn require(&self) -> Result<Session, SessionError> {
        self.current().ok_or(SessionError::NotAuthenticated)
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<Session, SessionError> {
        let resp = self.auth.login(username, password).await?;
        let user = match (resp.success, resp.user) {
            (true, Some(user)) => user,
            (true, None) => AdminUser {
                username: username.to_string(),
                role: String::new(),
            },
            (false, _) => {
                let reason = resp
                    .message
                    .unwrap_or_else(|| "Invalid credentials".to_string());
                tracing::warn!(username, %reason, "admin login rejected");
                return Err(SessionError::InvalidCredentials(reason));
            }
        };

        let session = Session {
            id: Uuid::new_v4(),
            user,
            started_at: Utc::now(),
        };
        tracing::info!(session = %session.id, user = %session.user.username, "admin logged in");
        self.set(Some(session.clone()));
        Ok(session)
    }

    /// End the session locally. A backend failure is logged, not returned.
    pub async fn logout(&self) {
        if let Err(err) = self.auth.logout().await {
            tracing::warn!(error = %err, "backend logout failed; clearing local session anyway");
        }
        if let Some(session) = self.take() {
            tracing::info!(session = %session.id, "admin logged out");
        }
    }

    /// Re-check the session with the backend. Any mismatch clears it.
    pub async fn verify(&self) -> Result<Session, SessionError> {
        let Some(session) = self.current() else {
            return Err(SessionError::NotAuthenticated);
        };
        match self.auth.me().await {
            Ok(Some(user)) if user.username == session.user.username => Ok(session),
            Ok(_) => {
                tracing::info!(session = %session.id, "backend session gone");
                self.take();
                Err(SessionError::NotAuthenticated)
            }
            Err(err) => {
                self.take();
                Err(err.into())
            }
        }
    }

    fn set(&self, session: Option<Session>) {
        if let Ok(mut current) = self.current.lock() {
            *current = session;
        }
    }

    fn take(&self) -> Option<Session> {
        self.current.lock().ok().and_then(|mut s| s.take())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeBackend;

    #[tokio::test]
    async fn test_login_and_logout() {
        let backend = FakeBackend::new();
        let sessions = SessionManager::new(backend.clone());
        assert!(matches!(sessions.require(), Err(SessionError::NotAuthenticated)));

        let session = sessions.login("admin", "admin123").await.unwrap();
        assert_eq!(session.user.username, "admin");
        assert_eq!(session.user.role, "admin");
        assert_eq!(sessions.require().unwrap().id, session.id);

        sessions.logout().await;
        assert!(sessions.current().is_none());
        assert!(backend.me().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_bad_credentials_leave_no_session() {
        let sessions = SessionManager::new(FakeBackend::new());
        let err = sessions.login("admin", "nope").await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidCredentials(ref m) if m == "Invalid credentials"));
        assert!(sessions.current().is_none());
    }

    #[tokio::test]
    async fn test_verify_clears_expired_session() {
        let backend = FakeBackend::new();
        let sessions = SessionManager::new(backend.clone());
        sessions.login("admin", "admin123").await.unwrap();
        assert!(sessions.verify().await.is_ok());

        backend.expire_session();
        assert!(matches!(
            sessions.verify().await,
            Err(SessionError::NotAuthenticated)
        ));
        assert!(sessions.current().is_none());
    }
}
