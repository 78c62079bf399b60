use async_trait::async_trait;
use axum::http::{HeaderMap, header};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;

/// Cookie carrying the session token.
pub const SESSION_COOKIE: &str = "tagfoot_session";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session provider unavailable: {0}")]
    Provider(String),
}

/// The authenticated viewer behind a request. The first role in the list is
/// the effective role for opt-out checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Viewer {
    pub user_id: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl Viewer {
    pub fn primary_role(&self) -> Option<&str> {
        self.roles.first().map(String::as_str)
    }
}

#[async_trait]
pub trait SessionManager: Send + Sync {
    async fn validate(&self, token: Option<String>) -> Result<Option<Viewer>, SessionError>;
    async fn issue(&self, viewer: Viewer) -> Result<String, SessionError>;
}

/// Sessions held in process memory; tokens are random v4 UUIDs.
#[derive(Default)]
pub struct MemorySessionManager {
    sessions: RwLock<HashMap<String, Viewer>>,
}

#[async_trait]
impl SessionManager for MemorySessionManager {
    async fn validate(&self, token: Option<String>) -> Result<Option<Viewer>, SessionError> {
        let Some(token) = token else {
            return Ok(None);
        };
        Ok(self.sessions.read().await.get(&token).cloned())
    }

    async fn issue(&self, viewer: Viewer) -> Result<String, SessionError> {
        let token = uuid::Uuid::new_v4().to_string();
        tracing::info!(user = %viewer.user_id, roles = ?viewer.roles, "issued session");
        self.sessions.write().await.insert(token.clone(), viewer);
        Ok(token)
    }
}

/// Extracts the session token from the request's Cookie header.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::COOKIE)
        .and_then(|value| value.to_str().ok())
        .and_then(|cookies| {
            cookies.split(';').find_map(|cookie| {
                cookie
                    .trim()
                    .strip_prefix(SESSION_COOKIE)
                    .and_then(|rest| rest.strip_prefix('='))
                    .map(|token| token.to_string())
            })
        })
}

pub fn make_session_cookie(token: &str) -> String {
    format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[tokio::test]
    async fn issued_sessions_validate_to_the_same_viewer() {
        let manager = MemorySessionManager::default();
        let token = manager
            .issue(Viewer {
                user_id: "alice".into(),
                roles: vec!["editor".into(), "author".into()],
            })
            .await
            .unwrap();

        let viewer = manager.validate(Some(token)).await.unwrap().unwrap();
        assert_eq!(viewer.user_id, "alice");
        assert_eq!(viewer.primary_role(), Some("editor"));
    }

    #[tokio::test]
    async fn unknown_or_missing_tokens_are_anonymous() {
        let manager = MemorySessionManager::default();
        assert!(manager.validate(None).await.unwrap().is_none());
        assert!(
            manager
                .validate(Some("bogus".into()))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn parses_the_session_cookie_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; tagfoot_session=tok-123; lang=en"),
        );
        assert_eq!(session_token(&headers), Some("tok-123".to_string()));

        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("theme=dark"));
        assert_eq!(session_token(&headers), None);
    }

    #[test]
    fn cookie_round_trips_through_the_parser() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(&make_session_cookie("tok-456")).unwrap(),
        );
        assert_eq!(session_token(&headers), Some("tok-456".to_string()));
    }
}
