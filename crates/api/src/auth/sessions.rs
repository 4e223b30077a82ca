//! Opaque cookie sessions
//!
//! A session is a random 256-bit token stored under `session:<token>`
//! with a fixed 7-day TTL. No implicit renewal: a session expires 7
//! days after login no matter how active the user is. The token never
//! encodes anything; idle clients and attackers alike learn nothing
//! from it.

use std::sync::Arc;
use std::time::Duration;

use gatewiki_shared::{KvStore, Session, StoreError, StoreResult, UserId};
use rand::RngCore;
use time::OffsetDateTime;
use tower_cookies::{
    cookie::{time::Duration as CookieDuration, SameSite},
    Cookie, Cookies,
};

pub const SESSION_COOKIE: &str = "gatewiki_session";

/// Fixed session lifetime
pub const SESSION_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

const SESSION_TOKEN_BYTES: usize = 32;

/// Stores and validates sessions over the KV port
#[derive(Clone)]
pub struct SessionManager {
    kv: Arc<dyn KvStore>,
}

impl SessionManager {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    fn session_key(token: &str) -> String {
        format!("session:{token}")
    }

    fn generate_token() -> String {
        let mut bytes = [0u8; SESSION_TOKEN_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    /// Create a session and return its opaque token
    pub async fn create(&self, user_id: UserId) -> StoreResult<(String, Session)> {
        let now = OffsetDateTime::now_utc();
        let session = Session {
            user_id,
            created_at: now,
            expires_at: now + SESSION_TTL,
        };
        let token = Self::generate_token();
        let raw =
            serde_json::to_string(&session).map_err(|e| StoreError::Internal(e.to_string()))?;
        self.kv
            .put(&Self::session_key(&token), &raw, Some(SESSION_TTL))
            .await?;
        tracing::info!(user_id = %session.user_id, "Session created");
        Ok((token, session))
    }

    /// Resolve a token to its session. Absent or past `expires_at`
    /// means anonymous; both the KV TTL and the stored timestamp are
    /// honored, whichever fires first.
    pub async fn validate(&self, token: &str) -> StoreResult<Option<Session>> {
        let key = Self::session_key(token);
        let Some(raw) = self.kv.get(&key).await? else {
            return Ok(None);
        };
        let session: Session = serde_json::from_str(&raw).map_err(|e| StoreError::Corrupt {
            key,
            reason: e.to_string(),
        })?;
        if session.is_expired(OffsetDateTime::now_utc()) {
            return Ok(None);
        }
        Ok(Some(session))
    }

    /// Delete a session. Idempotent; destroying twice is not an error.
    pub async fn destroy(&self, token: &str) -> StoreResult<()> {
        self.kv.delete(&Self::session_key(token)).await
    }

    /// Resolve the current request's session from its cookie jar
    pub async fn from_cookies(&self, cookies: &Cookies) -> StoreResult<Option<Session>> {
        match cookies.get(SESSION_COOKIE) {
            Some(cookie) => self.validate(cookie.value()).await,
            None => Ok(None),
        }
    }
}

/// Attach the session cookie. HttpOnly + Secure + SameSite=Strict with
/// Max-Age matching the session TTL.
pub fn set_session_cookie(cookies: &Cookies, token: &str) {
    let cookie = Cookie::build((SESSION_COOKIE, token.to_string()))
        .path("/")
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Strict)
        .max_age(CookieDuration::seconds(SESSION_TTL.as_secs() as i64))
        .build();
    cookies.add(cookie);
}

/// Overwrite the session cookie with an epoch expiry so clients drop it
pub fn clear_session_cookie(cookies: &Cookies) {
    let cookie = Cookie::build((SESSION_COOKIE, ""))
        .path("/")
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Strict)
        .max_age(CookieDuration::ZERO)
        .build();
    cookies.add(cookie);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use gatewiki_shared::MemoryKv;
    use uuid::Uuid;

    fn manager() -> SessionManager {
        SessionManager::new(Arc::new(MemoryKv::new()))
    }

    #[tokio::test]
    async fn test_create_then_validate() {
        let manager = manager();
        let user_id = UserId(Uuid::new_v4());
        let (token, session) = manager.create(user_id).await.unwrap();

        assert_eq!(token.len(), 64);
        assert_eq!((session.expires_at - session.created_at).whole_days(), 7);

        let resolved = manager.validate(&token).await.unwrap().unwrap();
        assert_eq!(resolved.user_id, user_id);
    }

    #[tokio::test]
    async fn test_unknown_token_is_anonymous() {
        let manager = manager();
        assert!(manager.validate("deadbeef").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_record_is_anonymous() {
        let manager = manager();
        let now = OffsetDateTime::now_utc();
        let stale = Session {
            user_id: UserId(Uuid::new_v4()),
            created_at: now - time::Duration::days(8),
            expires_at: now - time::Duration::days(1),
        };
        let raw = serde_json::to_string(&stale).unwrap();
        manager
            .kv
            .put(&SessionManager::session_key("stale"), &raw, None)
            .await
            .unwrap();

        assert!(manager.validate("stale").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_destroy_is_idempotent() {
        let manager = manager();
        let (token, _) = manager.create(UserId(Uuid::new_v4())).await.unwrap();

        manager.destroy(&token).await.unwrap();
        assert!(manager.validate(&token).await.unwrap().is_none());
        // Second destroy is a no-op, not an error
        manager.destroy(&token).await.unwrap();
    }

    #[tokio::test]
    async fn test_tokens_are_unique() {
        let manager = manager();
        let (a, _) = manager.create(UserId(Uuid::new_v4())).await.unwrap();
        let (b, _) = manager.create(UserId(Uuid::new_v4())).await.unwrap();
        assert_ne!(a, b);
    }
}
