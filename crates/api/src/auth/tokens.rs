//! Email confirmation and password reset tokens
//!
//! Short-lived, single-use opaque tokens. The token itself is the
//! lookup key; it carries no decodable meaning. Consuming a token
//! deletes it, and a consumed or expired token reads exactly like one
//! that never existed.

use std::sync::Arc;
use std::time::Duration;

use gatewiki_shared::{KvStore, StoreResult, UserId};
use rand::RngCore;
use uuid::Uuid;

/// Token purpose for verification flows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenPurpose {
    EmailConfirm,
    PasswordReset,
}

impl TokenPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenPurpose::EmailConfirm => "confirm",
            TokenPurpose::PasswordReset => "reset",
        }
    }

    /// Time-to-live for tokens of this purpose
    pub fn ttl(&self) -> Duration {
        match self {
            TokenPurpose::EmailConfirm => Duration::from_secs(24 * 60 * 60),
            TokenPurpose::PasswordReset => Duration::from_secs(2 * 60 * 60),
        }
    }
}

/// Vault for single-use verification tokens
#[derive(Clone)]
pub struct TokenVault {
    kv: Arc<dyn KvStore>,
}

impl TokenVault {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// Generate a secure random token
    ///
    /// Returns a 32-byte hex-encoded token (64 characters, 256 bits)
    fn generate_token() -> String {
        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    fn key(purpose: TokenPurpose, token: &str) -> String {
        format!("token:{}:{}", purpose.as_str(), token)
    }

    /// Issue a new token mapped to the user, expiring after the
    /// purpose's TTL
    pub async fn issue(&self, purpose: TokenPurpose, user_id: UserId) -> StoreResult<String> {
        let token = Self::generate_token();
        self.kv
            .put(
                &Self::key(purpose, &token),
                &user_id.0.to_string(),
                Some(purpose.ttl()),
            )
            .await?;

        tracing::info!(
            user_id = %user_id,
            purpose = %purpose.as_str(),
            "Verification token issued"
        );

        Ok(token)
    }

    /// Look up a token and delete it.
    ///
    /// Get-then-delete on a store with no transactions: two concurrent
    /// consumers of the same token can race through the narrow window
    /// between the read and the delete. Accepted risk; the token is
    /// gone either way.
    pub async fn consume(
        &self,
        purpose: TokenPurpose,
        token: &str,
    ) -> StoreResult<Option<UserId>> {
        let key = Self::key(purpose, token);
        let Some(raw) = self.kv.get(&key).await? else {
            return Ok(None);
        };
        self.kv.delete(&key).await?;

        let user_id = match Uuid::parse_str(&raw) {
            Ok(id) => UserId(id),
            Err(e) => {
                tracing::error!(purpose = %purpose.as_str(), error = %e, "Corrupt token record");
                return Ok(None);
            }
        };

        tracing::info!(
            user_id = %user_id,
            purpose = %purpose.as_str(),
            "Verification token consumed"
        );

        Ok(Some(user_id))
    }

    /// Read a token without consuming it, for validating a reset link
    /// before rendering the form
    pub async fn peek(&self, purpose: TokenPurpose, token: &str) -> StoreResult<Option<UserId>> {
        let Some(raw) = self.kv.get(&Self::key(purpose, token)).await? else {
            return Ok(None);
        };
        Ok(Uuid::parse_str(&raw).ok().map(UserId))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use gatewiki_shared::MemoryKv;

    fn vault() -> TokenVault {
        TokenVault::new(Arc::new(MemoryKv::new()))
    }

    #[test]
    fn test_token_generation() {
        let token1 = TokenVault::generate_token();
        let token2 = TokenVault::generate_token();

        // 32 bytes hex-encoded
        assert_eq!(token1.len(), 64);
        assert_ne!(token1, token2);
        assert!(token1.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn test_token_single_use() {
        let vault = vault();
        let user_id = UserId::new();

        let token = vault
            .issue(TokenPurpose::EmailConfirm, user_id)
            .await
            .unwrap();

        // First consume succeeds and returns the right user
        let first = vault
            .consume(TokenPurpose::EmailConfirm, &token)
            .await
            .unwrap();
        assert_eq!(first, Some(user_id));

        // Every subsequent consume reads as absent
        for _ in 0..3 {
            let again = vault
                .consume(TokenPurpose::EmailConfirm, &token)
                .await
                .unwrap();
            assert_eq!(again, None);
        }
    }

    #[tokio::test]
    async fn test_peek_does_not_consume() {
        let vault = vault();
        let user_id = UserId::new();

        let token = vault
            .issue(TokenPurpose::PasswordReset, user_id)
            .await
            .unwrap();

        assert_eq!(
            vault.peek(TokenPurpose::PasswordReset, &token).await.unwrap(),
            Some(user_id)
        );
        assert_eq!(
            vault
                .consume(TokenPurpose::PasswordReset, &token)
                .await
                .unwrap(),
            Some(user_id)
        );
        assert_eq!(
            vault.peek(TokenPurpose::PasswordReset, &token).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_purposes_are_namespaced() {
        let vault = vault();
        let user_id = UserId::new();

        let token = vault
            .issue(TokenPurpose::EmailConfirm, user_id)
            .await
            .unwrap();

        // A confirm token is not a reset token
        assert_eq!(
            vault
                .consume(TokenPurpose::PasswordReset, &token)
                .await
                .unwrap(),
            None
        );
        assert_eq!(
            vault
                .consume(TokenPurpose::EmailConfirm, &token)
                .await
                .unwrap(),
            Some(user_id)
        );
    }

    #[tokio::test]
    async fn test_never_issued_token_is_absent() {
        let vault = vault();
        let made_up = "a".repeat(64);
        assert_eq!(
            vault
                .consume(TokenPurpose::EmailConfirm, &made_up)
                .await
                .unwrap(),
            None
        );
    }
}
