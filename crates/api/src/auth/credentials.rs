//! Credential store
//!
//! Maps identity to a versioned password hash and profile fields over
//! the KV port. Users live at `user:<id>`; reverse lookup indexes live
//! at `user_email:<folded>` and `user_name:<folded>`. The store has no
//! foreign keys, so every create, update and erase here writes the
//! primary record together with its index entries.

use std::sync::Arc;

use gatewiki_shared::{KvStore, Role, StoreError, User, UserId};
use time::OffsetDateTime;
use uuid::Uuid;

use super::password::{hash_password, needs_upgrade, verify_password, PasswordError};

/// Outcome of a credential check. Absence, an unconfirmed address and
/// a wrong password are separated here so the facade can pick
/// responses; externally the first and last collapse into one generic
/// "invalid credentials".
#[derive(Debug)]
pub enum VerifyOutcome {
    Ok(User),
    /// Credentials are correct but the address was never confirmed
    NeedsConfirmation,
    InvalidCredentials,
}

/// Fields for a new account
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub name: String,
    pub email: String,
    pub password: String,
    /// Admin-created accounts skip the confirmation email
    pub email_confirmed: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("Email already registered")]
    DuplicateEmail,
    #[error("Username already taken")]
    DuplicateUsername,
    #[error(transparent)]
    Hash(#[from] PasswordError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct CredentialStore {
    kv: Arc<dyn KvStore>,
}

impl CredentialStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    fn user_key(id: UserId) -> String {
        format!("user:{}", id)
    }

    fn email_key(email: &str) -> String {
        format!("user_email:{}", fold(email))
    }

    fn username_key(username: &str) -> String {
        format!("user_name:{}", fold(username))
    }

    async fn write_user(&self, user: &User) -> Result<(), StoreError> {
        let raw = serde_json::to_string(user).map_err(|e| StoreError::Internal(e.to_string()))?;
        self.kv.put(&Self::user_key(user.id), &raw, None).await
    }

    pub async fn get(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let key = Self::user_key(id);
        match self.kv.get(&key).await? {
            Some(raw) => {
                let user = serde_json::from_str(&raw).map_err(|e| StoreError::Corrupt {
                    key,
                    reason: e.to_string(),
                })?;
                Ok(Some(user))
            }
            None => Ok(None),
        }
    }

    pub async fn get_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let Some(raw_id) = self.kv.get(&Self::email_key(email)).await? else {
            return Ok(None);
        };
        let id = Uuid::parse_str(&raw_id).map_err(|e| StoreError::Corrupt {
            key: Self::email_key(email),
            reason: e.to_string(),
        })?;
        self.get(UserId(id)).await
    }

    /// Check credentials for a login. Fails closed: an absent user, an
    /// unconfirmed address and a hash mismatch all come back not-ok.
    pub async fn verify(
        &self,
        email: &str,
        plaintext: &str,
    ) -> Result<VerifyOutcome, CredentialError> {
        let Some(user) = self.get_by_email(email).await? else {
            tracing::warn!(email = %fold(email), "verify: user not found");
            return Ok(VerifyOutcome::InvalidCredentials);
        };

        if !verify_password(plaintext, &user.password_hash)? {
            tracing::warn!(user_id = %user.id, "verify: hash mismatch");
            return Ok(VerifyOutcome::InvalidCredentials);
        }

        if !user.email_confirmed {
            tracing::info!(user_id = %user.id, "verify: email not confirmed");
            return Ok(VerifyOutcome::NeedsConfirmation);
        }

        Ok(VerifyOutcome::Ok(user))
    }

    /// Create an account with a V2 hash, writing the primary record
    /// and both index entries
    pub async fn create(&self, new: NewUser) -> Result<User, CredentialError> {
        if self.kv.get(&Self::email_key(&new.email)).await?.is_some() {
            return Err(CredentialError::DuplicateEmail);
        }
        if self
            .kv
            .get(&Self::username_key(&new.username))
            .await?
            .is_some()
        {
            return Err(CredentialError::DuplicateUsername);
        }

        let role = Role::default();
        let user = User {
            id: UserId::new(),
            username: new.username.trim().to_string(),
            name: new.name.trim().to_string(),
            email: fold(&new.email),
            password_hash: hash_password(&new.password)?,
            role,
            access_level: role.access_level(),
            email_confirmed: new.email_confirmed,
            created_at: OffsetDateTime::now_utc(),
        };

        self.write_user(&user).await?;
        self.kv
            .put(&Self::email_key(&user.email), &user.id.0.to_string(), None)
            .await?;
        self.kv
            .put(
                &Self::username_key(&user.username),
                &user.id.0.to_string(),
                None,
            )
            .await?;

        tracing::info!(
            user_id = %user.id,
            email_confirmed = user.email_confirmed,
            "User created"
        );

        Ok(user)
    }

    /// Rewrite a legacy hash under V2 after a successful verification.
    /// Idempotent: a hash that is already V2 is left alone.
    pub async fn upgrade_hash(&self, user: &User, plaintext: &str) -> Result<(), CredentialError> {
        if !needs_upgrade(&user.password_hash) {
            return Ok(());
        }

        let mut updated = user.clone();
        updated.password_hash = hash_password(plaintext)?;
        self.write_user(&updated).await?;

        tracing::info!(user_id = %user.id, "Password hash upgraded to v2");
        Ok(())
    }

    /// Set a new password (always V2). Used by the reset flow.
    pub async fn update_password(
        &self,
        user_id: UserId,
        new_password: &str,
    ) -> Result<Option<User>, CredentialError> {
        let Some(mut user) = self.get(user_id).await? else {
            return Ok(None);
        };
        user.password_hash = hash_password(new_password)?;
        self.write_user(&user).await?;

        tracing::info!(user_id = %user_id, "Password updated");
        Ok(Some(user))
    }

    /// Mark the account's email address as confirmed
    pub async fn confirm_email(&self, user_id: UserId) -> Result<Option<User>, CredentialError> {
        let Some(mut user) = self.get(user_id).await? else {
            return Ok(None);
        };
        if !user.email_confirmed {
            user.email_confirmed = true;
            self.write_user(&user).await?;
            tracing::info!(user_id = %user_id, "Email confirmed");
        }
        Ok(Some(user))
    }

    /// Account erasure: the only hard delete. Removes the primary
    /// record and both index entries.
    pub async fn erase(&self, user_id: UserId) -> Result<(), CredentialError> {
        if let Some(user) = self.get(user_id).await? {
            self.kv.delete(&Self::email_key(&user.email)).await?;
            self.kv.delete(&Self::username_key(&user.username)).await?;
            self.kv.delete(&Self::user_key(user_id)).await?;
            tracing::info!(user_id = %user_id, "Account erased");
        }
        Ok(())
    }
}

/// Case-fold an identity value for index keys
fn fold(value: &str) -> String {
    value.trim().to_lowercase()
}
