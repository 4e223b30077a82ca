//! Common types used across Gatewiki

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// ID Wrappers
// =============================================================================

/// User ID wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for UserId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

// =============================================================================
// Roles
// =============================================================================

/// Wiki role, ordered by privilege
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Viewer,
    Contributor,
    Editor,
    Admin,
}

impl Role {
    /// Numeric access level, monotonic with privilege.
    /// Stored alongside the role so content gating can do a plain
    /// integer comparison without knowing the enum.
    pub fn access_level(&self) -> u8 {
        match self {
            Role::Viewer => 10,
            Role::Contributor => 20,
            Role::Editor => 30,
            Role::Admin => 100,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Viewer => "viewer",
            Role::Contributor => "contributor",
            Role::Editor => "editor",
            Role::Admin => "admin",
        }
    }
}

impl Default for Role {
    fn default() -> Self {
        Role::Viewer
    }
}

// =============================================================================
// Users
// =============================================================================

/// A wiki account.
///
/// Stored at `user:<id>` with reverse index entries at
/// `user_email:<folded email>` and `user_name:<folded username>`.
/// The store enforces no foreign keys; writers keep the primary record
/// and both index entries consistent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub name: String,
    /// Unique, compared case-insensitively
    pub email: String,
    /// Versioned hash: legacy V1 (hex sha256) or `v2:<iter>:<salt>:<hash>`
    pub password_hash: String,
    pub role: Role,
    pub access_level: u8,
    pub email_confirmed: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

// =============================================================================
// Sessions
// =============================================================================

/// A login session, stored at `session:<token>`.
///
/// Fixed TTL from creation; there is no renewal. An absent or expired
/// record reads as "no session".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub user_id: UserId,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl Session {
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        now >= self.expires_at
    }
}

// =============================================================================
// Abuse-resistance records
// =============================================================================

/// Sliding-window counter, keyed by `(action, dimension, value)`.
///
/// Mutated by read-modify-write; under concurrent requests two writers
/// can both observe the pre-increment count and both store `count + 1`,
/// undercounting by one per race. The underlying store offers no atomic
/// increment, so this is an accepted approximation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitRecord {
    pub attempt_count: u32,
    /// Unix timestamp of the window start
    pub window_start: i64,
}

/// Per-email failure tally and lockout state, keyed by folded email.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LockoutRecord {
    pub failure_count: u32,
    /// Unix timestamp; while in the future, every login check
    /// short-circuits as locked
    pub locked_until: Option<i64>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_access_level_monotonic_with_role() {
        assert!(Role::Viewer.access_level() < Role::Contributor.access_level());
        assert!(Role::Contributor.access_level() < Role::Editor.access_level());
        assert!(Role::Editor.access_level() < Role::Admin.access_level());
    }

    #[test]
    fn test_session_expiry() {
        let now = OffsetDateTime::now_utc();
        let session = Session {
            user_id: UserId::new(),
            created_at: now,
            expires_at: now + time::Duration::days(7),
        };
        assert!(!session.is_expired(now));
        assert!(session.is_expired(now + time::Duration::days(8)));
    }

    #[test]
    fn test_user_round_trips_through_json() {
        let user = User {
            id: UserId::new(),
            username: "wikiwright".to_string(),
            name: "Wiki Wright".to_string(),
            email: "w@example.com".to_string(),
            password_hash: "v2:100000:00:00".to_string(),
            role: Role::Editor,
            access_level: Role::Editor.access_level(),
            email_confirmed: true,
            created_at: OffsetDateTime::now_utc(),
        };
        let json = serde_json::to_string(&user).unwrap();
        let back: User = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, user.id);
        assert_eq!(back.role, Role::Editor);
        assert!(back.email_confirmed);
    }
}
