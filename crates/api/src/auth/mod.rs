//! Authentication and abuse-resistance core for Gatewiki

pub mod credentials;
pub mod csrf;
pub mod password;
pub mod rate_limit;
pub mod sessions;
pub mod tokens;

pub use credentials::{CredentialError, CredentialStore, NewUser, VerifyOutcome};
pub use csrf::{CsrfError, CsrfGuard, CsrfRejection};
pub use password::{
    hash_password, needs_upgrade, validate_password_strength, verify_password, PasswordError,
    PasswordValidationError,
};
pub use rate_limit::{AbuseGuard, AuthAction, GuardConfig, LockoutStatus, RateLimitResult};
pub use sessions::{clear_session_cookie, set_session_cookie, SessionManager, SESSION_COOKIE};
pub use tokens::{TokenPurpose, TokenVault};
