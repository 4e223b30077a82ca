//! Versioned password hashing
//!
//! Two formats coexist. Legacy V1 is a single SHA-256 over a fixed
//! salt and the password, hex encoded; it is verify-only and survives
//! from migrated accounts. V2 is PBKDF2-HMAC-SHA256 with 100,000
//! iterations, a 16-byte random salt and a 32-byte output, encoded as
//! `v2:<iterations>:<saltHex>:<hashHex>`. Every successful V1
//! verification is followed by a transparent re-hash under V2 at the
//! facade; no third scheme is ever introduced.

use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

const V2_PREFIX: &str = "v2:";
const V2_ITERATIONS: u32 = 100_000;
const V2_SALT_LEN: usize = 16;
const V2_HASH_LEN: usize = 32;

/// Fixed salt of the legacy scheme. Never used for new hashes.
const V1_FIXED_SALT: &str = "gatewiki.v1:";

/// Hash a password under the current (V2) scheme
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let mut salt = [0u8; V2_SALT_LEN];
    rand::rngs::OsRng.fill_bytes(&mut salt);

    let mut out = [0u8; V2_HASH_LEN];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, V2_ITERATIONS, &mut out);

    Ok(format!(
        "{}{}:{}:{}",
        V2_PREFIX,
        V2_ITERATIONS,
        hex::encode(salt),
        hex::encode(out)
    ))
}

/// Verify a password against a stored hash of either version
pub fn verify_password(password: &str, hash: &str) -> Result<bool, PasswordError> {
    if let Some(rest) = hash.strip_prefix(V2_PREFIX) {
        return verify_v2(password, rest);
    }

    // Legacy V1: bare hex sha256
    if hash.len() == 64 && hash.chars().all(|c| c.is_ascii_hexdigit()) {
        let expected = hex::decode(hash).map_err(|e| PasswordError::InvalidHash(e.to_string()))?;
        let actual = v1_digest(password);
        return Ok(actual.ct_eq(expected.as_slice()).into());
    }

    Err(PasswordError::InvalidHash(
        "unrecognized hash format".to_string(),
    ))
}

/// Whether a stored hash predates the current scheme.
/// A V1 hash should be rewritten under V2 on the next successful verify.
pub fn needs_upgrade(hash: &str) -> bool {
    !hash.starts_with(V2_PREFIX)
}

fn verify_v2(password: &str, encoded: &str) -> Result<bool, PasswordError> {
    let mut parts = encoded.splitn(3, ':');
    let (iterations, salt_hex, hash_hex) = match (parts.next(), parts.next(), parts.next()) {
        (Some(i), Some(s), Some(h)) => (i, s, h),
        _ => {
            return Err(PasswordError::InvalidHash(
                "malformed v2 hash".to_string(),
            ))
        }
    };

    let iterations: u32 = iterations
        .parse()
        .map_err(|_| PasswordError::InvalidHash("bad iteration count".to_string()))?;
    let salt = hex::decode(salt_hex).map_err(|e| PasswordError::InvalidHash(e.to_string()))?;
    let expected = hex::decode(hash_hex).map_err(|e| PasswordError::InvalidHash(e.to_string()))?;
    if expected.len() != V2_HASH_LEN {
        return Err(PasswordError::InvalidHash(
            "bad v2 digest length".to_string(),
        ));
    }

    let mut out = [0u8; V2_HASH_LEN];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, iterations, &mut out);

    Ok(out.ct_eq(expected.as_slice()).into())
}

fn v1_digest(password: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(V1_FIXED_SALT.as_bytes());
    hasher.update(password.as_bytes());
    hasher.finalize().into()
}

/// Produce a legacy V1 hash. Fixture helper for exercising the
/// upgrade path; production code only ever writes V2.
#[cfg(test)]
pub(crate) fn legacy_v1_hash(password: &str) -> String {
    hex::encode(v1_digest(password))
}

/// Validate password strength for new passwords
pub fn validate_password_strength(password: &str) -> Result<(), PasswordValidationError> {
    if password.len() < 8 {
        return Err(PasswordValidationError::TooShort);
    }

    if password.len() > 128 {
        return Err(PasswordValidationError::TooLong);
    }

    let has_lowercase = password.chars().any(|c| c.is_ascii_lowercase());
    let has_uppercase = password.chars().any(|c| c.is_ascii_uppercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());

    if !has_lowercase {
        return Err(PasswordValidationError::MissingLowercase);
    }

    if !has_uppercase {
        return Err(PasswordValidationError::MissingUppercase);
    }

    if !has_digit {
        return Err(PasswordValidationError::MissingDigit);
    }

    if is_common_password(password) {
        return Err(PasswordValidationError::TooCommon);
    }

    Ok(())
}

/// Check if password is in the common passwords list
fn is_common_password(password: &str) -> bool {
    let password_lower = password.to_lowercase();

    const COMMON_PASSWORDS: &[&str] = &[
        "password",
        "password1",
        "password12",
        "password123",
        "password1234",
        "12345678",
        "123456789",
        "1234567890",
        "qwerty123",
        "abcd1234",
        "letmein1",
        "welcome1",
        "welcome123",
        "admin123",
        "root1234",
        "iloveyou1",
        "trustno1",
        "sunshine1",
        "superman1",
        "football1",
        "baseball1",
        "master123",
        "hello123",
        "freedom1",
        "whatever1",
        "1q2w3e4r",
        "1qaz2wsx",
        "zaq12wsx",
        "abc12345",
        "mypassword1",
        "changeme1",
        "password!",
        "qwertyuiop1",
        "asdfghjkl1",
        "secret123",
        "letmein123",
        "welcome12",
        "admin1234",
        "test1234",
        "guest1234",
    ];

    COMMON_PASSWORDS.contains(&password_lower.as_str())
}

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("Password hashing failed: {0}")]
    Hashing(String),
    #[error("Invalid password hash: {0}")]
    InvalidHash(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PasswordValidationError {
    #[error("Password must be at least 8 characters")]
    TooShort,
    #[error("Password must be at most 128 characters")]
    TooLong,
    #[error("Password must contain at least one lowercase letter")]
    MissingLowercase,
    #[error("Password must contain at least one uppercase letter")]
    MissingUppercase,
    #[error("Password must contain at least one digit")]
    MissingDigit,
    #[error("This password is too common - please choose a unique password")]
    TooCommon,
}
