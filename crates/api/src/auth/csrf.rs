//! Stateless CSRF tokens
//!
//! A token is an AES-256-GCM sealed bundle of `{issued_at, ip, country,
//! ua_hash}`, encoded as base64url over `nonce (12 bytes) || ciphertext`.
//! Validity is established by decryption alone, no server-side lookup:
//! storage cost is traded for a little CPU on every request, which is
//! cheap next to a KV round-trip.
//!
//! Country and user-agent hash are always compared strictly. Exact IP
//! match is relaxed by default because proxies and mobile carriers
//! rotate client addresses mid-session; `CSRF_STRICT_IP=true` turns
//! exact matching back on.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;

/// Tokens older than this are rejected regardless of bindings
const CSRF_TTL_SECONDS: i64 = 30 * 60;

const NONCE_LEN: usize = 12;

#[derive(Debug, thiserror::Error)]
pub enum CsrfError {
    #[error("Failed to seal CSRF token: {0}")]
    Seal(String),
}

/// Why a token was rejected. Logged server-side only; clients see a
/// single generic failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CsrfRejection {
    #[error("token is not valid base64url or is too short")]
    Malformed,
    #[error("token failed to decrypt")]
    DecryptFailed,
    #[error("token expired")]
    Expired,
    #[error("client IP does not match token binding")]
    IpMismatch,
    #[error("client country does not match token binding")]
    CountryMismatch,
    #[error("user agent does not match token binding")]
    UserAgentMismatch,
}

#[derive(Debug, Serialize, Deserialize)]
struct CsrfBundle {
    issued_at: i64,
    ip: String,
    country: String,
    ua_hash: String,
}

/// Issues and validates anti-forgery tokens bound to request metadata
#[derive(Clone)]
pub struct CsrfGuard {
    key: [u8; 32],
    strict_ip: bool,
}

impl CsrfGuard {
    /// The secret may be any length; the cipher key is its SHA-256
    /// digest.
    pub fn new(secret: &str, strict_ip: bool) -> Self {
        let digest = Sha256::digest(secret.as_bytes());
        let mut key = [0u8; 32];
        key.copy_from_slice(&digest);
        Self { key, strict_ip }
    }

    pub fn issue(&self, ip: &str, country: &str, user_agent: &str) -> Result<String, CsrfError> {
        self.issue_at(
            OffsetDateTime::now_utc().unix_timestamp(),
            ip,
            country,
            user_agent,
        )
    }

    /// Seal a bundle with an explicit issue time. Production code only
    /// stamps "now"; tests backdate tokens to exercise expiry.
    fn issue_at(
        &self,
        issued_at: i64,
        ip: &str,
        country: &str,
        user_agent: &str,
    ) -> Result<String, CsrfError> {
        let bundle = CsrfBundle {
            issued_at,
            ip: ip.to_string(),
            country: country.to_string(),
            ua_hash: hash_user_agent(user_agent),
        };
        let plaintext =
            serde_json::to_vec(&bundle).map_err(|e| CsrfError::Seal(e.to_string()))?;

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_slice())
            .map_err(|e| CsrfError::Seal(e.to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(URL_SAFE_NO_PAD.encode(sealed))
    }

    pub fn validate(
        &self,
        token: &str,
        ip: &str,
        country: &str,
        user_agent: &str,
    ) -> Result<(), CsrfRejection> {
        let sealed = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|_| CsrfRejection::Malformed)?;
        if sealed.len() <= NONCE_LEN {
            return Err(CsrfRejection::Malformed);
        }
        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| CsrfRejection::DecryptFailed)?;
        let bundle: CsrfBundle =
            serde_json::from_slice(&plaintext).map_err(|_| CsrfRejection::DecryptFailed)?;

        let now = OffsetDateTime::now_utc().unix_timestamp();
        if now - bundle.issued_at > CSRF_TTL_SECONDS {
            return Err(CsrfRejection::Expired);
        }
        if self.strict_ip && bundle.ip != ip {
            return Err(CsrfRejection::IpMismatch);
        }
        if bundle.country != country {
            return Err(CsrfRejection::CountryMismatch);
        }
        if bundle.ua_hash != hash_user_agent(user_agent) {
            return Err(CsrfRejection::UserAgentMismatch);
        }
        Ok(())
    }
}

fn hash_user_agent(user_agent: &str) -> String {
    hex::encode(Sha256::digest(user_agent.as_bytes()))
}
