//! Application configuration

use std::env;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub bind_address: String,
    pub public_url: String,

    // Storage. Absent REDIS_URL selects the in-memory store, which is
    // for development and tests only.
    pub redis_url: Option<String>,

    // CSRF
    pub csrf_secret: String,
    pub csrf_strict_ip: bool,

    // Bot defenses
    pub turnstile_secret_key: Option<String>,
    /// Registrations submitted faster than this are treated as bots
    pub min_form_fill_seconds: i64,

    // Email
    pub resend_api_key: String,
    pub email_from: String,

    // Feature flags
    pub enable_signup: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            // Server
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            public_url: env::var("PUBLIC_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),

            // Storage
            redis_url: env::var("REDIS_URL").ok(),

            // CSRF
            csrf_secret: {
                let secret =
                    env::var("CSRF_SECRET").map_err(|_| ConfigError::Missing("CSRF_SECRET"))?;
                if secret.len() < 32 {
                    return Err(ConfigError::WeakSecret(
                        "CSRF_SECRET must be at least 32 characters",
                    ));
                }
                secret
            },
            csrf_strict_ip: env::var("CSRF_STRICT_IP")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),

            // Bot defenses
            turnstile_secret_key: env::var("TURNSTILE_SECRET_KEY").ok(),
            min_form_fill_seconds: env::var("MIN_FORM_FILL_SECONDS")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .unwrap_or(3),

            // Email
            resend_api_key: env::var("RESEND_API_KEY").unwrap_or_default(),
            email_from: env::var("EMAIL_FROM")
                .unwrap_or_else(|_| "Gatewiki <noreply@localhost>".to_string()),

            // Feature flags
            enable_signup: env::var("ENABLE_SIGNUP")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Weak secret: {0}")]
    WeakSecret(&'static str),
}
