//! Shared application state

use std::sync::Arc;

use gatewiki_shared::KvStore;

use crate::auth::{AbuseGuard, CredentialStore, CsrfGuard, SessionManager, TokenVault};
use crate::captcha::CaptchaVerifier;
use crate::config::Config;
use crate::email::{EmailConfig, EmailService};

/// State shared by every handler. All components hold `Arc<dyn KvStore>`
/// so cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    pub kv: Arc<dyn KvStore>,
    pub credentials: CredentialStore,
    pub tokens: TokenVault,
    pub abuse: AbuseGuard,
    pub sessions: SessionManager,
    pub csrf: CsrfGuard,
    pub captcha: CaptchaVerifier,
    pub email: EmailService,
    pub config: Config,
}

impl AppState {
    pub fn new(kv: Arc<dyn KvStore>, config: Config) -> Self {
        let email = EmailService::new(EmailConfig {
            resend_api_key: config.resend_api_key.clone(),
            email_from: config.email_from.clone(),
            public_url: config.public_url.clone(),
        });

        Self {
            credentials: CredentialStore::new(Arc::clone(&kv)),
            tokens: TokenVault::new(Arc::clone(&kv)),
            abuse: AbuseGuard::new(Arc::clone(&kv)),
            sessions: SessionManager::new(Arc::clone(&kv)),
            csrf: CsrfGuard::new(&config.csrf_secret, config.csrf_strict_ip),
            captcha: CaptchaVerifier::new(config.turnstile_secret_key.clone()),
            email,
            kv,
            config,
        }
    }
}
