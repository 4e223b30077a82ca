//! Transactional email via the Resend API
//!
//! Sends are best-effort. A failed send is logged and swallowed; the
//! auth flows that trigger email never fail because the provider is
//! down, and handlers fire these off in a background task so response
//! timing does not reveal whether an email went out.

/// Email configuration
#[derive(Debug, Clone)]
pub struct EmailConfig {
    /// Resend API key; empty disables sending
    pub resend_api_key: String,
    /// From address for emails
    pub email_from: String,
    /// Public base URL used in confirmation and reset links
    pub public_url: String,
}

impl EmailConfig {
    pub fn is_enabled(&self) -> bool {
        !self.resend_api_key.is_empty()
    }
}

/// Auth email sender
#[derive(Clone)]
pub struct EmailService {
    config: EmailConfig,
    client: reqwest::Client,
    api_base: String,
}

impl EmailService {
    pub fn new(config: EmailConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            api_base: "https://api.resend.com".to_string(),
        }
    }

    #[cfg(test)]
    fn with_api_base(config: EmailConfig, api_base: String) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            api_base,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.is_enabled()
    }

    /// Send an email via the Resend API
    async fn send_email(&self, to: &str, subject: &str, html: &str) {
        if !self.config.is_enabled() {
            tracing::warn!("Email not configured, skipping: {}", subject);
            return;
        }

        let body = serde_json::json!({
            "from": self.config.email_from,
            "to": [to],
            "subject": subject,
            "html": html
        });

        let response = self
            .client
            .post(format!("{}/emails", self.api_base))
            .header(
                "Authorization",
                format!("Bearer {}", self.config.resend_api_key),
            )
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => {
                tracing::info!(to = %to, subject = %subject, "Email sent");
            }
            Ok(resp) => {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                tracing::error!(
                    status = %status,
                    body = %body,
                    "Failed to send email"
                );
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to send email");
            }
        }
    }

    /// Send the email-confirmation link after registration
    pub async fn send_confirmation(&self, to: &str, token: &str) {
        let link = format!("{}/api/v1/auth/confirm?token={}", self.config.public_url, token);
        let html = format!(
            r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"></head>
<body style="font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; line-height: 1.6; color: #333; max-width: 600px; margin: 0 auto; padding: 20px;">
    <h2 style="color: #6366f1;">Confirm your email</h2>
    <p>Welcome to Gatewiki! Click the button below to confirm your email address.</p>
    <p>
        <a href="{link}" style="display: inline-block; padding: 12px 24px; background-color: #6366f1; color: white; text-decoration: none; border-radius: 6px; font-weight: bold;">
            Confirm Email
        </a>
    </p>
    <p style="color: #666; font-size: 14px;">This link expires in 24 hours. If you didn't create an account, you can ignore this email.</p>
</body>
</html>"#,
        );
        self.send_email(to, "Confirm your Gatewiki email", &html).await;
    }

    /// Send the password-reset link
    pub async fn send_password_reset(&self, to: &str, token: &str) {
        let link = format!("{}/reset-password?token={}", self.config.public_url, token);
        let html = format!(
            r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"></head>
<body style="font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; line-height: 1.6; color: #333; max-width: 600px; margin: 0 auto; padding: 20px;">
    <h2 style="color: #6366f1;">Reset your password</h2>
    <p>We received a request to reset the password for your Gatewiki account.</p>
    <p>
        <a href="{link}" style="display: inline-block; padding: 12px 24px; background-color: #6366f1; color: white; text-decoration: none; border-radius: 6px; font-weight: bold;">
            Reset Password
        </a>
    </p>
    <p style="color: #666; font-size: 14px;">This link expires in 2 hours and can be used once. If you didn't request a reset, you can ignore this email.</p>
</body>
</html>"#,
        );
        self.send_email(to, "Reset your Gatewiki password", &html).await;
    }

    /// Notify after a successful password change
    pub async fn send_password_changed(&self, to: &str) {
        let html = r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"></head>
<body style="font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; line-height: 1.6; color: #333; max-width: 600px; margin: 0 auto; padding: 20px;">
    <h2 style="color: #059669;">Your password was changed</h2>
    <p>The password for your Gatewiki account was just changed.</p>
    <p style="color: #666; font-size: 14px;">If this wasn't you, reset your password immediately.</p>
</body>
</html>"#;
        self.send_email(to, "Your Gatewiki password was changed", html)
            .await;
    }
}
