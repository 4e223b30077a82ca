//! Authentication routes
//!
//! The façade over the auth core. Handlers own the gate ordering:
//! lockout and rate limiting come first so a blocked caller learns
//! nothing past the 429, CSRF next, then credential work. Failed gates
//! after rate limiting are booked against the account's lockout
//! counter; the rate-limit and lockout rejections themselves are not
//! double-recorded.

use std::time::Instant;

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::Redirect,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use time::OffsetDateTime;
use tower_cookies::Cookies;

use crate::{
    auth::{
        clear_session_cookie, set_session_cookie, validate_password_strength, AuthAction,
        TokenPurpose, VerifyOutcome,
    },
    error::{ApiError, ApiResult},
    state::AppState,
};
use gatewiki_shared::{Role, User};

use super::{extract_client_ip, extract_country, extract_user_agent};

/// Every login and forgot-password response takes at least this long,
/// so response timing does not separate existing from unknown accounts.
const MIN_RESPONSE_TIME: std::time::Duration = std::time::Duration::from_millis(500);

/// Domains of throwaway inbox providers, rejected at registration
const DISPOSABLE_DOMAINS: &[&str] = &[
    "10minutemail.com",
    "dispostable.com",
    "getnada.com",
    "guerrillamail.com",
    "maildrop.cc",
    "mailinator.com",
    "sharklasers.com",
    "temp-mail.org",
    "tempmail.com",
    "trashmail.com",
    "yopmail.com",
];

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    pub csrf_token: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub name: String,
    pub email: String,
    pub password: String,
    pub csrf_token: String,
    #[serde(default)]
    pub turnstile_token: String,
    /// Honeypot; humans never see this field, so non-empty means bot
    #[serde(default)]
    pub hp_field: String,
    /// Unix timestamp the client rendered the form
    #[serde(default)]
    pub form_timestamp: i64,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmQuery {
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
    pub csrf_token: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
    pub csrf_token: String,
}

#[derive(Debug, Deserialize)]
pub struct CheckPasswordStrengthRequest {
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub access_level: u8,
    pub email_confirmed: bool,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.to_string(),
            username: user.username.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role,
            access_level: user.access_level,
            email_confirmed: user.email_confirmed,
        }
    }
}

// =============================================================================
// Login
// =============================================================================

/// POST /api/v1/auth/login
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    cookies: Cookies,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let start = Instant::now();

    let result = login_inner(&state, &headers, &cookies, &req).await;

    let elapsed = start.elapsed();
    if elapsed < MIN_RESPONSE_TIME {
        tokio::time::sleep(MIN_RESPONSE_TIME - elapsed).await;
    }

    result
}

async fn login_inner(
    state: &AppState,
    headers: &HeaderMap,
    cookies: &Cookies,
    req: &LoginRequest,
) -> ApiResult<Json<serde_json::Value>> {
    let ip = extract_client_ip(headers);
    let country = extract_country(headers);
    let user_agent = extract_user_agent(headers);

    // Lockout first: a locked account stays locked regardless of
    // rate-limit state
    let lockout = state.abuse.check_account_lockout(&req.email).await?;
    if lockout.locked {
        tracing::warn!(retry_after = ?lockout.retry_after_seconds, "login: account locked");
        return Err(ApiError::AccountLocked(
            lockout.retry_after_seconds.unwrap_or(60),
        ));
    }

    match state
        .abuse
        .check_rate_limit(AuthAction::Login, ip.as_deref(), Some(&req.email))
        .await
    {
        Ok(result) if !result.allowed => {
            return Err(ApiError::RateLimited(result.retry_after_seconds.unwrap_or(60)));
        }
        Err(e) => {
            // Fail open so a store hiccup does not lock everyone out
            tracing::error!(error = ?e, "login: rate limit check failed, allowing request");
        }
        _ => {}
    }

    let csrf_ip = ip.as_deref().unwrap_or("unknown");
    if let Err(reason) = state
        .csrf
        .validate(&req.csrf_token, csrf_ip, &country, &user_agent)
    {
        tracing::warn!(reason = %reason, "login: CSRF rejected");
        state
            .abuse
            .record_outcome(AuthAction::Login, &req.email, false)
            .await?;
        return Err(ApiError::CsrfRejected);
    }

    let user = match state.credentials.verify(&req.email, &req.password).await? {
        VerifyOutcome::Ok(user) => user,
        VerifyOutcome::NeedsConfirmation => {
            // Correct password; not booked against the lockout counter
            return Err(ApiError::NeedsConfirmation);
        }
        VerifyOutcome::InvalidCredentials => {
            state
                .abuse
                .record_outcome(AuthAction::Login, &req.email, false)
                .await?;
            return Err(ApiError::InvalidCredentials);
        }
    };

    // Transparent V1 -> V2 migration. The login already succeeded
    // against the old hash, so a failed rewrite is logged, not fatal.
    if let Err(e) = state.credentials.upgrade_hash(&user, &req.password).await {
        tracing::error!(user_id = %user.id, error = ?e, "login: hash upgrade failed");
    }

    let (token, _session) = state.sessions.create(user.id).await?;
    set_session_cookie(cookies, &token);

    state
        .abuse
        .record_outcome(AuthAction::Login, &req.email, true)
        .await?;

    tracing::info!(user_id = %user.id, "login: success");
    Ok(Json(json!({ "user": UserResponse::from(&user) })))
}

// =============================================================================
// Registration
// =============================================================================

/// POST /api/v1/auth/register
pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let ip = extract_client_ip(&headers);
    let country = extract_country(&headers);
    let user_agent = extract_user_agent(&headers);

    if !state.config.enable_signup {
        return Err(ApiError::BadRequest("Registration is disabled".to_string()));
    }

    // Bot heuristics short-circuit to the same success shape as the
    // genuine path, with no side effects, so automated clients cannot
    // tell they were detected.
    let now = OffsetDateTime::now_utc().unix_timestamp();
    // An omitted timestamp deserializes as 0 and counts as too fast:
    // a client that strips the field does not get a free pass.
    let filled_too_fast = req.form_timestamp <= 0
        || now - req.form_timestamp < state.config.min_form_fill_seconds;
    if !req.hp_field.is_empty() || filled_too_fast {
        tracing::info!(
            honeypot = !req.hp_field.is_empty(),
            filled_too_fast,
            "register: bot heuristics tripped, returning fabricated success"
        );
        return Ok(registered_response());
    }

    match state
        .abuse
        .check_rate_limit(AuthAction::Register, ip.as_deref(), None)
        .await
    {
        Ok(result) if !result.allowed => {
            return Err(ApiError::RateLimited(result.retry_after_seconds.unwrap_or(60)));
        }
        Err(e) => {
            tracing::error!(error = ?e, "register: rate limit check failed, allowing request");
        }
        _ => {}
    }

    let csrf_ip = ip.as_deref().unwrap_or("unknown");
    if let Err(reason) = state
        .csrf
        .validate(&req.csrf_token, csrf_ip, &country, &user_agent)
    {
        tracing::warn!(reason = %reason, "register: CSRF rejected");
        return Err(ApiError::CsrfRejected);
    }

    if !state.captcha.verify(&req.turnstile_token, csrf_ip).await {
        return Err(ApiError::BadRequest(
            "Captcha verification failed".to_string(),
        ));
    }

    validate_registration_fields(&req)?;

    let user = state
        .credentials
        .create(crate::auth::NewUser {
            username: req.username.trim().to_string(),
            name: req.name.trim().to_string(),
            email: req.email.trim().to_string(),
            password: req.password.clone(),
            email_confirmed: false,
        })
        .await?;

    let confirm_token = state
        .tokens
        .issue(TokenPurpose::EmailConfirm, user.id)
        .await?;

    // Fire and forget; a provider outage must not fail the signup
    tokio::spawn({
        let email = state.email.clone();
        let to = user.email.clone();
        async move {
            email.send_confirmation(&to, &confirm_token).await;
        }
    });

    tracing::info!(user_id = %user.id, "register: account created");
    Ok(registered_response())
}

fn registered_response() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::CREATED,
        Json(json!({
            "message": "Account created. Check your email to confirm your address."
        })),
    )
}

fn validate_registration_fields(req: &RegisterRequest) -> ApiResult<()> {
    let username = req.username.trim();
    if username.len() < 3 || username.len() > 30 {
        return Err(ApiError::Validation(
            "Username must be between 3 and 30 characters".to_string(),
        ));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(ApiError::Validation(
            "Username may only contain letters, digits, underscores and hyphens".to_string(),
        ));
    }

    let name = req.name.trim();
    if name.is_empty() || name.len() > 100 {
        return Err(ApiError::Validation(
            "Name must be between 1 and 100 characters".to_string(),
        ));
    }

    let email = req.email.trim().to_lowercase();
    let Some((local, domain)) = email.split_once('@') else {
        return Err(ApiError::Validation("Invalid email address".to_string()));
    };
    if local.is_empty() || domain.is_empty() || !domain.contains('.') {
        return Err(ApiError::Validation("Invalid email address".to_string()));
    }
    if DISPOSABLE_DOMAINS.contains(&domain) {
        return Err(ApiError::Validation(
            "Disposable email addresses are not allowed".to_string(),
        ));
    }

    validate_password_strength(&req.password)
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    Ok(())
}

// =============================================================================
// Email confirmation
// =============================================================================

/// GET /api/v1/auth/confirm?token=...
///
/// Lands from an email link, so it redirects to a page instead of
/// returning JSON.
pub async fn confirm(
    State(state): State<AppState>,
    Query(query): Query<ConfirmQuery>,
) -> Redirect {
    let error_page = format!("{}/confirm-error", state.config.public_url);

    if query.token.is_empty() {
        return Redirect::to(&error_page);
    }

    let user_id = match state
        .tokens
        .consume(TokenPurpose::EmailConfirm, &query.token)
        .await
    {
        Ok(Some(user_id)) => user_id,
        Ok(None) => return Redirect::to(&error_page),
        Err(e) => {
            tracing::error!(error = ?e, "confirm: store error");
            return Redirect::to(&error_page);
        }
    };

    match state.credentials.confirm_email(user_id).await {
        Ok(Some(_)) => Redirect::to(&format!("{}/confirm-success", state.config.public_url)),
        Ok(None) => Redirect::to(&error_page),
        Err(e) => {
            tracing::error!(user_id = %user_id, error = ?e, "confirm: update failed");
            Redirect::to(&error_page)
        }
    }
}

// =============================================================================
// Password reset
// =============================================================================

/// POST /api/v1/auth/forgot-password
///
/// Always answers 200 with the same body, whether or not the account
/// exists. The timing floor keeps the two branches indistinguishable.
pub async fn forgot_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ForgotPasswordRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let start = Instant::now();

    let result = forgot_password_inner(&state, &headers, &req).await;

    let elapsed = start.elapsed();
    if elapsed < MIN_RESPONSE_TIME {
        tokio::time::sleep(MIN_RESPONSE_TIME - elapsed).await;
    }

    result
}

async fn forgot_password_inner(
    state: &AppState,
    headers: &HeaderMap,
    req: &ForgotPasswordRequest,
) -> ApiResult<Json<serde_json::Value>> {
    let ip = extract_client_ip(headers);
    let country = extract_country(headers);
    let user_agent = extract_user_agent(headers);

    match state
        .abuse
        .check_rate_limit(AuthAction::ForgotPassword, ip.as_deref(), None)
        .await
    {
        Ok(result) if !result.allowed => {
            return Err(ApiError::RateLimited(result.retry_after_seconds.unwrap_or(60)));
        }
        Err(e) => {
            tracing::error!(error = ?e, "forgot_password: rate limit check failed, allowing");
        }
        _ => {}
    }

    let csrf_ip = ip.as_deref().unwrap_or("unknown");
    if let Err(reason) = state
        .csrf
        .validate(&req.csrf_token, csrf_ip, &country, &user_agent)
    {
        tracing::warn!(reason = %reason, "forgot_password: CSRF rejected");
        return Err(ApiError::CsrfRejected);
    }

    if let Some(user) = state.credentials.get_by_email(&req.email).await? {
        let token = state
            .tokens
            .issue(TokenPurpose::PasswordReset, user.id)
            .await?;
        tokio::spawn({
            let email = state.email.clone();
            let to = user.email.clone();
            async move {
                email.send_password_reset(&to, &token).await;
            }
        });
        tracing::info!(user_id = %user.id, "forgot_password: reset email queued");
    }

    // Identical body either way
    Ok(Json(json!({
        "message": "If that address has an account, a reset link is on its way."
    })))
}

/// POST /api/v1/auth/reset-password
pub async fn reset_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ResetPasswordRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let ip = extract_client_ip(&headers);
    let country = extract_country(&headers);
    let user_agent = extract_user_agent(&headers);

    let csrf_ip = ip.as_deref().unwrap_or("unknown");
    if let Err(reason) = state
        .csrf
        .validate(&req.csrf_token, csrf_ip, &country, &user_agent)
    {
        tracing::warn!(reason = %reason, "reset_password: CSRF rejected");
        return Err(ApiError::CsrfRejected);
    }

    validate_password_strength(&req.password)
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    // Consumed or expired or never issued all read the same
    let user_id = state
        .tokens
        .consume(TokenPurpose::PasswordReset, &req.token)
        .await?
        .ok_or(ApiError::InvalidToken)?;

    let user = state
        .credentials
        .update_password(user_id, &req.password)
        .await?
        .ok_or(ApiError::InvalidToken)?;

    tokio::spawn({
        let email = state.email.clone();
        let to = user.email.clone();
        async move {
            email.send_password_changed(&to).await;
        }
    });

    tracing::info!(user_id = %user_id, "reset_password: password updated");
    Ok(Json(json!({ "message": "Password updated. You can log in now." })))
}

// =============================================================================
// Session endpoints
// =============================================================================

/// GET /api/v1/auth/me
///
/// Anonymous is a normal answer here, never an error
pub async fn me(
    State(state): State<AppState>,
    cookies: Cookies,
) -> ApiResult<Json<serde_json::Value>> {
    let Some(session) = state.sessions.from_cookies(&cookies).await? else {
        return Ok(Json(json!({ "authenticated": false })));
    };

    // Session outliving its user reads as anonymous too
    let Some(user) = state.credentials.get(session.user_id).await? else {
        return Ok(Json(json!({ "authenticated": false })));
    };

    Ok(Json(json!({
        "authenticated": true,
        "user": UserResponse::from(&user),
    })))
}

/// POST /api/v1/auth/logout
///
/// Idempotent; always 200 even without a session
pub async fn logout(
    State(state): State<AppState>,
    cookies: Cookies,
) -> ApiResult<Json<serde_json::Value>> {
    if let Some(cookie) = cookies.get(crate::auth::SESSION_COOKIE) {
        state.sessions.destroy(cookie.value()).await?;
    }
    clear_session_cookie(&cookies);
    Ok(Json(json!({ "message": "Logged out" })))
}

// =============================================================================
// CSRF and password strength
// =============================================================================

/// GET /api/v1/auth/csrf
pub async fn issue_csrf(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<serde_json::Value>> {
    let ip = extract_client_ip(&headers);
    let country = extract_country(&headers);
    let user_agent = extract_user_agent(&headers);

    let token = state
        .csrf
        .issue(ip.as_deref().unwrap_or("unknown"), &country, &user_agent)
        .map_err(|e| {
            tracing::error!(error = ?e, "issue_csrf: seal failed");
            ApiError::Internal
        })?;

    Ok(Json(json!({ "csrf_token": token })))
}

/// POST /api/v1/auth/check-password-strength
pub async fn check_password_strength(
    Json(req): Json<CheckPasswordStrengthRequest>,
) -> Json<serde_json::Value> {
    match validate_password_strength(&req.password) {
        Ok(()) => Json(json!({ "valid": true })),
        Err(e) => Json(json!({ "valid": false, "message": e.to_string() })),
    }
}
