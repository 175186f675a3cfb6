//! Authentication handlers: registration, challenges, login, refresh,
//! password reset.

use axum::{
    extract::{Json, State},
    http::{header, HeaderMap, StatusCode},
};
use validator::Validate;

use crate::dtos::auth::{
    AuthResponse, ChallengeRequest, LoginRequest, MessageResponse, PasswordResetConfirm,
    RefreshRequest, RegisterRequest, RegisterResponse, VerifyChallengeRequest,
};
use crate::models::{GlobalStatus, IdentityResponse};
use crate::services::{ServiceError, SessionOrigin, TokenResponse};
use crate::utils::Password;
use crate::AppState;

fn session_origin(headers: &HeaderMap) -> SessionOrigin {
    SessionOrigin {
        ip_address: headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(',').next().unwrap_or(v).trim().to_string()),
        user_agent: headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string()),
    }
}

/// Register a new identity against a tenant.
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Registered", body = RegisterResponse),
        (status = 403, description = "Account is soft-deleted; reactivation required"),
        (status = 409, description = "Email or phone already registered"),
    ),
    tag = "Authentication"
)]
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), ServiceError> {
    req.validate()?;

    let identity = state
        .identity
        .register(
            req.tenant_id,
            req.email,
            req.phone,
            Password::new(req.password),
        )
        .await?;

    let message = registration_message(identity.status());

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            identity: identity.sanitized(),
            message: message.to_string(),
        }),
    ))
}

/// Request a one-time verification code.
#[utoipa::path(
    post,
    path = "/auth/challenges",
    request_body = ChallengeRequest,
    responses(
        (status = 200, description = "Code sent if the account exists", body = MessageResponse),
        (status = 423, description = "Challenge issuance is cooling down"),
    ),
    tag = "Verification"
)]
pub async fn request_challenge(
    State(state): State<AppState>,
    Json(req): Json<ChallengeRequest>,
) -> Result<Json<MessageResponse>, ServiceError> {
    req.validate()?;

    state.identity.request_challenge(&req.email, req.purpose).await?;

    Ok(Json(MessageResponse {
        message: "If the account exists, a verification code has been sent.".to_string(),
    }))
}

/// Submit a one-time verification code.
#[utoipa::path(
    post,
    path = "/auth/challenges/verify",
    request_body = VerifyChallengeRequest,
    responses(
        (status = 200, description = "Code accepted", body = IdentityResponse),
        (status = 401, description = "Wrong code"),
        (status = 404, description = "No live challenge"),
    ),
    tag = "Verification"
)]
pub async fn verify_challenge(
    State(state): State<AppState>,
    Json(req): Json<VerifyChallengeRequest>,
) -> Result<Json<IdentityResponse>, ServiceError> {
    req.validate()?;

    let identity = state
        .identity
        .verify_challenge(&req.email, req.purpose, &req.code)
        .await?;

    Ok(Json(identity.sanitized()))
}

/// Log in with email and password, optionally into a tenant.
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = AuthResponse),
        (status = 401, description = "Bad credentials"),
        (status = 403, description = "Account state forbids login"),
        (status = 423, description = "Account is locked"),
    ),
    tag = "Authentication"
)]
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ServiceError> {
    req.validate()?;

    let (tokens, identity) = state
        .sessions
        .login(
            &req.email,
            Password::new(req.password),
            req.tenant_id,
            session_origin(&headers),
        )
        .await?;

    Ok(Json(AuthResponse {
        identity: identity.sanitized(),
        tokens,
    }))
}

/// Reissue an access credential against an existing session.
#[utoipa::path(
    post,
    path = "/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New access credential", body = TokenResponse),
        (status = 401, description = "Unknown, revoked or expired refresh value"),
    ),
    tag = "Authentication"
)]
pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<TokenResponse>, ServiceError> {
    let tokens = state
        .sessions
        .refresh(&req.refresh_token, req.tenant_id)
        .await?;
    Ok(Json(tokens))
}

/// Replace the credential authorized by a consumed password-reset challenge.
#[utoipa::path(
    post,
    path = "/auth/password-reset/confirm",
    request_body = PasswordResetConfirm,
    responses(
        (status = 200, description = "Credential replaced", body = MessageResponse),
        (status = 401, description = "No reset authorization pending"),
    ),
    tag = "Authentication"
)]
pub async fn confirm_password_reset(
    State(state): State<AppState>,
    Json(req): Json<PasswordResetConfirm>,
) -> Result<Json<MessageResponse>, ServiceError> {
    req.validate()?;

    state
        .identity
        .confirm_password_reset(&req.email, Password::new(req.new_password))
        .await?;

    Ok(Json(MessageResponse {
        message: "Password has been reset. Please log in again.".to_string(),
    }))
}

fn registration_message(status: GlobalStatus) -> &'static str {
    match status {
        GlobalStatus::PendingEmailVerification => {
            "Registration successful. Verify your email address to continue."
        }
        GlobalStatus::PendingPhoneVerification => {
            "Registration successful. Verify your phone number to continue."
        }
        GlobalStatus::PendingAccountVerification => {
            "Registration successful. Verify your email address and phone number to continue."
        }
        GlobalStatus::PendingAdminApproval => {
            "Registration successful. An administrator must approve the account before login."
        }
        GlobalStatus::ProfileIncomplete => {
            "Registration successful. Complete your profile to continue."
        }
        _ => "Registration successful.",
    }
}
