//! Request/response DTOs for the authentication surface.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::models::{ChallengePurpose, IdentityResponse};
use crate::services::TokenResponse;

/// Registration request.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    pub tenant_id: Uuid,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 7, max = 20))]
    pub phone: Option<String>,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
}

/// Registration response.
#[derive(Debug, Serialize, ToSchema)]
pub struct RegisterResponse {
    pub identity: IdentityResponse,
    pub message: String,
}

/// Login request.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    pub password: String,
    pub tenant_id: Option<Uuid>,
}

/// Token refresh request.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RefreshRequest {
    pub refresh_token: String,
    pub tenant_id: Option<Uuid>,
}

/// Request a verification challenge.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ChallengeRequest {
    #[validate(email)]
    pub email: String,
    pub purpose: ChallengePurpose,
}

/// Submit a verification challenge code.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct VerifyChallengeRequest {
    #[validate(email)]
    pub email: String,
    pub purpose: ChallengePurpose,
    #[validate(length(min = 6, max = 6))]
    pub code: String,
}

/// Replace the credential after a consumed password-reset challenge.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct PasswordResetConfirm {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, max = 128))]
    pub new_password: String,
}

/// Authentication response with identity info and tokens.
#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    pub identity: IdentityResponse,
    pub tokens: TokenResponse,
}

/// Message response for simple operations.
#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}
