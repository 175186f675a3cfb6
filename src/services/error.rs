//! Service error taxonomy.
//!
//! Policy and challenge failures are business outcomes the caller must be
//! able to distinguish, so every variant is typed; only persistence and
//! internal failures collapse into opaque 5xx responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::models::VerificationKind;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Account is soft-deleted; reactivation required")]
    AccountSoftDeleted,

    #[error("Account is banned")]
    AccountBanned,

    #[error("Account is locked until {0}")]
    AccountLocked(DateTime<Utc>),

    #[error("Verification required")]
    RequiresVerification {
        missing: VerificationKind,
        contact_hint: Option<String>,
    },

    #[error("Account pending admin approval")]
    RequiresAdminApproval,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Wire shape for error responses.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    locked_until: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    missing_verification: Option<VerificationKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    contact_hint: Option<String>,
}

impl ErrorBody {
    fn new(error: String, code: &'static str) -> Self {
        Self {
            error,
            code,
            locked_until: None,
            missing_verification: None,
            contact_hint: None,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ServiceError::AccountSoftDeleted => (
                StatusCode::FORBIDDEN,
                ErrorBody::new(self.to_string(), "account_soft_deleted"),
            ),
            ServiceError::AccountBanned => (
                StatusCode::FORBIDDEN,
                ErrorBody::new(self.to_string(), "account_banned"),
            ),
            ServiceError::AccountLocked(until) => (
                StatusCode::LOCKED,
                ErrorBody {
                    locked_until: Some(until),
                    ..ErrorBody::new(self.to_string(), "account_locked")
                },
            ),
            ServiceError::RequiresVerification {
                missing,
                ref contact_hint,
            } => (
                StatusCode::FORBIDDEN,
                ErrorBody {
                    missing_verification: Some(missing),
                    contact_hint: contact_hint.clone(),
                    ..ErrorBody::new("Verification required".to_string(), "requires_verification")
                },
            ),
            ServiceError::RequiresAdminApproval => (
                StatusCode::FORBIDDEN,
                ErrorBody::new(self.to_string(), "requires_admin_approval"),
            ),
            ServiceError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                ErrorBody::new(self.to_string(), "unauthorized"),
            ),
            ServiceError::NotFound(_) => (
                StatusCode::NOT_FOUND,
                ErrorBody::new(self.to_string(), "not_found"),
            ),
            ServiceError::Conflict(_) => (
                StatusCode::CONFLICT,
                ErrorBody::new(self.to_string(), "conflict"),
            ),
            ServiceError::Validation(ref errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorBody::new(errors.to_string(), "validation_error"),
            ),
            ServiceError::Database(ref err) => {
                tracing::error!(error = %err, "Database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody::new("Service unavailable".to_string(), "unavailable"),
                )
            }
            ServiceError::Config(ref msg) => {
                tracing::error!(error = %msg, "Configuration error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody::new("Internal server error".to_string(), "internal"),
                )
            }
            ServiceError::Internal(ref err) => {
                tracing::error!(error = %err, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody::new("Internal server error".to_string(), "internal"),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}
