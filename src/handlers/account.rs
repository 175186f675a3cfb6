//! Authenticated self-service handlers: contact changes and federated
//! login management.

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::dtos::admin::{LinkFederatedLoginRequest, UpdateEmailRequest, UpdatePhoneRequest};
use crate::dtos::auth::MessageResponse;
use crate::middleware::AuthUser;
use crate::models::{FederatedLoginResponse, IdentityResponse};
use crate::services::ServiceError;
use crate::AppState;

fn subject_id(claims_sub: &str) -> Result<Uuid, ServiceError> {
    Uuid::parse_str(claims_sub).map_err(|_| ServiceError::Unauthorized)
}

/// Change the account email. The new address starts unverified.
pub async fn update_email(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Json(req): Json<UpdateEmailRequest>,
) -> Result<Json<IdentityResponse>, ServiceError> {
    let identity_id = subject_id(&claims.sub)?;
    let identity = state.identity.update_email(identity_id, req.email).await?;
    Ok(Json(identity.sanitized()))
}

/// Change the account phone. The new number starts unverified.
pub async fn update_phone(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Json(req): Json<UpdatePhoneRequest>,
) -> Result<Json<IdentityResponse>, ServiceError> {
    let identity_id = subject_id(&claims.sub)?;
    let identity = state.identity.update_phone(identity_id, req.phone).await?;
    Ok(Json(identity.sanitized()))
}

pub async fn list_federated_logins(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<Json<Vec<FederatedLoginResponse>>, ServiceError> {
    let identity_id = subject_id(&claims.sub)?;
    let logins = state.db.list_federated_logins(identity_id).await?;
    Ok(Json(
        logins.into_iter().map(FederatedLoginResponse::from).collect(),
    ))
}

pub async fn link_federated_login(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Json(req): Json<LinkFederatedLoginRequest>,
) -> Result<Json<MessageResponse>, ServiceError> {
    let identity_id = subject_id(&claims.sub)?;
    state
        .identity
        .link_federated_login(
            identity_id,
            req.provider,
            req.provider_subject_id,
            req.display_name,
        )
        .await?;
    Ok(Json(MessageResponse {
        message: "Federated login linked.".to_string(),
    }))
}

pub async fn unlink_federated_login(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path((provider, provider_subject_id)): Path<(String, String)>,
) -> Result<Json<MessageResponse>, ServiceError> {
    let identity_id = subject_id(&claims.sub)?;
    state
        .identity
        .unlink_federated_login(identity_id, &provider, &provider_subject_id)
        .await?;
    Ok(Json(MessageResponse {
        message: "Federated login unlinked.".to_string(),
    }))
}
