//! Maintenance handlers, gated by the admin API key.

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::dtos::admin::{
    SetMembershipRoleRequest, SetMembershipStatusRequest, SetStatusRequest,
};
use crate::dtos::auth::MessageResponse;
use crate::models::IdentityResponse;
use crate::services::ServiceError;
use crate::AppState;

/// Explicit global-status override; the only way out of the admin-approval
/// and profile-incomplete states.
pub async fn set_status(
    State(state): State<AppState>,
    Path(identity_id): Path<Uuid>,
    Json(req): Json<SetStatusRequest>,
) -> Result<Json<IdentityResponse>, ServiceError> {
    let identity = state.identity.set_status(identity_id, req.status).await?;
    Ok(Json(identity.sanitized()))
}

/// Soft-delete an identity and revoke all of its sessions.
pub async fn soft_delete(
    State(state): State<AppState>,
    Path(identity_id): Path<Uuid>,
) -> Result<Json<MessageResponse>, ServiceError> {
    state.identity.soft_delete(identity_id).await?;
    Ok(Json(MessageResponse {
        message: "Identity soft-deleted.".to_string(),
    }))
}

pub async fn set_membership_status(
    State(state): State<AppState>,
    Path((identity_id, tenant_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<SetMembershipStatusRequest>,
) -> Result<Json<MessageResponse>, ServiceError> {
    state
        .identity
        .set_membership_status(identity_id, tenant_id, req.status)
        .await?;
    Ok(Json(MessageResponse {
        message: "Membership status updated.".to_string(),
    }))
}

pub async fn set_membership_role(
    State(state): State<AppState>,
    Path((identity_id, tenant_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<SetMembershipRoleRequest>,
) -> Result<Json<MessageResponse>, ServiceError> {
    state
        .identity
        .set_membership_role(identity_id, tenant_id, req.role_name, req.permissions)
        .await?;
    Ok(Json(MessageResponse {
        message: "Membership role updated.".to_string(),
    }))
}

/// Admin forced logout of one session.
pub async fn revoke_session(
    State(state): State<AppState>,
    Path((identity_id, session_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<MessageResponse>, ServiceError> {
    state.sessions.revoke(identity_id, session_id).await?;
    Ok(Json(MessageResponse {
        message: "Session revoked.".to_string(),
    }))
}
