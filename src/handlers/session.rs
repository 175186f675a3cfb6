//! Session handlers: listing, revocation, logout.

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::dtos::auth::MessageResponse;
use crate::middleware::AuthUser;
use crate::models::SessionInfo;
use crate::services::ServiceError;
use crate::AppState;

fn subject_id(claims_sub: &str) -> Result<Uuid, ServiceError> {
    Uuid::parse_str(claims_sub).map_err(|_| ServiceError::Unauthorized)
}

/// List the caller's active sessions, newest first.
#[utoipa::path(
    get,
    path = "/auth/sessions",
    responses(
        (status = 200, description = "Active sessions", body = [SessionInfo]),
        (status = 401, description = "Not authenticated"),
    ),
    security(("bearer_auth" = [])),
    tag = "Sessions"
)]
pub async fn list_sessions(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<Json<Vec<SessionInfo>>, ServiceError> {
    let identity_id = subject_id(&claims.sub)?;
    let sessions = state.sessions.list_active(identity_id).await?;
    Ok(Json(sessions))
}

/// Revoke one of the caller's sessions.
#[utoipa::path(
    delete,
    path = "/auth/sessions/{session_id}",
    params(("session_id" = Uuid, Path, description = "Session to revoke")),
    responses(
        (status = 200, description = "Session revoked", body = MessageResponse),
        (status = 404, description = "Not owned or already revoked"),
    ),
    security(("bearer_auth" = [])),
    tag = "Sessions"
)]
pub async fn revoke_session(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(session_id): Path<Uuid>,
) -> Result<Json<MessageResponse>, ServiceError> {
    let identity_id = subject_id(&claims.sub)?;
    state.sessions.revoke(identity_id, session_id).await?;
    Ok(Json(MessageResponse {
        message: "Session revoked.".to_string(),
    }))
}

/// Log out: revoke the session backing the presented access token.
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Logged out", body = MessageResponse),
        (status = 404, description = "Session already gone"),
    ),
    security(("bearer_auth" = [])),
    tag = "Sessions"
)]
pub async fn logout(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<Json<MessageResponse>, ServiceError> {
    let identity_id = subject_id(&claims.sub)?;
    let session_id = Uuid::parse_str(&claims.sid).map_err(|_| ServiceError::Unauthorized)?;

    state.sessions.revoke(identity_id, session_id).await?;

    tracing::info!(identity_id = %identity_id, "Logged out");
    Ok(Json(MessageResponse {
        message: "Logged out.".to_string(),
    }))
}
