//! Refresh and revocation flows.

mod common;

use common::{unique_email, unique_phone, TestCtx};
use identity_service::services::{ServiceError, SessionOrigin};
use identity_service::utils::Password;
use uuid::Uuid;

const PASSWORD: &str = "a-strong-password";

async fn login(ctx: &TestCtx, tenant: Option<Uuid>) -> (identity_service::services::TokenResponse, Uuid) {
    let email = unique_email("refresh");
    ctx.identity
        .register(
            tenant.unwrap_or_else(Uuid::new_v4),
            email.clone(),
            Some(unique_phone()),
            Password::new(PASSWORD.into()),
        )
        .await
        .unwrap();
    let (tokens, identity) = ctx
        .sessions
        .login(&email, Password::new(PASSWORD.into()), tenant, SessionOrigin::default())
        .await
        .unwrap();
    (tokens, identity.identity_id)
}

#[tokio::test]
async fn test_refresh_reissues_access_for_same_session() {
    let Some(ctx) = TestCtx::spawn().await else { return };
    let tenant = Uuid::new_v4();
    let (tokens, _) = login(&ctx, Some(tenant)).await;

    let refreshed = ctx.sessions.refresh(&tokens.refresh_token, None).await.unwrap();

    // The refresh value is not rotated; the access credential is new but
    // stays bound to the same session.
    assert_eq!(refreshed.refresh_token, tokens.refresh_token);
    let original = ctx.jwt.validate_access_token(&tokens.access_token).unwrap();
    let reissued = ctx.jwt.validate_access_token(&refreshed.access_token).unwrap();
    assert_eq!(original.sid, reissued.sid);
    assert_eq!(reissued.tenant_id, Some(tenant.to_string()));
}

#[tokio::test]
async fn test_refresh_with_unknown_value_is_unauthorized() {
    let Some(ctx) = TestCtx::spawn().await else { return };

    let err = ctx
        .sessions
        .refresh("not-a-refresh-value", None)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Unauthorized));
}

#[tokio::test]
async fn test_refresh_after_revocation_is_unauthorized() {
    let Some(ctx) = TestCtx::spawn().await else { return };
    let (tokens, identity_id) = login(&ctx, None).await;

    let claims = ctx.jwt.validate_access_token(&tokens.access_token).unwrap();
    let session_id = Uuid::parse_str(&claims.sid).unwrap();

    ctx.sessions.revoke(identity_id, session_id).await.unwrap();

    let err = ctx
        .sessions
        .refresh(&tokens.refresh_token, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Unauthorized));
}

#[tokio::test]
async fn test_revoking_twice_is_not_found() {
    let Some(ctx) = TestCtx::spawn().await else { return };
    let (tokens, identity_id) = login(&ctx, None).await;

    let claims = ctx.jwt.validate_access_token(&tokens.access_token).unwrap();
    let session_id = Uuid::parse_str(&claims.sid).unwrap();

    ctx.sessions.revoke(identity_id, session_id).await.unwrap();
    let err = ctx.sessions.revoke(identity_id, session_id).await.unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[tokio::test]
async fn test_session_owned_by_someone_else_is_not_found() {
    let Some(ctx) = TestCtx::spawn().await else { return };
    let (tokens, _) = login(&ctx, None).await;
    let (_, other_identity) = login(&ctx, None).await;

    let claims = ctx.jwt.validate_access_token(&tokens.access_token).unwrap();
    let session_id = Uuid::parse_str(&claims.sid).unwrap();

    let err = ctx
        .sessions
        .revoke(other_identity, session_id)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[tokio::test]
async fn test_soft_delete_kills_sessions() {
    let Some(ctx) = TestCtx::spawn().await else { return };
    let (tokens, identity_id) = login(&ctx, None).await;

    ctx.identity.soft_delete(identity_id).await.unwrap();

    let err = ctx
        .sessions
        .refresh(&tokens.refresh_token, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Unauthorized));
    assert!(ctx.sessions.list_active(identity_id).await.unwrap().is_empty());
}
