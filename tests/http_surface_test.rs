//! Router-level tests over the HTTP surface.

mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use common::{unique_email, unique_phone, TestCtx, TEST_ADMIN_API_KEY};
use identity_service::build_router;
use serde_json::{json, Value};
use tower::util::ServiceExt;
use uuid::Uuid;

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("failed to read body");
    serde_json::from_slice(&bytes).expect("body is not JSON")
}

#[tokio::test]
async fn test_health_endpoint_reports_healthy() {
    let Some(ctx) = TestCtx::spawn().await else { return };
    let app = build_router(ctx.app_state());

    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_register_login_logout_over_http() {
    let Some(ctx) = TestCtx::spawn().await else { return };
    let app = build_router(ctx.app_state());

    let email = unique_email("http");
    let tenant = Uuid::new_v4();

    let response = app
        .clone()
        .oneshot(
            Request::post("/auth/register")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({
                        "tenant_id": tenant,
                        "email": email,
                        "phone": unique_phone(),
                        "password": "a-strong-password",
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .clone()
        .oneshot(
            Request::post("/auth/login")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({
                        "email": email,
                        "password": "a-strong-password",
                        "tenant_id": tenant,
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let access_token = body["tokens"]["access_token"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(
            Request::post("/auth/logout")
                .header("authorization", format!("Bearer {}", access_token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // The token outlives the session, but the session is gone.
    let response = app
        .oneshot(
            Request::get("/auth/sessions")
                .header("authorization", format!("Bearer {}", access_token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body.as_array().map(|a| a.len()), Some(0));
}

#[tokio::test]
async fn test_validation_errors_are_unprocessable() {
    let Some(ctx) = TestCtx::spawn().await else { return };
    let app = build_router(ctx.app_state());

    let response = app
        .oneshot(
            Request::post("/auth/register")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({
                        "tenant_id": Uuid::new_v4(),
                        "email": "not-an-email",
                        "password": "short",
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_protected_routes_require_bearer_token() {
    let Some(ctx) = TestCtx::spawn().await else { return };
    let app = build_router(ctx.app_state());

    let response = app
        .oneshot(Request::get("/auth/sessions").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_routes_require_api_key() {
    let Some(ctx) = TestCtx::spawn().await else { return };
    let app = build_router(ctx.app_state());
    let identity_id = Uuid::new_v4();

    let response = app
        .clone()
        .oneshot(
            Request::put(format!("/auth/admin/identities/{}/status", identity_id))
                .header("content-type", "application/json")
                .body(Body::from(json!({"status": "banned"}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // With the key the request reaches the handler, which 404s on the
    // unknown identity.
    let response = app
        .oneshot(
            Request::put(format!("/auth/admin/identities/{}/status", identity_id))
                .header("content-type", "application/json")
                .header("x-admin-api-key", TEST_ADMIN_API_KEY)
                .body(Body::from(json!({"status": "banned"}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
