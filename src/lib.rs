pub mod config;
pub mod db;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod services;
pub mod utils;

use axum::{
    http::{header, HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::{
    openapi::security::{ApiKey, ApiKeyValue, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::config::IdentityConfig;
use crate::services::{
    ChallengeService, Database, IdentityService, JwtService, ServiceError, SessionService,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        handlers::auth::register,
        handlers::auth::request_challenge,
        handlers::auth::verify_challenge,
        handlers::auth::login,
        handlers::auth::refresh,
        handlers::auth::confirm_password_reset,
        handlers::session::list_sessions,
        handlers::session::revoke_session,
        handlers::session::logout,
    ),
    components(
        schemas(
            dtos::auth::RegisterRequest,
            dtos::auth::RegisterResponse,
            dtos::auth::LoginRequest,
            dtos::auth::RefreshRequest,
            dtos::auth::ChallengeRequest,
            dtos::auth::VerifyChallengeRequest,
            dtos::auth::PasswordResetConfirm,
            dtos::auth::AuthResponse,
            dtos::auth::MessageResponse,
            models::IdentityResponse,
            models::SessionInfo,
            models::ChallengePurpose,
            services::TokenResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Authentication", description = "Registration, login and token management"),
        (name = "Verification", description = "One-time code challenges"),
        (name = "Sessions", description = "Session listing and revocation"),
        (name = "Observability", description = "Service health"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    utoipa::openapi::security::HttpBuilder::new()
                        .scheme(utoipa::openapi::security::HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
            components.add_security_scheme(
                "admin_api_key",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("x-admin-api-key"))),
            );
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: IdentityConfig,
    pub db: Database,
    pub jwt: JwtService,
    pub identity: IdentityService,
    pub challenges: ChallengeService,
    pub sessions: SessionService,
}

pub fn build_router(state: AppState) -> Router {
    let admin_routes = Router::new()
        .route(
            "/auth/admin/identities/:identity_id/status",
            put(handlers::admin::set_status),
        )
        .route(
            "/auth/admin/identities/:identity_id",
            delete(handlers::admin::soft_delete),
        )
        .route(
            "/auth/admin/identities/:identity_id/memberships/:tenant_id/status",
            put(handlers::admin::set_membership_status),
        )
        .route(
            "/auth/admin/identities/:identity_id/memberships/:tenant_id/role",
            put(handlers::admin::set_membership_role),
        )
        .route(
            "/auth/admin/identities/:identity_id/sessions/:session_id",
            delete(handlers::admin::revoke_session),
        )
        .layer(from_fn_with_state(
            state.clone(),
            middleware::admin_auth_middleware,
        ));

    let authenticated_routes = Router::new()
        .route("/auth/logout", post(handlers::session::logout))
        .route("/auth/sessions", get(handlers::session::list_sessions))
        .route(
            "/auth/sessions/:session_id",
            delete(handlers::session::revoke_session),
        )
        .route("/auth/me/email", put(handlers::account::update_email))
        .route("/auth/me/phone", put(handlers::account::update_phone))
        .route(
            "/auth/me/federated-logins",
            get(handlers::account::list_federated_logins)
                .post(handlers::account::link_federated_login),
        )
        .route(
            "/auth/me/federated-logins/:provider/:provider_subject_id",
            delete(handlers::account::unlink_federated_login),
        )
        .layer(from_fn_with_state(state.clone(), middleware::auth_middleware));

    Router::new()
        .route("/health", get(health_check))
        .merge(SwaggerUi::new("/docs").url("/.well-known/openapi.json", ApiDoc::openapi()))
        .route("/auth/register", post(handlers::auth::register))
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/refresh", post(handlers::auth::refresh))
        .route("/auth/challenges", post(handlers::auth::request_challenge))
        .route(
            "/auth/challenges/verify",
            post(handlers::auth::verify_challenge),
        )
        .route(
            "/auth/password-reset/confirm",
            post(handlers::auth::confirm_password_reset),
        )
        .merge(authenticated_routes)
        .merge(admin_routes)
        .with_state(state.clone())
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }),
        )
        .layer(
            CorsLayer::new()
                .allow_origin(
                    state
                        .config
                        .security
                        .allowed_origins
                        .iter()
                        .map(|o| {
                            o.parse::<HeaderValue>().unwrap_or_else(|e| {
                                tracing::error!(
                                    "Invalid CORS origin '{}': {}. Using fallback.",
                                    o,
                                    e
                                );
                                HeaderValue::from_static("http://localhost:3000")
                            })
                        })
                        .collect::<Vec<HeaderValue>>(),
                )
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([
                    header::AUTHORIZATION,
                    header::CONTENT_TYPE,
                    header::HeaderName::from_static("x-admin-api-key"),
                    header::HeaderName::from_static("x-request-id"),
                ]),
        )
}

/// Service health check
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
        (status = 500, description = "Service is unhealthy")
    ),
    tag = "Observability"
)]
pub async fn health_check(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Result<axum::Json<serde_json::Value>, ServiceError> {
    state.db.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Database health check failed");
        e
    })?;

    Ok(axum::Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "checks": {
            "postgres": "up"
        }
    })))
}
