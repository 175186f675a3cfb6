use identity_service::{
    build_router,
    config::IdentityConfig,
    db,
    observability::init_tracing,
    services::{
        ChallengeService, Database, HttpEventPublisher, HttpNotificationClient,
        HttpTenantDirectory, IdentityService, JwtService, SessionService,
    },
    AppState,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    dotenvy::dotenv().ok();

    // Load configuration - fail fast if invalid
    let config = IdentityConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    );

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting identity service"
    );

    let pool = db::create_pool(&config.database).await?;
    db::run_migrations(&pool).await?;
    let database = Database::new(pool);
    tracing::info!("Database initialized successfully");

    let jwt = JwtService::new(&config.jwt)?;
    tracing::info!("JWT service initialized");

    let directory = Arc::new(HttpTenantDirectory::new(
        &config.tenant_directory.base_url,
        config.tenant_directory.timeout_seconds,
    )?);
    let notifier = Arc::new(HttpNotificationClient::new(
        &config.notification.base_url,
        config.notification.timeout_seconds,
    )?);
    let events = Arc::new(HttpEventPublisher::new(
        &config.audit.base_url,
        config.audit.timeout_seconds,
    )?);
    tracing::info!("Collaborator clients initialized");

    let challenges = ChallengeService::new(database.clone(), notifier.clone());
    let identity = IdentityService::new(
        database.clone(),
        directory.clone(),
        challenges.clone(),
        events.clone(),
    );
    let sessions = SessionService::new(
        database.clone(),
        jwt.clone(),
        directory,
        notifier,
        events,
        config.jwt.refresh_token_expiry_days,
    );

    let state = AppState {
        config: config.clone(),
        db: database,
        jwt,
        identity,
        challenges,
        sessions,
    };

    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
