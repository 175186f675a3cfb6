//! Test helper module for database-backed integration tests.
//!
//! Tests run against the database named by `TEST_DATABASE_URL` and skip
//! with a note when it is not set. Every test uses unique contact details
//! so parallel tests never step on each other.

#![allow(dead_code)]

use std::sync::Arc;
use uuid::Uuid;

use identity_service::{
    config::{
        CollaboratorConfig, DatabaseConfig, Environment, IdentityConfig, JwtConfig, SecurityConfig,
    },
    db,
    services::{
        ChallengeService, Database, IdentityService, JwtService, MockCodeDelivery,
        MockEventPublisher, MockTenantDirectory, SessionService,
    },
    AppState,
};

pub const TEST_JWT_SECRET: &str = "integration-test-secret-0123456789abcdef";
pub const TEST_ADMIN_API_KEY: &str = "test-admin-key-12345";

/// Create a test configuration.
pub fn test_config(database_url: String) -> IdentityConfig {
    let collaborator = CollaboratorConfig {
        base_url: "http://localhost:0".to_string(),
        timeout_seconds: 1,
    };
    IdentityConfig {
        environment: Environment::Dev,
        service_name: "identity-service-test".to_string(),
        service_version: "0.0.0".to_string(),
        log_level: "error".to_string(),
        port: 0,
        otlp_endpoint: None,
        database: DatabaseConfig {
            url: database_url,
            max_connections: 5,
            min_connections: 1,
        },
        jwt: JwtConfig {
            secret: TEST_JWT_SECRET.to_string(),
            access_token_expiry_minutes: 15,
            refresh_token_expiry_days: 7,
        },
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
            admin_api_key: TEST_ADMIN_API_KEY.to_string(),
        },
        tenant_directory: collaborator.clone(),
        notification: collaborator.clone(),
        audit: collaborator,
    }
}

/// Wired-up services over a real database, with mocked collaborators.
pub struct TestCtx {
    pub db: Database,
    pub jwt: JwtService,
    pub identity: IdentityService,
    pub challenges: ChallengeService,
    pub sessions: SessionService,
    pub directory: Arc<MockTenantDirectory>,
    pub notifier: Arc<MockCodeDelivery>,
    pub events: Arc<MockEventPublisher>,
}

impl TestCtx {
    /// Spawn the service graph, or None when no test database is configured.
    pub async fn spawn() -> Option<TestCtx> {
        dotenvy::dotenv().ok();
        let Ok(url) = std::env::var("TEST_DATABASE_URL") else {
            eprintln!("TEST_DATABASE_URL not set; skipping database-backed test");
            return None;
        };

        let pool = db::create_pool(&DatabaseConfig {
            url,
            max_connections: 5,
            min_connections: 1,
        })
        .await
        .expect("Failed to connect to test database");
        db::run_migrations(&pool).await.expect("Failed to run migrations");

        let database = Database::new(pool);
        let jwt = JwtService::new(&JwtConfig {
            secret: TEST_JWT_SECRET.to_string(),
            access_token_expiry_minutes: 15,
            refresh_token_expiry_days: 7,
        })
        .expect("Failed to create JWT service");

        let directory = Arc::new(MockTenantDirectory::new());
        let notifier = Arc::new(MockCodeDelivery::new());
        let events = Arc::new(MockEventPublisher::new());

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
            directory.clone(),
            notifier.clone(),
            events.clone(),
            7,
        );

        Some(TestCtx {
            db: database,
            jwt,
            identity,
            challenges,
            sessions,
            directory,
            notifier,
            events,
        })
    }

    /// Application state over this context, for router-level tests.
    pub fn app_state(&self) -> AppState {
        let url = std::env::var("TEST_DATABASE_URL").expect("spawn() checked this");
        AppState {
            config: test_config(url),
            db: self.db.clone(),
            jwt: self.jwt.clone(),
            identity: self.identity.clone(),
            challenges: self.challenges.clone(),
            sessions: self.sessions.clone(),
        }
    }
}

pub fn unique_email(prefix: &str) -> String {
    format!("{}+{}@example.com", prefix, Uuid::new_v4().simple())
}

pub fn unique_phone() -> String {
    format!("+1{:010}", rand::random::<u32>())
}
