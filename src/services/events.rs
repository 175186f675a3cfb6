//! Identity lifecycle event publication.
//!
//! Audit persistence and profile provisioning live elsewhere; this service
//! only emits the facts. Publication is best-effort: failures are logged by
//! callers and never fail the triggering operation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::services::ServiceError;

/// Facts other services consume.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IdentityEvent {
    Registered {
        identity_id: Uuid,
        tenant_id: Uuid,
        email: String,
    },
    ContactChanged {
        identity_id: Uuid,
        channel: &'static str,
        value: String,
    },
    RoleChanged {
        identity_id: Uuid,
        tenant_id: Uuid,
        role_name: String,
    },
    AccountLocked {
        identity_id: Uuid,
        locked_until: DateTime<Utc>,
    },
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: IdentityEvent) -> Result<(), ServiceError>;
}

/// HTTP publisher posting events to the audit collaborator.
#[derive(Clone)]
pub struct HttpEventPublisher {
    http: reqwest::Client,
    base_url: String,
}

impl HttpEventPublisher {
    pub fn new(base_url: &str, timeout_seconds: u64) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| ServiceError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl EventPublisher for HttpEventPublisher {
    async fn publish(&self, event: IdentityEvent) -> Result<(), ServiceError> {
        let url = format!("{}/events/identity", self.base_url);
        self.http
            .post(&url)
            .json(&event)
            .send()
            .await
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Event publish error: {}", e)))?
            .error_for_status()
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Event publish error: {}", e)))?;
        Ok(())
    }
}

/// Mock publisher for tests: records published events.
#[derive(Default)]
pub struct MockEventPublisher {
    pub events: std::sync::Mutex<Vec<IdentityEvent>>,
}

impl MockEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventPublisher for MockEventPublisher {
    async fn publish(&self, event: IdentityEvent) -> Result<(), ServiceError> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}
