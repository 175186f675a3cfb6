//! Notification collaborator client.
//!
//! This service never sends anything itself; it hands "verification code
//! ready for delivery" and "account locked" facts to the notification
//! service and moves on. Delivery failures are logged by callers and never
//! fail the triggering operation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{ChallengePurpose, Identity};
use crate::services::ServiceError;

/// Channel a code travels over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryChannel {
    Email,
    Phone,
}

#[async_trait]
pub trait CodeDelivery: Send + Sync {
    async fn deliver_code(
        &self,
        identity: &Identity,
        channel: DeliveryChannel,
        code: &str,
        purpose: ChallengePurpose,
    ) -> Result<(), ServiceError>;

    async fn notify_lockout(
        &self,
        identity: &Identity,
        until: DateTime<Utc>,
        origin: Option<&str>,
    ) -> Result<(), ServiceError>;
}

/// HTTP client for the notification service.
#[derive(Clone)]
pub struct HttpNotificationClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpNotificationClient {
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

    async fn post<T: Serialize>(&self, path: &str, body: &T) -> Result<(), ServiceError> {
        let url = format!("{}{}", self.base_url, path);
        self.http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Notification error: {}", e)))?
            .error_for_status()
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Notification error: {}", e)))?;
        Ok(())
    }
}

#[derive(Serialize)]
struct DeliverCodeRequest<'a> {
    identity_id: uuid::Uuid,
    channel: DeliveryChannel,
    destination: &'a str,
    code: &'a str,
    purpose: ChallengePurpose,
}

#[derive(Serialize)]
struct LockoutNoticeRequest<'a> {
    identity_id: uuid::Uuid,
    email: &'a str,
    locked_until: DateTime<Utc>,
    origin: Option<&'a str>,
}

#[async_trait]
impl CodeDelivery for HttpNotificationClient {
    async fn deliver_code(
        &self,
        identity: &Identity,
        channel: DeliveryChannel,
        code: &str,
        purpose: ChallengePurpose,
    ) -> Result<(), ServiceError> {
        let destination = match channel {
            DeliveryChannel::Phone => identity
                .phone
                .as_deref()
                .ok_or_else(|| ServiceError::Conflict("Identity has no phone on file".into()))?,
            DeliveryChannel::Email => identity.email.as_str(),
        };

        self.post(
            "/notifications/verification-code",
            &DeliverCodeRequest {
                identity_id: identity.identity_id,
                channel,
                destination,
                code,
                purpose,
            },
        )
        .await
    }

    async fn notify_lockout(
        &self,
        identity: &Identity,
        until: DateTime<Utc>,
        origin: Option<&str>,
    ) -> Result<(), ServiceError> {
        self.post(
            "/notifications/account-locked",
            &LockoutNoticeRequest {
                identity_id: identity.identity_id,
                email: &identity.email,
                locked_until: until,
                origin,
            },
        )
        .await
    }
}

/// Mock delivery for tests: records everything handed to it.
#[derive(Default)]
pub struct MockCodeDelivery {
    pub delivered: std::sync::Mutex<Vec<(uuid::Uuid, DeliveryChannel, String, ChallengePurpose)>>,
    pub lockouts: std::sync::Mutex<Vec<(uuid::Uuid, DateTime<Utc>)>>,
}

impl MockCodeDelivery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last code recorded for an identity, if any.
    pub fn last_code_for(&self, identity_id: uuid::Uuid) -> Option<String> {
        self.delivered
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(id, _, _, _)| *id == identity_id)
            .map(|(_, _, code, _)| code.clone())
    }
}

#[async_trait]
impl CodeDelivery for MockCodeDelivery {
    async fn deliver_code(
        &self,
        identity: &Identity,
        channel: DeliveryChannel,
        code: &str,
        purpose: ChallengePurpose,
    ) -> Result<(), ServiceError> {
        self.delivered.lock().unwrap().push((
            identity.identity_id,
            channel,
            code.to_string(),
            purpose,
        ));
        Ok(())
    }

    async fn notify_lockout(
        &self,
        identity: &Identity,
        until: DateTime<Utc>,
        _origin: Option<&str>,
    ) -> Result<(), ServiceError> {
        self.lockouts
            .lock()
            .unwrap()
            .push((identity.identity_id, until));
        Ok(())
    }
}
