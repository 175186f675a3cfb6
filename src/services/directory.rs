//! Tenant directory client.
//!
//! Read-only collaborator supplying per-tenant verification/approval
//! requirements and the subscription-validity signal. Lookups are
//! best-effort: identity and session availability must not depend on the
//! registry's uptime, so callers map failures to the permissive branch.

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{Membership, TenantAccessConfig, TenantRequirement};
use crate::services::ServiceError;

#[async_trait]
pub trait TenantDirectory: Send + Sync {
    /// The tenant's access policy, or None when the registry does not know
    /// the tenant (treated as "no additional requirement").
    async fn tenant_config(&self, tenant_id: Uuid)
        -> Result<Option<TenantAccessConfig>, ServiceError>;

    /// Whether the identity's entitlement for the tenant has lapsed.
    async fn subscription_expired(
        &self,
        identity_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<bool, ServiceError>;
}

/// HTTP client for the tenant registry.
#[derive(Clone)]
pub struct HttpTenantDirectory {
    http: reqwest::Client,
    base_url: String,
}

impl HttpTenantDirectory {
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
impl TenantDirectory for HttpTenantDirectory {
    async fn tenant_config(
        &self,
        tenant_id: Uuid,
    ) -> Result<Option<TenantAccessConfig>, ServiceError> {
        let url = format!("{}/tenants/{}/access-config", self.base_url, tenant_id);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Tenant registry error: {}", e)))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let config = response
            .error_for_status()
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Tenant registry error: {}", e)))?
            .json::<TenantAccessConfig>()
            .await
            .map_err(|e| {
                ServiceError::Internal(anyhow::anyhow!("Tenant registry decode error: {}", e))
            })?;

        Ok(Some(config))
    }

    async fn subscription_expired(
        &self,
        identity_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<bool, ServiceError> {
        #[derive(serde::Deserialize)]
        struct SubscriptionStatus {
            valid: bool,
        }

        let url = format!(
            "{}/tenants/{}/subscriptions/{}",
            self.base_url, tenant_id, identity_id
        );
        let status = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Subscription lookup error: {}", e)))?
            .error_for_status()
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Subscription lookup error: {}", e)))?
            .json::<SubscriptionStatus>()
            .await
            .map_err(|e| {
                ServiceError::Internal(anyhow::anyhow!("Subscription decode error: {}", e))
            })?;

        Ok(!status.valid)
    }
}

/// Assemble the evaluator's input: the identity's memberships joined with
/// each tenant's registry config. A failed or empty config lookup contributes
/// no requirement for that tenant; the membership status still rides along so
/// tenant-local gates (approval, ban) keep working.
pub async fn assemble_requirements(
    directory: &dyn TenantDirectory,
    memberships: &[Membership],
) -> Vec<TenantRequirement> {
    let mut requirements = Vec::with_capacity(memberships.len());

    for membership in memberships {
        let config = match directory.tenant_config(membership.tenant_id).await {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(
                    tenant_id = %membership.tenant_id,
                    error = %e,
                    "Tenant requirement lookup failed; treating as no additional requirement"
                );
                None
            }
        };

        requirements.push(TenantRequirement {
            tenant_id: membership.tenant_id,
            verification: config
                .as_ref()
                .map(|c| c.verification)
                .unwrap_or(crate::models::VerificationKind::None),
            approval_mandatory: config.map(|c| c.approval_mandatory).unwrap_or(false),
            membership_status: membership.status(),
        });
    }

    requirements
}

/// Mock directory for tests: explicit configs per tenant and an explicit set
/// of expired (identity, tenant) pairs.
#[derive(Default)]
pub struct MockTenantDirectory {
    configs: std::sync::Mutex<std::collections::HashMap<Uuid, TenantAccessConfig>>,
    expired: std::sync::Mutex<std::collections::HashSet<(Uuid, Uuid)>>,
}

impl MockTenantDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_config(&self, tenant_id: Uuid, config: TenantAccessConfig) {
        self.configs.lock().unwrap().insert(tenant_id, config);
    }

    pub fn set_expired(&self, identity_id: Uuid, tenant_id: Uuid) {
        self.expired.lock().unwrap().insert((identity_id, tenant_id));
    }
}

#[async_trait]
impl TenantDirectory for MockTenantDirectory {
    async fn tenant_config(
        &self,
        tenant_id: Uuid,
    ) -> Result<Option<TenantAccessConfig>, ServiceError> {
        Ok(self.configs.lock().unwrap().get(&tenant_id).cloned())
    }

    async fn subscription_expired(
        &self,
        identity_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<bool, ServiceError> {
        Ok(self
            .expired
            .lock()
            .unwrap()
            .contains(&(identity_id, tenant_id)))
    }
}
