//! Federated login model - external provider identities linked to a principal.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Federated login entity. (provider, provider_subject_id) is unique across
/// the whole system; one identity owns each pair.
#[derive(Debug, Clone, FromRow)]
pub struct FederatedLogin {
    pub login_id: Uuid,
    pub identity_id: Uuid,
    pub provider: String,
    pub provider_subject_id: String,
    pub display_name: Option<String>,
    pub created_utc: DateTime<Utc>,
}

impl FederatedLogin {
    pub fn new(
        identity_id: Uuid,
        provider: String,
        provider_subject_id: String,
        display_name: Option<String>,
    ) -> Self {
        Self {
            login_id: Uuid::new_v4(),
            identity_id,
            provider,
            provider_subject_id,
            display_name,
            created_utc: Utc::now(),
        }
    }
}

/// Federated login response for API.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct FederatedLoginResponse {
    pub provider: String,
    pub provider_subject_id: String,
    pub display_name: Option<String>,
}

impl From<FederatedLogin> for FederatedLoginResponse {
    fn from(l: FederatedLogin) -> Self {
        Self {
            provider: l.provider,
            provider_subject_id: l.provider_subject_id,
            display_name: l.display_name,
        }
    }
}
