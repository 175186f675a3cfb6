//! Membership model - an identity's participation in one tenant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Reserved tenant holding platform-wide roles. A membership here carrying
/// the super-admin role is included in every issued token and is never
/// subject to subscription suppression.
pub const SYSTEM_TENANT_ID: Uuid = Uuid::from_u128(1);

/// Role name granting platform-wide access through the system tenant.
pub const SUPER_ADMIN_ROLE: &str = "super_admin";

/// Tenant-local membership status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipStatus {
    Active,
    Banned,
    PendingApproval,
}

impl MembershipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipStatus::Active => "active",
            MembershipStatus::Banned => "banned",
            MembershipStatus::PendingApproval => "pending_approval",
        }
    }
}

impl std::str::FromStr for MembershipStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(MembershipStatus::Active),
            "banned" => Ok(MembershipStatus::Banned),
            "pending_approval" => Ok(MembershipStatus::PendingApproval),
            _ => Err(format!("Invalid membership status: {}", s)),
        }
    }
}

/// Membership entity. Unique per (identity, tenant). The role name and its
/// permission names are opaque pass-through strings owned by the tenant
/// registry; this service never evaluates them.
#[derive(Debug, Clone, FromRow)]
pub struct Membership {
    pub membership_id: Uuid,
    pub identity_id: Uuid,
    pub tenant_id: Uuid,
    pub role_name: String,
    pub permissions: Vec<String>,
    pub status_code: String,
    pub subscription_expiry_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
}

impl Membership {
    pub fn new(identity_id: Uuid, tenant_id: Uuid, status: MembershipStatus) -> Self {
        Self {
            membership_id: Uuid::new_v4(),
            identity_id,
            tenant_id,
            role_name: "member".to_string(),
            permissions: Vec::new(),
            status_code: status.as_str().to_string(),
            subscription_expiry_utc: None,
            created_utc: Utc::now(),
        }
    }

    pub fn status(&self) -> MembershipStatus {
        self.status_code.parse().unwrap_or(MembershipStatus::PendingApproval)
    }

    pub fn is_super_admin(&self) -> bool {
        self.tenant_id == SYSTEM_TENANT_ID && self.role_name == SUPER_ADMIN_ROLE
    }

    pub fn subscription_expired(&self) -> bool {
        matches!(self.subscription_expiry_utc, Some(expiry) if expiry <= Utc::now())
    }
}

/// Membership response for API.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct MembershipResponse {
    pub tenant_id: Uuid,
    pub role_name: String,
    pub status: String,
    pub subscription_expiry_utc: Option<DateTime<Utc>>,
}

impl From<Membership> for MembershipResponse {
    fn from(m: Membership) -> Self {
        Self {
            tenant_id: m.tenant_id,
            role_name: m.role_name,
            status: m.status_code,
            subscription_expiry_utc: m.subscription_expiry_utc,
        }
    }
}
