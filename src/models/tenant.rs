//! Tenant requirement read models - supplied by the tenant registry,
//! read-only from this service's point of view.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::membership::MembershipStatus;

/// Contact verification a tenant demands before login.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationKind {
    None,
    Email,
    Phone,
    Both,
}

impl VerificationKind {
    pub fn requires_email(&self) -> bool {
        matches!(self, VerificationKind::Email | VerificationKind::Both)
    }

    pub fn requires_phone(&self) -> bool {
        matches!(self, VerificationKind::Phone | VerificationKind::Both)
    }

    /// Combine missing-channel flags back into a kind.
    pub fn from_missing(email_missing: bool, phone_missing: bool) -> Option<VerificationKind> {
        match (email_missing, phone_missing) {
            (true, true) => Some(VerificationKind::Both),
            (false, true) => Some(VerificationKind::Phone),
            (true, false) => Some(VerificationKind::Email),
            (false, false) => None,
        }
    }
}

/// Per-tenant access policy as served by the tenant registry.
#[derive(Debug, Clone, Deserialize)]
pub struct TenantAccessConfig {
    pub verification: VerificationKind,
    pub approval_mandatory: bool,
    #[serde(default)]
    pub profile_required: bool,
}

/// One tenant's requirement joined with the identity's membership status
/// there. This is the evaluator's unit of input: verification is enforced
/// identity-wide across all of these, tenant-local rules only against the
/// login target.
#[derive(Debug, Clone)]
pub struct TenantRequirement {
    pub tenant_id: Uuid,
    pub verification: VerificationKind,
    pub approval_mandatory: bool,
    pub membership_status: MembershipStatus,
}
