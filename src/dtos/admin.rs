//! DTOs for maintenance endpoints.

use serde::Deserialize;

use crate::models::{GlobalStatus, MembershipStatus};

#[derive(Debug, Deserialize)]
pub struct SetStatusRequest {
    pub status: GlobalStatus,
}

#[derive(Debug, Deserialize)]
pub struct SetMembershipStatusRequest {
    pub status: MembershipStatus,
}

#[derive(Debug, Deserialize)]
pub struct SetMembershipRoleRequest {
    pub role_name: String,
    #[serde(default)]
    pub permissions: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateEmailRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePhoneRequest {
    pub phone: String,
}

#[derive(Debug, Deserialize)]
pub struct LinkFederatedLoginRequest {
    pub provider: String,
    pub provider_subject_id: String,
    pub display_name: Option<String>,
}
