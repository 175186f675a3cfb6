//! Identity model - the durable principal record and its status machine.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Failed password attempts allowed before the account is locked.
pub const MAX_FAILED_PASSWORD_ATTEMPTS: i32 = 5;

/// Lockout window applied once the failure threshold is reached.
pub const LOCKOUT_MINUTES: i64 = 15;

/// Global identity status codes. Exactly one holds at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GlobalStatus {
    PendingEmailVerification,
    PendingPhoneVerification,
    PendingAccountVerification,
    PendingAdminApproval,
    ProfileIncomplete,
    Active,
    Banned,
    SoftDeleted,
}

impl GlobalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GlobalStatus::PendingEmailVerification => "pending_email_verification",
            GlobalStatus::PendingPhoneVerification => "pending_phone_verification",
            GlobalStatus::PendingAccountVerification => "pending_account_verification",
            GlobalStatus::PendingAdminApproval => "pending_admin_approval",
            GlobalStatus::ProfileIncomplete => "profile_incomplete",
            GlobalStatus::Active => "active",
            GlobalStatus::Banned => "banned",
            GlobalStatus::SoftDeleted => "soft_deleted",
        }
    }

    /// Statuses set by an admin or a lifecycle command rather than derived
    /// from verification flags. The recomputation rule never overwrites them.
    pub fn is_verification_derived(&self) -> bool {
        matches!(
            self,
            GlobalStatus::Active
                | GlobalStatus::PendingEmailVerification
                | GlobalStatus::PendingPhoneVerification
                | GlobalStatus::PendingAccountVerification
        )
    }

    /// Ordering used when deciding whether a new tenant requirement may
    /// downgrade the status: higher means more verification outstanding.
    pub fn pending_severity(&self) -> u8 {
        match self {
            GlobalStatus::Active => 0,
            GlobalStatus::PendingEmailVerification | GlobalStatus::PendingPhoneVerification => 1,
            GlobalStatus::PendingAccountVerification => 2,
            _ => 0,
        }
    }
}

impl std::str::FromStr for GlobalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending_email_verification" => Ok(GlobalStatus::PendingEmailVerification),
            "pending_phone_verification" => Ok(GlobalStatus::PendingPhoneVerification),
            "pending_account_verification" => Ok(GlobalStatus::PendingAccountVerification),
            "pending_admin_approval" => Ok(GlobalStatus::PendingAdminApproval),
            "profile_incomplete" => Ok(GlobalStatus::ProfileIncomplete),
            "active" => Ok(GlobalStatus::Active),
            "banned" => Ok(GlobalStatus::Banned),
            "soft_deleted" => Ok(GlobalStatus::SoftDeleted),
            _ => Err(format!("Invalid global status: {}", s)),
        }
    }
}

/// Identity entity. Owns its memberships, federated logins and sessions;
/// those child rows are only ever mutated through the services, never handed
/// out for external mutation.
#[derive(Debug, Clone, FromRow)]
pub struct Identity {
    pub identity_id: Uuid,
    pub email: String,
    pub phone: Option<String>,
    pub password_hash: String,
    pub status_code: String,
    pub email_verified: bool,
    pub phone_verified: bool,
    pub failed_password_count: i32,
    pub lockout_until_utc: Option<DateTime<Utc>>,
    pub otp_blocked_until_utc: Option<DateTime<Utc>>,
    pub password_reset_pending: bool,
    pub last_login_utc: Option<DateTime<Utc>>,
    pub last_login_tenant: Option<Uuid>,
    pub created_utc: DateTime<Utc>,
}

impl Identity {
    /// Create a new identity. Status starts at the most restrictive
    /// verification-pending state; registration refines it from the
    /// tenant's requirements.
    pub fn new(email: String, phone: Option<String>, password_hash: String) -> Self {
        Self {
            identity_id: Uuid::new_v4(),
            email,
            phone,
            password_hash,
            status_code: GlobalStatus::PendingAccountVerification.as_str().to_string(),
            email_verified: false,
            phone_verified: false,
            failed_password_count: 0,
            lockout_until_utc: None,
            otp_blocked_until_utc: None,
            password_reset_pending: false,
            last_login_utc: None,
            last_login_tenant: None,
            created_utc: Utc::now(),
        }
    }

    pub fn status(&self) -> GlobalStatus {
        // An unknown code in the row is treated as the most restrictive
        // pending state rather than a crash.
        self.status_code
            .parse()
            .unwrap_or(GlobalStatus::PendingAccountVerification)
    }

    pub fn set_status(&mut self, status: GlobalStatus) {
        self.status_code = status.as_str().to_string();
    }

    pub fn is_soft_deleted(&self) -> bool {
        self.status_code == GlobalStatus::SoftDeleted.as_str()
    }

    pub fn is_banned(&self) -> bool {
        self.status_code == GlobalStatus::Banned.as_str()
    }

    /// Lockout is evaluated lazily against wall-clock time; there is no
    /// background sweeper clearing expired windows.
    pub fn is_locked_out(&self) -> bool {
        matches!(self.lockout_until_utc, Some(until) if until > Utc::now())
    }

    pub fn is_otp_blocked(&self) -> bool {
        matches!(self.otp_blocked_until_utc, Some(until) if until > Utc::now())
    }

    pub fn verify_email(&mut self) {
        self.email_verified = true;
        self.recompute_verification_status();
    }

    pub fn verify_phone(&mut self) {
        self.phone_verified = true;
        self.recompute_verification_status();
    }

    /// Re-derive the status from the verification flags. Admin-approval,
    /// profile-incomplete, banned and soft-deleted states are terminal until
    /// explicitly cleared and are never overwritten here.
    pub fn recompute_verification_status(&mut self) {
        if !self.status().is_verification_derived() {
            return;
        }
        let next = match (self.email_verified, self.phone_verified) {
            (true, true) => GlobalStatus::Active,
            (false, false) => GlobalStatus::PendingAccountVerification,
            (false, true) => GlobalStatus::PendingEmailVerification,
            (true, false) => GlobalStatus::PendingPhoneVerification,
        };
        self.set_status(next);
    }

    /// Record a failed password attempt. Returns the lockout deadline when
    /// this attempt crossed the threshold; the counter never grows past it.
    pub fn record_failed_password(&mut self) -> Option<DateTime<Utc>> {
        if self.failed_password_count >= MAX_FAILED_PASSWORD_ATTEMPTS {
            return None;
        }
        self.failed_password_count += 1;
        if self.failed_password_count >= MAX_FAILED_PASSWORD_ATTEMPTS {
            let until = Utc::now() + Duration::minutes(LOCKOUT_MINUTES);
            self.lock_until(until);
            return Some(until);
        }
        None
    }

    pub fn reset_failed_password(&mut self) {
        self.failed_password_count = 0;
        self.lockout_until_utc = None;
    }

    pub fn lock_until(&mut self, until: DateTime<Utc>) {
        self.lockout_until_utc = Some(until);
    }

    pub fn block_otp_until(&mut self, until: DateTime<Utc>) {
        self.otp_blocked_until_utc = Some(until);
    }

    pub fn soft_delete(&mut self) {
        self.set_status(GlobalStatus::SoftDeleted);
    }

    /// Restore a soft-deleted identity. The channel the reactivation code
    /// travelled over is considered verified; if the other channel is not,
    /// the matching single-channel pending status applies instead of Active.
    pub fn reactivate(&mut self) {
        self.email_verified = true;
        self.reset_failed_password();
        if self.phone_verified {
            self.set_status(GlobalStatus::Active);
        } else {
            self.set_status(GlobalStatus::PendingPhoneVerification);
        }
    }

    /// Changing a contact clears its verified flag and re-derives the status.
    pub fn update_email(&mut self, new_email: String) {
        self.email = new_email;
        self.email_verified = false;
        self.recompute_verification_status();
    }

    pub fn update_phone(&mut self, new_phone: String) {
        self.phone = Some(new_phone);
        self.phone_verified = false;
        self.recompute_verification_status();
    }

    pub fn update_password(&mut self, new_hash: String) {
        self.password_hash = new_hash;
        self.password_reset_pending = false;
        self.reset_failed_password();
    }

    pub fn record_login(&mut self, tenant_id: Option<Uuid>) {
        self.last_login_utc = Some(Utc::now());
        self.last_login_tenant = tenant_id;
        self.reset_failed_password();
    }

    /// Convert to sanitized response (no credential material).
    pub fn sanitized(&self) -> IdentityResponse {
        IdentityResponse {
            identity_id: self.identity_id,
            email: self.email.clone(),
            phone: self.phone.clone(),
            status: self.status_code.clone(),
            email_verified: self.email_verified,
            phone_verified: self.phone_verified,
            last_login_utc: self.last_login_utc,
            created_utc: self.created_utc,
        }
    }
}

/// Identity response for API (no sensitive fields).
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct IdentityResponse {
    pub identity_id: Uuid,
    pub email: String,
    pub phone: Option<String>,
    pub status: String,
    pub email_verified: bool,
    pub phone_verified: bool,
    pub last_login_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> Identity {
        Identity::new("a@example.com".to_string(), Some("+15550001".to_string()), "hash".into())
    }

    #[test]
    fn test_new_identity_starts_pending_account_verification() {
        let id = identity();
        assert_eq!(id.status(), GlobalStatus::PendingAccountVerification);
        assert!(!id.email_verified);
        assert!(!id.phone_verified);
    }

    #[test]
    fn test_verification_recomputation_walks_through_pending_states() {
        let mut id = identity();

        id.verify_email();
        assert_eq!(id.status(), GlobalStatus::PendingPhoneVerification);

        id.verify_phone();
        assert_eq!(id.status(), GlobalStatus::Active);
    }

    #[test]
    fn test_recomputation_never_overwrites_admin_states() {
        let mut id = identity();
        id.set_status(GlobalStatus::PendingAdminApproval);
        id.verify_email();
        id.verify_phone();
        assert_eq!(id.status(), GlobalStatus::PendingAdminApproval);

        id.set_status(GlobalStatus::ProfileIncomplete);
        id.recompute_verification_status();
        assert_eq!(id.status(), GlobalStatus::ProfileIncomplete);
    }

    #[test]
    fn test_fifth_failed_password_locks_and_caps_counter() {
        let mut id = identity();
        for _ in 0..4 {
            assert!(id.record_failed_password().is_none());
        }
        assert_eq!(id.failed_password_count, 4);

        let until = id.record_failed_password().expect("fifth failure must lock");
        assert!(until > Utc::now());
        assert!(until <= Utc::now() + Duration::minutes(LOCKOUT_MINUTES));
        assert_eq!(id.failed_password_count, 5);
        assert!(id.is_locked_out());

        // Further failures do not grow the counter or extend the window.
        assert!(id.record_failed_password().is_none());
        assert_eq!(id.failed_password_count, 5);
    }

    #[test]
    fn test_reset_failed_password_clears_lockout() {
        let mut id = identity();
        for _ in 0..5 {
            id.record_failed_password();
        }
        id.reset_failed_password();
        assert_eq!(id.failed_password_count, 0);
        assert!(!id.is_locked_out());
    }

    #[test]
    fn test_reactivate_rederives_single_channel_pending() {
        let mut id = identity();
        id.soft_delete();
        id.reactivate();
        // Phone was never verified, so reactivation lands on the matching
        // single-channel pending state, not Active.
        assert_eq!(id.status(), GlobalStatus::PendingPhoneVerification);

        let mut id = identity();
        id.phone_verified = true;
        id.soft_delete();
        id.reactivate();
        assert_eq!(id.status(), GlobalStatus::Active);
    }

    #[test]
    fn test_contact_update_clears_verified_flag() {
        let mut id = identity();
        id.verify_email();
        id.verify_phone();
        assert_eq!(id.status(), GlobalStatus::Active);

        id.update_email("b@example.com".to_string());
        assert!(!id.email_verified);
        assert_eq!(id.status(), GlobalStatus::PendingEmailVerification);
    }

    #[test]
    fn test_update_password_consumes_reset_authorization() {
        let mut id = identity();
        id.password_reset_pending = true;
        id.lock_until(Utc::now() + Duration::minutes(5));
        id.update_password("new-hash".to_string());
        assert!(!id.password_reset_pending);
        assert!(!id.is_locked_out());
        assert_eq!(id.password_hash, "new-hash");
    }
}
