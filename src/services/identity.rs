//! Identity service.
//!
//! Owns registration (all three resolution paths), contact updates, the
//! silent challenge-request flows, password-reset confirmation, federated
//! login linking, and the explicit status/membership maintenance commands.

use std::sync::Arc;
use uuid::Uuid;

use crate::models::{
    ChallengePurpose, FederatedLogin, GlobalStatus, Identity, Membership, MembershipStatus,
    TenantAccessConfig, VerificationKind,
};
use crate::services::challenge::ChallengeService;
use crate::services::database::is_unique_violation;
use crate::services::directory::TenantDirectory;
use crate::services::events::{EventPublisher, IdentityEvent};
use crate::services::{Database, ServiceError};
use crate::utils::{hash_password, verify_password, Password};

#[derive(Clone)]
pub struct IdentityService {
    db: Database,
    directory: Arc<dyn TenantDirectory>,
    challenges: ChallengeService,
    events: Arc<dyn EventPublisher>,
}

impl IdentityService {
    pub fn new(
        db: Database,
        directory: Arc<dyn TenantDirectory>,
        challenges: ChallengeService,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            db,
            directory,
            challenges,
            events,
        }
    }

    /// Register against a tenant. Resolves three paths:
    /// (a) a brand-new identity, (b) a soft-deleted identity, which must be
    /// sent to reactivation rather than silently resurrected, and (c) an
    /// existing identity joining an additional tenant.
    pub async fn register(
        &self,
        tenant_id: Uuid,
        email: String,
        phone: Option<String>,
        password: Password,
    ) -> Result<Identity, ServiceError> {
        if let Some(existing) = self.db.find_identity_by_email(&email).await? {
            if existing.is_soft_deleted() {
                return Err(ServiceError::AccountSoftDeleted);
            }
            return self.join_tenant(existing, tenant_id, &password).await;
        }

        if let Some(p) = &phone {
            if self.db.find_identity_by_phone(p).await?.is_some() {
                return Err(ServiceError::Conflict("Phone already registered".into()));
            }
        }

        let password_hash = hash_password(&password)?;
        let mut identity = Identity::new(email, phone, password_hash);

        let config = self.lookup_config(tenant_id).await;
        let (status, membership_status) = initial_status(config.as_ref());
        identity.set_status(status);

        let membership = Membership::new(identity.identity_id, tenant_id, membership_status);

        self.db
            .create_identity_with_membership(&identity, &membership)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    ServiceError::Conflict("Email or phone already registered".into())
                } else {
                    e
                }
            })?;

        tracing::info!(
            identity_id = %identity.identity_id,
            tenant_id = %tenant_id,
            status = %identity.status_code,
            "Identity registered"
        );

        self.publish(IdentityEvent::Registered {
            identity_id: identity.identity_id,
            tenant_id,
            email: identity.email.clone(),
        })
        .await;

        Ok(identity)
    }

    /// Path (c): an authenticated existing identity joins another tenant.
    /// The global status is only touched when the new tenant's requirement
    /// is stricter than the current verification state, and then only ever
    /// downgraded.
    async fn join_tenant(
        &self,
        mut identity: Identity,
        tenant_id: Uuid,
        password: &Password,
    ) -> Result<Identity, ServiceError> {
        // Whoever holds the email's credential may extend it to a new
        // tenant; anyone else just sees the duplicate.
        if verify_password(password, &identity.password_hash).is_err() {
            return Err(ServiceError::Conflict("Email already registered".into()));
        }

        if self
            .db
            .find_membership(identity.identity_id, tenant_id)
            .await?
            .is_some()
        {
            return Err(ServiceError::Conflict(
                "Already registered with this tenant".into(),
            ));
        }

        let config = self.lookup_config(tenant_id).await;
        let membership_status = match config.as_ref() {
            Some(c) if c.approval_mandatory => MembershipStatus::PendingApproval,
            _ => MembershipStatus::Active,
        };

        let membership = Membership::new(identity.identity_id, tenant_id, membership_status);
        self.db.insert_membership(&membership).await.map_err(|e| {
            if is_unique_violation(&e) {
                ServiceError::Conflict("Already registered with this tenant".into())
            } else {
                e
            }
        })?;

        if identity.status().is_verification_derived() {
            if let Some(config) = config.as_ref() {
                let email_missing =
                    config.verification.requires_email() && !identity.email_verified;
                let phone_missing =
                    config.verification.requires_phone() && !identity.phone_verified;
                let pending = match (email_missing, phone_missing) {
                    (true, true) => Some(GlobalStatus::PendingAccountVerification),
                    (true, false) => Some(GlobalStatus::PendingEmailVerification),
                    (false, true) => Some(GlobalStatus::PendingPhoneVerification),
                    (false, false) => None,
                };
                if let Some(pending) = pending {
                    if pending.pending_severity() > identity.status().pending_severity() {
                        identity.set_status(pending);
                        self.db.update_identity(&identity).await?;
                    }
                }
            }
        }

        tracing::info!(
            identity_id = %identity.identity_id,
            tenant_id = %tenant_id,
            "Identity joined additional tenant"
        );

        self.publish(IdentityEvent::Registered {
            identity_id: identity.identity_id,
            tenant_id,
            email: identity.email.clone(),
        })
        .await;

        Ok(identity)
    }

    /// Request a verification challenge by email. Deliberately silent when
    /// the identity is unknown or ineligible for the purpose, so the
    /// endpoint does not enumerate accounts. The issuance cool-down still
    /// surfaces as a typed failure.
    pub async fn request_challenge(
        &self,
        email: &str,
        purpose: ChallengePurpose,
    ) -> Result<(), ServiceError> {
        let Some(identity) = self.db.find_identity_by_email(email).await? else {
            tracing::debug!(purpose = purpose.as_str(), "Challenge requested for unknown email");
            return Ok(());
        };

        if !ChallengeService::eligible(&identity, purpose) {
            tracing::debug!(
                identity_id = %identity.identity_id,
                purpose = purpose.as_str(),
                status = %identity.status_code,
                "Challenge request ignored for ineligible identity"
            );
            return Ok(());
        }

        self.challenges
            .issue(&identity, purpose, purpose.default_ttl())
            .await?;
        Ok(())
    }

    /// Verify a challenge code by email and apply its side effect.
    pub async fn verify_challenge(
        &self,
        email: &str,
        purpose: ChallengePurpose,
        code: &str,
    ) -> Result<Identity, ServiceError> {
        let identity = self
            .db
            .find_identity_by_email(email)
            .await?
            .ok_or(ServiceError::Unauthorized)?;

        self.challenges.verify(identity, purpose, code).await
    }

    /// Replace the credential authorized by a consumed password-reset
    /// challenge. Exactly one replacement per challenge: the pending flag is
    /// consumed here, and every session dies with the old credential.
    pub async fn confirm_password_reset(
        &self,
        email: &str,
        new_password: Password,
    ) -> Result<(), ServiceError> {
        let mut identity = self
            .db
            .find_identity_by_email(email)
            .await?
            .ok_or(ServiceError::Unauthorized)?;

        if !identity.password_reset_pending {
            return Err(ServiceError::Unauthorized);
        }

        let new_hash = hash_password(&new_password)?;
        identity.update_password(new_hash);

        self.db.update_identity(&identity).await?;
        self.db.revoke_all_sessions(identity.identity_id).await?;

        tracing::info!(identity_id = %identity.identity_id, "Credential replaced after reset");
        Ok(())
    }

    /// Soft delete. The record stays; every session dies; reactivation is
    /// the only way back.
    pub async fn soft_delete(&self, identity_id: Uuid) -> Result<(), ServiceError> {
        let mut identity = self
            .db
            .find_identity_by_id(identity_id)
            .await?
            .ok_or(ServiceError::NotFound("identity"))?;

        identity.soft_delete();
        self.db.update_identity(&identity).await?;
        self.db.revoke_all_sessions(identity_id).await?;

        tracing::info!(identity_id = %identity_id, "Identity soft-deleted");
        Ok(())
    }

    /// Explicit status override, the only way out of the admin-approval and
    /// profile-incomplete states.
    pub async fn set_status(
        &self,
        identity_id: Uuid,
        status: GlobalStatus,
    ) -> Result<Identity, ServiceError> {
        let mut identity = self
            .db
            .find_identity_by_id(identity_id)
            .await?
            .ok_or(ServiceError::NotFound("identity"))?;

        identity.set_status(status);
        self.db.update_identity(&identity).await?;

        tracing::info!(identity_id = %identity_id, status = status.as_str(), "Status set explicitly");
        Ok(identity)
    }

    pub async fn update_email(
        &self,
        identity_id: Uuid,
        new_email: String,
    ) -> Result<Identity, ServiceError> {
        let mut identity = self
            .db
            .find_identity_by_id(identity_id)
            .await?
            .ok_or(ServiceError::NotFound("identity"))?;

        if let Some(other) = self.db.find_identity_by_email(&new_email).await? {
            if other.identity_id != identity_id {
                return Err(ServiceError::Conflict("Email already registered".into()));
            }
        }

        identity.update_email(new_email);
        self.db.update_identity(&identity).await.map_err(|e| {
            if is_unique_violation(&e) {
                ServiceError::Conflict("Email already registered".into())
            } else {
                e
            }
        })?;

        self.publish(IdentityEvent::ContactChanged {
            identity_id,
            channel: "email",
            value: identity.email.clone(),
        })
        .await;

        Ok(identity)
    }

    pub async fn update_phone(
        &self,
        identity_id: Uuid,
        new_phone: String,
    ) -> Result<Identity, ServiceError> {
        let mut identity = self
            .db
            .find_identity_by_id(identity_id)
            .await?
            .ok_or(ServiceError::NotFound("identity"))?;

        if let Some(other) = self.db.find_identity_by_phone(&new_phone).await? {
            if other.identity_id != identity_id {
                return Err(ServiceError::Conflict("Phone already registered".into()));
            }
        }

        identity.update_phone(new_phone);
        self.db.update_identity(&identity).await.map_err(|e| {
            if is_unique_violation(&e) {
                ServiceError::Conflict("Phone already registered".into())
            } else {
                e
            }
        })?;

        self.publish(IdentityEvent::ContactChanged {
            identity_id,
            channel: "phone",
            value: identity.phone.clone().unwrap_or_default(),
        })
        .await;

        Ok(identity)
    }

    /// Link a federated login. The (provider, subject) pair is unique across
    /// the system; re-linking the same pair to the same identity is a no-op.
    pub async fn link_federated_login(
        &self,
        identity_id: Uuid,
        provider: String,
        provider_subject_id: String,
        display_name: Option<String>,
    ) -> Result<(), ServiceError> {
        self.db
            .find_identity_by_id(identity_id)
            .await?
            .ok_or(ServiceError::NotFound("identity"))?;

        if let Some(existing) = self
            .db
            .find_federated_login(&provider, &provider_subject_id)
            .await?
        {
            if existing.identity_id == identity_id {
                return Ok(());
            }
            return Err(ServiceError::Conflict(
                "Provider login already linked to another account".into(),
            ));
        }

        let login =
            FederatedLogin::new(identity_id, provider, provider_subject_id, display_name);
        self.db.insert_federated_login(&login).await.map_err(|e| {
            if is_unique_violation(&e) {
                ServiceError::Conflict("Provider login already linked to another account".into())
            } else {
                e
            }
        })?;

        tracing::info!(identity_id = %identity_id, provider = %login.provider, "Federated login linked");
        Ok(())
    }

    pub async fn unlink_federated_login(
        &self,
        identity_id: Uuid,
        provider: &str,
        provider_subject_id: &str,
    ) -> Result<(), ServiceError> {
        let removed = self
            .db
            .delete_federated_login(identity_id, provider, provider_subject_id)
            .await?;
        if !removed {
            return Err(ServiceError::NotFound("federated login"));
        }
        Ok(())
    }

    pub async fn set_membership_status(
        &self,
        identity_id: Uuid,
        tenant_id: Uuid,
        status: MembershipStatus,
    ) -> Result<(), ServiceError> {
        let updated = self
            .db
            .update_membership_status(identity_id, tenant_id, status)
            .await?;
        if !updated {
            return Err(ServiceError::NotFound("membership"));
        }
        tracing::info!(
            identity_id = %identity_id,
            tenant_id = %tenant_id,
            status = status.as_str(),
            "Membership status changed"
        );
        Ok(())
    }

    pub async fn set_membership_role(
        &self,
        identity_id: Uuid,
        tenant_id: Uuid,
        role_name: String,
        permissions: Vec<String>,
    ) -> Result<(), ServiceError> {
        let updated = self
            .db
            .update_membership_role(identity_id, tenant_id, &role_name, &permissions)
            .await?;
        if !updated {
            return Err(ServiceError::NotFound("membership"));
        }

        self.publish(IdentityEvent::RoleChanged {
            identity_id,
            tenant_id,
            role_name,
        })
        .await;

        Ok(())
    }

    async fn lookup_config(&self, tenant_id: Uuid) -> Option<TenantAccessConfig> {
        match self.directory.tenant_config(tenant_id).await {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(
                    tenant_id = %tenant_id,
                    error = %e,
                    "Tenant config lookup failed; treating as no additional requirement"
                );
                None
            }
        }
    }

    async fn publish(&self, event: IdentityEvent) {
        if let Err(e) = self.events.publish(event).await {
            tracing::warn!(error = %e, "Identity event publication failed");
        }
    }
}

/// Initial status for a brand-new identity, by priority:
/// verification required > approval required > profile incomplete > active.
fn initial_status(config: Option<&TenantAccessConfig>) -> (GlobalStatus, MembershipStatus) {
    let Some(config) = config else {
        return (GlobalStatus::Active, MembershipStatus::Active);
    };

    let membership_status = if config.approval_mandatory {
        MembershipStatus::PendingApproval
    } else {
        MembershipStatus::Active
    };

    let status = match config.verification {
        VerificationKind::Both => GlobalStatus::PendingAccountVerification,
        VerificationKind::Email => GlobalStatus::PendingEmailVerification,
        VerificationKind::Phone => GlobalStatus::PendingPhoneVerification,
        VerificationKind::None => {
            if config.approval_mandatory {
                GlobalStatus::PendingAdminApproval
            } else if config.profile_required {
                GlobalStatus::ProfileIncomplete
            } else {
                GlobalStatus::Active
            }
        }
    };

    (status, membership_status)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(
        verification: VerificationKind,
        approval_mandatory: bool,
        profile_required: bool,
    ) -> TenantAccessConfig {
        TenantAccessConfig {
            verification,
            approval_mandatory,
            profile_required,
        }
    }

    #[test]
    fn test_initial_status_priority() {
        // Verification requirements outrank everything else.
        let (status, membership) =
            initial_status(Some(&config(VerificationKind::Both, true, true)));
        assert_eq!(status, GlobalStatus::PendingAccountVerification);
        assert_eq!(membership, MembershipStatus::PendingApproval);

        let (status, _) = initial_status(Some(&config(VerificationKind::Email, false, false)));
        assert_eq!(status, GlobalStatus::PendingEmailVerification);

        let (status, _) = initial_status(Some(&config(VerificationKind::Phone, false, false)));
        assert_eq!(status, GlobalStatus::PendingPhoneVerification);

        // Then approval, then profile completion, then active.
        let (status, _) = initial_status(Some(&config(VerificationKind::None, true, true)));
        assert_eq!(status, GlobalStatus::PendingAdminApproval);

        let (status, _) = initial_status(Some(&config(VerificationKind::None, false, true)));
        assert_eq!(status, GlobalStatus::ProfileIncomplete);

        let (status, membership) =
            initial_status(Some(&config(VerificationKind::None, false, false)));
        assert_eq!(status, GlobalStatus::Active);
        assert_eq!(membership, MembershipStatus::Active);
    }

    #[test]
    fn test_no_config_means_no_requirement() {
        let (status, membership) = initial_status(None);
        assert_eq!(status, GlobalStatus::Active);
        assert_eq!(membership, MembershipStatus::Active);
    }
}
