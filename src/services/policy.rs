//! Login policy evaluator.
//!
//! A pure decision function over the identity, the tenant requirements it is
//! subject to, and the subscription signal. No I/O happens here; callers
//! gather the inputs and persist whatever the decision implies.

use uuid::Uuid;

use crate::models::{Identity, MembershipStatus, TenantRequirement, VerificationKind};
use crate::services::ServiceError;

/// Outcome of a successful evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoginDecision {
    /// Omit tenant role/permission claims from the issued credential.
    pub suppress_roles: bool,
}

/// Evaluate whether `identity` may log in, optionally into `target_tenant`.
///
/// Rules apply in order, first match wins:
/// 1. soft-deleted, 2. banned, 3. locked out,
/// 4. verification state vs. every membership's requirement (identity-wide),
/// 5. target-tenant membership gates (approval, tenant ban),
/// 6. lapsed subscription suppresses role claims but allows login.
pub fn evaluate(
    identity: &Identity,
    requirements: &[TenantRequirement],
    target_tenant: Option<Uuid>,
    subscription_expired: bool,
) -> Result<LoginDecision, ServiceError> {
    if identity.is_soft_deleted() {
        return Err(ServiceError::AccountSoftDeleted);
    }

    if identity.is_banned() {
        return Err(ServiceError::AccountBanned);
    }

    if let Some(until) = identity.lockout_until_utc {
        if until > chrono::Utc::now() {
            return Err(ServiceError::AccountLocked(until));
        }
    }

    // Verification is identity-wide: a requirement from any membership
    // blocks login everywhere until satisfied.
    let mut email_missing = false;
    let mut phone_missing = false;
    for req in requirements {
        if req.verification.requires_email() && !identity.email_verified {
            email_missing = true;
        }
        if req.verification.requires_phone() && !identity.phone_verified {
            phone_missing = true;
        }
    }
    if let Some(missing) = VerificationKind::from_missing(email_missing, phone_missing) {
        let contact_hint = if phone_missing {
            identity.phone.clone()
        } else {
            Some(identity.email.clone())
        };
        return Err(ServiceError::RequiresVerification {
            missing,
            contact_hint,
        });
    }

    if let Some(tenant_id) = target_tenant {
        if let Some(req) = requirements.iter().find(|r| r.tenant_id == tenant_id) {
            match req.membership_status {
                MembershipStatus::PendingApproval if req.approval_mandatory => {
                    return Err(ServiceError::RequiresAdminApproval);
                }
                MembershipStatus::Banned => {
                    return Err(ServiceError::AccountBanned);
                }
                _ => {}
            }
        }
    }

    let suppress_roles = target_tenant.is_some() && subscription_expired;

    Ok(LoginDecision { suppress_roles })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GlobalStatus, Identity};
    use chrono::{Duration, Utc};

    fn identity() -> Identity {
        let mut id = Identity::new(
            "a@example.com".to_string(),
            Some("+15550001".to_string()),
            "hash".to_string(),
        );
        id.email_verified = true;
        id.phone_verified = true;
        id.set_status(GlobalStatus::Active);
        id
    }

    fn requirement(
        tenant_id: Uuid,
        verification: VerificationKind,
        approval_mandatory: bool,
        membership_status: MembershipStatus,
    ) -> TenantRequirement {
        TenantRequirement {
            tenant_id,
            verification,
            approval_mandatory,
            membership_status,
        }
    }

    #[test]
    fn test_allow_with_no_requirements() {
        let decision = evaluate(&identity(), &[], None, false).unwrap();
        assert!(!decision.suppress_roles);
    }

    #[test]
    fn test_soft_deleted_wins_over_everything() {
        let mut id = identity();
        id.set_status(GlobalStatus::SoftDeleted);
        id.lock_until(Utc::now() + Duration::minutes(10));

        let err = evaluate(&id, &[], None, false).unwrap_err();
        assert!(matches!(err, ServiceError::AccountSoftDeleted));
    }

    #[test]
    fn test_banned_wins_over_lockout() {
        let mut id = identity();
        id.set_status(GlobalStatus::Banned);
        id.lock_until(Utc::now() + Duration::minutes(10));

        let err = evaluate(&id, &[], None, false).unwrap_err();
        assert!(matches!(err, ServiceError::AccountBanned));
    }

    #[test]
    fn test_lockout_blocks_regardless_of_requirements() {
        let mut id = identity();
        let until = Utc::now() + Duration::minutes(10);
        id.lock_until(until);

        let err = evaluate(&id, &[], None, false).unwrap_err();
        match err {
            ServiceError::AccountLocked(reported) => assert_eq!(reported, until),
            other => panic!("expected AccountLocked, got {:?}", other),
        }
    }

    #[test]
    fn test_expired_lockout_is_ignored() {
        let mut id = identity();
        id.lock_until(Utc::now() - Duration::seconds(1));
        assert!(evaluate(&id, &[], None, false).is_ok());
    }

    #[test]
    fn test_verification_is_identity_wide() {
        let mut id = identity();
        id.phone_verified = false;

        // The strict tenant is not the login target, but its requirement
        // still applies.
        let strict = Uuid::new_v4();
        let target = Uuid::new_v4();
        let reqs = vec![
            requirement(target, VerificationKind::None, false, MembershipStatus::Active),
            requirement(strict, VerificationKind::Both, false, MembershipStatus::Active),
        ];

        let err = evaluate(&id, &reqs, Some(target), false).unwrap_err();
        match err {
            ServiceError::RequiresVerification { missing, .. } => {
                assert_eq!(missing, VerificationKind::Phone);
            }
            other => panic!("expected RequiresVerification, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_phone_reported_even_when_subscription_valid() {
        let mut id = identity();
        id.phone_verified = false;
        let tenant = Uuid::new_v4();
        let reqs = vec![requirement(
            tenant,
            VerificationKind::Both,
            false,
            MembershipStatus::Active,
        )];

        // Subscription state is irrelevant while verification is missing.
        let err = evaluate(&id, &reqs, Some(tenant), false).unwrap_err();
        assert!(matches!(
            err,
            ServiceError::RequiresVerification {
                missing: VerificationKind::Phone,
                ..
            }
        ));
    }

    #[test]
    fn test_both_channels_missing_reported_as_both() {
        let mut id = identity();
        id.email_verified = false;
        id.phone_verified = false;
        let tenant = Uuid::new_v4();
        let reqs = vec![requirement(
            tenant,
            VerificationKind::Both,
            false,
            MembershipStatus::Active,
        )];

        let err = evaluate(&id, &reqs, Some(tenant), false).unwrap_err();
        assert!(matches!(
            err,
            ServiceError::RequiresVerification {
                missing: VerificationKind::Both,
                ..
            }
        ));
    }

    #[test]
    fn test_pending_approval_blocks_only_when_mandated() {
        let id = identity();
        let tenant = Uuid::new_v4();

        let mandated = vec![requirement(
            tenant,
            VerificationKind::None,
            true,
            MembershipStatus::PendingApproval,
        )];
        let err = evaluate(&id, &mandated, Some(tenant), false).unwrap_err();
        assert!(matches!(err, ServiceError::RequiresAdminApproval));

        let not_mandated = vec![requirement(
            tenant,
            VerificationKind::None,
            false,
            MembershipStatus::PendingApproval,
        )];
        assert!(evaluate(&id, &not_mandated, Some(tenant), false).is_ok());
    }

    #[test]
    fn test_tenant_ban_applies_only_to_target_tenant() {
        let id = identity();
        let banned_tenant = Uuid::new_v4();
        let other_tenant = Uuid::new_v4();
        let reqs = vec![
            requirement(
                banned_tenant,
                VerificationKind::None,
                false,
                MembershipStatus::Banned,
            ),
            requirement(
                other_tenant,
                VerificationKind::None,
                false,
                MembershipStatus::Active,
            ),
        ];

        let err = evaluate(&id, &reqs, Some(banned_tenant), false).unwrap_err();
        assert!(matches!(err, ServiceError::AccountBanned));

        // A ban elsewhere does not block logging into another tenant.
        assert!(evaluate(&id, &reqs, Some(other_tenant), false).is_ok());
    }

    #[test]
    fn test_expired_subscription_suppresses_without_blocking() {
        let id = identity();
        let tenant = Uuid::new_v4();
        let reqs = vec![requirement(
            tenant,
            VerificationKind::None,
            false,
            MembershipStatus::Active,
        )];

        let decision = evaluate(&id, &reqs, Some(tenant), true).unwrap();
        assert!(decision.suppress_roles);

        // Without a target tenant there is nothing to suppress.
        let decision = evaluate(&id, &reqs, None, true).unwrap();
        assert!(!decision.suppress_roles);
    }
}
