//! Session lifecycle manager.
//!
//! Orchestrates policy evaluation, forced single-session semantics and
//! credential issuance across the stores. Operations are request-scoped;
//! nothing is cached in-process between them.

use std::sync::Arc;
use uuid::Uuid;

use crate::models::{Identity, Membership, Session, SessionInfo};
use crate::services::directory::{assemble_requirements, TenantDirectory};
use crate::services::events::{EventPublisher, IdentityEvent};
use crate::services::jwt::{generate_refresh_value, JwtService, TokenResponse};
use crate::services::notify::CodeDelivery;
use crate::services::{policy, Database, ServiceError};
use crate::utils::{verify_password, Password};

/// Request metadata recorded on the session row.
#[derive(Debug, Clone, Default)]
pub struct SessionOrigin {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Clone)]
pub struct SessionService {
    db: Database,
    jwt: JwtService,
    directory: Arc<dyn TenantDirectory>,
    notifier: Arc<dyn CodeDelivery>,
    events: Arc<dyn EventPublisher>,
    refresh_token_expiry_days: i64,
}

impl SessionService {
    pub fn new(
        db: Database,
        jwt: JwtService,
        directory: Arc<dyn TenantDirectory>,
        notifier: Arc<dyn CodeDelivery>,
        events: Arc<dyn EventPublisher>,
        refresh_token_expiry_days: i64,
    ) -> Self {
        Self {
            db,
            jwt,
            directory,
            notifier,
            events,
            refresh_token_expiry_days,
        }
    }

    /// Log in, optionally into a tenant. On allow, any session already active
    /// for this (identity, tenant) scope is evicted before the new one is
    /// created; the revoke and the insert share one transaction.
    pub async fn login(
        &self,
        email: &str,
        password: Password,
        tenant_id: Option<Uuid>,
        origin: SessionOrigin,
    ) -> Result<(TokenResponse, Identity), ServiceError> {
        let identity = self
            .db
            .find_identity_by_email(email)
            .await?
            .ok_or(ServiceError::Unauthorized)?;

        let memberships = self.db.list_memberships(identity.identity_id).await?;
        let requirements = assemble_requirements(self.directory.as_ref(), &memberships).await;
        let subscription_expired = match tenant_id {
            Some(tenant) => {
                self.subscription_expired(&identity, &memberships, tenant)
                    .await
            }
            None => false,
        };

        let decision =
            policy::evaluate(&identity, &requirements, tenant_id, subscription_expired)?;

        let mut identity = identity;
        if verify_password(&password, &identity.password_hash).is_err() {
            let locked_until = identity.record_failed_password();
            self.db.update_identity(&identity).await?;

            if let Some(until) = locked_until {
                tracing::warn!(
                    identity_id = %identity.identity_id,
                    until = %until,
                    "Account locked after repeated password failures"
                );
                if let Err(e) = self
                    .notifier
                    .notify_lockout(&identity, until, origin.ip_address.as_deref())
                    .await
                {
                    tracing::warn!(error = %e, "Lockout notice delivery failed");
                }
                if let Err(e) = self
                    .events
                    .publish(IdentityEvent::AccountLocked {
                        identity_id: identity.identity_id,
                        locked_until: until,
                    })
                    .await
                {
                    tracing::warn!(error = %e, "Lockout event publication failed");
                }
            }

            return Err(ServiceError::Unauthorized);
        }

        identity.record_login(tenant_id);

        let refresh_value = generate_refresh_value();
        let session = Session::new(
            identity.identity_id,
            tenant_id,
            &refresh_value,
            self.refresh_token_expiry_days,
            origin.ip_address,
            origin.user_agent,
        );

        self.db.create_login_session(&identity, &session).await?;

        let access_token = self.jwt.issue_access_token(
            &identity,
            session.session_id,
            tenant_id,
            tenant_membership(&memberships, tenant_id),
            super_admin_membership(&memberships),
            decision.suppress_roles,
        )?;

        tracing::info!(
            identity_id = %identity.identity_id,
            session_id = %session.session_id,
            tenant_id = ?tenant_id,
            suppressed = decision.suppress_roles,
            "Login succeeded"
        );

        Ok((
            TokenResponse::new(
                access_token,
                refresh_value,
                self.jwt.access_token_expiry_seconds(),
            ),
            identity,
        ))
    }

    /// Reissue an access credential against an existing session. The refresh
    /// value is not rotated: a leaked value stays valid until expiry or
    /// revocation, and concurrent refresh calls never invalidate each other.
    pub async fn refresh(
        &self,
        refresh_value: &str,
        tenant_hint: Option<Uuid>,
    ) -> Result<TokenResponse, ServiceError> {
        let token_hash = Session::hash_refresh_value(refresh_value);
        let session = self
            .db
            .find_session_by_token_hash(&token_hash)
            .await?
            .ok_or(ServiceError::Unauthorized)?;

        if !session.is_active() {
            tracing::warn!(
                session_id = %session.session_id,
                identity_id = %session.identity_id,
                revoked = session.revoked,
                "Refresh attempted against an unusable session"
            );
            return Err(ServiceError::Unauthorized);
        }

        let identity = self
            .db
            .find_identity_by_id(session.identity_id)
            .await?
            .ok_or(ServiceError::Unauthorized)?;

        let tenant_id = session.tenant_id.or(tenant_hint);
        let memberships = self.db.list_memberships(identity.identity_id).await?;
        let suppress_roles = match tenant_id {
            Some(tenant) => {
                self.subscription_expired(&identity, &memberships, tenant)
                    .await
            }
            None => false,
        };

        let access_token = self.jwt.issue_access_token(
            &identity,
            session.session_id,
            tenant_id,
            tenant_membership(&memberships, tenant_id),
            super_admin_membership(&memberships),
            suppress_roles,
        )?;

        Ok(TokenResponse::new(
            access_token,
            refresh_value.to_string(),
            self.jwt.access_token_expiry_seconds(),
        ))
    }

    /// Explicit logout or admin forced-logout of one session.
    pub async fn revoke(&self, identity_id: Uuid, session_id: Uuid) -> Result<(), ServiceError> {
        let revoked = self.db.revoke_session(identity_id, session_id).await?;
        if !revoked {
            return Err(ServiceError::NotFound("session"));
        }
        tracing::info!(identity_id = %identity_id, session_id = %session_id, "Session revoked");
        Ok(())
    }

    /// Active sessions, newest first.
    pub async fn list_active(&self, identity_id: Uuid) -> Result<Vec<SessionInfo>, ServiceError> {
        let sessions = self.db.list_active_sessions(identity_id).await?;
        Ok(sessions.into_iter().map(SessionInfo::from).collect())
    }

    /// The subscription signal, best-effort. A live lookup wins; when the
    /// registry is unreachable the expiry stored on the membership row (fed
    /// by subscription events) decides, and an identity with neither is
    /// treated as entitled.
    async fn subscription_expired(
        &self,
        identity: &Identity,
        memberships: &[Membership],
        tenant_id: Uuid,
    ) -> bool {
        match self
            .directory
            .subscription_expired(identity.identity_id, tenant_id)
            .await
        {
            Ok(expired) => expired,
            Err(e) => {
                tracing::warn!(
                    identity_id = %identity.identity_id,
                    tenant_id = %tenant_id,
                    error = %e,
                    "Subscription lookup failed; using stored expiry"
                );
                memberships
                    .iter()
                    .find(|m| m.tenant_id == tenant_id)
                    .map(|m| m.subscription_expired())
                    .unwrap_or(false)
            }
        }
    }
}

fn tenant_membership(memberships: &[Membership], tenant_id: Option<Uuid>) -> Option<&Membership> {
    tenant_id.and_then(|tenant| memberships.iter().find(|m| m.tenant_id == tenant))
}

fn super_admin_membership(memberships: &[Membership]) -> Option<&Membership> {
    memberships
        .iter()
        .find(|m| m.is_super_admin() && m.status() == crate::models::MembershipStatus::Active)
}
