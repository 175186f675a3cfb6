//! PostgreSQL database service.
//!
//! All durable state lives here, including the challenge and lockout
//! cool-downs, so horizontally scaled instances agree on them.

use sqlx::postgres::PgPool;
use uuid::Uuid;

use crate::models::{
    FederatedLogin, Identity, Membership, MembershipStatus, Session, VerificationChallenge,
};
use crate::services::ServiceError;

/// PostgreSQL database wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

/// Check whether an error is a unique-constraint violation, for mapping
/// duplicate email/phone/login inserts to `Conflict`.
pub fn is_unique_violation(err: &ServiceError) -> bool {
    match err {
        ServiceError::Database(sqlx::Error::Database(db_err)) => {
            db_err.code().as_deref() == Some("23505")
        }
        _ => false,
    }
}

impl Database {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Health check - ping the database.
    pub async fn health_check(&self) -> Result<(), ServiceError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    // ==================== Identity Operations ====================

    pub async fn find_identity_by_id(&self, identity_id: Uuid) -> Result<Option<Identity>, ServiceError> {
        let identity =
            sqlx::query_as::<_, Identity>("SELECT * FROM identities WHERE identity_id = $1")
                .bind(identity_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(identity)
    }

    pub async fn find_identity_by_email(&self, email: &str) -> Result<Option<Identity>, ServiceError> {
        let identity =
            sqlx::query_as::<_, Identity>("SELECT * FROM identities WHERE LOWER(email) = LOWER($1)")
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;
        Ok(identity)
    }

    pub async fn find_identity_by_phone(&self, phone: &str) -> Result<Option<Identity>, ServiceError> {
        let identity = sqlx::query_as::<_, Identity>("SELECT * FROM identities WHERE phone = $1")
            .bind(phone)
            .fetch_optional(&self.pool)
            .await?;
        Ok(identity)
    }

    pub async fn insert_identity(&self, identity: &Identity) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO identities (
                identity_id, email, phone, password_hash, status_code,
                email_verified, phone_verified, failed_password_count,
                lockout_until_utc, otp_blocked_until_utc, password_reset_pending,
                last_login_utc, last_login_tenant, created_utc
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(identity.identity_id)
        .bind(&identity.email)
        .bind(&identity.phone)
        .bind(&identity.password_hash)
        .bind(&identity.status_code)
        .bind(identity.email_verified)
        .bind(identity.phone_verified)
        .bind(identity.failed_password_count)
        .bind(identity.lockout_until_utc)
        .bind(identity.otp_blocked_until_utc)
        .bind(identity.password_reset_pending)
        .bind(identity.last_login_utc)
        .bind(identity.last_login_tenant)
        .bind(identity.created_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Persist every mutable column of the aggregate.
    pub async fn update_identity(&self, identity: &Identity) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            UPDATE identities SET
                email = $2, phone = $3, password_hash = $4, status_code = $5,
                email_verified = $6, phone_verified = $7, failed_password_count = $8,
                lockout_until_utc = $9, otp_blocked_until_utc = $10,
                password_reset_pending = $11, last_login_utc = $12, last_login_tenant = $13
            WHERE identity_id = $1
            "#,
        )
        .bind(identity.identity_id)
        .bind(&identity.email)
        .bind(&identity.phone)
        .bind(&identity.password_hash)
        .bind(&identity.status_code)
        .bind(identity.email_verified)
        .bind(identity.phone_verified)
        .bind(identity.failed_password_count)
        .bind(identity.lockout_until_utc)
        .bind(identity.otp_blocked_until_utc)
        .bind(identity.password_reset_pending)
        .bind(identity.last_login_utc)
        .bind(identity.last_login_tenant)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Insert an identity and its first membership in one transaction;
    /// registration must never leave one without the other.
    pub async fn create_identity_with_membership(
        &self,
        identity: &Identity,
        membership: &Membership,
    ) -> Result<(), ServiceError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO identities (
                identity_id, email, phone, password_hash, status_code,
                email_verified, phone_verified, failed_password_count,
                lockout_until_utc, otp_blocked_until_utc, password_reset_pending,
                last_login_utc, last_login_tenant, created_utc
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(identity.identity_id)
        .bind(&identity.email)
        .bind(&identity.phone)
        .bind(&identity.password_hash)
        .bind(&identity.status_code)
        .bind(identity.email_verified)
        .bind(identity.phone_verified)
        .bind(identity.failed_password_count)
        .bind(identity.lockout_until_utc)
        .bind(identity.otp_blocked_until_utc)
        .bind(identity.password_reset_pending)
        .bind(identity.last_login_utc)
        .bind(identity.last_login_tenant)
        .bind(identity.created_utc)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO memberships (
                membership_id, identity_id, tenant_id, role_name, permissions,
                status_code, subscription_expiry_utc, created_utc
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(membership.membership_id)
        .bind(membership.identity_id)
        .bind(membership.tenant_id)
        .bind(&membership.role_name)
        .bind(&membership.permissions)
        .bind(&membership.status_code)
        .bind(membership.subscription_expiry_utc)
        .bind(membership.created_utc)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    // ==================== Membership Operations ====================

    pub async fn find_membership(
        &self,
        identity_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<Option<Membership>, ServiceError> {
        let membership = sqlx::query_as::<_, Membership>(
            "SELECT * FROM memberships WHERE identity_id = $1 AND tenant_id = $2",
        )
        .bind(identity_id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(membership)
    }

    pub async fn list_memberships(&self, identity_id: Uuid) -> Result<Vec<Membership>, ServiceError> {
        let memberships = sqlx::query_as::<_, Membership>(
            "SELECT * FROM memberships WHERE identity_id = $1 ORDER BY created_utc",
        )
        .bind(identity_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(memberships)
    }

    pub async fn insert_membership(&self, membership: &Membership) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO memberships (
                membership_id, identity_id, tenant_id, role_name, permissions,
                status_code, subscription_expiry_utc, created_utc
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(membership.membership_id)
        .bind(membership.identity_id)
        .bind(membership.tenant_id)
        .bind(&membership.role_name)
        .bind(&membership.permissions)
        .bind(&membership.status_code)
        .bind(membership.subscription_expiry_utc)
        .bind(membership.created_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn update_membership_status(
        &self,
        identity_id: Uuid,
        tenant_id: Uuid,
        status: MembershipStatus,
    ) -> Result<bool, ServiceError> {
        let result = sqlx::query(
            "UPDATE memberships SET status_code = $3 WHERE identity_id = $1 AND tenant_id = $2",
        )
        .bind(identity_id)
        .bind(tenant_id)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn update_membership_role(
        &self,
        identity_id: Uuid,
        tenant_id: Uuid,
        role_name: &str,
        permissions: &[String],
    ) -> Result<bool, ServiceError> {
        let result = sqlx::query(
            r#"
            UPDATE memberships SET role_name = $3, permissions = $4
            WHERE identity_id = $1 AND tenant_id = $2
            "#,
        )
        .bind(identity_id)
        .bind(tenant_id)
        .bind(role_name)
        .bind(permissions)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn update_membership_subscription_expiry(
        &self,
        identity_id: Uuid,
        tenant_id: Uuid,
        expiry: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Result<bool, ServiceError> {
        let result = sqlx::query(
            r#"
            UPDATE memberships SET subscription_expiry_utc = $3
            WHERE identity_id = $1 AND tenant_id = $2
            "#,
        )
        .bind(identity_id)
        .bind(tenant_id)
        .bind(expiry)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    // ==================== Federated Login Operations ====================

    pub async fn find_federated_login(
        &self,
        provider: &str,
        provider_subject_id: &str,
    ) -> Result<Option<FederatedLogin>, ServiceError> {
        let login = sqlx::query_as::<_, FederatedLogin>(
            "SELECT * FROM federated_logins WHERE provider = $1 AND provider_subject_id = $2",
        )
        .bind(provider)
        .bind(provider_subject_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(login)
    }

    pub async fn list_federated_logins(
        &self,
        identity_id: Uuid,
    ) -> Result<Vec<FederatedLogin>, ServiceError> {
        let logins = sqlx::query_as::<_, FederatedLogin>(
            "SELECT * FROM federated_logins WHERE identity_id = $1 ORDER BY created_utc",
        )
        .bind(identity_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(logins)
    }

    pub async fn insert_federated_login(&self, login: &FederatedLogin) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO federated_logins (
                login_id, identity_id, provider, provider_subject_id, display_name, created_utc
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(login.login_id)
        .bind(login.identity_id)
        .bind(&login.provider)
        .bind(&login.provider_subject_id)
        .bind(&login.display_name)
        .bind(login.created_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete_federated_login(
        &self,
        identity_id: Uuid,
        provider: &str,
        provider_subject_id: &str,
    ) -> Result<bool, ServiceError> {
        let result = sqlx::query(
            r#"
            DELETE FROM federated_logins
            WHERE identity_id = $1 AND provider = $2 AND provider_subject_id = $3
            "#,
        )
        .bind(identity_id)
        .bind(provider)
        .bind(provider_subject_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    // ==================== Challenge Operations ====================

    pub async fn insert_challenge(
        &self,
        challenge: &VerificationChallenge,
    ) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO challenges (
                challenge_id, identity_id, purpose_code, code, expiry_utc,
                used, attempts, created_utc
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(challenge.challenge_id)
        .bind(challenge.identity_id)
        .bind(&challenge.purpose_code)
        .bind(&challenge.code)
        .bind(challenge.expiry_utc)
        .bind(challenge.used)
        .bind(challenge.attempts)
        .bind(challenge.created_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// The authoritative challenge for (identity, purpose): among live ones,
    /// the latest expiry wins; older live challenges are simply ignored.
    pub async fn find_live_challenge(
        &self,
        identity_id: Uuid,
        purpose_code: &str,
    ) -> Result<Option<VerificationChallenge>, ServiceError> {
        let challenge = sqlx::query_as::<_, VerificationChallenge>(
            r#"
            SELECT * FROM challenges
            WHERE identity_id = $1 AND purpose_code = $2 AND NOT used AND expiry_utc > NOW()
            ORDER BY expiry_utc DESC, created_utc DESC
            LIMIT 1
            "#,
        )
        .bind(identity_id)
        .bind(purpose_code)
        .fetch_optional(&self.pool)
        .await?;
        Ok(challenge)
    }

    /// Atomically bump the attempt counter and return the new value, keeping
    /// the threshold exact under concurrent submissions.
    pub async fn increment_challenge_attempts(
        &self,
        challenge_id: Uuid,
    ) -> Result<i32, ServiceError> {
        let attempts = sqlx::query_scalar::<_, i32>(
            "UPDATE challenges SET attempts = attempts + 1 WHERE challenge_id = $1 RETURNING attempts",
        )
        .bind(challenge_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(attempts)
    }

    pub async fn consume_challenge(&self, challenge_id: Uuid) -> Result<(), ServiceError> {
        sqlx::query("UPDATE challenges SET used = TRUE WHERE challenge_id = $1")
            .bind(challenge_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Burn a challenge and start the identity's issuance cool-down together.
    pub async fn burn_challenge_and_block_otp(
        &self,
        challenge_id: Uuid,
        identity_id: Uuid,
        until: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), ServiceError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE challenges SET used = TRUE WHERE challenge_id = $1")
            .bind(challenge_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE identities SET otp_blocked_until_utc = $2 WHERE identity_id = $1")
            .bind(identity_id)
            .bind(until)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    // ==================== Session Operations ====================

    /// Forced single-session semantics: revoke whatever sessions exist for
    /// this (identity, tenant) scope, insert the new one, and persist the
    /// identity's login-time mutations, all in one transaction. A partial
    /// unique index on the scope backs this up against concurrent logins.
    pub async fn create_login_session(
        &self,
        identity: &Identity,
        session: &Session,
    ) -> Result<(), ServiceError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE sessions SET revoked = TRUE
            WHERE identity_id = $1 AND tenant_id IS NOT DISTINCT FROM $2 AND NOT revoked
            "#,
        )
        .bind(identity.identity_id)
        .bind(session.tenant_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO sessions (
                session_id, identity_id, tenant_id, refresh_token_hash,
                expiry_utc, revoked, created_utc, ip_address, user_agent
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(session.session_id)
        .bind(session.identity_id)
        .bind(session.tenant_id)
        .bind(&session.refresh_token_hash)
        .bind(session.expiry_utc)
        .bind(session.revoked)
        .bind(session.created_utc)
        .bind(&session.ip_address)
        .bind(&session.user_agent)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE identities SET
                failed_password_count = $2, lockout_until_utc = $3,
                last_login_utc = $4, last_login_tenant = $5
            WHERE identity_id = $1
            "#,
        )
        .bind(identity.identity_id)
        .bind(identity.failed_password_count)
        .bind(identity.lockout_until_utc)
        .bind(identity.last_login_utc)
        .bind(identity.last_login_tenant)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn find_session_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<Session>, ServiceError> {
        let session =
            sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE refresh_token_hash = $1")
                .bind(token_hash)
                .fetch_optional(&self.pool)
                .await?;
        Ok(session)
    }

    pub async fn find_session(
        &self,
        identity_id: Uuid,
        session_id: Uuid,
    ) -> Result<Option<Session>, ServiceError> {
        let session = sqlx::query_as::<_, Session>(
            "SELECT * FROM sessions WHERE session_id = $1 AND identity_id = $2",
        )
        .bind(session_id)
        .bind(identity_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }

    /// Revoke a session the identity owns. Returns false when the session
    /// does not exist, is owned by someone else, or was already revoked.
    pub async fn revoke_session(
        &self,
        identity_id: Uuid,
        session_id: Uuid,
    ) -> Result<bool, ServiceError> {
        let result = sqlx::query(
            r#"
            UPDATE sessions SET revoked = TRUE
            WHERE session_id = $1 AND identity_id = $2 AND NOT revoked
            "#,
        )
        .bind(session_id)
        .bind(identity_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn revoke_all_sessions(&self, identity_id: Uuid) -> Result<u64, ServiceError> {
        let result =
            sqlx::query("UPDATE sessions SET revoked = TRUE WHERE identity_id = $1 AND NOT revoked")
                .bind(identity_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    pub async fn list_active_sessions(
        &self,
        identity_id: Uuid,
    ) -> Result<Vec<Session>, ServiceError> {
        let sessions = sqlx::query_as::<_, Session>(
            r#"
            SELECT * FROM sessions
            WHERE identity_id = $1 AND NOT revoked AND expiry_utc > NOW()
            ORDER BY created_utc DESC
            "#,
        )
        .bind(identity_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(sessions)
    }
}
