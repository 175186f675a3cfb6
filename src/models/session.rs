//! Session model - one durable record per issued refresh credential.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::FromRow;
use uuid::Uuid;

/// Session entity. The refresh value itself is never stored; only its
/// SHA-256 digest is, and lookups go through the digest.
#[derive(Debug, Clone, FromRow)]
pub struct Session {
    pub session_id: Uuid,
    pub identity_id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub refresh_token_hash: String,
    pub expiry_utc: DateTime<Utc>,
    pub revoked: bool,
    pub created_utc: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl Session {
    pub fn new(
        identity_id: Uuid,
        tenant_id: Option<Uuid>,
        refresh_value: &str,
        expiry_days: i64,
        ip_address: Option<String>,
        user_agent: Option<String>,
    ) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            identity_id,
            tenant_id,
            refresh_token_hash: Self::hash_refresh_value(refresh_value),
            expiry_utc: Utc::now() + Duration::days(expiry_days),
            revoked: false,
            created_utc: Utc::now(),
            ip_address,
            user_agent,
        }
    }

    /// Hash a refresh value with SHA-256 for storage and lookup.
    pub fn hash_refresh_value(value: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(value.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// A session is active iff it has not been revoked and has not expired.
    pub fn is_active(&self) -> bool {
        !self.revoked && self.expiry_utc > Utc::now()
    }
}

/// Session info for API responses.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct SessionInfo {
    pub session_id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub created_utc: DateTime<Utc>,
    pub expiry_utc: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl From<Session> for SessionInfo {
    fn from(s: Session) -> Self {
        Self {
            session_id: s.session_id,
            tenant_id: s.tenant_id,
            created_utc: s.created_utc,
            expiry_utc: s.expiry_utc,
            ip_address: s.ip_address,
            user_agent: s.user_agent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_stores_digest_not_value() {
        let session = Session::new(Uuid::new_v4(), None, "opaque-value", 7, None, None);
        assert_ne!(session.refresh_token_hash, "opaque-value");
        assert_eq!(
            session.refresh_token_hash,
            Session::hash_refresh_value("opaque-value")
        );
    }

    #[test]
    fn test_session_activity() {
        let mut session = Session::new(Uuid::new_v4(), None, "v", 7, None, None);
        assert!(session.is_active());

        session.revoked = true;
        assert!(!session.is_active());

        session.revoked = false;
        session.expiry_utc = Utc::now() - Duration::seconds(1);
        assert!(!session.is_active());
    }
}
