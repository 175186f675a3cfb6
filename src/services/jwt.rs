//! Token issuer.
//!
//! Assembles the short-lived signed access credential and the long-lived
//! opaque refresh value. The refresh value is the sole authority backing a
//! session row and is never derived from anything predictable.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::models::{Identity, Membership};

/// JWT service for access-token generation and validation.
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_token_expiry_minutes: i64,
}

/// Claims carried by an access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Subject (identity ID)
    pub sub: String,
    /// Session backing this credential
    pub sid: String,
    /// Tenant the session is bound to, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    pub email: String,
    pub email_verified: bool,
    pub phone_verified: bool,
    /// Tenant role; omitted when entitlement is suppressed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<String>,
    /// Platform super-admin role held through the system tenant;
    /// never suppressed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub super_admin_role: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub super_admin_permissions: Vec<String>,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// JWT ID
    pub jti: String,
}

/// Token pair response returned to the client.
#[derive(Debug, Serialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

impl TokenResponse {
    pub fn new(access_token: String, refresh_token: String, expires_in: i64) -> Self {
        Self {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in,
        }
    }
}

impl JwtService {
    pub fn new(config: &JwtConfig) -> Result<Self, anyhow::Error> {
        if config.secret.len() < 32 {
            return Err(anyhow::anyhow!(
                "JWT secret must be at least 32 bytes, got {}",
                config.secret.len()
            ));
        }

        Ok(Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            access_token_expiry_minutes: config.access_token_expiry_minutes,
        })
    }

    /// Issue an access token for a session.
    ///
    /// When `suppress_roles` is set the tenant role and permission claims are
    /// omitted; the super-admin claims ride along regardless.
    pub fn issue_access_token(
        &self,
        identity: &Identity,
        session_id: Uuid,
        tenant_id: Option<Uuid>,
        membership: Option<&Membership>,
        super_admin: Option<&Membership>,
        suppress_roles: bool,
    ) -> Result<String, anyhow::Error> {
        let now = Utc::now();
        let exp = now + Duration::minutes(self.access_token_expiry_minutes);

        let (role, permissions) = match membership {
            Some(m) if !suppress_roles => (Some(m.role_name.clone()), m.permissions.clone()),
            _ => (None, Vec::new()),
        };

        let (super_admin_role, super_admin_permissions) = match super_admin {
            Some(m) => (Some(m.role_name.clone()), m.permissions.clone()),
            None => (None, Vec::new()),
        };

        let claims = AccessTokenClaims {
            sub: identity.identity_id.to_string(),
            sid: session_id.to_string(),
            tenant_id: tenant_id.map(|t| t.to_string()),
            email: identity.email.clone(),
            email_verified: identity.email_verified,
            phone_verified: identity.phone_verified,
            role,
            permissions,
            super_admin_role,
            super_admin_permissions,
            exp: exp.timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| anyhow::anyhow!("Failed to encode access token: {}", e))
    }

    /// Validate and decode an access token.
    pub fn validate_access_token(&self, token: &str) -> Result<AccessTokenClaims, anyhow::Error> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;

        let data = decode::<AccessTokenClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| anyhow::anyhow!("Invalid access token: {}", e))?;

        Ok(data.claims)
    }

    /// Access token lifetime in seconds, for the client response.
    pub fn access_token_expiry_seconds(&self) -> i64 {
        self.access_token_expiry_minutes * 60
    }
}

/// Generate an opaque refresh value: 32 bytes from the OS CSPRNG,
/// hex-encoded.
pub fn generate_refresh_value() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::membership::{MembershipStatus, SYSTEM_TENANT_ID};

    fn jwt_service() -> JwtService {
        JwtService::new(&JwtConfig {
            secret: "0123456789abcdef0123456789abcdef".to_string(),
            access_token_expiry_minutes: 15,
            refresh_token_expiry_days: 7,
        })
        .expect("service creation failed")
    }

    fn identity() -> Identity {
        let mut id = Identity::new("a@example.com".to_string(), None, "hash".to_string());
        id.email_verified = true;
        id
    }

    fn membership(tenant_id: Uuid, role: &str, perms: &[&str]) -> Membership {
        let mut m = Membership::new(Uuid::new_v4(), tenant_id, MembershipStatus::Active);
        m.role_name = role.to_string();
        m.permissions = perms.iter().map(|p| p.to_string()).collect();
        m
    }

    #[test]
    fn test_short_secret_rejected() {
        let result = JwtService::new(&JwtConfig {
            secret: "too-short".to_string(),
            access_token_expiry_minutes: 15,
            refresh_token_expiry_days: 7,
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_access_token_roundtrip() {
        let jwt = jwt_service();
        let id = identity();
        let tenant = Uuid::new_v4();
        let session = Uuid::new_v4();
        let m = membership(tenant, "editor", &["posts.write", "posts.read"]);

        let token = jwt
            .issue_access_token(&id, session, Some(tenant), Some(&m), None, false)
            .unwrap();
        let claims = jwt.validate_access_token(&token).unwrap();

        assert_eq!(claims.sub, id.identity_id.to_string());
        assert_eq!(claims.sid, session.to_string());
        assert_eq!(claims.tenant_id, Some(tenant.to_string()));
        assert!(claims.email_verified);
        assert!(!claims.phone_verified);
        assert_eq!(claims.role.as_deref(), Some("editor"));
        assert_eq!(claims.permissions, vec!["posts.write", "posts.read"]);
    }

    #[test]
    fn test_suppression_omits_tenant_claims_but_not_super_admin() {
        let jwt = jwt_service();
        let id = identity();
        let tenant = Uuid::new_v4();
        let m = membership(tenant, "editor", &["posts.write"]);
        let admin = membership(SYSTEM_TENANT_ID, "super_admin", &["access.all"]);

        let token = jwt
            .issue_access_token(&id, Uuid::new_v4(), Some(tenant), Some(&m), Some(&admin), true)
            .unwrap();
        let claims = jwt.validate_access_token(&token).unwrap();

        assert!(claims.role.is_none());
        assert!(claims.permissions.is_empty());
        assert_eq!(claims.super_admin_role.as_deref(), Some("super_admin"));
        assert_eq!(claims.super_admin_permissions, vec!["access.all"]);
    }

    #[test]
    fn test_tenantless_token_has_no_role_claims() {
        let jwt = jwt_service();
        let id = identity();

        let token = jwt
            .issue_access_token(&id, Uuid::new_v4(), None, None, None, false)
            .unwrap();
        let claims = jwt.validate_access_token(&token).unwrap();

        assert!(claims.tenant_id.is_none());
        assert!(claims.role.is_none());
    }

    #[test]
    fn test_tampered_token_rejected() {
        let jwt = jwt_service();
        let id = identity();
        let mut token = jwt
            .issue_access_token(&id, Uuid::new_v4(), None, None, None, false)
            .unwrap();
        token.push('x');
        assert!(jwt.validate_access_token(&token).is_err());
    }

    #[test]
    fn test_refresh_values_are_unique_and_opaque() {
        let first = generate_refresh_value();
        let second = generate_refresh_value();
        assert_eq!(first.len(), 64);
        assert_ne!(first, second);
    }
}
