//! Verification challenge model - one-time codes bound to an identity
//! and a purpose.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use subtle::ConstantTimeEq;
use uuid::Uuid;

/// Wrong submissions tolerated before a challenge is burned and the
/// identity's challenge issuance is cooled down.
pub const MAX_CHALLENGE_ATTEMPTS: i32 = 5;

/// Cool-down applied to challenge issuance and verification once the
/// attempt threshold is reached.
pub const OTP_BLOCK_MINUTES: i64 = 10;

/// Challenge purpose codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ChallengePurpose {
    Email,
    Phone,
    Both,
    Reactivation,
    PasswordReset,
}

impl ChallengePurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChallengePurpose::Email => "email",
            ChallengePurpose::Phone => "phone",
            ChallengePurpose::Both => "both",
            ChallengePurpose::Reactivation => "reactivation",
            ChallengePurpose::PasswordReset => "password_reset",
        }
    }

    /// Contact-verification codes are short-lived; reset and reactivation
    /// codes get a longer window.
    pub fn default_ttl(&self) -> Duration {
        match self {
            ChallengePurpose::Email | ChallengePurpose::Phone | ChallengePurpose::Both => {
                Duration::minutes(5)
            }
            ChallengePurpose::Reactivation | ChallengePurpose::PasswordReset => {
                Duration::minutes(15)
            }
        }
    }
}

impl std::str::FromStr for ChallengePurpose {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(ChallengePurpose::Email),
            "phone" => Ok(ChallengePurpose::Phone),
            "both" => Ok(ChallengePurpose::Both),
            "reactivation" => Ok(ChallengePurpose::Reactivation),
            "password_reset" => Ok(ChallengePurpose::PasswordReset),
            _ => Err(format!("Invalid challenge purpose: {}", s)),
        }
    }
}

/// Verification challenge entity.
#[derive(Debug, Clone, FromRow)]
pub struct VerificationChallenge {
    pub challenge_id: Uuid,
    pub identity_id: Uuid,
    pub purpose_code: String,
    pub code: String,
    pub expiry_utc: DateTime<Utc>,
    pub used: bool,
    pub attempts: i32,
    pub created_utc: DateTime<Utc>,
}

impl VerificationChallenge {
    pub fn new(identity_id: Uuid, purpose: ChallengePurpose, code: String, ttl: Duration) -> Self {
        Self {
            challenge_id: Uuid::new_v4(),
            identity_id,
            purpose_code: purpose.as_str().to_string(),
            code,
            expiry_utc: Utc::now() + ttl,
            used: false,
            attempts: 0,
            created_utc: Utc::now(),
        }
    }

    /// A challenge is live iff it has not been consumed and has not expired.
    pub fn is_live(&self) -> bool {
        !self.used && self.expiry_utc > Utc::now()
    }

    /// Constant-time code comparison.
    pub fn matches_code(&self, submitted: &str) -> bool {
        self.code.as_bytes().ct_eq(submitted.as_bytes()).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_challenge_liveness() {
        let mut ch = VerificationChallenge::new(
            Uuid::new_v4(),
            ChallengePurpose::Email,
            "123456".to_string(),
            Duration::minutes(5),
        );
        assert!(ch.is_live());

        ch.used = true;
        assert!(!ch.is_live());

        ch.used = false;
        ch.expiry_utc = Utc::now() - Duration::seconds(1);
        assert!(!ch.is_live());
    }

    #[test]
    fn test_code_comparison() {
        let ch = VerificationChallenge::new(
            Uuid::new_v4(),
            ChallengePurpose::Phone,
            "654321".to_string(),
            Duration::minutes(5),
        );
        assert!(ch.matches_code("654321"));
        assert!(!ch.matches_code("654320"));
        assert!(!ch.matches_code("65432"));
    }

    #[test]
    fn test_purpose_ttls() {
        assert_eq!(ChallengePurpose::Email.default_ttl(), Duration::minutes(5));
        assert_eq!(
            ChallengePurpose::PasswordReset.default_ttl(),
            Duration::minutes(15)
        );
        assert_eq!(
            ChallengePurpose::Reactivation.default_ttl(),
            Duration::minutes(15)
        );
    }
}
