//! Verification challenge store.
//!
//! Issues, stores and consumes one-time codes bound to an identity and a
//! purpose. All challenge state, including the issuance cool-down, is
//! durable so horizontally scaled instances agree on it.

use chrono::{Duration, Utc};
use rand::Rng;
use std::sync::Arc;

use crate::models::challenge::{MAX_CHALLENGE_ATTEMPTS, OTP_BLOCK_MINUTES};
use crate::models::{ChallengePurpose, GlobalStatus, Identity, VerificationChallenge};
use crate::services::notify::{CodeDelivery, DeliveryChannel};
use crate::services::{Database, ServiceError};

#[derive(Clone)]
pub struct ChallengeService {
    db: Database,
    notifier: Arc<dyn CodeDelivery>,
}

impl ChallengeService {
    pub fn new(db: Database, notifier: Arc<dyn CodeDelivery>) -> Self {
        Self { db, notifier }
    }

    /// Issue a fresh challenge and hand its code to the notification
    /// collaborator. Fails while the identity's issuance cool-down is
    /// running. Delivery is best-effort: the challenge stands even if the
    /// collaborator is down.
    pub async fn issue(
        &self,
        identity: &Identity,
        purpose: ChallengePurpose,
        ttl: Duration,
    ) -> Result<VerificationChallenge, ServiceError> {
        if let Some(until) = identity.otp_blocked_until_utc {
            if until > Utc::now() {
                return Err(ServiceError::AccountLocked(until));
            }
        }

        let code = generate_code();
        let challenge =
            VerificationChallenge::new(identity.identity_id, purpose, code.clone(), ttl);
        self.db.insert_challenge(&challenge).await?;

        tracing::info!(
            identity_id = %identity.identity_id,
            purpose = purpose.as_str(),
            "Verification challenge issued"
        );

        for channel in delivery_channels(identity, purpose) {
            if let Err(e) = self
                .notifier
                .deliver_code(identity, channel, &code, purpose)
                .await
            {
                tracing::warn!(
                    identity_id = %identity.identity_id,
                    error = %e,
                    "Code delivery failed; challenge remains valid"
                );
            }
        }

        Ok(challenge)
    }

    /// Verify a submitted code against the authoritative live challenge and
    /// apply the purpose's side effect to the identity. Returns the updated
    /// identity.
    pub async fn verify(
        &self,
        mut identity: Identity,
        purpose: ChallengePurpose,
        code: &str,
    ) -> Result<Identity, ServiceError> {
        if identity.is_otp_blocked() {
            return Err(ServiceError::Unauthorized);
        }

        let challenge = self
            .db
            .find_live_challenge(identity.identity_id, purpose.as_str())
            .await?
            .ok_or(ServiceError::NotFound("challenge"))?;

        if !challenge.matches_code(code) {
            let attempts = self
                .db
                .increment_challenge_attempts(challenge.challenge_id)
                .await?;

            if attempts >= MAX_CHALLENGE_ATTEMPTS {
                let until = Utc::now() + Duration::minutes(OTP_BLOCK_MINUTES);
                self.db
                    .burn_challenge_and_block_otp(challenge.challenge_id, identity.identity_id, until)
                    .await?;
                tracing::warn!(
                    identity_id = %identity.identity_id,
                    purpose = purpose.as_str(),
                    "Challenge burned after repeated failures; issuance blocked"
                );
            }

            return Err(ServiceError::Unauthorized);
        }

        self.db.consume_challenge(challenge.challenge_id).await?;

        match purpose {
            ChallengePurpose::Email => identity.verify_email(),
            ChallengePurpose::Phone => identity.verify_phone(),
            ChallengePurpose::Both => {
                identity.email_verified = true;
                identity.verify_phone();
            }
            ChallengePurpose::Reactivation => identity.reactivate(),
            ChallengePurpose::PasswordReset => identity.password_reset_pending = true,
        }

        self.db.update_identity(&identity).await?;

        tracing::info!(
            identity_id = %identity.identity_id,
            purpose = purpose.as_str(),
            status = %identity.status_code,
            "Verification challenge consumed"
        );

        Ok(identity)
    }

    /// Whether the identity may currently be handed a challenge for the
    /// purpose; the silent request paths use this to decide eligibility.
    pub fn eligible(identity: &Identity, purpose: ChallengePurpose) -> bool {
        match purpose {
            ChallengePurpose::Reactivation => identity.status() == GlobalStatus::SoftDeleted,
            _ => !identity.is_banned() && !identity.is_soft_deleted(),
        }
    }
}

/// Where a code travels for each purpose.
fn delivery_channels(identity: &Identity, purpose: ChallengePurpose) -> Vec<DeliveryChannel> {
    match purpose {
        ChallengePurpose::Phone => vec![DeliveryChannel::Phone],
        ChallengePurpose::Both => {
            let mut channels = vec![DeliveryChannel::Email];
            if identity.phone.is_some() {
                channels.push(DeliveryChannel::Phone);
            }
            channels
        }
        _ => vec![DeliveryChannel::Email],
    }
}

/// Six decimal digits.
fn generate_code() -> String {
    rand::thread_rng().gen_range(100_000..1_000_000).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_codes_are_six_digits() {
        for _ in 0..100 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_delivery_channels_per_purpose() {
        let mut identity =
            Identity::new("a@example.com".into(), Some("+15550001".into()), "h".into());

        assert_eq!(
            delivery_channels(&identity, ChallengePurpose::Email),
            vec![DeliveryChannel::Email]
        );
        assert_eq!(
            delivery_channels(&identity, ChallengePurpose::Phone),
            vec![DeliveryChannel::Phone]
        );
        assert_eq!(
            delivery_channels(&identity, ChallengePurpose::Both),
            vec![DeliveryChannel::Email, DeliveryChannel::Phone]
        );

        identity.phone = None;
        assert_eq!(
            delivery_channels(&identity, ChallengePurpose::Both),
            vec![DeliveryChannel::Email]
        );
    }

    #[test]
    fn test_reactivation_eligibility() {
        let mut identity = Identity::new("a@example.com".into(), None, "h".into());
        assert!(!ChallengeService::eligible(
            &identity,
            ChallengePurpose::Reactivation
        ));
        assert!(ChallengeService::eligible(&identity, ChallengePurpose::Email));

        identity.soft_delete();
        assert!(ChallengeService::eligible(
            &identity,
            ChallengePurpose::Reactivation
        ));
        assert!(!ChallengeService::eligible(
            &identity,
            ChallengePurpose::PasswordReset
        ));
    }
}
