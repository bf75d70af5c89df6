//! OTP issuance and verification.
//!
//! Codes are single-use: issuing a new code invalidates the user's
//! outstanding ones, and a successful verification consumes the code.

use std::sync::Arc;

use chrono::Duration;
use rand::RngExt;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{AppError, AppResult};
use crate::models::OtpCode;
use crate::store::CredentialStore;

/// Generate a random 6-digit code.
pub fn generate_code() -> String {
    rand::rng().random_range(100_000..1_000_000u32).to_string()
}

/// Case-sensitive exact match in constant time.
fn codes_match(stored: &str, candidate: &str) -> bool {
    stored.len() == candidate.len()
        && stored.as_bytes().ct_eq(candidate.as_bytes()).into()
}

/// OTP verification service.
#[derive(Clone)]
pub struct OtpService {
    store: Arc<dyn CredentialStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl OtpService {
    pub fn new(store: Arc<dyn CredentialStore>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self { store, clock, ttl }
    }

    /// Issue a fresh code for a user, invalidating any outstanding ones.
    pub async fn issue_otp(&self, user_id: Uuid) -> AppResult<OtpCode> {
        if self.store.get_user(user_id).await?.is_none() {
            return Err(AppError::InvalidUser(user_id.to_string()));
        }

        let now = self.clock.now();
        self.store.deactivate_otps_for_user(user_id, now).await?;

        let otp = OtpCode {
            id: Uuid::new_v4(),
            user_id,
            code: generate_code(),
            expires_at: now + self.ttl,
            is_active: true,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        self.store.insert_otp(&otp).await?;
        Ok(otp)
    }

    /// Verify a code for a user and consume it on success.
    ///
    /// Fails with `NotFound` when no active code exists, `InvalidCode` on
    /// mismatch, `Expired` when the matching code's expiry has passed,
    /// and `ConcurrentModification` when a concurrent consumer won.
    pub async fn verify_otp(&self, user_id: Uuid, code: &str) -> AppResult<()> {
        let candidates = self.store.active_otps_for_user(user_id).await?;
        if candidates.is_empty() {
            return Err(AppError::NotFound(format!(
                "Active code for user {}",
                user_id
            )));
        }

        let Some(otp) = candidates.iter().find(|c| codes_match(&c.code, code)) else {
            return Err(AppError::InvalidCode);
        };

        let now = self.clock.now();
        if otp.is_expired_at(now) {
            return Err(AppError::Expired);
        }

        if !self.store.consume_otp(otp.id, now).await? {
            return Err(AppError::ConcurrentModification(format!(
                "otp code for user {}",
                user_id
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_code_is_six_digits() {
        for _ in 0..100 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_codes_match_is_exact() {
        assert!(codes_match("123456", "123456"));
        assert!(!codes_match("123456", "123457"));
        assert!(!codes_match("123456", "12345"));
    }
}
