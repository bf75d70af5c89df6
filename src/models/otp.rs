//! OTP code model: short-lived, single-use verification codes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Length of an OTP code in ASCII digits.
pub const OTP_CODE_LENGTH: usize = 6;

/// A single-use verification code bound to exactly one user.
///
/// Consumed (`is_active = false`) on successful verification or by the
/// expiry sweep; never reactivated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtpCode {
    pub id: Uuid,
    pub user_id: Uuid,
    /// 6-digit code, matched case-sensitively
    pub code: String,
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl OtpCode {
    /// Check whether the code's expiry has passed at the given instant.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
