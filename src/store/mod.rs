//! Persistence seam for the lifecycle manager.
//!
//! All state-mutating operations are expressed as conditional updates
//! (check status/version before writing) so that concurrent callers
//! against a shared store cannot clobber each other. Conditional methods
//! return whether a row was actually written; a `false` means the
//! predicate no longer matched at write time.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{AccessToken, OtpCode, Service, TokenStatus, User};

/// Field changes applied to an access token by a conditional update.
///
/// `None` leaves the field untouched. The store bumps `version` on every
/// successful write.
#[derive(Debug, Clone, Default)]
pub struct TokenPatch {
    pub status: Option<TokenStatus>,
    pub token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub renewed_at: Option<DateTime<Utc>>,
    pub notified: Option<bool>,
}

/// Field changes applied to a user by a version-checked update.
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub last_login_at: Option<DateTime<Utc>>,
    pub settings: Option<serde_json::Value>,
}

/// Record storage scoped to users, services, access tokens and OTP codes.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    // ---- users ----

    /// Insert a new user. Fails with `InvalidInput` when the email or
    /// username is already taken.
    async fn insert_user(&self, user: &User) -> AppResult<()>;

    /// Fetch a user by id. Soft-deleted users are not returned.
    async fn get_user(&self, id: Uuid) -> AppResult<Option<User>>;

    /// Apply a patch and bump the version iff the stored version still
    /// matches `expected_version`.
    async fn update_user_if_version(
        &self,
        id: Uuid,
        expected_version: i32,
        patch: UserPatch,
        now: DateTime<Utc>,
    ) -> AppResult<bool>;

    /// Soft-delete a user and hard-delete their OTP codes.
    async fn soft_delete_user(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<bool>;

    // ---- services ----

    /// Insert a new service. Fails with `InvalidInput` on duplicate name.
    async fn insert_service(&self, service: &Service) -> AppResult<()>;

    async fn get_service(&self, id: Uuid) -> AppResult<Option<Service>>;

    async fn list_services(&self) -> AppResult<Vec<Service>>;

    // ---- access tokens ----

    async fn insert_token(&self, token: &AccessToken) -> AppResult<()>;

    async fn get_token(&self, id: Uuid) -> AppResult<Option<AccessToken>>;

    /// Conditional write: apply the patch and bump the version iff the
    /// token status is one of `expected_status` and, when given, the
    /// stored version still matches `expected_version`.
    async fn update_token_if(
        &self,
        id: Uuid,
        expected_status: &[TokenStatus],
        expected_version: Option<i32>,
        patch: TokenPatch,
        now: DateTime<Utc>,
    ) -> AppResult<bool>;

    /// Bulk conditional update: every `active` token with
    /// `expires_at <= now` becomes `expired`. Returns rows changed.
    async fn expire_due_tokens(&self, now: DateTime<Utc>) -> AppResult<u64>;

    /// Expired tokens with `notified == false`, oldest expiry first.
    async fn find_expired_unnotified(&self, limit: u64) -> AppResult<Vec<AccessToken>>;

    /// Set `notified = true` iff the token is still expired and
    /// unnotified.
    async fn mark_notified(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<bool>;

    /// One page of `active` tokens with `expires_at` in `[from, until]`,
    /// ordered by expiry then id so pagination is stable.
    async fn list_expiring_page(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
        offset: u64,
        limit: u64,
    ) -> AppResult<Vec<AccessToken>>;

    // ---- otp codes ----

    async fn insert_otp(&self, otp: &OtpCode) -> AppResult<()>;

    /// Active, non-deleted codes for a user, newest first.
    async fn active_otps_for_user(&self, user_id: Uuid) -> AppResult<Vec<OtpCode>>;

    /// Deactivate every active code for a user. Returns rows changed.
    async fn deactivate_otps_for_user(&self, user_id: Uuid, now: DateTime<Utc>) -> AppResult<u64>;

    /// Consume a code iff it is still active. A `false` means a
    /// concurrent consumer won the race.
    async fn consume_otp(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<bool>;

    /// Bulk conditional update: every active code with
    /// `expires_at <= now` becomes inactive. Returns rows changed.
    async fn expire_due_otps(&self, now: DateTime<Utc>) -> AppResult<u64>;
}
