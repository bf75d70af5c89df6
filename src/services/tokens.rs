//! Credential lifecycle manager.
//!
//! Owns the state and transition rules for access tokens: issuance,
//! expiry detection, renewal, revocation, and expiry notification
//! bookkeeping. All writes go through the store's conditional updates so
//! a sweep, a revoke and a renewal can race without lost updates.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use futures_util::Stream;
use tracing::warn;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{AppError, AppResult};
use crate::models::{AccessToken, TokenStatus};
use crate::notify::Notifier;
use crate::store::{CredentialStore, TokenPatch};

/// Token secret prefix.
const TOKEN_PREFIX: &str = "acme_at_";
/// Random bytes in a token secret (hex-encoded to 64 chars).
const TOKEN_SECRET_BYTES: usize = 32;
/// Page size for sweep notification batches and expiring-soon queries.
const PAGE_SIZE: u64 = 100;

/// Generate a fresh opaque token secret.
pub fn generate_secret() -> String {
    let bytes: [u8; TOKEN_SECRET_BYTES] = rand::random();
    format!("{}{}", TOKEN_PREFIX, hex::encode(bytes))
}

/// Counters from one expiry sweep, for logging.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepOutcome {
    /// Active tokens moved to expired
    pub expired: u64,
    /// Expiry notifications dispatched and flagged
    pub notified: u64,
    /// Rows skipped because a conditional write lost its race; the next
    /// sweep picks them up
    pub skipped: u64,
    /// Active OTP codes deactivated by the sweep
    pub otp_deactivated: u64,
}

/// The lifecycle manager. Cheap to clone via the shared collaborators.
#[derive(Clone)]
pub struct LifecycleManager {
    store: Arc<dyn CredentialStore>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
}

impl LifecycleManager {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            clock,
            notifier,
        }
    }

    /// Current instant from the injected clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Issue a new token scoped to a service, optionally owned by a user.
    ///
    /// A token with no owning user is a service-level token; it follows
    /// the same expiry rules but is exempt from per-user reporting.
    pub async fn issue(
        &self,
        user_id: Option<Uuid>,
        service_id: Uuid,
        name: &str,
        ttl: Duration,
    ) -> AppResult<AccessToken> {
        if ttl <= Duration::zero() {
            return Err(AppError::InvalidInput("ttl must be positive".to_string()));
        }

        if self.store.get_service(service_id).await?.is_none() {
            return Err(AppError::InvalidService(service_id.to_string()));
        }

        if let Some(user_id) = user_id
            && self.store.get_user(user_id).await?.is_none()
        {
            return Err(AppError::InvalidUser(user_id.to_string()));
        }

        let now = self.clock.now();
        let token = AccessToken {
            id: Uuid::new_v4(),
            token: generate_secret(),
            name: name.to_string(),
            user_id,
            service_id,
            status: TokenStatus::Active,
            notified: false,
            version: 1,
            created_at: now,
            expires_at: now + ttl,
            renewed_at: None,
        };

        self.store.insert_token(&token).await?;
        Ok(token)
    }

    /// Revoke a token. Idempotent: revoking an already-revoked token is a
    /// no-op, never an error.
    pub async fn revoke(&self, token_id: Uuid) -> AppResult<AccessToken> {
        let token = self.get(token_id).await?;
        if token.status == TokenStatus::Revoked {
            return Ok(token);
        }

        let now = self.clock.now();
        let patch = TokenPatch {
            status: Some(TokenStatus::Revoked),
            ..Default::default()
        };

        // Status-conditional only: a renewal landing in between still
        // leaves the token revocable, and the write goes through.
        self.store
            .update_token_if(
                token_id,
                &[TokenStatus::Active, TokenStatus::Expired],
                None,
                patch,
                now,
            )
            .await?;

        // The write can only lose to a concurrent revoke, which is the
        // same outcome.
        self.get(token_id).await
    }

    /// Renew a token from `active` or `expired`, producing a fresh secret
    /// and expiry horizon. Renewal from `revoked` is rejected.
    pub async fn renew(&self, token_id: Uuid, ttl: Duration) -> AppResult<AccessToken> {
        if ttl <= Duration::zero() {
            return Err(AppError::InvalidInput("ttl must be positive".to_string()));
        }

        let token = self.get(token_id).await?;
        if token.status == TokenStatus::Revoked {
            return Err(AppError::InvalidTransition(format!(
                "cannot renew revoked token {}",
                token_id
            )));
        }

        let now = self.clock.now();
        let patch = TokenPatch {
            status: Some(TokenStatus::Active),
            token: Some(generate_secret()),
            expires_at: Some(now + ttl),
            renewed_at: Some(now),
            notified: Some(false),
        };

        let written = self
            .store
            .update_token_if(
                token_id,
                &[TokenStatus::Active, TokenStatus::Expired],
                Some(token.version),
                patch,
                now,
            )
            .await?;

        if !written {
            // Re-read to tell a revoke apart from a competing renewal.
            let current = self.get(token_id).await?;
            if current.status == TokenStatus::Revoked {
                return Err(AppError::InvalidTransition(format!(
                    "cannot renew revoked token {}",
                    token_id
                )));
            }
            return Err(AppError::ConcurrentModification(format!(
                "token {}",
                token_id
            )));
        }

        self.get(token_id).await
    }

    /// Reconcile stored status against `now`.
    ///
    /// Phase 1 moves every active token past its expiry horizon (expiry
    /// exactly at `now` counts) to `expired`. Phase 2 dispatches one
    /// notification per unnotified expired token and sets the flag.
    /// Phase 3 deactivates expired OTP codes. Safe to re-run with the
    /// same `now`: the second call matches no rows.
    pub async fn sweep_expirations(&self, now: DateTime<Utc>) -> AppResult<SweepOutcome> {
        let mut outcome = SweepOutcome {
            expired: self.store.expire_due_tokens(now).await?,
            ..Default::default()
        };

        loop {
            let batch = self.store.find_expired_unnotified(PAGE_SIZE).await?;
            if batch.is_empty() {
                break;
            }
            let batch_len = batch.len() as u64;

            for token in batch {
                // Notification is fire-and-forget: a delivery failure is
                // logged and the flag is still set, so a token is alerted
                // at most once.
                if let Err(e) = self.notifier.notify_expired(&token).await {
                    warn!(token_id = %token.id, "expiry notification failed: {}", e);
                }

                if self.store.mark_notified(token.id, now).await? {
                    outcome.notified += 1;
                } else {
                    // Lost a race with a renew or revoke; no longer our row.
                    outcome.skipped += 1;
                }
            }

            if batch_len < PAGE_SIZE {
                break;
            }
        }

        outcome.otp_deactivated = self.store.expire_due_otps(now).await?;
        Ok(outcome)
    }

    /// Lazy, finite stream of active tokens expiring within
    /// `[now, now + window]`, ordered by expiry. Calling again re-evaluates
    /// against the clock.
    pub fn list_expiring_soon(
        &self,
        window: Duration,
    ) -> impl Stream<Item = AppResult<AccessToken>> + Send + use<> {
        let now = self.clock.now();
        let until = now + window;
        let store = Arc::clone(&self.store);

        futures_util::stream::try_unfold(
            (store, 0u64, VecDeque::new(), false),
            move |(store, offset, mut buffered, exhausted)| async move {
                if let Some(next) = buffered.pop_front() {
                    return Ok(Some((next, (store, offset, buffered, exhausted))));
                }
                if exhausted {
                    return Ok(None);
                }

                let page = store.list_expiring_page(now, until, offset, PAGE_SIZE).await?;
                let exhausted = (page.len() as u64) < PAGE_SIZE;
                let offset = offset + page.len() as u64;
                let mut buffered: VecDeque<AccessToken> = page.into();

                match buffered.pop_front() {
                    Some(next) => Ok(Some((next, (store, offset, buffered, exhausted)))),
                    None => Ok(None),
                }
            },
        )
    }

    /// Fetch a token by id.
    pub async fn get(&self, token_id: Uuid) -> AppResult<AccessToken> {
        self.store
            .get_token(token_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Token {}", token_id)))
    }
}
