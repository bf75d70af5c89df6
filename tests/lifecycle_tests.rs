//! Integration tests for the token lifecycle manager.
//!
//! Runs against the in-memory store with a manual clock and a recording
//! notifier, so every expiry scenario is deterministic.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use futures_util::TryStreamExt;
use uuid::Uuid;

use acme_creds_lib::clock::{Clock, ManualClock};
use acme_creds_lib::error::{AppError, AppResult};
use acme_creds_lib::models::{AccessToken, OtpCode, Service, TokenStatus, User};
use acme_creds_lib::notify::RecordingNotifier;
use acme_creds_lib::services::{AccountService, LifecycleManager, NewUser};
use acme_creds_lib::store::memory::MemoryStore;
use acme_creds_lib::store::{CredentialStore, TokenPatch, UserPatch};

struct Fixture {
    store: Arc<MemoryStore>,
    clock: Arc<ManualClock>,
    notifier: Arc<RecordingNotifier>,
    manager: LifecycleManager,
    accounts: AccountService,
    user: User,
    service: Service,
}

async fn fixture() -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let notifier = Arc::new(RecordingNotifier::new());

    let manager = LifecycleManager::new(store.clone(), clock.clone(), notifier.clone());
    let accounts = AccountService::new(store.clone(), clock.clone());

    let user = accounts
        .register_user(NewUser {
            email: "john.doe@example.com".to_string(),
            username: "johndoe".to_string(),
            first_name: "John".to_string(),
            last_name: "Doe".to_string(),
            password_hash: "hash".to_string(),
            avatar_url: None,
        })
        .await
        .unwrap();

    let service = accounts
        .create_service("GitHub", "GitHub API integration")
        .await
        .unwrap();

    Fixture {
        store,
        clock,
        notifier,
        manager,
        accounts,
        user,
        service,
    }
}

#[tokio::test]
async fn test_issue_creates_active_token() {
    let fx = fixture().await;
    let now = fx.clock.now();

    let token = fx
        .manager
        .issue(Some(fx.user.id), fx.service.id, "CI token", Duration::days(30))
        .await
        .unwrap();

    assert_eq!(token.status, TokenStatus::Active);
    assert_eq!(token.expires_at, now + Duration::days(30));
    assert_eq!(token.user_id, Some(fx.user.id));
    assert!(!token.notified);
    assert!(token.renewed_at.is_none());
    assert!(token.token.starts_with("acme_at_"));
    assert!(token.expires_at > token.created_at);
}

#[tokio::test]
async fn test_issue_service_level_token() {
    let fx = fixture().await;

    let token = fx
        .manager
        .issue(None, fx.service.id, "Deploy token", Duration::days(7))
        .await
        .unwrap();

    assert!(token.is_service_level());
    assert_eq!(token.status, TokenStatus::Active);
}

#[tokio::test]
async fn test_issue_rejects_unknown_service_and_user() {
    let fx = fixture().await;

    let result = fx
        .manager
        .issue(None, Uuid::new_v4(), "Bad", Duration::days(1))
        .await;
    assert!(matches!(result, Err(AppError::InvalidService(_))));

    let result = fx
        .manager
        .issue(Some(Uuid::new_v4()), fx.service.id, "Bad", Duration::days(1))
        .await;
    assert!(matches!(result, Err(AppError::InvalidUser(_))));

    let result = fx
        .manager
        .issue(None, fx.service.id, "Bad", Duration::zero())
        .await;
    assert!(matches!(result, Err(AppError::InvalidInput(_))));
}

#[tokio::test]
async fn test_sweep_expires_and_notifies_once() {
    let fx = fixture().await;

    let token = fx
        .manager
        .issue(Some(fx.user.id), fx.service.id, "Short", Duration::minutes(10))
        .await
        .unwrap();

    // One second past the expiry horizon
    fx.clock.advance(Duration::minutes(10) + Duration::seconds(1));
    let now = fx.clock.now();

    let outcome = fx.manager.sweep_expirations(now).await.unwrap();
    assert_eq!(outcome.expired, 1);
    assert_eq!(outcome.notified, 1);
    assert_eq!(outcome.skipped, 0);

    let swept = fx.manager.get(token.id).await.unwrap();
    assert_eq!(swept.status, TokenStatus::Expired);
    assert!(swept.notified);
    assert_eq!(fx.notifier.sent(), vec![token.id]);

    // Idempotent: re-running with the same `now` changes nothing and
    // dispatches no duplicate notification.
    let outcome = fx.manager.sweep_expirations(now).await.unwrap();
    assert_eq!(outcome.expired, 0);
    assert_eq!(outcome.notified, 0);
    assert_eq!(fx.notifier.sent().len(), 1);
}

#[tokio::test]
async fn test_token_expiring_exactly_at_now_is_expired() {
    let fx = fixture().await;

    let token = fx
        .manager
        .issue(None, fx.service.id, "Boundary", Duration::minutes(10))
        .await
        .unwrap();

    fx.clock.advance(Duration::minutes(10));
    let outcome = fx.manager.sweep_expirations(fx.clock.now()).await.unwrap();

    assert_eq!(outcome.expired, 1);
    let swept = fx.manager.get(token.id).await.unwrap();
    assert_eq!(swept.status, TokenStatus::Expired);
}

#[tokio::test]
async fn test_revoke_is_idempotent() {
    let fx = fixture().await;

    let token = fx
        .manager
        .issue(None, fx.service.id, "Revocable", Duration::days(1))
        .await
        .unwrap();

    let revoked = fx.manager.revoke(token.id).await.unwrap();
    assert_eq!(revoked.status, TokenStatus::Revoked);

    // Duplicate revoke is a no-op, never an error
    let again = fx.manager.revoke(token.id).await.unwrap();
    assert_eq!(again.status, TokenStatus::Revoked);
    assert_eq!(again.version, revoked.version);

    let result = fx.manager.revoke(Uuid::new_v4()).await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_revoke_then_renew_fails() {
    let fx = fixture().await;

    let token = fx
        .manager
        .issue(Some(fx.user.id), fx.service.id, "Doomed", Duration::days(1))
        .await
        .unwrap();

    fx.clock.advance(Duration::minutes(1));
    fx.manager.revoke(token.id).await.unwrap();

    fx.clock.advance(Duration::minutes(1));
    let result = fx.manager.renew(token.id, Duration::days(1)).await;
    assert!(matches!(result, Err(AppError::InvalidTransition(_))));
}

#[tokio::test]
async fn test_renew_active_and_expired_tokens() {
    let fx = fixture().await;

    let token = fx
        .manager
        .issue(None, fx.service.id, "Renewable", Duration::minutes(10))
        .await
        .unwrap();
    let original_secret = token.token.clone();

    // Renew while active
    fx.clock.advance(Duration::minutes(5));
    let renewed = fx.manager.renew(token.id, Duration::days(30)).await.unwrap();
    assert_eq!(renewed.status, TokenStatus::Active);
    assert_eq!(renewed.expires_at, fx.clock.now() + Duration::days(30));
    assert_eq!(renewed.renewed_at, Some(fx.clock.now()));
    assert_ne!(renewed.token, original_secret);
    assert!(!renewed.notified);

    // Let it expire, get notified, then renew from expired
    fx.clock.advance(Duration::days(31));
    fx.manager.sweep_expirations(fx.clock.now()).await.unwrap();
    let expired = fx.manager.get(token.id).await.unwrap();
    assert_eq!(expired.status, TokenStatus::Expired);
    assert!(expired.notified);

    let renewed = fx.manager.renew(token.id, Duration::days(7)).await.unwrap();
    assert_eq!(renewed.status, TokenStatus::Active);
    // Fresh expiry horizon resets the notification flag
    assert!(!renewed.notified);

    // A further sweep must not re-notify the renewed token
    let outcome = fx.manager.sweep_expirations(fx.clock.now()).await.unwrap();
    assert_eq!(outcome.notified, 0);
}

#[tokio::test]
async fn test_list_expiring_soon_window() {
    let fx = fixture().await;

    let soon = fx
        .manager
        .issue(None, fx.service.id, "Soon", Duration::days(5))
        .await
        .unwrap();
    let later = fx
        .manager
        .issue(None, fx.service.id, "Later", Duration::days(20))
        .await
        .unwrap();
    let far = fx
        .manager
        .issue(None, fx.service.id, "Far", Duration::days(90))
        .await
        .unwrap();
    let revoked = fx
        .manager
        .issue(None, fx.service.id, "Revoked", Duration::days(5))
        .await
        .unwrap();
    fx.manager.revoke(revoked.id).await.unwrap();

    let expiring: Vec<_> = fx
        .manager
        .list_expiring_soon(Duration::days(30))
        .try_collect()
        .await
        .unwrap();

    let ids: Vec<Uuid> = expiring.iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![soon.id, later.id]);
    assert!(!ids.contains(&far.id));

    // Restartable: advancing the clock re-evaluates the window
    fx.clock.advance(Duration::days(61));
    let expiring: Vec<AccessToken> = fx
        .manager
        .list_expiring_soon(Duration::days(30))
        .try_collect()
        .await
        .unwrap();
    assert_eq!(
        expiring.iter().map(|t| t.id).collect::<Vec<_>>(),
        vec![far.id]
    );
}

#[tokio::test]
async fn test_sweep_deactivates_expired_otps() {
    let fx = fixture().await;
    let now = fx.clock.now();

    let otp = OtpCode {
        id: Uuid::new_v4(),
        user_id: fx.user.id,
        code: "123456".to_string(),
        expires_at: now + Duration::minutes(10),
        is_active: true,
        created_at: now,
        updated_at: now,
        deleted_at: None,
    };
    fx.store.insert_otp(&otp).await.unwrap();

    fx.clock.advance(Duration::minutes(11));
    let outcome = fx.manager.sweep_expirations(fx.clock.now()).await.unwrap();

    assert_eq!(outcome.otp_deactivated, 1);
    assert!(fx
        .store
        .active_otps_for_user(fx.user.id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_update_settings_detects_stale_version() {
    let fx = fixture().await;

    fx.accounts
        .update_settings(fx.user.id, 1, serde_json::json!({"theme": "dark"}))
        .await
        .unwrap();

    // The first write bumped the version to 2; re-using 1 must fail.
    let result = fx
        .accounts
        .update_settings(fx.user.id, 1, serde_json::json!({"theme": "light"}))
        .await;
    assert!(matches!(result, Err(AppError::ConcurrentModification(_))));

    let result = fx
        .accounts
        .update_settings(Uuid::new_v4(), 1, serde_json::json!({}))
        .await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_soft_delete_user_keeps_tokens() {
    let fx = fixture().await;

    let token = fx
        .manager
        .issue(Some(fx.user.id), fx.service.id, "Orphan", Duration::days(30))
        .await
        .unwrap();

    fx.accounts.soft_delete_user(fx.user.id).await.unwrap();

    let result = fx.accounts.get_user(fx.user.id).await;
    assert!(matches!(result, Err(AppError::NotFound(_))));

    // Tokens survive the owner's soft delete
    let survivor = fx.manager.get(token.id).await.unwrap();
    assert_eq!(survivor.status, TokenStatus::Active);
}

/// Store wrapper that lets a competing renewal land between the
/// manager's read and its conditional write.
struct RacingStore {
    inner: Arc<MemoryStore>,
    raced: AtomicBool,
}

#[async_trait]
impl CredentialStore for RacingStore {
    async fn insert_user(&self, user: &User) -> AppResult<()> {
        self.inner.insert_user(user).await
    }
    async fn get_user(&self, id: Uuid) -> AppResult<Option<User>> {
        self.inner.get_user(id).await
    }
    async fn update_user_if_version(
        &self,
        id: Uuid,
        expected_version: i32,
        patch: UserPatch,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        self.inner
            .update_user_if_version(id, expected_version, patch, now)
            .await
    }
    async fn soft_delete_user(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<bool> {
        self.inner.soft_delete_user(id, now).await
    }
    async fn insert_service(&self, service: &Service) -> AppResult<()> {
        self.inner.insert_service(service).await
    }
    async fn get_service(&self, id: Uuid) -> AppResult<Option<Service>> {
        self.inner.get_service(id).await
    }
    async fn list_services(&self) -> AppResult<Vec<Service>> {
        self.inner.list_services().await
    }
    async fn insert_token(&self, token: &AccessToken) -> AppResult<()> {
        self.inner.insert_token(token).await
    }

    async fn get_token(&self, id: Uuid) -> AppResult<Option<AccessToken>> {
        let token = self.inner.get_token(id).await?;

        // After the caller reads, apply one competing renewal so the
        // caller's version check goes stale.
        if let Some(ref t) = token
            && !self.raced.swap(true, Ordering::SeqCst)
        {
            let patch = TokenPatch {
                status: Some(TokenStatus::Active),
                expires_at: Some(t.expires_at + Duration::days(99)),
                ..Default::default()
            };
            self.inner
                .update_token_if(
                    id,
                    &[TokenStatus::Active, TokenStatus::Expired],
                    Some(t.version),
                    patch,
                    t.expires_at,
                )
                .await?;
        }

        Ok(token)
    }

    async fn update_token_if(
        &self,
        id: Uuid,
        expected_status: &[TokenStatus],
        expected_version: Option<i32>,
        patch: TokenPatch,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        self.inner
            .update_token_if(id, expected_status, expected_version, patch, now)
            .await
    }
    async fn expire_due_tokens(&self, now: DateTime<Utc>) -> AppResult<u64> {
        self.inner.expire_due_tokens(now).await
    }
    async fn find_expired_unnotified(&self, limit: u64) -> AppResult<Vec<AccessToken>> {
        self.inner.find_expired_unnotified(limit).await
    }
    async fn mark_notified(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<bool> {
        self.inner.mark_notified(id, now).await
    }
    async fn list_expiring_page(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
        offset: u64,
        limit: u64,
    ) -> AppResult<Vec<AccessToken>> {
        self.inner.list_expiring_page(from, until, offset, limit).await
    }
    async fn insert_otp(&self, otp: &OtpCode) -> AppResult<()> {
        self.inner.insert_otp(otp).await
    }
    async fn active_otps_for_user(&self, user_id: Uuid) -> AppResult<Vec<OtpCode>> {
        self.inner.active_otps_for_user(user_id).await
    }
    async fn deactivate_otps_for_user(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<u64> {
        self.inner.deactivate_otps_for_user(user_id, now).await
    }
    async fn consume_otp(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<bool> {
        self.inner.consume_otp(id, now).await
    }
    async fn expire_due_otps(&self, now: DateTime<Utc>) -> AppResult<u64> {
        self.inner.expire_due_otps(now).await
    }
}

#[tokio::test]
async fn test_competing_renewals_exactly_one_wins() {
    let inner = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let notifier = Arc::new(RecordingNotifier::new());

    // Set up fixtures against the plain store first
    let accounts = AccountService::new(inner.clone(), clock.clone());
    let service = accounts.create_service("Stripe", "Payments").await.unwrap();
    let plain = LifecycleManager::new(inner.clone(), clock.clone(), notifier.clone());
    let token = plain
        .issue(None, service.id, "Contested", Duration::days(1))
        .await
        .unwrap();

    // The racing manager sees one competing renewal land after its read
    let racing = Arc::new(RacingStore {
        inner: inner.clone(),
        raced: AtomicBool::new(false),
    });
    let manager = LifecycleManager::new(racing, clock.clone(), notifier);

    let result = manager.renew(token.id, Duration::days(2)).await;
    assert!(matches!(result, Err(AppError::ConcurrentModification(_))));

    // The competing renewal's write is intact
    let current = plain.get(token.id).await.unwrap();
    assert_eq!(current.expires_at, token.expires_at + Duration::days(99));
}
