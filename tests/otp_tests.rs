//! Integration tests for OTP issuance and verification.

use std::sync::Arc;

use chrono::{Duration, Utc};

use acme_creds_lib::clock::{Clock, ManualClock};
use acme_creds_lib::error::AppError;
use acme_creds_lib::services::{AccountService, NewUser, OtpService};
use acme_creds_lib::store::memory::MemoryStore;
use acme_creds_lib::store::CredentialStore;

fn otp_ttl() -> Duration {
    Duration::minutes(10)
}

struct Fixture {
    store: Arc<MemoryStore>,
    clock: Arc<ManualClock>,
    otp: OtpService,
    user_id: uuid::Uuid,
}

async fn fixture() -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(Utc::now()));

    let accounts = AccountService::new(store.clone(), clock.clone());
    let user = accounts
        .register_user(NewUser {
            email: "jane.smith@example.com".to_string(),
            username: "janesmith".to_string(),
            first_name: "Jane".to_string(),
            last_name: "Smith".to_string(),
            password_hash: "hash".to_string(),
            avatar_url: None,
        })
        .await
        .unwrap();

    let otp = OtpService::new(store.clone(), clock.clone(), otp_ttl());

    Fixture {
        store,
        clock,
        otp,
        user_id: user.id,
    }
}

#[tokio::test]
async fn test_otp_round_trip_succeeds_exactly_once() {
    let fx = fixture().await;

    let issued = fx.otp.issue_otp(fx.user_id).await.unwrap();
    assert_eq!(issued.code.len(), 6);
    assert_eq!(issued.expires_at, fx.clock.now() + otp_ttl());

    fx.otp.verify_otp(fx.user_id, &issued.code).await.unwrap();

    // Single-use: the code was consumed, so there is no active code left
    let result = fx.otp.verify_otp(fx.user_id, &issued.code).await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_verify_rejects_wrong_code() {
    let fx = fixture().await;

    let issued = fx.otp.issue_otp(fx.user_id).await.unwrap();
    let wrong = if issued.code == "000000" {
        "000001"
    } else {
        "000000"
    };

    let result = fx.otp.verify_otp(fx.user_id, wrong).await;
    assert!(matches!(result, Err(AppError::InvalidCode)));

    // The mismatch did not consume the real code
    fx.otp.verify_otp(fx.user_id, &issued.code).await.unwrap();
}

#[tokio::test]
async fn test_verify_rejects_expired_code() {
    let fx = fixture().await;

    let issued = fx.otp.issue_otp(fx.user_id).await.unwrap();
    fx.clock.advance(otp_ttl() + Duration::seconds(1));

    let result = fx.otp.verify_otp(fx.user_id, &issued.code).await;
    assert!(matches!(result, Err(AppError::Expired)));
}

#[tokio::test]
async fn test_verify_without_active_code_fails() {
    let fx = fixture().await;

    let result = fx.otp.verify_otp(fx.user_id, "123456").await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_issue_invalidates_previous_codes() {
    let fx = fixture().await;

    let first = fx.otp.issue_otp(fx.user_id).await.unwrap();
    let second = fx.otp.issue_otp(fx.user_id).await.unwrap();

    // Only the fresh code remains active
    let active = fx.store.active_otps_for_user(fx.user_id).await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, second.id);

    if first.code != second.code {
        let result = fx.otp.verify_otp(fx.user_id, &first.code).await;
        assert!(matches!(result, Err(AppError::InvalidCode)));
    }

    fx.otp.verify_otp(fx.user_id, &second.code).await.unwrap();
}

#[tokio::test]
async fn test_issue_otp_rejects_unknown_user() {
    let fx = fixture().await;

    let result = fx.otp.issue_otp(uuid::Uuid::new_v4()).await;
    assert!(matches!(result, Err(AppError::InvalidUser(_))));
}
