//! In-memory `CredentialStore` used by tests and the demo seeder.
//!
//! A single mutex over plain maps; conditional-update semantics match the
//! Postgres implementation exactly, including the OTP cascade on user
//! soft delete.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{AccessToken, OtpCode, Service, TokenStatus, User};

use super::{CredentialStore, TokenPatch, UserPatch};

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, User>,
    services: HashMap<Uuid, Service>,
    tokens: HashMap<Uuid, AccessToken>,
    otps: HashMap<Uuid, OtpCode>,
}

/// Process-local store backed by `HashMap`s.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("store mutex poisoned")
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn insert_user(&self, user: &User) -> AppResult<()> {
        let mut inner = self.lock();
        if inner.users.values().any(|u| u.email == user.email) {
            return Err(AppError::InvalidInput(format!(
                "email already registered: {}",
                user.email
            )));
        }
        if inner.users.values().any(|u| u.username == user.username) {
            return Err(AppError::InvalidInput(format!(
                "username already taken: {}",
                user.username
            )));
        }
        inner.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get_user(&self, id: Uuid) -> AppResult<Option<User>> {
        let inner = self.lock();
        Ok(inner
            .users
            .get(&id)
            .filter(|u| u.deleted_at.is_none())
            .cloned())
    }

    async fn update_user_if_version(
        &self,
        id: Uuid,
        expected_version: i32,
        patch: UserPatch,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut inner = self.lock();
        let Some(user) = inner.users.get_mut(&id) else {
            return Ok(false);
        };
        if user.deleted_at.is_some() || user.version != expected_version {
            return Ok(false);
        }
        if let Some(last_login_at) = patch.last_login_at {
            user.last_login_at = Some(last_login_at);
        }
        if let Some(settings) = patch.settings {
            user.settings = settings;
        }
        user.version += 1;
        user.updated_at = now;
        Ok(true)
    }

    async fn soft_delete_user(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<bool> {
        let mut inner = self.lock();
        let Some(user) = inner.users.get_mut(&id) else {
            return Ok(false);
        };
        if user.deleted_at.is_some() {
            return Ok(false);
        }
        user.deleted_at = Some(now);
        user.is_active = false;
        user.version += 1;
        user.updated_at = now;
        // Cascade: otp_codes.user_id references users(id) ON DELETE CASCADE
        inner.otps.retain(|_, otp| otp.user_id != id);
        Ok(true)
    }

    async fn insert_service(&self, service: &Service) -> AppResult<()> {
        let mut inner = self.lock();
        if inner.services.values().any(|s| s.name == service.name) {
            return Err(AppError::InvalidInput(format!(
                "service name already exists: {}",
                service.name
            )));
        }
        inner.services.insert(service.id, service.clone());
        Ok(())
    }

    async fn get_service(&self, id: Uuid) -> AppResult<Option<Service>> {
        Ok(self.lock().services.get(&id).cloned())
    }

    async fn list_services(&self) -> AppResult<Vec<Service>> {
        let mut services: Vec<Service> = self.lock().services.values().cloned().collect();
        services.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(services)
    }

    async fn insert_token(&self, token: &AccessToken) -> AppResult<()> {
        self.lock().tokens.insert(token.id, token.clone());
        Ok(())
    }

    async fn get_token(&self, id: Uuid) -> AppResult<Option<AccessToken>> {
        Ok(self.lock().tokens.get(&id).cloned())
    }

    async fn update_token_if(
        &self,
        id: Uuid,
        expected_status: &[TokenStatus],
        expected_version: Option<i32>,
        patch: TokenPatch,
        _now: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut inner = self.lock();
        let Some(token) = inner.tokens.get_mut(&id) else {
            return Ok(false);
        };
        if !expected_status.contains(&token.status) {
            return Ok(false);
        }
        if let Some(expected) = expected_version
            && token.version != expected
        {
            return Ok(false);
        }
        if let Some(status) = patch.status {
            token.status = status;
        }
        if let Some(secret) = patch.token {
            token.token = secret;
        }
        if let Some(expires_at) = patch.expires_at {
            token.expires_at = expires_at;
        }
        if let Some(renewed_at) = patch.renewed_at {
            token.renewed_at = Some(renewed_at);
        }
        if let Some(notified) = patch.notified {
            token.notified = notified;
        }
        token.version += 1;
        Ok(true)
    }

    async fn expire_due_tokens(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let mut inner = self.lock();
        let mut changed = 0;
        for token in inner.tokens.values_mut() {
            if token.status == TokenStatus::Active && token.expires_at <= now {
                token.status = TokenStatus::Expired;
                token.version += 1;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn find_expired_unnotified(&self, limit: u64) -> AppResult<Vec<AccessToken>> {
        let inner = self.lock();
        let mut tokens: Vec<AccessToken> = inner
            .tokens
            .values()
            .filter(|t| t.status == TokenStatus::Expired && !t.notified)
            .cloned()
            .collect();
        tokens.sort_by_key(|t| (t.expires_at, t.id));
        tokens.truncate(limit as usize);
        Ok(tokens)
    }

    async fn mark_notified(&self, id: Uuid, _now: DateTime<Utc>) -> AppResult<bool> {
        let mut inner = self.lock();
        let Some(token) = inner.tokens.get_mut(&id) else {
            return Ok(false);
        };
        if token.status != TokenStatus::Expired || token.notified {
            return Ok(false);
        }
        token.notified = true;
        token.version += 1;
        Ok(true)
    }

    async fn list_expiring_page(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
        offset: u64,
        limit: u64,
    ) -> AppResult<Vec<AccessToken>> {
        let inner = self.lock();
        let mut tokens: Vec<AccessToken> = inner
            .tokens
            .values()
            .filter(|t| {
                t.status == TokenStatus::Active && t.expires_at >= from && t.expires_at <= until
            })
            .cloned()
            .collect();
        tokens.sort_by_key(|t| (t.expires_at, t.id));
        Ok(tokens
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn insert_otp(&self, otp: &OtpCode) -> AppResult<()> {
        self.lock().otps.insert(otp.id, otp.clone());
        Ok(())
    }

    async fn active_otps_for_user(&self, user_id: Uuid) -> AppResult<Vec<OtpCode>> {
        let inner = self.lock();
        let mut codes: Vec<OtpCode> = inner
            .otps
            .values()
            .filter(|o| o.user_id == user_id && o.is_active && o.deleted_at.is_none())
            .cloned()
            .collect();
        codes.sort_by_key(|o| std::cmp::Reverse(o.created_at));
        Ok(codes)
    }

    async fn deactivate_otps_for_user(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<u64> {
        let mut inner = self.lock();
        let mut changed = 0;
        for otp in inner.otps.values_mut() {
            if otp.user_id == user_id && otp.is_active && otp.deleted_at.is_none() {
                otp.is_active = false;
                otp.updated_at = now;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn consume_otp(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<bool> {
        let mut inner = self.lock();
        let Some(otp) = inner.otps.get_mut(&id) else {
            return Ok(false);
        };
        if !otp.is_active || otp.deleted_at.is_some() {
            return Ok(false);
        }
        otp.is_active = false;
        otp.updated_at = now;
        Ok(true)
    }

    async fn expire_due_otps(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let mut inner = self.lock();
        let mut changed = 0;
        for otp in inner.otps.values_mut() {
            if otp.is_active && otp.deleted_at.is_none() && otp.expires_at <= now {
                otp.is_active = false;
                otp.updated_at = now;
                changed += 1;
            }
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user(email: &str, username: &str) -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            username: username.to_string(),
            first_name: "Test".to_string(),
            last_name: "User".to_string(),
            password_hash: "x".to_string(),
            avatar_url: None,
            is_active: true,
            last_login_at: None,
            settings: serde_json::json!({}),
            version: 1,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[tokio::test]
    async fn test_insert_user_rejects_duplicate_email() {
        let store = MemoryStore::new();
        store
            .insert_user(&sample_user("a@example.com", "a"))
            .await
            .unwrap();

        let result = store.insert_user(&sample_user("a@example.com", "b")).await;
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_update_user_stale_version_fails() {
        let store = MemoryStore::new();
        let user = sample_user("a@example.com", "a");
        store.insert_user(&user).await.unwrap();

        let now = Utc::now();
        let written = store
            .update_user_if_version(user.id, 1, UserPatch::default(), now)
            .await
            .unwrap();
        assert!(written);

        // Version is now 2; the stale check must fail.
        let written = store
            .update_user_if_version(user.id, 1, UserPatch::default(), now)
            .await
            .unwrap();
        assert!(!written);
    }

    #[tokio::test]
    async fn test_soft_delete_cascades_otp_codes() {
        let store = MemoryStore::new();
        let user = sample_user("a@example.com", "a");
        store.insert_user(&user).await.unwrap();

        let now = Utc::now();
        let otp = OtpCode {
            id: Uuid::new_v4(),
            user_id: user.id,
            code: "123456".to_string(),
            expires_at: now + chrono::Duration::minutes(10),
            is_active: true,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        store.insert_otp(&otp).await.unwrap();

        assert!(store.soft_delete_user(user.id, now).await.unwrap());
        assert!(store.get_user(user.id).await.unwrap().is_none());
        assert!(store.active_otps_for_user(user.id).await.unwrap().is_empty());
    }
}
