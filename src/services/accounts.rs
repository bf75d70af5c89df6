//! User registration and service catalog management.
//!
//! Mutating user updates go through the version-checked store write so
//! concurrent editors surface as `ConcurrentModification` instead of
//! silently losing updates.

use std::sync::Arc;

use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{AppError, AppResult};
use crate::models::{Service, User};
use crate::store::{CredentialStore, UserPatch};

/// Parameters for registering a new user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
    pub avatar_url: Option<String>,
}

/// Account and service catalog operations.
#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn CredentialStore>,
    clock: Arc<dyn Clock>,
}

impl AccountService {
    pub fn new(store: Arc<dyn CredentialStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Register a new user. Email and username must be unique.
    pub async fn register_user(&self, new_user: NewUser) -> AppResult<User> {
        let now = self.clock.now();
        let user = User {
            id: Uuid::new_v4(),
            email: new_user.email,
            username: new_user.username,
            first_name: new_user.first_name,
            last_name: new_user.last_name,
            password_hash: new_user.password_hash,
            avatar_url: new_user.avatar_url,
            is_active: true,
            last_login_at: None,
            settings: serde_json::json!({}),
            version: 1,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        self.store.insert_user(&user).await?;
        Ok(user)
    }

    /// Record a successful login.
    pub async fn record_login(&self, user_id: Uuid) -> AppResult<()> {
        let user = self.get_user(user_id).await?;
        let now = self.clock.now();
        let patch = UserPatch {
            last_login_at: Some(now),
            ..Default::default()
        };

        if !self
            .store
            .update_user_if_version(user_id, user.version, patch, now)
            .await?
        {
            return Err(AppError::ConcurrentModification(format!(
                "user {}",
                user_id
            )));
        }

        Ok(())
    }

    /// Replace a user's settings blob, checked against the version the
    /// caller read.
    pub async fn update_settings(
        &self,
        user_id: Uuid,
        expected_version: i32,
        settings: serde_json::Value,
    ) -> AppResult<()> {
        let now = self.clock.now();
        let patch = UserPatch {
            settings: Some(settings),
            ..Default::default()
        };

        if !self
            .store
            .update_user_if_version(user_id, expected_version, patch, now)
            .await?
        {
            // Distinguish a missing user from a stale version.
            self.get_user(user_id).await?;
            return Err(AppError::ConcurrentModification(format!(
                "user {}",
                user_id
            )));
        }

        Ok(())
    }

    /// Soft-delete a user. Their OTP codes are removed with them; their
    /// tokens stay behind as service-level history.
    pub async fn soft_delete_user(&self, user_id: Uuid) -> AppResult<()> {
        let now = self.clock.now();
        if !self.store.soft_delete_user(user_id, now).await? {
            return Err(AppError::NotFound(format!("User {}", user_id)));
        }
        Ok(())
    }

    /// Fetch a user by id.
    pub async fn get_user(&self, user_id: Uuid) -> AppResult<User> {
        self.store
            .get_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {}", user_id)))
    }

    /// Create a new service. Immutable once created.
    pub async fn create_service(&self, name: &str, description: &str) -> AppResult<Service> {
        let service = Service {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: description.to_string(),
            created_at: self.clock.now(),
        };

        self.store.insert_service(&service).await?;
        Ok(service)
    }

    /// List all services, ordered by name.
    pub async fn list_services(&self) -> AppResult<Vec<Service>> {
        self.store.list_services().await
    }
}
