//! User model: identity anchor for tokens and OTP codes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// User stored in the database.
///
/// Users are soft-deleted only; `version` increments on every mutating
/// update and backs the optimistic concurrency checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    /// Hash of the user's password; never the plaintext
    pub password_hash: String,
    pub avatar_url: Option<String>,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    /// Opaque settings blob
    pub settings: serde_json::Value,
    /// Optimistic concurrency counter, starts at 1
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl User {
    /// Check if the user has been soft-deleted.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}
