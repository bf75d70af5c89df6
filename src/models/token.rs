//! Access token model and status state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of an access token.
///
/// `Active` is the initial state. `Expired` can be superseded by a renewal;
/// `Revoked` is permanently terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TokenStatus {
    #[default]
    Active,
    Expired,
    Revoked,
}

impl TokenStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Expired => "expired",
            Self::Revoked => "revoked",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "expired" => Some(Self::Expired),
            "revoked" => Some(Self::Revoked),
            _ => None,
        }
    }

    /// Whether a renewal is allowed from this status.
    pub fn is_renewable(&self) -> bool {
        matches!(self, Self::Active | Self::Expired)
    }
}

impl std::fmt::Display for TokenStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Access token stored in the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessToken {
    /// Unique identifier (UUID)
    pub id: Uuid,
    /// Opaque secret value; regenerated only by renewal
    pub token: String,
    /// Human-readable label (e.g., "GitHub Token - 2026-08-01")
    pub name: String,
    /// Owning user; None for service-level tokens
    pub user_id: Option<Uuid>,
    /// Service the token is scoped to
    pub service_id: Uuid,
    /// Lifecycle status
    pub status: TokenStatus,
    /// True once an expiry notification has been dispatched
    pub notified: bool,
    /// Optimistic concurrency counter; bumped on every mutating write
    pub version: i32,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Expiration timestamp; always after created_at
    pub expires_at: DateTime<Utc>,
    /// Timestamp of the most recent renewal
    pub renewed_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    /// Check whether the token's expiry horizon has passed.
    ///
    /// Expiry exactly at `now` counts as expired (closed interval on the
    /// expired side).
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Tokens with no owning user are service-level tokens.
    pub fn is_service_level(&self) -> bool {
        self.user_id.is_none()
    }
}
