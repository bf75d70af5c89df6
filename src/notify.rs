//! Notifier seam for expiry alerts.
//!
//! Dispatch is fire-and-forget: the sweep logs failures and keeps going,
//! it never propagates them as lifecycle errors.

use std::sync::Mutex;

use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::AccessToken;

/// Dispatches an alert when a token has expired.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_expired(&self, token: &AccessToken) -> AppResult<()>;
}

/// Notifier that only logs. Stands in until a real delivery channel
/// (email, webhook) is wired up behind this trait.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_expired(&self, token: &AccessToken) -> AppResult<()> {
        info!(
            token_id = %token.id,
            name = %token.name,
            service_id = %token.service_id,
            user_id = ?token.user_id,
            "access token expired"
        );
        Ok(())
    }
}

/// Test double that records every dispatched token id.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Uuid>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids of all tokens notified so far, in dispatch order.
    pub fn sent(&self) -> Vec<Uuid> {
        self.sent.lock().expect("notifier mutex poisoned").clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_expired(&self, token: &AccessToken) -> AppResult<()> {
        self.sent
            .lock()
            .expect("notifier mutex poisoned")
            .push(token.id);
        Ok(())
    }
}
