//! Background expiry sweeper.

use std::time::Duration;

use tokio::time::interval;
use tracing::{error, info};

use super::tokens::{LifecycleManager, SweepOutcome};

/// Configuration for the sweeper task.
#[derive(Clone)]
pub struct SweeperConfig {
    /// How often to run a sweep (in seconds)
    pub interval_secs: u64,
}

/// Start the expiry sweep background task.
///
/// Spawns a tokio task that periodically reconciles token status against
/// the clock and dispatches pending expiry notifications. The sweep is
/// idempotent per row, so a failed cycle is simply retried on the next
/// tick.
pub fn start_sweeper_task(manager: LifecycleManager, config: SweeperConfig) {
    tokio::spawn(async move {
        info!(
            "Starting expiry sweeper (interval: {} seconds)",
            config.interval_secs
        );

        let mut ticker = interval(Duration::from_secs(config.interval_secs));

        loop {
            ticker.tick().await;

            match manager.sweep_expirations(manager.now()).await {
                Ok(outcome) => {
                    if outcome != SweepOutcome::default() {
                        info!(
                            "Sweep: {} expired, {} notified, {} skipped, {} otp codes deactivated",
                            outcome.expired,
                            outcome.notified,
                            outcome.skipped,
                            outcome.otp_deactivated
                        );
                    }
                }
                Err(e) => error!("Expiry sweep failed: {}", e),
            }
        }
    });
}
