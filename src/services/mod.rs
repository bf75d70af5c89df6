//! Business logic services.

pub mod accounts;
pub mod otp;
pub mod sweeper;
pub mod tokens;

pub use accounts::{AccountService, NewUser};
pub use otp::OtpService;
pub use sweeper::{start_sweeper_task, SweeperConfig};
pub use tokens::{LifecycleManager, SweepOutcome};
