//! Domain models for the credential server.

pub mod otp;
pub mod service;
pub mod token;
pub mod user;

// Re-export commonly used types
pub use otp::{OtpCode, OTP_CODE_LENGTH};
pub use service::Service;
pub use token::{AccessToken, TokenStatus};
pub use user::User;
