//! Acme Credential Server library.
//!
//! Core functionality for the credential lifecycle service: token
//! issuance, expiry sweeps, renewal, revocation and OTP verification,
//! behind pluggable store/clock/notifier seams.

pub mod clock;
pub mod config;
pub mod entity;
pub mod error;
pub mod migration;
pub mod models;
pub mod notify;
pub mod services;
pub mod store;
