//! SeaORM entity definitions for PostgreSQL database.

pub mod access_token;
pub mod otp_code;
pub mod service;
pub mod user;
