//! HTTP route handlers.
//!
//! - `faces`: register and recognize
//! - `health`: liveness probe

pub mod faces;
pub mod health;
