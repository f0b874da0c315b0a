//! sitewatch - uptime monitoring engine
//!
//! Checks a dynamic set of HTTP endpoints on their own intervals, logs only
//! status transitions and alerts once per transition into DOWN.

pub mod config;
pub mod database;
pub mod error;
pub mod monitoring;
pub mod notify;
pub mod pool;
pub mod service;
pub mod validation;

pub use config::Config;
pub use service::Service;
