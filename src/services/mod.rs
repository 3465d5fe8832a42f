pub mod auth;
pub mod config_store;
pub mod executor;
pub mod help;
pub mod logger;
pub mod permission;
pub mod rate_limiter;
pub mod response;
pub mod schedule;
