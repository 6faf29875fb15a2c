pub mod analytics;
pub mod config;
pub mod error;
pub mod event;
pub mod ingest;
pub mod rate_limit;
pub mod registry;
pub mod session;
pub mod validate;
