use chrono::Duration;

use crate::analytics::{clamp_active_minutes, DEFAULT_ACTIVE_MINUTES};
use crate::rate_limit::{RateLimitKey, RateLimitPolicy};
use crate::validate::ValidationLimits;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub data_dir: String,
    /// DuckDB `memory_limit`, e.g. "1GB".
    pub duckdb_memory_limit: String,
    pub max_body_bytes: usize,
    pub max_batch_events: usize,
    pub rate_limit_key: RateLimitKey,
    pub rate_limit_max: u32,
    pub rate_limit_window_secs: u64,
    pub rate_limit_prune_at: usize,
    pub rate_limit_disable: bool,
    pub active_minutes: u32,
    /// When set, a website with this tracking id is created on startup.
    pub seed_tracking_id: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            data_dir: "./data".to_string(),
            duckdb_memory_limit: "1GB".to_string(),
            max_body_bytes: 8 * 1024,
            max_batch_events: 25,
            rate_limit_key: RateLimitKey::TrackingId,
            rate_limit_max: RateLimitKey::TrackingId.default_limit(),
            rate_limit_window_secs: 60,
            rate_limit_prune_at: 1000,
            rate_limit_disable: false,
            active_minutes: DEFAULT_ACTIVE_MINUTES,
            seed_tracking_id: None,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let defaults = Self::default();
        let rate_limit_key = std::env::var("TALLY_RATE_LIMIT_KEY")
            .map(|v| RateLimitKey::parse(&v))
            .unwrap_or(defaults.rate_limit_key);

        Ok(Self {
            port: std::env::var("TALLY_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|e| format!("invalid port: {e}"))?,
            data_dir: std::env::var("TALLY_DATA_DIR").unwrap_or(defaults.data_dir),
            duckdb_memory_limit: std::env::var("TALLY_DUCKDB_MEMORY")
                .unwrap_or(defaults.duckdb_memory_limit),
            max_body_bytes: env_parse("TALLY_MAX_BODY_BYTES", defaults.max_body_bytes),
            max_batch_events: env_parse("TALLY_MAX_BATCH_EVENTS", defaults.max_batch_events)
                .max(1),
            rate_limit_key,
            rate_limit_max: env_parse("TALLY_RATE_LIMIT_MAX", rate_limit_key.default_limit())
                .max(1),
            rate_limit_window_secs: env_parse(
                "TALLY_RATE_LIMIT_WINDOW_SECS",
                defaults.rate_limit_window_secs,
            )
            .max(1),
            rate_limit_prune_at: env_parse("TALLY_RATE_LIMIT_PRUNE_AT", defaults.rate_limit_prune_at),
            rate_limit_disable: std::env::var("TALLY_RATE_LIMIT_DISABLE")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            active_minutes: clamp_active_minutes(env_parse(
                "TALLY_ACTIVE_MINUTES",
                defaults.active_minutes,
            )),
            seed_tracking_id: std::env::var("TALLY_SEED_TRACKING_ID")
                .ok()
                .filter(|v| !v.trim().is_empty()),
        })
    }

    pub fn rate_limit_policy(&self) -> RateLimitPolicy {
        RateLimitPolicy {
            limit: self.rate_limit_max,
            window: Duration::seconds(i64::try_from(self.rate_limit_window_secs).unwrap_or(60)),
            prune_threshold: self.rate_limit_prune_at,
        }
    }

    pub fn validation_limits(&self) -> ValidationLimits {
        ValidationLimits {
            max_body_bytes: self.max_body_bytes,
            max_batch_events: self.max_batch_events,
            ..ValidationLimits::default()
        }
    }
}
