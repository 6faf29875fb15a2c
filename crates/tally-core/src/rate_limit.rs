//! Fixed-window admission control for the ingestion path.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitKey {
    TrackingId,
    /// SHA-256 of the client IP, hex-encoded.
    ClientIp,
}

impl RateLimitKey {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "ip" | "client_ip" => Self::ClientIp,
            _ => Self::TrackingId,
        }
    }

    pub fn default_limit(self) -> u32 {
        match self {
            Self::TrackingId => 120,
            Self::ClientIp => 60,
        }
    }

    /// Bucket key for one request.
    pub fn bucket_for(self, tracking_id: &str, client_ip: Option<&str>) -> String {
        match self {
            Self::TrackingId => tracking_id.to_string(),
            Self::ClientIp => hash_client_ip(client_ip.unwrap_or("unknown")),
        }
    }
}

pub fn hash_client_ip(ip: &str) -> String {
    hex::encode(Sha256::digest(ip.as_bytes()))
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitPolicy {
    pub limit: u32,
    pub window: Duration,
    /// Table size at which expired buckets are swept during a hit.
    pub prune_threshold: usize,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            limit: 120,
            window: Duration::seconds(60),
            prune_threshold: 1000,
        }
    }
}

/// Bucket storage. `hit` must count and decide atomically per key.
#[async_trait]
pub trait RateLimitStore: Send + Sync + 'static {
    async fn hit(&self, key: &str, now: DateTime<Utc>, policy: &RateLimitPolicy)
        -> anyhow::Result<bool>;
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    count: u32,
    reset_at: DateTime<Utc>,
}

/// Process-local bucket table behind a single async mutex.
#[derive(Debug, Default)]
pub struct InMemoryRateLimitStore {
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl InMemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.buckets.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    async fn hit(
        &self,
        key: &str,
        now: DateTime<Utc>,
        policy: &RateLimitPolicy,
    ) -> anyhow::Result<bool> {
        let mut buckets = self.buckets.lock().await;

        if buckets.len() >= policy.prune_threshold {
            buckets.retain(|_, bucket| bucket.reset_at > now);
        }

        match buckets.get_mut(key) {
            Some(bucket) if now < bucket.reset_at => {
                if bucket.count >= policy.limit {
                    return Ok(false);
                }
                bucket.count += 1;
                Ok(true)
            }
            _ => {
                buckets.insert(
                    key.to_string(),
                    Bucket {
                        count: 1,
                        reset_at: now + policy.window,
                    },
                );
                Ok(true)
            }
        }
    }
}

#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    policy: RateLimitPolicy,
    enabled: bool,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>, policy: RateLimitPolicy) -> Self {
        Self {
            store,
            policy,
            enabled: true,
        }
    }

    pub fn in_memory(policy: RateLimitPolicy) -> Self {
        Self::new(Arc::new(InMemoryRateLimitStore::new()), policy)
    }

    /// Admits everything.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::in_memory(RateLimitPolicy::default())
        }
    }

    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    pub async fn admit(&self, key: &str) -> bool {
        self.admit_at(key, Utc::now()).await
    }

    /// A failing store admits the request.
    pub async fn admit_at(&self, key: &str, now: DateTime<Utc>) -> bool {
        if !self.enabled {
            return true;
        }
        match self.store.hit(key, now, &self.policy).await {
            Ok(admitted) => admitted,
            Err(e) => {
                tracing::warn!(error = %e, "rate limit store failed; admitting request");
                true
            }
        }
    }
}
