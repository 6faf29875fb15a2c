use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::error;

use tally_core::analytics::AnalyticsBackend;
use tally_core::config::Config;
use tally_core::ingest::IngestPipeline;
use tally_core::rate_limit::RateLimiter;
use tally_core::registry::{TenantRegistry, WebsiteRef};
use tally_duckdb::DuckDbBackend;

use crate::error::AppError;

/// Read-through cache in front of the website store.
///
/// Entries are added on the first successful lookup and dropped by
/// [`CachedRegistry::evict_website`]. Misses are not cached, so a website
/// created at runtime is picked up on its first beacon.
pub struct CachedRegistry {
    inner: Arc<dyn TenantRegistry>,
    by_tracking_id: RwLock<HashMap<String, WebsiteRef>>,
    known_websites: RwLock<HashSet<String>>,
}

impl CachedRegistry {
    pub fn new(inner: Arc<dyn TenantRegistry>) -> Self {
        Self {
            inner,
            by_tracking_id: RwLock::new(HashMap::new()),
            known_websites: RwLock::new(HashSet::new()),
        }
    }

    pub async fn evict_website(&self, website_id: &str) {
        self.by_tracking_id
            .write()
            .await
            .retain(|_, website| website.id != website_id);
        self.known_websites.write().await.remove(website_id);
    }
}

#[async_trait]
impl TenantRegistry for CachedRegistry {
    async fn resolve_tracking_id(&self, tracking_id: &str) -> anyhow::Result<Option<WebsiteRef>> {
        if let Some(hit) = self.by_tracking_id.read().await.get(tracking_id) {
            return Ok(Some(hit.clone()));
        }

        let resolved = self.inner.resolve_tracking_id(tracking_id).await?;
        if let Some(website) = &resolved {
            self.by_tracking_id
                .write()
                .await
                .insert(tracking_id.to_string(), website.clone());
        }
        Ok(resolved)
    }

    async fn website_exists(&self, website_id: &str) -> anyhow::Result<bool> {
        if self.known_websites.read().await.contains(website_id) {
            return Ok(true);
        }

        let exists = self.inner.website_exists(website_id).await?;
        if exists {
            self.known_websites
                .write()
                .await
                .insert(website_id.to_string());
        }
        Ok(exists)
    }
}

/// Shared application state injected into every Axum handler via
/// [`axum::extract::State`].
pub struct AppState {
    /// The DuckDB backend. Internally uses `Arc<tokio::sync::Mutex<Connection>>`.
    pub db: Arc<DuckDbBackend>,

    /// Read side of the same store, behind the backend trait.
    pub analytics: Arc<dyn AnalyticsBackend>,

    pub registry: Arc<CachedRegistry>,

    /// Parse → rate limit → tenant lookup → validate → reconcile → commit.
    pub pipeline: IngestPipeline,

    /// Parsed configuration, loaded once at startup from environment variables.
    pub config: Arc<Config>,
}

impl AppState {
    /// Construct a new `AppState` wrapping the given backend and config.
    pub fn new(db: DuckDbBackend, config: Config) -> Self {
        let limiter = if config.rate_limit_disable {
            RateLimiter::disabled()
        } else {
            RateLimiter::in_memory(config.rate_limit_policy())
        };
        Self::with_limiter(db, config, limiter)
    }

    /// Like [`AppState::new`] with a caller-supplied limiter (e.g. a shared store).
    pub fn with_limiter(db: DuckDbBackend, config: Config, limiter: RateLimiter) -> Self {
        let db = Arc::new(db);
        let registry = Arc::new(CachedRegistry::new(db.clone()));
        let pipeline = IngestPipeline::new(
            registry.clone(),
            db.clone(),
            limiter,
            config.rate_limit_key,
            config.validation_limits(),
        );
        Self {
            analytics: db.clone(),
            db,
            registry,
            pipeline,
            config: Arc::new(config),
        }
    }

    /// `Ok(())` when the website exists, `NotFound` otherwise.
    pub async fn require_website(&self, website_id: &str) -> Result<(), AppError> {
        match self.registry.website_exists(website_id).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(AppError::NotFound("Website not found".to_string())),
            Err(e) => {
                error!(website_id, error = %e, "website_exists DB lookup failed");
                Err(AppError::Internal(e))
            }
        }
    }

    /// Delete a website with all of its events and sessions, then drop it from the cache.
    pub async fn delete_website(&self, website_id: &str) -> anyhow::Result<bool> {
        let deleted = self.db.delete_website(website_id).await?;
        self.registry.evict_website(website_id).await;
        Ok(deleted)
    }
}
