//! Tenant lookup seam between ingestion and the website store.

use async_trait::async_trait;
use serde::Serialize;

/// The slice of a website record the ingestion path needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebsiteRef {
    pub id: String,
    pub tracking_id: String,
}

/// Read-only view over websites.
#[async_trait]
pub trait TenantRegistry: Send + Sync + 'static {
    async fn resolve_tracking_id(&self, tracking_id: &str) -> anyhow::Result<Option<WebsiteRef>>;

    async fn website_exists(&self, website_id: &str) -> anyhow::Result<bool>;
}
