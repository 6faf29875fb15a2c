//! The ingestion pipeline: parse, admit, resolve, validate, reconcile, commit.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use serde::Serialize;

use crate::error::IngestError;
use crate::event::Event;
use crate::rate_limit::{RateLimitKey, RateLimiter};
use crate::registry::TenantRegistry;
use crate::session::{reconcile, SessionUpsert};
use crate::validate::{parse_batch, validate_batch, RequestContext, ValidationLimits};

/// Write side of the store.
#[async_trait]
pub trait EventStore: Send + Sync + 'static {
    /// Insert all events in one transaction.
    async fn insert_events(&self, events: &[Event]) -> anyhow::Result<()>;

    /// Atomic insert-or-merge keyed by `(website_id, id)`.
    async fn upsert_session(&self, upsert: &SessionUpsert) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub website_id: String,
    pub events: usize,
    pub sessions: usize,
}

/// Session upserts run concurrently, then the events go in as one batch.
pub async fn commit(
    store: &dyn EventStore,
    events: &[Event],
    sessions: &[SessionUpsert],
) -> Result<(), IngestError> {
    try_join_all(sessions.iter().map(|upsert| store.upsert_session(upsert)))
        .await
        .map_err(IngestError::WriteFailure)?;
    store
        .insert_events(events)
        .await
        .map_err(IngestError::WriteFailure)
}

pub struct IngestPipeline {
    registry: Arc<dyn TenantRegistry>,
    store: Arc<dyn EventStore>,
    limiter: RateLimiter,
    key: RateLimitKey,
    limits: ValidationLimits,
}

impl IngestPipeline {
    pub fn new(
        registry: Arc<dyn TenantRegistry>,
        store: Arc<dyn EventStore>,
        limiter: RateLimiter,
        key: RateLimitKey,
        limits: ValidationLimits,
    ) -> Self {
        Self {
            registry,
            store,
            limiter,
            key,
            limits,
        }
    }

    pub fn limits(&self) -> &ValidationLimits {
        &self.limits
    }

    /// Run one request body through the whole pipeline. Nothing is written
    /// unless every event in the batch validates.
    pub async fn ingest(
        &self,
        body: &[u8],
        ctx: &RequestContext,
    ) -> Result<IngestSummary, IngestError> {
        let batch = parse_batch(body, &self.limits)?;

        let bucket = self
            .key
            .bucket_for(&batch.tracking_id, ctx.client_ip.as_deref());
        if !self.limiter.admit_at(&bucket, ctx.received_at).await {
            return Err(IngestError::RateLimited);
        }

        let website = self
            .registry
            .resolve_tracking_id(&batch.tracking_id)
            .await
            .map_err(IngestError::WriteFailure)?
            .ok_or(IngestError::UnknownTenant)?;

        let events = validate_batch(batch, &website, ctx, &self.limits)?;
        let sessions: Vec<SessionUpsert> = reconcile(&events).into_values().collect();

        commit(self.store.as_ref(), &events, &sessions).await?;

        Ok(IngestSummary {
            website_id: website.id,
            events: events.len(),
            sessions: sessions.len(),
        })
    }
}
