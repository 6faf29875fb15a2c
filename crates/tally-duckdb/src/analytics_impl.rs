use async_trait::async_trait;
use chrono::{DateTime, Utc};

use tally_core::analytics::{
    AnalyticsBackend, AnalyticsFilter, BreakdownResult, Dimension, DimensionFilters,
    FilterOptions, Granularity, OverviewMetrics, TimeseriesResult,
};
use tally_core::event::Event;
use tally_core::ingest::EventStore;
use tally_core::registry::{TenantRegistry, WebsiteRef};
use tally_core::session::SessionUpsert;

use crate::DuckDbBackend;

#[async_trait]
impl EventStore for DuckDbBackend {
    async fn insert_events(&self, events: &[Event]) -> anyhow::Result<()> {
        DuckDbBackend::insert_events(self, events).await
    }

    async fn upsert_session(&self, upsert: &SessionUpsert) -> anyhow::Result<()> {
        crate::session::upsert_session_inner(self, upsert).await
    }
}

#[async_trait]
impl TenantRegistry for DuckDbBackend {
    async fn resolve_tracking_id(&self, tracking_id: &str) -> anyhow::Result<Option<WebsiteRef>> {
        self.find_by_tracking_id(tracking_id).await
    }

    async fn website_exists(&self, website_id: &str) -> anyhow::Result<bool> {
        DuckDbBackend::website_exists(self, website_id).await
    }
}

#[async_trait]
impl AnalyticsBackend for DuckDbBackend {
    async fn get_overview(
        &self,
        website_id: &str,
        filter: &AnalyticsFilter,
        active_minutes: u32,
        now: DateTime<Utc>,
    ) -> anyhow::Result<OverviewMetrics> {
        crate::queries::overview::get_overview_inner(self, website_id, filter, active_minutes, now)
            .await
    }

    async fn get_active_users(
        &self,
        website_id: &str,
        filters: &DimensionFilters,
        minutes: u32,
        now: DateTime<Utc>,
    ) -> anyhow::Result<i64> {
        Ok(self
            .active_signals(website_id, filters, minutes, now)
            .await?
            .active_users())
    }

    async fn get_timeseries(
        &self,
        website_id: &str,
        filter: &AnalyticsFilter,
        granularity: Granularity,
    ) -> anyhow::Result<TimeseriesResult> {
        crate::queries::timeseries::get_timeseries_inner(self, website_id, filter, granularity)
            .await
    }

    async fn get_breakdown(
        &self,
        website_id: &str,
        dimension: Dimension,
        filter: &AnalyticsFilter,
        limit: usize,
    ) -> anyhow::Result<BreakdownResult> {
        crate::queries::breakdowns::get_breakdown_inner(self, website_id, dimension, filter, limit)
            .await
    }

    async fn get_filter_options(
        &self,
        website_id: &str,
        filter: &AnalyticsFilter,
    ) -> anyhow::Result<FilterOptions> {
        crate::queries::breakdowns::get_filter_options_inner(self, website_id, filter).await
    }
}
