//! Analytics backend abstraction.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::DeviceType;
use crate::validate::normalize_country;

pub const DEFAULT_ACTIVE_MINUTES: u32 = 5;
pub const MAX_ACTIVE_MINUTES: u32 = 30;
pub const DEFAULT_BREAKDOWN_LIMIT: usize = 12;
pub const MAX_BREAKDOWN_LIMIT: usize = 100;
pub const DEFAULT_RANGE_DAYS: i64 = 30;
pub const MAX_RANGE_DAYS: i64 = 90;

/// Dimension filters shared by every query, including active users.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DimensionFilters {
    pub device: Option<DeviceType>,
    pub browser: Option<String>,
    pub country: Option<String>,
}

impl DimensionFilters {
    /// Normalize raw query values. Invalid values mean "no filter".
    pub fn from_raw(device: Option<&str>, browser: Option<&str>, country: Option<&str>) -> Self {
        Self {
            device: normalize_device_filter(device),
            browser: normalize_browser_filter(browser),
            country: country.and_then(normalize_country),
        }
    }

    /// The same filters minus the one on `dimension`.
    pub fn without(&self, dimension: Dimension) -> Self {
        let mut next = self.clone();
        match dimension {
            Dimension::Device => next.device = None,
            Dimension::Browser => next.browser = None,
            Dimension::Country => next.country = None,
            Dimension::Os | Dimension::Page | Dimension::Referrer => {}
        }
        next
    }
}

/// Time range plus dimension filters for one dashboard query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyticsFilter {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub dimensions: DimensionFilters,
}

impl AnalyticsFilter {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            from,
            to,
            dimensions: DimensionFilters::default(),
        }
    }

    pub fn without(&self, dimension: Dimension) -> Self {
        Self {
            dimensions: self.dimensions.without(dimension),
            ..self.clone()
        }
    }
}

pub fn normalize_device_filter(raw: Option<&str>) -> Option<DeviceType> {
    raw.and_then(DeviceType::parse_known)
}

/// Browser names are 1..=100 chars of `[\w .+()/-]`.
pub fn normalize_browser_filter(raw: Option<&str>) -> Option<String> {
    let value = raw?.trim();
    let allowed = |c: char| {
        c.is_ascii_alphanumeric() || matches!(c, '_' | ' ' | '.' | '+' | '(' | ')' | '/' | '-')
    };
    if value.is_empty() || value.chars().count() > 100 || !value.chars().all(allowed) {
        return None;
    }
    Some(value.to_string())
}

/// Clamp an active-user window to `[1, MAX_ACTIVE_MINUTES]`.
pub fn clamp_active_minutes(minutes: u32) -> u32 {
    minutes.clamp(1, MAX_ACTIVE_MINUTES)
}

/// Parse a window from a query string. Non-numeric or below one falls back to the default.
pub fn parse_active_minutes(raw: Option<&str>) -> u32 {
    match raw.and_then(|v| v.trim().parse::<f64>().ok()) {
        Some(v) if v.is_finite() && v >= 1.0 => {
            clamp_active_minutes(v.floor().min(f64::from(MAX_ACTIVE_MINUTES)) as u32)
        }
        _ => DEFAULT_ACTIVE_MINUTES,
    }
}

pub fn parse_breakdown_limit(raw: Option<&str>) -> usize {
    match raw.and_then(|v| v.trim().parse::<i64>().ok()) {
        Some(v) => v.clamp(1, MAX_BREAKDOWN_LIMIT as i64) as usize,
        None => DEFAULT_BREAKDOWN_LIMIT,
    }
}

/// Resolve a dashboard date range to `[start of from-day, end of to-day]` in UTC.
///
/// Missing or unparsable dates fall back to the last 30 days ending today.
/// `to` never passes the end of today, a reversed range falls back to the
/// default and a span longer than 90 days is cut to 90 days from `from`.
pub fn resolve_date_range(
    start: Option<&str>,
    end: Option<&str>,
    now: DateTime<Utc>,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let today = now.date_naive();
    let default_from = today - Duration::days(DEFAULT_RANGE_DAYS - 1);

    let parse = |raw: Option<&str>| {
        raw.and_then(|v| NaiveDate::parse_from_str(v.trim(), "%Y-%m-%d").ok())
    };
    let mut to = parse(end).unwrap_or(today).min(today);
    let mut from = parse(start).unwrap_or(default_from);

    if from > to {
        from = default_from;
        to = today;
    }
    let max_to = from + Duration::days(MAX_RANGE_DAYS - 1);
    if to > max_to {
        to = max_to;
    }

    (start_of_day(from), end_of_day(to))
}

pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

pub fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    start_of_day(date) + Duration::days(1) - Duration::microseconds(1)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    #[default]
    Daily,
    Weekly,
    Monthly,
}

impl Granularity {
    /// Unknown or missing values mean daily.
    pub fn parse_lenient(raw: Option<&str>) -> Self {
        match raw.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("weekly") | Some("week") => Self::Weekly,
            Some("monthly") | Some("month") => Self::Monthly,
            _ => Self::Daily,
        }
    }

    /// DuckDB `date_trunc` part.
    pub fn trunc_unit(self) -> &'static str {
        match self {
            Self::Daily => "day",
            Self::Weekly => "week",
            Self::Monthly => "month",
        }
    }

    /// First day of the bucket containing `date`. Weeks start on Monday.
    pub fn truncate(self, date: NaiveDate) -> NaiveDate {
        match self {
            Self::Daily => date,
            Self::Weekly => date - Duration::days(i64::from(date.weekday().num_days_from_monday())),
            Self::Monthly => NaiveDate::from_ymd_opt(date.year(), date.month(), 1).unwrap_or(date),
        }
    }

    fn next(self, bucket: NaiveDate) -> Option<NaiveDate> {
        match self {
            Self::Daily => bucket.succ_opt(),
            Self::Weekly => bucket.checked_add_signed(Duration::days(7)),
            Self::Monthly => bucket.checked_add_months(Months::new(1)),
        }
    }

    /// Every bucket from the one containing `from` to the one containing `to`.
    pub fn buckets(self, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<NaiveDate> {
        let last = self.truncate(to.date_naive());
        let mut current = Some(self.truncate(from.date_naive()));
        let mut out = Vec::new();
        while let Some(bucket) = current.filter(|b| *b <= last) {
            out.push(bucket);
            current = self.next(bucket);
        }
        out
    }
}

/// Bucket label used on the wire and in SQL.
pub fn bucket_label(bucket: NaiveDate) -> String {
    bucket.format("%Y-%m-%d").to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    Device,
    Browser,
    Country,
    Os,
    Page,
    Referrer,
}

impl Dimension {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "device" | "device_type" => Some(Self::Device),
            "browser" => Some(Self::Browser),
            "country" => Some(Self::Country),
            "os" => Some(Self::Os),
            "page" | "pages" => Some(Self::Page),
            "referrer" | "referrers" => Some(Self::Referrer),
            _ => None,
        }
    }
}

/// Session-store count when it has anything, else the event-stream count.
///
/// The session upsert and the event insert are separate writes, so a window
/// can briefly see events whose sessions are not yet visible.
pub fn resolve_active_users(from_sessions: i64, from_events: i64) -> i64 {
    if from_sessions > 0 {
        from_sessions
    } else {
        from_events.max(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverviewMetrics {
    pub visitors: i64,
    pub page_views: i64,
    pub sessions: i64,
    pub active_users: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimeseriesPoint {
    pub bucket: String,
    pub page_views: i64,
    pub visitors: i64,
    pub sessions: i64,
}

impl TimeseriesPoint {
    pub fn empty(bucket: String) -> Self {
        Self {
            bucket,
            page_views: 0,
            visitors: 0,
            sessions: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TimeseriesResult {
    pub series: Vec<TimeseriesPoint>,
    pub granularity: Granularity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BreakdownRow {
    pub label: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BreakdownResult {
    pub dimension: Dimension,
    pub rows: Vec<BreakdownRow>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterOptions {
    pub devices: Vec<String>,
    pub browsers: Vec<String>,
    pub countries: Vec<String>,
}

/// Read side of the store. All queries are scoped to one website and count
/// page views only.
#[async_trait]
pub trait AnalyticsBackend: Send + Sync + 'static {
    async fn get_overview(
        &self,
        website_id: &str,
        filter: &AnalyticsFilter,
        active_minutes: u32,
        now: DateTime<Utc>,
    ) -> anyhow::Result<OverviewMetrics>;

    async fn get_active_users(
        &self,
        website_id: &str,
        filters: &DimensionFilters,
        minutes: u32,
        now: DateTime<Utc>,
    ) -> anyhow::Result<i64>;

    async fn get_timeseries(
        &self,
        website_id: &str,
        filter: &AnalyticsFilter,
        granularity: Granularity,
    ) -> anyhow::Result<TimeseriesResult>;

    async fn get_breakdown(
        &self,
        website_id: &str,
        dimension: Dimension,
        filter: &AnalyticsFilter,
        limit: usize,
    ) -> anyhow::Result<BreakdownResult>;

    async fn get_filter_options(
        &self,
        website_id: &str,
        filter: &AnalyticsFilter,
    ) -> anyhow::Result<FilterOptions>;
}
