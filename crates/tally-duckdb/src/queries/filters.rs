use chrono::{DateTime, Utc};
use duckdb::types::ToSql;

use tally_core::analytics::{AnalyticsFilter, DimensionFilters};
use tally_core::event::PAGE_VIEW_EVENT;

use crate::backend::sql_timestamp;

/// A `WHERE` clause assembled from numbered placeholders.
///
/// Values are always bound, never formatted into the SQL text.
pub(crate) struct WhereClause {
    clauses: Vec<String>,
    params: Vec<Box<dyn ToSql>>,
}

impl WhereClause {
    pub(crate) fn new() -> Self {
        Self {
            clauses: Vec::new(),
            params: Vec::new(),
        }
    }

    /// Bind a value and return its placeholder, e.g. `?3`.
    pub(crate) fn bind(&mut self, value: impl ToSql + 'static) -> String {
        self.params.push(Box::new(value));
        format!("?{}", self.params.len())
    }

    pub(crate) fn push(&mut self, column: &str, op: &str, value: impl ToSql + 'static) {
        let placeholder = self.bind(value);
        self.clauses.push(format!("{column} {op} {placeholder}"));
    }

    pub(crate) fn push_timestamp(&mut self, column: &str, op: &str, ts: &DateTime<Utc>) {
        let placeholder = self.bind(sql_timestamp(ts));
        self.clauses
            .push(format!("{column} {op} CAST({placeholder} AS TIMESTAMP)"));
    }

    pub(crate) fn push_raw(&mut self, clause: impl Into<String>) {
        self.clauses.push(clause.into());
    }

    pub(crate) fn sql(&self) -> String {
        if self.clauses.is_empty() {
            "TRUE".to_string()
        } else {
            self.clauses.join(" AND ")
        }
    }

    pub(crate) fn params(&self) -> Vec<&dyn ToSql> {
        self.params.iter().map(|p| p.as_ref()).collect()
    }
}

/// Device/browser/country predicates. Column names are shared by `events` and `sessions`.
pub(crate) fn push_dimensions(clause: &mut WhereClause, filters: &DimensionFilters) {
    if let Some(device) = filters.device {
        clause.push("device_type", "=", device.as_str().to_string());
    }
    if let Some(browser) = &filters.browser {
        clause.push("browser", "=", browser.clone());
    }
    if let Some(country) = &filters.country {
        clause.push("country", "=", country.clone());
    }
}

/// Page views of one website inside the filter's time range.
pub(crate) fn page_view_scope(website_id: &str, filter: &AnalyticsFilter) -> WhereClause {
    let mut clause = WhereClause::new();
    clause.push("website_id", "=", website_id.to_string());
    clause.push("event_type", "=", PAGE_VIEW_EVENT.to_string());
    clause.push_timestamp("occurred_at", ">=", &filter.from);
    clause.push_timestamp("occurred_at", "<=", &filter.to);
    push_dimensions(&mut clause, &filter.dimensions);
    clause
}

/// Visitor identity: the session id, or the user agent for events without one.
pub(crate) const VISITOR_KEY: &str = "COALESCE(NULLIF(session_id, ''), user_agent)";
