use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use duckdb::Connection;

use tally_core::analytics::{clamp_active_minutes, resolve_active_users, DimensionFilters};
use tally_core::event::PAGE_VIEW_EVENT;

use crate::queries::filters::{push_dimensions, WhereClause};
use crate::DuckDbBackend;

/// Raw counts behind the active-user number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveSignals {
    /// Sessions whose `last_seen_at` falls inside the window.
    pub sessions: i64,
    /// Distinct session ids among page views inside the window.
    pub events: i64,
}

impl ActiveSignals {
    pub fn active_users(&self) -> i64 {
        resolve_active_users(self.sessions, self.events)
    }
}

pub(crate) fn count_active_signals(
    conn: &Connection,
    website_id: &str,
    filters: &DimensionFilters,
    minutes: u32,
    now: DateTime<Utc>,
) -> Result<ActiveSignals> {
    let cutoff = now - Duration::minutes(i64::from(clamp_active_minutes(minutes)));

    let mut session_scope = WhereClause::new();
    session_scope.push("website_id", "=", website_id.to_string());
    session_scope.push_timestamp("last_seen_at", ">=", &cutoff);
    push_dimensions(&mut session_scope, filters);
    let sql = format!(
        "SELECT COUNT(DISTINCT id) FROM sessions WHERE {}",
        session_scope.sql()
    );
    let sessions: i64 = conn
        .prepare(&sql)?
        .query_row(session_scope.params().as_slice(), |row| row.get(0))?;

    let mut event_scope = WhereClause::new();
    event_scope.push("website_id", "=", website_id.to_string());
    event_scope.push("event_type", "=", PAGE_VIEW_EVENT.to_string());
    event_scope.push_timestamp("occurred_at", ">=", &cutoff);
    push_dimensions(&mut event_scope, filters);
    let sql = format!(
        "SELECT COUNT(DISTINCT session_id) FROM events WHERE {}",
        event_scope.sql()
    );
    let events: i64 = conn
        .prepare(&sql)?
        .query_row(event_scope.params().as_slice(), |row| row.get(0))?;

    Ok(ActiveSignals { sessions, events })
}

impl DuckDbBackend {
    pub async fn active_signals(
        &self,
        website_id: &str,
        filters: &DimensionFilters,
        minutes: u32,
        now: DateTime<Utc>,
    ) -> Result<ActiveSignals> {
        let conn = self.conn.lock().await;
        count_active_signals(&conn, website_id, filters, minutes, now)
    }
}
