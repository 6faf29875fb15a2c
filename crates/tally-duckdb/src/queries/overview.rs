use anyhow::Result;
use chrono::{DateTime, Utc};

use tally_core::analytics::{AnalyticsFilter, OverviewMetrics};

use crate::queries::active::count_active_signals;
use crate::queries::filters::{page_view_scope, VISITOR_KEY};
use crate::DuckDbBackend;

pub async fn get_overview_inner(
    db: &DuckDbBackend,
    website_id: &str,
    filter: &AnalyticsFilter,
    active_minutes: u32,
    now: DateTime<Utc>,
) -> Result<OverviewMetrics> {
    let conn = db.conn.lock().await;

    let scope = page_view_scope(website_id, filter);
    let sql = format!(
        r#"
        SELECT
            COUNT(*)                         AS page_views,
            COUNT(DISTINCT session_id)       AS sessions,
            COUNT(DISTINCT {VISITOR_KEY})    AS visitors
        FROM events
        WHERE {}
        "#,
        scope.sql()
    );
    let (page_views, sessions, visitors): (i64, i64, i64) = conn
        .prepare(&sql)?
        .query_row(scope.params().as_slice(), |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        })?;

    let active = count_active_signals(&conn, website_id, &filter.dimensions, active_minutes, now)?;

    Ok(OverviewMetrics {
        visitors,
        page_views,
        sessions,
        active_users: active.active_users(),
    })
}
