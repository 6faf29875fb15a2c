use std::collections::HashMap;

use anyhow::Result;

use tally_core::analytics::{
    bucket_label, AnalyticsFilter, Granularity, TimeseriesPoint, TimeseriesResult,
};

use crate::queries::filters::{page_view_scope, VISITOR_KEY};
use crate::DuckDbBackend;

pub async fn get_timeseries_inner(
    db: &DuckDbBackend,
    website_id: &str,
    filter: &AnalyticsFilter,
    granularity: Granularity,
) -> Result<TimeseriesResult> {
    let conn = db.conn.lock().await;

    let scope = page_view_scope(website_id, filter);
    // Keys match `bucket_label` so the zero-fill below is an exact lookup.
    let unit = granularity.trunc_unit();
    let sql = format!(
        r#"
        SELECT
            strftime(date_trunc('{unit}', occurred_at), '%Y-%m-%d') AS bucket,
            COUNT(*)                         AS page_views,
            COUNT(DISTINCT {VISITOR_KEY})    AS visitors,
            COUNT(DISTINCT session_id)       AS sessions
        FROM events
        WHERE {}
        GROUP BY bucket
        "#,
        scope.sql()
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(scope.params().as_slice(), |row| {
        Ok(TimeseriesPoint {
            bucket: row.get(0)?,
            page_views: row.get(1)?,
            visitors: row.get(2)?,
            sessions: row.get(3)?,
        })
    })?;

    let mut by_bucket: HashMap<String, TimeseriesPoint> = HashMap::new();
    for row in rows {
        let point = row?;
        by_bucket.insert(point.bucket.clone(), point);
    }

    // Zero-fill: one point per bucket in range, in order.
    let series = granularity
        .buckets(filter.from, filter.to)
        .into_iter()
        .map(bucket_label)
        .map(|label| {
            by_bucket
                .remove(&label)
                .unwrap_or_else(|| TimeseriesPoint::empty(label))
        })
        .collect();

    Ok(TimeseriesResult {
        series,
        granularity,
    })
}
