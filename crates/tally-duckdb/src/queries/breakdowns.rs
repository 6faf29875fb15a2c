use anyhow::Result;
use duckdb::Connection;

use tally_core::analytics::{
    AnalyticsFilter, BreakdownResult, BreakdownRow, Dimension, FilterOptions,
    DEFAULT_BREAKDOWN_LIMIT, MAX_BREAKDOWN_LIMIT,
};
use tally_core::event::DeviceType;

use crate::queries::filters::page_view_scope;
use crate::DuckDbBackend;

/// SQL expression for a breakdown label.
fn label_expr(dimension: Dimension) -> &'static str {
    match dimension {
        Dimension::Device => "device_type",
        Dimension::Browser => "browser",
        Dimension::Country => "country",
        Dimension::Os => "os",
        Dimension::Page => "COALESCE(page_path, page_url)",
        Dimension::Referrer => "referrer",
    }
}

/// Page views per label, most viewed first. Blank labels are skipped.
pub(crate) fn ranked_labels(
    conn: &Connection,
    website_id: &str,
    dimension: Dimension,
    filter: &AnalyticsFilter,
    limit: usize,
) -> Result<Vec<BreakdownRow>> {
    let label = label_expr(dimension);
    let mut scope = page_view_scope(website_id, filter);
    scope.push_raw(format!("{label} IS NOT NULL"));
    scope.push_raw(format!("TRIM({label}) <> ''"));

    let sql = format!(
        r#"
        SELECT {label} AS label, COUNT(*) AS total
        FROM events
        WHERE {}
        GROUP BY label
        ORDER BY total DESC, label ASC
        LIMIT {limit}
        "#,
        scope.sql()
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(scope.params().as_slice(), |row| {
        Ok(BreakdownRow {
            label: row.get(0)?,
            count: row.get(1)?,
        })
    })?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub async fn get_breakdown_inner(
    db: &DuckDbBackend,
    website_id: &str,
    dimension: Dimension,
    filter: &AnalyticsFilter,
    limit: usize,
) -> Result<BreakdownResult> {
    let conn = db.conn.lock().await;
    let limit = limit.clamp(1, MAX_BREAKDOWN_LIMIT);
    let rows = ranked_labels(&conn, website_id, dimension, filter, limit)?;
    Ok(BreakdownResult { dimension, rows })
}

/// Values offered in the dashboard filter pickers.
///
/// Each list ignores the filter on its own dimension so the current choice
/// never hides its alternatives.
pub async fn get_filter_options_inner(
    db: &DuckDbBackend,
    website_id: &str,
    filter: &AnalyticsFilter,
) -> Result<FilterOptions> {
    let conn = db.conn.lock().await;
    let options_for = |dimension: Dimension| -> Result<Vec<String>> {
        Ok(ranked_labels(
            &conn,
            website_id,
            dimension,
            &filter.without(dimension),
            DEFAULT_BREAKDOWN_LIMIT,
        )?
        .into_iter()
        .map(|row| row.label)
        .collect())
    };

    let devices = options_for(Dimension::Device)?
        .into_iter()
        .filter(|label| label != DeviceType::Unknown.as_str())
        .collect();

    Ok(FilterOptions {
        devices,
        browsers: options_for(Dimension::Browser)?,
        countries: options_for(Dimension::Country)?,
    })
}
