use chrono::{DateTime, Utc};
use serde::Deserialize;

use tally_core::analytics::{resolve_date_range, AnalyticsFilter, DimensionFilters};

/// Query string shared by the dashboard routes.
///
/// Everything is taken as a raw string so a bad value degrades to a default
/// instead of failing extraction.
#[derive(Debug, Default, Deserialize)]
pub struct DashboardQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub device: Option<String>,
    pub browser: Option<String>,
    pub country: Option<String>,
    pub granularity: Option<String>,
    #[serde(rename = "type")]
    pub dimension: Option<String>,
    pub limit: Option<String>,
    pub minutes: Option<String>,
}

impl DashboardQuery {
    pub fn dimensions(&self) -> DimensionFilters {
        DimensionFilters::from_raw(
            self.device.as_deref(),
            self.browser.as_deref(),
            self.country.as_deref(),
        )
    }

    pub fn filter(&self, now: DateTime<Utc>) -> AnalyticsFilter {
        let (from, to) =
            resolve_date_range(self.start_date.as_deref(), self.end_date.as_deref(), now);
        AnalyticsFilter {
            from,
            to,
            dimensions: self.dimensions(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::event::DeviceType;

    #[test]
    fn invalid_values_become_no_filter() {
        let query = DashboardQuery {
            device: Some("phone".to_string()),
            browser: Some("Firefox".to_string()),
            country: Some("usa".to_string()),
            ..DashboardQuery::default()
        };
        let dims = query.dimensions();
        assert_eq!(dims.device, None);
        assert_eq!(dims.browser.as_deref(), Some("Firefox"));
        assert_eq!(dims.country, None);
    }

    #[test]
    fn filter_covers_whole_days() {
        let query = DashboardQuery {
            start_date: Some("2026-01-01".to_string()),
            end_date: Some("2026-01-02".to_string()),
            device: Some("desktop".to_string()),
            ..DashboardQuery::default()
        };
        let now = DateTime::parse_from_rfc3339("2026-01-10T12:00:00Z")
            .expect("valid")
            .with_timezone(&Utc);
        let filter = query.filter(now);
        assert_eq!(filter.from.to_rfc3339(), "2026-01-01T00:00:00+00:00");
        assert_eq!(filter.to.date_naive().to_string(), "2026-01-02");
        assert_eq!(filter.dimensions.device, Some(DeviceType::Desktop));
    }
}
