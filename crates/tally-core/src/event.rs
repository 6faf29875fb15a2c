use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The only event type the aggregation engine counts.
pub const PAGE_VIEW_EVENT: &str = "page_view";

/// One beacon as sent by the tracker to POST /api/track.
///
/// Every field is optional at the wire level so that a missing field produces
/// a precise rejection reason instead of a generic deserialization error.
/// Type mismatches (a number where a string belongs) still fail the batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackPayload {
    pub tracking_id: Option<String>,
    pub session_id: Option<String>,
    pub event_type: Option<String>,
    pub event_payload: Option<EventPayload>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventPayload {
    pub page: Option<PagePayload>,
    pub device: Option<DevicePayload>,
    pub referrer: Option<String>,
    /// Client clock, RFC 3339.
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PagePayload {
    pub url: Option<String>,
    pub pathname: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DevicePayload {
    pub user_agent: Option<String>,
    pub device_type: Option<String>,
    pub os_name: Option<String>,
    pub browser_name: Option<String>,
}

/// Accepts either a single beacon or a batch array at POST /api/track.
///
/// `Batch` is tried first: a derived struct also accepts JSON arrays
/// positionally, which would let `["abc"]` through as a single beacon.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum TrackOrBatch {
    Batch(Vec<TrackPayload>),
    Single(Box<TrackPayload>),
}

impl TrackOrBatch {
    pub fn into_items(self) -> Vec<TrackPayload> {
        match self {
            Self::Batch(items) => items,
            Self::Single(item) => vec![*item],
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Mobile,
    Tablet,
    Desktop,
    #[default]
    Unknown,
}

impl DeviceType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mobile => "mobile",
            Self::Tablet => "tablet",
            Self::Desktop => "desktop",
            Self::Unknown => "unknown",
        }
    }

    /// Parse one of the three known device classes. Anything else is `None`.
    pub fn parse_known(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "mobile" => Some(Self::Mobile),
            "tablet" => Some(Self::Tablet),
            "desktop" => Some(Self::Desktop),
            _ => None,
        }
    }

    /// Ingestion-side parse: unrecognised values collapse to `Unknown`.
    pub fn parse_lenient(raw: Option<&str>) -> Self {
        raw.and_then(Self::parse_known).unwrap_or(Self::Unknown)
    }

    pub fn is_known(self) -> bool {
        self != Self::Unknown
    }
}

/// A validated, enriched event. Mirrors the DuckDB `events` table columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub website_id: String,
    pub tracking_id: String,
    pub session_id: String,
    pub event_type: String,
    pub page_url: Option<String>,
    pub page_path: Option<String>,
    pub page_title: Option<String>,
    pub referrer: Option<String>,
    pub user_agent: Option<String>,
    pub device_type: DeviceType,
    pub browser: Option<String>,
    pub os: Option<String>,
    pub country: Option<String>,
    pub occurred_at: DateTime<Utc>,
    /// Server receipt time.
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_object_and_array_both_parse() {
        let single: TrackOrBatch =
            serde_json::from_str(r#"{"tracking_id":"t1","event_type":"page_view"}"#)
                .expect("single");
        assert_eq!(single.into_items().len(), 1);

        let batch: TrackOrBatch = serde_json::from_str(
            r#"[{"tracking_id":"t1"},{"tracking_id":"t1","session_id":"s"}]"#,
        )
        .expect("batch");
        assert_eq!(batch.into_items().len(), 2);
    }

    #[test]
    fn array_of_strings_is_not_a_single_beacon() {
        let parsed = serde_json::from_str::<TrackOrBatch>(r#"["abc"]"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn type_mismatch_fails() {
        let parsed = serde_json::from_str::<TrackOrBatch>(r#"{"tracking_id": 42}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn device_type_parsing() {
        assert_eq!(DeviceType::parse_lenient(Some("Mobile")), DeviceType::Mobile);
        assert_eq!(DeviceType::parse_lenient(Some(" tablet ")), DeviceType::Tablet);
        assert_eq!(DeviceType::parse_lenient(Some("watch")), DeviceType::Unknown);
        assert_eq!(DeviceType::parse_lenient(None), DeviceType::Unknown);
        assert_eq!(DeviceType::parse_known("unknown"), None);
    }
}
