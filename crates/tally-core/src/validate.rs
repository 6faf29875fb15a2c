//! Beacon batch parsing and per-event normalization.

use chrono::{DateTime, Duration, Utc};

use crate::error::{IngestError, MalformedReason};
use crate::event::{DeviceType, Event, TrackOrBatch, TrackPayload};
use crate::registry::WebsiteRef;

pub const MAX_ID_LEN: usize = 64;
pub const MAX_EVENT_TYPE_LEN: usize = 50;
pub const MAX_URL_LEN: usize = 1000;
pub const MAX_TITLE_LEN: usize = 500;
pub const MAX_REFERRER_LEN: usize = 500;
pub const MAX_USER_AGENT_LEN: usize = 500;
pub const MAX_DIMENSION_LEN: usize = 100;

/// Edge headers that may carry a visitor country, in priority order.
pub const COUNTRY_HEADERS: [&str; 4] = [
    "x-vercel-ip-country",
    "cf-ipcountry",
    "x-country",
    "x-geo-country",
];

#[derive(Debug, Clone)]
pub struct ValidationLimits {
    pub max_body_bytes: usize,
    pub max_batch_events: usize,
    /// How far ahead of receipt time a client timestamp may be.
    pub max_future_skew: Duration,
    /// How far behind receipt time a client timestamp may be.
    pub max_event_age: Duration,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            max_body_bytes: 8 * 1024,
            max_batch_events: 25,
            max_future_skew: Duration::minutes(5),
            max_event_age: Duration::hours(24),
        }
    }
}

/// Request-scoped facts the handler derives from the transport.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub received_at: DateTime<Utc>,
    pub country: Option<String>,
    pub client_ip: Option<String>,
}

impl RequestContext {
    pub fn new(received_at: DateTime<Utc>) -> Self {
        Self {
            received_at,
            country: None,
            client_ip: None,
        }
    }
}

/// A parsed batch whose items all carry the same tracking id.
#[derive(Debug, Clone)]
pub struct BeaconBatch {
    pub tracking_id: String,
    pub items: Vec<TrackPayload>,
}

/// Trim and truncate to `max` characters. Blank input is absent.
pub fn clean_string(raw: Option<&str>, max: usize) -> Option<String> {
    let trimmed = raw?.trim();
    if trimmed.is_empty() {
        return None;
    }
    let cut = match trimmed.char_indices().nth(max) {
        Some((idx, _)) => &trimmed[..idx],
        None => trimmed,
    };
    Some(cut.to_string())
}

/// Upper-case and keep only exact two-letter ASCII codes.
pub fn normalize_country(raw: &str) -> Option<String> {
    let code = raw.trim().to_ascii_uppercase();
    if code.len() == 2 && code.bytes().all(|b| b.is_ascii_uppercase()) {
        Some(code)
    } else {
        None
    }
}

/// First valid country among [`COUNTRY_HEADERS`], using `lookup` to read a header.
pub fn country_from_headers<'a>(lookup: impl Fn(&str) -> Option<&'a str>) -> Option<String> {
    COUNTRY_HEADERS
        .iter()
        .filter_map(|name| lookup(name))
        .find_map(normalize_country)
}

fn clean_dimension(raw: Option<&str>) -> Option<String> {
    clean_string(raw, MAX_DIMENSION_LEN).filter(|v| !v.eq_ignore_ascii_case("unknown"))
}

/// Client timestamp when it is RFC 3339 and inside the skew window, else receipt time.
pub fn resolve_occurred_at(
    raw: Option<&str>,
    received_at: DateTime<Utc>,
    limits: &ValidationLimits,
) -> DateTime<Utc> {
    raw.and_then(|ts| DateTime::parse_from_rfc3339(ts.trim()).ok())
        .map(|ts| ts.with_timezone(&Utc))
        .filter(|ts| {
            *ts <= received_at + limits.max_future_skew && *ts >= received_at - limits.max_event_age
        })
        .unwrap_or(received_at)
}

/// Size check, JSON shape check and shared-tracking-id check.
pub fn parse_batch(body: &[u8], limits: &ValidationLimits) -> Result<BeaconBatch, IngestError> {
    if body.len() > limits.max_body_bytes {
        return Err(IngestError::PayloadTooLarge {
            max: limits.max_body_bytes,
        });
    }

    let value: serde_json::Value =
        serde_json::from_slice(body).map_err(|_| MalformedReason::InvalidJson)?;
    let items = serde_json::from_value::<TrackOrBatch>(value)
        .map_err(|_| MalformedReason::InvalidPayload)?
        .into_items();

    if items.is_empty() || items.len() > limits.max_batch_events {
        return Err(MalformedReason::BatchSize {
            len: items.len(),
            max: limits.max_batch_events,
        }
        .into());
    }

    let tracking_id = clean_string(items[0].tracking_id.as_deref(), MAX_ID_LEN)
        .ok_or(MalformedReason::MissingTrackingId)?;

    // Compared before truncation: ids sharing a long prefix are still different tenants.
    let first = items[0].tracking_id.as_deref().map(str::trim);
    let mixed = items
        .iter()
        .any(|item| item.tracking_id.as_deref().map(str::trim) != first);
    if mixed {
        return Err(MalformedReason::MixedTrackingIds.into());
    }

    Ok(BeaconBatch { tracking_id, items })
}

/// Turn every item into an [`Event`]; one bad item rejects the whole batch.
pub fn validate_batch(
    batch: BeaconBatch,
    website: &WebsiteRef,
    ctx: &RequestContext,
    limits: &ValidationLimits,
) -> Result<Vec<Event>, IngestError> {
    batch
        .items
        .iter()
        .map(|item| validate_item(item, &batch.tracking_id, website, ctx, limits))
        .collect()
}

fn validate_item(
    item: &TrackPayload,
    tracking_id: &str,
    website: &WebsiteRef,
    ctx: &RequestContext,
    limits: &ValidationLimits,
) -> Result<Event, IngestError> {
    let event_type = clean_string(item.event_type.as_deref(), MAX_EVENT_TYPE_LEN)
        .ok_or(MalformedReason::MissingEventType)?;
    let session_id = clean_string(item.session_id.as_deref(), MAX_ID_LEN)
        .ok_or(MalformedReason::MissingSessionId)?;
    let payload = item
        .event_payload
        .as_ref()
        .ok_or(MalformedReason::MissingPage)?;
    let page = payload.page.as_ref().ok_or(MalformedReason::MissingPage)?;

    let page_url = clean_string(page.url.as_deref(), MAX_URL_LEN);
    let page_path = clean_string(page.pathname.as_deref(), MAX_URL_LEN);
    if page_url.is_none() && page_path.is_none() {
        return Err(MalformedReason::MissingPage.into());
    }

    let device = payload.device.clone().unwrap_or_default();

    Ok(Event {
        id: uuid::Uuid::new_v4().to_string(),
        website_id: website.id.clone(),
        tracking_id: tracking_id.to_string(),
        session_id,
        event_type,
        page_url,
        page_path,
        page_title: clean_string(page.title.as_deref(), MAX_TITLE_LEN),
        referrer: clean_string(payload.referrer.as_deref(), MAX_REFERRER_LEN),
        user_agent: clean_string(device.user_agent.as_deref(), MAX_USER_AGENT_LEN),
        device_type: DeviceType::parse_lenient(device.device_type.as_deref()),
        browser: clean_dimension(device.browser_name.as_deref()),
        os: clean_dimension(device.os_name.as_deref()),
        country: ctx.country.clone(),
        occurred_at: resolve_occurred_at(payload.timestamp.as_deref(), ctx.received_at, limits),
        created_at: ctx.received_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn website() -> WebsiteRef {
        WebsiteRef {
            id: "site_1".to_string(),
            tracking_id: "trk_1".to_string(),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).single().expect("valid time")
    }

    fn beacon(session: &str) -> serde_json::Value {
        json!({
            "tracking_id": "trk_1",
            "session_id": session,
            "event_type": "page_view",
            "event_payload": {
                "page": {"url": "https://example.com/a", "pathname": "/a", "title": "A"},
                "device": {"user_agent": "UA", "device_type": "desktop", "os_name": "macOS", "browser_name": "Chrome"},
                "referrer": "https://google.com/"
            }
        })
    }

    fn run(body: serde_json::Value) -> Result<Vec<Event>, IngestError> {
        let limits = ValidationLimits::default();
        let bytes = serde_json::to_vec(&body).expect("serialize");
        let batch = parse_batch(&bytes, &limits)?;
        let mut ctx = RequestContext::new(now());
        ctx.country = Some("DE".to_string());
        validate_batch(batch, &website(), &ctx, &limits)
    }

    #[test]
    fn valid_batch_yields_one_event_per_item() {
        let events = run(json!([beacon("s1"), beacon("s2"), beacon("s1")])).expect("valid");
        assert_eq!(events.len(), 3);
        let first = &events[0];
        assert_eq!(first.website_id, "site_1");
        assert_eq!(first.tracking_id, "trk_1");
        assert_eq!(first.page_path.as_deref(), Some("/a"));
        assert_eq!(first.device_type, DeviceType::Desktop);
        assert_eq!(first.browser.as_deref(), Some("Chrome"));
        assert_eq!(first.country.as_deref(), Some("DE"));
        assert_eq!(first.occurred_at, now());
    }

    #[test]
    fn oversized_body_is_rejected_before_parsing() {
        let limits = ValidationLimits {
            max_body_bytes: 16,
            ..ValidationLimits::default()
        };
        let err = parse_batch(&[b' '; 17], &limits).expect_err("too large");
        assert!(matches!(err, IngestError::PayloadTooLarge { max: 16 }));
    }

    #[test]
    fn malformed_json_and_wrong_shape() {
        let limits = ValidationLimits::default();
        assert!(matches!(
            parse_batch(b"{not json", &limits),
            Err(IngestError::Malformed(MalformedReason::InvalidJson))
        ));
        assert!(matches!(
            parse_batch(b"42", &limits),
            Err(IngestError::Malformed(MalformedReason::InvalidPayload))
        ));
    }

    #[test]
    fn batch_size_bounds() {
        assert!(matches!(
            run(json!([])),
            Err(IngestError::Malformed(MalformedReason::BatchSize { len: 0, .. }))
        ));
        let too_many: Vec<_> = (0..26).map(|i| beacon(&format!("s{i}"))).collect();
        assert!(matches!(
            run(json!(too_many)),
            Err(IngestError::Malformed(MalformedReason::BatchSize { len: 26, max: 25 }))
        ));
    }

    #[test]
    fn mixed_tracking_ids_reject_the_batch() {
        let mut other = beacon("s2");
        other["tracking_id"] = json!("trk_2");
        assert!(matches!(
            run(json!([beacon("s1"), other])),
            Err(IngestError::Malformed(MalformedReason::MixedTrackingIds))
        ));
    }

    #[test]
    fn long_tracking_ids_with_shared_prefix_are_mixed() {
        let prefix = "t".repeat(MAX_ID_LEN);
        let mut first = beacon("s1");
        first["tracking_id"] = json!(format!("{prefix}A"));
        let mut second = beacon("s2");
        second["tracking_id"] = json!(format!("{prefix}B"));
        let bytes = serde_json::to_vec(&json!([first, second])).expect("serialize");
        assert!(matches!(
            parse_batch(&bytes, &ValidationLimits::default()),
            Err(IngestError::Malformed(MalformedReason::MixedTrackingIds))
        ));
    }

    #[test]
    fn blank_tracking_id_is_missing() {
        let mut item = beacon("s1");
        item["tracking_id"] = json!("   ");
        assert!(matches!(
            run(item),
            Err(IngestError::Malformed(MalformedReason::MissingTrackingId))
        ));
    }

    #[test]
    fn one_bad_item_rejects_everything() {
        let mut bad = beacon("s2");
        bad["event_payload"]["page"] = json!({"title": "no url"});
        assert!(matches!(
            run(json!([beacon("s1"), bad])),
            Err(IngestError::Malformed(MalformedReason::MissingPage))
        ));

        let mut no_session = beacon("");
        no_session["session_id"] = json!("  ");
        assert!(matches!(
            run(no_session),
            Err(IngestError::Malformed(MalformedReason::MissingSessionId))
        ));
    }

    #[test]
    fn path_alone_is_enough() {
        let mut item = beacon("s1");
        item["event_payload"]["page"] = json!({"pathname": "/only-path"});
        let events = run(item).expect("valid");
        assert_eq!(events[0].page_url, None);
        assert_eq!(events[0].page_path.as_deref(), Some("/only-path"));
    }

    #[test]
    fn long_fields_are_truncated_by_characters() {
        let mut item = beacon("s1");
        item["event_payload"]["page"]["url"] = json!("é".repeat(1200));
        item["event_payload"]["page"]["title"] = json!("t".repeat(600));
        item["event_payload"]["device"]["browser_name"] = json!("b".repeat(150));
        let events = run(item).expect("valid");
        assert_eq!(events[0].page_url.as_ref().map(|u| u.chars().count()), Some(MAX_URL_LEN));
        assert_eq!(events[0].page_title.as_ref().map(String::len), Some(MAX_TITLE_LEN));
        assert_eq!(events[0].browser.as_ref().map(String::len), Some(MAX_DIMENSION_LEN));
    }

    #[test]
    fn unknown_device_and_dimension_values_normalize() {
        let mut item = beacon("s1");
        item["event_payload"]["device"] =
            json!({"device_type": "smart-fridge", "browser_name": "Unknown", "os_name": " "});
        let events = run(item).expect("valid");
        assert_eq!(events[0].device_type, DeviceType::Unknown);
        assert_eq!(events[0].browser, None);
        assert_eq!(events[0].os, None);
    }

    #[test]
    fn client_timestamp_window() {
        let limits = ValidationLimits::default();
        let in_window = "2026-03-10T11:30:00Z";
        assert_eq!(
            resolve_occurred_at(Some(in_window), now(), &limits),
            Utc.with_ymd_and_hms(2026, 3, 10, 11, 30, 0).single().expect("valid")
        );
        let far_future = "2026-03-10T13:00:00Z";
        assert_eq!(resolve_occurred_at(Some(far_future), now(), &limits), now());
        let too_old = "2026-03-08T12:00:00Z";
        assert_eq!(resolve_occurred_at(Some(too_old), now(), &limits), now());
        assert_eq!(resolve_occurred_at(Some("yesterday"), now(), &limits), now());
    }

    #[test]
    fn country_normalization() {
        assert_eq!(normalize_country("us").as_deref(), Some("US"));
        assert_eq!(normalize_country("USA"), None);
        assert_eq!(normalize_country("X1"), None);
        assert_eq!(normalize_country("é"), None);

        let headers = [("cf-ipcountry", "XX1"), ("x-country", "fr")];
        let found = country_from_headers(|name| {
            headers.iter().find(|(k, _)| *k == name).map(|(_, v)| *v)
        });
        assert_eq!(found.as_deref(), Some("FR"));
    }
}
