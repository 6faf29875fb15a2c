use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use tally_core::config::Config;
use tally_duckdb::DuckDbBackend;
use tally_server::app::build_app;
use tally_server::state::AppState;

const TRACKING_ID: &str = "trk_dash";

async fn setup() -> (Arc<AppState>, axum::Router) {
    let db = DuckDbBackend::open_in_memory().expect("in-memory DuckDB");
    db.seed_website("site_dash", "example.com", TRACKING_ID)
        .await
        .expect("seed website");
    let state = Arc::new(AppState::new(db, Config::default()));
    let app = build_app(Arc::clone(&state));
    (state, app)
}

fn beacon(session_id: &str, path: &str, device: &str, browser: &str) -> Value {
    json!({
        "tracking_id": TRACKING_ID,
        "session_id": session_id,
        "event_type": "page_view",
        "event_payload": {
            "page": { "pathname": path },
            "device": { "device_type": device, "browser_name": browser }
        }
    })
}

/// Ingest through the public endpoint so the dashboard reads what the beacon wrote.
async fn ingest(app: &axum::Router, body: Value, country: &str) {
    let request = Request::builder()
        .method("POST")
        .uri("/api/track")
        .header("content-type", "application/json")
        .header("x-vercel-ip-country", country)
        .body(Body::from(body.to_string()))
        .expect("build request");
    let response = app.clone().oneshot(request).await.expect("request");
    assert_eq!(response.status(), StatusCode::OK);
}

async fn seed_traffic(app: &axum::Router) {
    ingest(
        app,
        json!([
            beacon("s1", "/", "desktop", "Chrome"),
            beacon("s1", "/pricing", "desktop", "Chrome"),
            beacon("s2", "/", "desktop", "Chrome"),
        ]),
        "US",
    )
    .await;
    ingest(app, json!([beacon("s3", "/", "mobile", "Safari")]), "DE").await;
}

async fn get(app: &axum::Router, uri: &str) -> axum::http::Response<Body> {
    let request = Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("build request");
    app.clone().oneshot(request).await.expect("request")
}

async fn json_body(response: axum::http::Response<Body>) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("parse JSON")
}

#[tokio::test]
async fn test_overview_counts_visitors_views_and_sessions() {
    let (_state, app) = setup().await;
    seed_traffic(&app).await;

    let response = get(&app, "/api/websites/site_dash/overview").await;
    assert_eq!(response.status(), StatusCode::OK);
    let data = &json_body(response).await["data"];
    assert_eq!(data["page_views"], 4);
    assert_eq!(data["visitors"], 3);
    assert_eq!(data["sessions"], 3);
    assert_eq!(data["active_users"], 3);
}

#[tokio::test]
async fn test_overview_applies_dimension_filters() {
    let (_state, app) = setup().await;
    seed_traffic(&app).await;

    let response = get(&app, "/api/websites/site_dash/overview?device=mobile").await;
    let data = &json_body(response).await["data"];
    assert_eq!(data["page_views"], 1);
    assert_eq!(data["visitors"], 1);

    let response = get(&app, "/api/websites/site_dash/overview?country=us").await;
    let data = &json_body(response).await["data"];
    assert_eq!(data["page_views"], 3);

    // Invalid values are dropped rather than rejected.
    let response = get(&app, "/api/websites/site_dash/overview?device=phone").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["data"]["page_views"], 4);
}

#[tokio::test]
async fn test_unknown_website_returns_404() {
    let (_state, app) = setup().await;

    for path in ["overview", "timeseries", "breakdown?type=device", "filter-options"] {
        let response = get(&app, &format!("/api/websites/site_missing/{path}")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{path}");
    }
}

#[tokio::test]
async fn test_timeseries_is_zero_filled_and_sums_to_total() {
    let (_state, app) = setup().await;
    seed_traffic(&app).await;

    let response = get(&app, "/api/websites/site_dash/timeseries?granularity=bogus").await;
    assert_eq!(response.status(), StatusCode::OK);
    let data = &json_body(response).await["data"];
    assert_eq!(data["granularity"], "daily");

    let series = data["series"].as_array().expect("series array");
    assert!(series.len() >= 30);
    let total: i64 = series
        .iter()
        .map(|point| point["page_views"].as_i64().expect("page_views"))
        .sum();
    assert_eq!(total, 4);
    assert!(series.iter().filter(|p| p["page_views"] == 0).count() >= 29);
}

#[tokio::test]
async fn test_breakdown_ranks_labels() {
    let (_state, app) = setup().await;
    seed_traffic(&app).await;

    let response = get(&app, "/api/websites/site_dash/breakdown?type=browser").await;
    assert_eq!(response.status(), StatusCode::OK);
    let data = &json_body(response).await["data"];
    assert_eq!(data["dimension"], "browser");
    let labels: Vec<&str> = data["rows"]
        .as_array()
        .expect("rows")
        .iter()
        .map(|row| row["label"].as_str().expect("label"))
        .collect();
    assert_eq!(labels, vec!["Chrome", "Safari"]);

    let response = get(&app, "/api/websites/site_dash/breakdown?type=page&limit=1").await;
    let rows = json_body(response).await["data"]["rows"].clone();
    assert_eq!(rows.as_array().expect("rows").len(), 1);
    assert_eq!(rows[0]["label"], "/");
}

#[tokio::test]
async fn test_breakdown_requires_known_type() {
    let (_state, app) = setup().await;

    let response = get(&app, "/api/websites/site_dash/breakdown?type=planet").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"]["code"], "validation_error");

    let response = get(&app, "/api/websites/site_dash/breakdown").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_filter_options_ignore_own_dimension() {
    let (_state, app) = setup().await;
    seed_traffic(&app).await;

    let response = get(&app, "/api/websites/site_dash/filter-options?device=mobile").await;
    assert_eq!(response.status(), StatusCode::OK);
    let data = &json_body(response).await["data"];

    // Device list is not narrowed by the device filter itself.
    let mut devices: Vec<&str> = data["devices"]
        .as_array()
        .expect("devices")
        .iter()
        .filter_map(Value::as_str)
        .collect();
    devices.sort();
    assert_eq!(devices, vec!["desktop", "mobile"]);

    // The other dimensions are narrowed by it.
    assert_eq!(data["browsers"], json!(["Safari"]));
    assert_eq!(data["countries"], json!(["DE"]));
}

#[tokio::test]
async fn test_active_users_endpoint() {
    let (_state, app) = setup().await;
    seed_traffic(&app).await;

    let response = get(&app, "/api/analytics/active?websiteId=site_dash&minutes=10").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("cache-control")
            .and_then(|v| v.to_str().ok()),
        Some("no-store")
    );
    let json = json_body(response).await;
    assert_eq!(json["activeUsers"], 3);
    assert!(json["updatedAt"].as_str().expect("updatedAt").ends_with('Z'));

    let response = get(&app, "/api/analytics/active?websiteId=site_dash&browser=Safari").await;
    assert_eq!(json_body(response).await["activeUsers"], 1);
}

#[tokio::test]
async fn test_active_users_requires_known_website() {
    let (_state, app) = setup().await;

    let response = get(&app, "/api/analytics/active").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = get(&app, "/api/analytics/active?websiteId=site_missing").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_deleted_website_is_evicted_from_cache() {
    let (state, app) = setup().await;
    seed_traffic(&app).await;
    assert_eq!(
        get(&app, "/api/websites/site_dash/overview").await.status(),
        StatusCode::OK
    );

    assert!(state.delete_website("site_dash").await.expect("delete"));

    assert_eq!(
        get(&app, "/api/websites/site_dash/overview").await.status(),
        StatusCode::NOT_FOUND
    );
    let request = Request::builder()
        .method("POST")
        .uri("/api/track")
        .header("content-type", "application/json")
        .body(Body::from(beacon("s1", "/", "desktop", "Chrome").to_string()))
        .expect("build request");
    let response = app.oneshot(request).await.expect("request");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
