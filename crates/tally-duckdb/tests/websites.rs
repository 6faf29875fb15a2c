use std::sync::Arc;

use chrono::Utc;
use tally_core::event::{DeviceType, Event};
use tally_core::registry::TenantRegistry;
use tally_core::session::reconcile;
use tally_duckdb::website::CreateWebsiteParams;
use tally_duckdb::DuckDbBackend;

fn params(tracking_id: Option<&str>) -> CreateWebsiteParams {
    CreateWebsiteParams {
        owner_id: "user_1".to_string(),
        name: "Example".to_string(),
        domain: "example.com".to_string(),
        tracking_id: tracking_id.map(str::to_string),
    }
}

fn event_for(website_id: &str, tracking_id: &str) -> Event {
    let now = Utc::now();
    Event {
        id: uuid::Uuid::new_v4().to_string(),
        website_id: website_id.to_string(),
        tracking_id: tracking_id.to_string(),
        session_id: "sess_1".to_string(),
        event_type: "page_view".to_string(),
        page_url: None,
        page_path: Some("/".to_string()),
        page_title: None,
        referrer: None,
        user_agent: None,
        device_type: DeviceType::Desktop,
        browser: None,
        os: None,
        country: None,
        occurred_at: now,
        created_at: now,
    }
}

#[tokio::test]
async fn test_create_website_generates_tracking_id() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    let a = db.create_website(params(None)).await.expect("create");
    let b = db.create_website(params(None)).await.expect("create");

    assert!(a.id.starts_with("site_"));
    assert_eq!(a.tracking_id.len(), 32);
    assert!(a.tracking_id.chars().all(|c| c.is_ascii_hexdigit()));
    assert_ne!(a.tracking_id, b.tracking_id);
}

#[tokio::test]
async fn test_requested_tracking_id_must_be_unused() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    db.create_website(params(Some("trk_fixed")))
        .await
        .expect("create");
    assert!(db.create_website(params(Some("trk_fixed"))).await.is_err());
}

#[tokio::test]
async fn test_registry_resolves_tracking_ids() {
    let db = Arc::new(DuckDbBackend::open_in_memory().expect("db"));
    let site = db.create_website(params(None)).await.expect("create");
    let registry: Arc<dyn TenantRegistry> = db.clone();

    let resolved = registry
        .resolve_tracking_id(&site.tracking_id)
        .await
        .expect("resolve")
        .expect("known");
    assert_eq!(resolved.id, site.id);
    assert!(registry
        .resolve_tracking_id("missing")
        .await
        .expect("resolve")
        .is_none());
    assert!(registry.website_exists(&site.id).await.expect("exists"));
    assert!(!registry.website_exists("site_nope").await.expect("exists"));
}

#[tokio::test]
async fn test_seed_website_is_idempotent() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    db.seed_website("site_1", "example.com", "trk_1")
        .await
        .expect("seed");
    db.seed_website("site_1", "example.com", "trk_1")
        .await
        .expect("seed again");
    let site = db.get_website("site_1").await.expect("get").expect("exists");
    assert_eq!(site.tracking_id, "trk_1");
}

#[tokio::test]
async fn test_delete_website_cascades() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    let keep = db.create_website(params(None)).await.expect("create");
    let doomed = db.create_website(params(None)).await.expect("create");

    for site in [&keep, &doomed] {
        let events = vec![event_for(&site.id, &site.tracking_id)];
        for upsert in reconcile(&events).values() {
            db.upsert_session(upsert).await.expect("upsert");
        }
        db.insert_events(&events).await.expect("insert");
    }

    assert!(db.delete_website(&doomed.id).await.expect("delete"));
    assert!(!db.delete_website(&doomed.id).await.expect("delete again"));

    let conn = db.conn_for_test().await;
    let count = |sql: &str| -> i64 {
        conn.query_row(sql, tally_duckdb::duckdb::params![doomed.id], |row| row.get(0))
            .expect("count")
    };
    assert_eq!(count("SELECT COUNT(*) FROM events WHERE website_id = ?1"), 0);
    assert_eq!(count("SELECT COUNT(*) FROM sessions WHERE website_id = ?1"), 0);
    assert_eq!(count("SELECT COUNT(*) FROM websites WHERE id = ?1"), 0);

    let kept: i64 = conn
        .query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))
        .expect("count");
    assert_eq!(kept, 1);
}
