use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use tally_server::{config::Config, state::AppState};

/// Website created at startup when `TALLY_SEED_TRACKING_ID` is set.
const SEED_WEBSITE_ID: &str = "site_default";

/// `tally health` — liveness probe for Docker HEALTHCHECK.
///
/// Calls `GET http://localhost:$TALLY_PORT/health`.
/// Exits 0 on HTTP 200, 1 otherwise.
fn run_health_check() -> ! {
    let port = std::env::var("TALLY_PORT").unwrap_or_else(|_| "3000".to_string());
    let url = format!("http://localhost:{}/health", port);
    match ureq::get(&url).call() {
        Ok(resp) if resp.status() == 200 => std::process::exit(0),
        _ => std::process::exit(1),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.get(1).map(|s| s.as_str()) == Some("health") {
        run_health_check();
    }

    // Structured JSON logging. Level controlled via RUST_LOG.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("tally=info".parse()?),
        )
        .json()
        .init();

    let cfg = Config::from_env().map_err(|e| anyhow::anyhow!(e))?;

    std::fs::create_dir_all(&cfg.data_dir)?;
    let db_path = format!("{}/tally.db", cfg.data_dir);
    let db = tally_duckdb::DuckDbBackend::open(&db_path, &cfg.duckdb_memory_limit)?;

    if let Some(tracking_id) = cfg.seed_tracking_id.as_deref() {
        match db.seed_website(SEED_WEBSITE_ID, "localhost", tracking_id).await {
            Ok(()) => info!(website_id = SEED_WEBSITE_ID, "Seed website ready"),
            Err(e) => tracing::warn!(error = %e, "Failed to seed website"),
        }
    }

    info!(
        rate_limit_key = ?cfg.rate_limit_key,
        rate_limit_max = cfg.rate_limit_max,
        rate_limit_disabled = cfg.rate_limit_disable,
        max_body_bytes = cfg.max_body_bytes,
        "Ingestion limits"
    );

    let addr = format!("0.0.0.0:{}", cfg.port);
    let state = Arc::new(AppState::new(db, cfg.clone()));
    let app = tally_server::app::build_app(state);

    info!(port = cfg.port, "Tally listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    Ok(())
}
