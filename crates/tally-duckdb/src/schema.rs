/// DuckDB initialization SQL.
///
/// Executed once at open time via `Connection::execute_batch`. Every
/// statement uses `IF NOT EXISTS`, so it is safe to re-run on each startup.
///
/// `memory_limit` comes from `Config.duckdb_memory_limit`
/// (env `TALLY_DUCKDB_MEMORY`, default `"1GB"`). Always set it: the DuckDB
/// default of 80% of system RAM is not acceptable for a server process.
///
/// There are no foreign keys. DuckDB enforces them at statement time, and
/// `delete_website` removes children before the parent inside one
/// transaction instead.
pub fn init_sql(memory_limit: &str) -> String {
    format!(
        r#"SET memory_limit = '{memory_limit}';
SET threads = 2;

-- ===========================================
-- WEBSITES (tenants)
-- ===========================================
CREATE TABLE IF NOT EXISTS websites (
    id              VARCHAR PRIMARY KEY,           -- 'site_' + 10 random chars
    owner_id        VARCHAR NOT NULL,
    name            VARCHAR NOT NULL,
    domain          VARCHAR NOT NULL,
    tracking_id     VARCHAR(64) NOT NULL UNIQUE,   -- immutable, embedded in the tracker snippet
    created_at      TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);

-- ===========================================
-- SESSIONS (one row per website + client session id)
-- ===========================================
-- Written only through the ON CONFLICT upsert in session.rs:
-- last_seen_at moves forward, first_seen_at is never rewritten,
-- device_type/browser/os/country are filled while unknown.
CREATE TABLE IF NOT EXISTS sessions (
    id              VARCHAR(64) NOT NULL,
    website_id      VARCHAR NOT NULL,
    first_seen_at   TIMESTAMP NOT NULL,
    last_seen_at    TIMESTAMP NOT NULL,
    device_type     VARCHAR(16) NOT NULL DEFAULT 'unknown',
    browser         VARCHAR(100),
    os              VARCHAR(100),
    country         VARCHAR(2),
    PRIMARY KEY (website_id, id)
);

-- ===========================================
-- EVENTS (append-only)
-- ===========================================
CREATE TABLE IF NOT EXISTS events (
    id              VARCHAR PRIMARY KEY,
    website_id      VARCHAR NOT NULL,
    tracking_id     VARCHAR(64) NOT NULL,
    session_id      VARCHAR(64) NOT NULL,
    event_type      VARCHAR(50) NOT NULL,
    page_url        VARCHAR,
    page_path       VARCHAR,
    page_title      VARCHAR,
    referrer        VARCHAR,
    user_agent      VARCHAR,
    device_type     VARCHAR(16) NOT NULL DEFAULT 'unknown',
    browser         VARCHAR(100),
    os              VARCHAR(100),
    country         VARCHAR(2),
    occurred_at     TIMESTAMP NOT NULL,            -- client time when plausible, else receipt
    created_at      TIMESTAMP NOT NULL             -- receipt time
);
CREATE INDEX IF NOT EXISTS idx_events_website_time ON events(website_id, occurred_at);
CREATE INDEX IF NOT EXISTS idx_events_session      ON events(website_id, session_id);
"#
    )
}
