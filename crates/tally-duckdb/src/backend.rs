use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use duckdb::Connection;
use tokio::sync::Mutex;
use tracing::info;

use tally_core::event::Event;

use crate::schema::init_sql;

/// Generate a cryptographically random hex string of `n` bytes (2n hex chars).
pub(crate) fn rand_hex(n: usize) -> String {
    use rand::RngCore;
    let mut buf = vec![0u8; n];
    rand::thread_rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

/// UTC timestamp in the literal form DuckDB casts to `TIMESTAMP`.
pub(crate) fn sql_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

/// Inverse of `epoch_us(ts)`; out-of-range values are an error.
pub(crate) fn from_epoch_us(us: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(us)
        .ok_or_else(|| anyhow::anyhow!("timestamp out of range: {us} us"))
}

/// A DuckDB backend for Tally.
///
/// DuckDB is single-writer: concurrent reads are fine, but concurrent writes
/// contend. The connection sits in `Arc<Mutex<_>>` so every request
/// serialises through it while the struct stays cheap to share across axum
/// handlers.
///
/// Memory and thread limits are enforced by [`init_sql`] at open time.
pub struct DuckDbBackend {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

impl DuckDbBackend {
    /// Open (or create) a DuckDB database file at `path`.
    ///
    /// `memory_limit` is a DuckDB size string such as `"1GB"` or `"512MB"`.
    pub fn open(path: &str, memory_limit: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(&init_sql(memory_limit))?;
        info!(
            "DuckDB opened at {} with memory_limit={}, threads=2",
            path, memory_limit
        );
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an **in-memory** DuckDB database. Data is discarded on drop.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(&init_sql("1GB"))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Insert a batch of validated events in a single transaction.
    ///
    /// Returns immediately (no-op) if `events` is empty.
    pub async fn insert_events(&self, events: &[Event]) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"INSERT INTO events (
                    id, website_id, tracking_id, session_id, event_type,
                    page_url, page_path, page_title, referrer, user_agent,
                    device_type, browser, os, country,
                    occurred_at, created_at
                ) VALUES (
                    ?1,  ?2,  ?3,  ?4,  ?5,
                    ?6,  ?7,  ?8,  ?9,  ?10,
                    ?11, ?12, ?13, ?14,
                    CAST(?15 AS TIMESTAMP), CAST(?16 AS TIMESTAMP)
                )"#,
            )?;
            for event in events {
                stmt.execute(duckdb::params![
                    event.id,
                    event.website_id,
                    event.tracking_id,
                    event.session_id,
                    event.event_type,
                    event.page_url,
                    event.page_path,
                    event.page_title,
                    event.referrer,
                    event.user_agent,
                    event.device_type.as_str(),
                    event.browser,
                    event.os,
                    event.country,
                    sql_timestamp(&event.occurred_at),
                    sql_timestamp(&event.created_at),
                ])?;
            }
        }
        tx.commit()?;
        tracing::debug!("Inserted {} events into DuckDB", events.len());
        Ok(())
    }

    /// Execute `SELECT 1` as a lightweight liveness check for `/health`.
    pub async fn ping(&self) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute_batch("SELECT 1")?;
        Ok(())
    }

    /// Acquire the DuckDB connection lock for direct queries.
    ///
    /// Intended for integration tests that need to verify stored data.
    pub async fn conn_for_test(&self) -> tokio::sync::MutexGuard<'_, Connection> {
        self.conn.lock().await
    }
}
