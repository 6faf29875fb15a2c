use anyhow::{bail, Result};
use duckdb::Connection;
use serde::Serialize;

use tally_core::registry::WebsiteRef;

use crate::backend::rand_hex;
use crate::DuckDbBackend;

#[derive(Debug, Clone, Serialize)]
pub struct Website {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub domain: String,
    pub tracking_id: String,
    pub created_at: String,
}

pub struct CreateWebsiteParams {
    pub owner_id: String,
    pub name: String,
    pub domain: String,
    /// Generated when absent.
    pub tracking_id: Option<String>,
}

/// Attempts at drawing an unused random tracking id.
const TRACKING_ID_ATTEMPTS: usize = 3;

/// Generate a website ID: "site_" + 10 random alphanumeric chars.
fn generate_website_id() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let chars: String = (0..10)
        .map(|_| {
            let idx = rng.gen_range(0..36);
            if idx < 10 {
                (b'0' + idx) as char
            } else {
                (b'a' + idx - 10) as char
            }
        })
        .collect();
    format!("site_{}", chars)
}

/// 16 random bytes, hex-encoded.
pub fn generate_tracking_id() -> String {
    rand_hex(16)
}

fn tracking_id_taken(conn: &Connection, tracking_id: &str) -> Result<bool> {
    let count: i64 = conn
        .prepare("SELECT COUNT(*) FROM websites WHERE tracking_id = ?1")?
        .query_row(duckdb::params![tracking_id], |row| row.get(0))?;
    Ok(count > 0)
}

fn read_website(conn: &Connection, column: &str, value: &str) -> Result<Option<Website>> {
    let sql = format!(
        "SELECT id, owner_id, name, domain, tracking_id, CAST(created_at AS VARCHAR) \
         FROM websites WHERE {column} = ?1"
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query_map(duckdb::params![value], |row| {
        Ok(Website {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            name: row.get(2)?,
            domain: row.get(3)?,
            tracking_id: row.get(4)?,
            created_at: row.get(5)?,
        })
    })?;
    let website = rows.next().transpose()?;
    Ok(website)
}

impl DuckDbBackend {
    /// Create a website. A caller-supplied tracking id must be unused; a
    /// generated one is redrawn up to three times on collision.
    pub async fn create_website(&self, params: CreateWebsiteParams) -> Result<Website> {
        let conn = self.conn.lock().await;
        let id = generate_website_id();

        let tracking_id = match params.tracking_id {
            Some(requested) => {
                if tracking_id_taken(&conn, &requested)? {
                    bail!("tracking id already in use");
                }
                requested
            }
            None => {
                let mut chosen = None;
                for _ in 0..TRACKING_ID_ATTEMPTS {
                    let candidate = generate_tracking_id();
                    if !tracking_id_taken(&conn, &candidate)? {
                        chosen = Some(candidate);
                        break;
                    }
                }
                match chosen {
                    Some(tracking_id) => tracking_id,
                    None => bail!("could not allocate a unique tracking id"),
                }
            }
        };

        conn.execute(
            "INSERT INTO websites (id, owner_id, name, domain, tracking_id, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, CURRENT_TIMESTAMP)",
            duckdb::params![id, params.owner_id, params.name, params.domain, tracking_id],
        )?;

        match read_website(&conn, "id", &id)? {
            Some(website) => Ok(website),
            None => bail!("website {id} vanished after insert"),
        }
    }

    pub async fn get_website(&self, id: &str) -> Result<Option<Website>> {
        let conn = self.conn.lock().await;
        read_website(&conn, "id", id)
    }

    pub async fn find_by_tracking_id(&self, tracking_id: &str) -> Result<Option<WebsiteRef>> {
        let conn = self.conn.lock().await;
        Ok(read_website(&conn, "tracking_id", tracking_id)?.map(|w| WebsiteRef {
            id: w.id,
            tracking_id: w.tracking_id,
        }))
    }

    /// Return `true` if a website with the given `website_id` exists.
    pub async fn website_exists(&self, website_id: &str) -> Result<bool> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT COUNT(*) FROM websites WHERE id = ?1")?;
        let count: i64 = stmt.query_row(duckdb::params![website_id], |row| row.get(0))?;
        Ok(count > 0)
    }

    /// Insert a website with a fixed id and tracking id if it is not there yet.
    ///
    /// Used for startup seeding and test fixtures; safe to call repeatedly.
    pub async fn seed_website(&self, id: &str, domain: &str, tracking_id: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            r#"INSERT INTO websites (id, owner_id, name, domain, tracking_id, created_at)
               VALUES (?1, 'local', ?2, ?3, ?4, CURRENT_TIMESTAMP)
               ON CONFLICT DO NOTHING"#,
            duckdb::params![id, domain, domain, tracking_id],
        )?;
        Ok(())
    }

    /// Delete a website and everything recorded for it.
    ///
    /// Cascade order is events → sessions → website, in one transaction.
    /// Returns `false` when the website does not exist.
    pub async fn delete_website(&self, id: &str) -> Result<bool> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        let exists: i64 = tx
            .prepare("SELECT COUNT(*) FROM websites WHERE id = ?1")?
            .query_row(duckdb::params![id], |row| row.get(0))?;
        if exists == 0 {
            return Ok(false);
        }

        tx.execute("DELETE FROM events WHERE website_id = ?1", duckdb::params![id])?;
        tx.execute("DELETE FROM sessions WHERE website_id = ?1", duckdb::params![id])?;
        tx.execute("DELETE FROM websites WHERE id = ?1", duckdb::params![id])?;
        tx.commit()?;

        Ok(true)
    }
}
