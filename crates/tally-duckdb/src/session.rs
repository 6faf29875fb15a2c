use anyhow::Result;

use tally_core::event::DeviceType;
use tally_core::session::{Session, SessionUpsert};

use crate::backend::{from_epoch_us, sql_timestamp};
use crate::DuckDbBackend;

/// Insert-or-merge one session row.
///
/// Same rule as [`SessionUpsert::merge_into`], executed as a single
/// statement so two batches for the same session cannot interleave.
pub(crate) async fn upsert_session_inner(db: &DuckDbBackend, upsert: &SessionUpsert) -> Result<()> {
    let conn = db.conn.lock().await;
    conn.execute(
        r#"INSERT INTO sessions (
               id, website_id, first_seen_at, last_seen_at,
               device_type, browser, os, country
           ) VALUES (
               ?1, ?2, CAST(?3 AS TIMESTAMP), CAST(?4 AS TIMESTAMP),
               ?5, ?6, ?7, ?8
           )
           ON CONFLICT (website_id, id) DO UPDATE SET
               last_seen_at = GREATEST(sessions.last_seen_at, EXCLUDED.last_seen_at),
               device_type  = CASE WHEN sessions.device_type = 'unknown'
                                   THEN EXCLUDED.device_type
                                   ELSE sessions.device_type END,
               browser      = COALESCE(sessions.browser, EXCLUDED.browser),
               os           = COALESCE(sessions.os, EXCLUDED.os),
               country      = COALESCE(sessions.country, EXCLUDED.country)"#,
        duckdb::params![
            upsert.id,
            upsert.website_id,
            sql_timestamp(&upsert.first_seen_at),
            sql_timestamp(&upsert.last_seen_at),
            upsert.device_type.as_str(),
            upsert.browser,
            upsert.os,
            upsert.country,
        ],
    )?;
    Ok(())
}

impl DuckDbBackend {
    pub async fn upsert_session(&self, upsert: &SessionUpsert) -> Result<()> {
        upsert_session_inner(self, upsert).await
    }

    pub async fn get_session(&self, website_id: &str, session_id: &str) -> Result<Option<Session>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, website_id, epoch_us(first_seen_at), epoch_us(last_seen_at), \
                    device_type, browser, os, country \
             FROM sessions WHERE website_id = ?1 AND id = ?2",
        )?;
        let mut rows = stmt.query_map(duckdb::params![website_id, session_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, Option<String>>(6)?,
                row.get::<_, Option<String>>(7)?,
            ))
        })?;
        let Some((id, website_id, first_seen_us, last_seen_us, device, browser, os, country)) =
            rows.next().transpose()?
        else {
            return Ok(None);
        };
        Ok(Some(Session {
            id,
            website_id,
            first_seen_at: from_epoch_us(first_seen_us)?,
            last_seen_at: from_epoch_us(last_seen_us)?,
            device_type: DeviceType::parse_lenient(Some(device.as_str())),
            browser,
            os,
            country,
        }))
    }
}
