use super::{from_millis, to_millis, BotStore};
use crate::{error::BotResult, event::EventLogEntry};
use rusqlite::params;

impl BotStore {
    // ── Event log ─────────────────────────────────────────────────

    pub fn append_event(&self, entry: &EventLogEntry) -> BotResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO event_log (user_id, event_type, payload, created_ms)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                entry.user_id,
                entry.event_type,
                entry.payload,
                to_millis(entry.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn events_for_user(&self, user_id: &str) -> BotResult<Vec<EventLogEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, event_type, payload, created_ms
             FROM event_log WHERE user_id = ?1
             ORDER BY id ASC",
        )?;
        let entries = stmt
            .query_map(params![user_id], |row| {
                Ok(EventLogEntry {
                    id: Some(row.get(0)?),
                    user_id: row.get(1)?,
                    event_type: row.get(2)?,
                    payload: row.get(3)?,
                    created_at: from_millis(row.get(4)?)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn event_count(&self, event_type: &str) -> BotResult<i64> {
        let conn = self.conn()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM event_log WHERE event_type = ?1",
            params![event_type],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
