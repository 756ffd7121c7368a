use super::BotStore;
use crate::{error::BotResult, types::ChannelId};
use rusqlite::params;

impl BotStore {
    // ── Channels ──────────────────────────────────────────────────

    pub fn channels(&self) -> BotResult<Vec<ChannelId>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT channel_id FROM channel ORDER BY id ASC")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Append a channel. Returns false if it was already present.
    pub fn add_channel(&self, channel_id: &str) -> BotResult<bool> {
        let conn = self.conn()?;
        let added = conn.execute(
            "INSERT OR IGNORE INTO channel (channel_id) VALUES (?1)",
            params![channel_id],
        )?;
        Ok(added > 0)
    }

    /// Remove a channel. Returns false if it was not present.
    pub fn remove_channel(&self, channel_id: &str) -> BotResult<bool> {
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM channel WHERE channel_id = ?1",
            params![channel_id],
        )?;
        Ok(removed > 0)
    }
}
