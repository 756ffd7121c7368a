use super::{from_millis, to_millis, BotStore};
use crate::{
    engagement::UserRecord,
    error::BotResult,
    types::{Amount, UserId},
};
use rusqlite::{params, Connection, OptionalExtension, Row};

const USER_COLUMNS: &str = "user_id, balance, spins, last_bonus_ms, referrals, invited_by";

impl BotStore {
    // ── User records ──────────────────────────────────────────────

    pub fn get_user(&self, user_id: &str) -> BotResult<Option<UserRecord>> {
        let conn = self.conn()?;
        select_user(&conn, user_id)
    }

    /// Fetch a user, creating the default record on first access.
    pub fn get_or_create_user(&self, user_id: &str, starting_spins: Amount) -> BotResult<UserRecord> {
        let conn = self.conn()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO bot_user (user_id, balance, spins, referrals)
             VALUES (?1, 0, ?2, 0)",
            params![user_id, starting_spins as i64],
        )?;
        if inserted > 0 {
            log::debug!("store: created user {user_id}");
        }
        let record = select_user(&conn, user_id)?;
        record.ok_or_else(|| rusqlite::Error::QueryReturnedNoRows.into())
    }

    /// Full overwrite of one record.
    pub fn put_user(&self, user_id: &str, record: &UserRecord) -> BotResult<()> {
        let conn = self.conn()?;
        upsert_user(&conn, user_id, record)
    }

    /// Overwrite several records in a single transaction: all or nothing.
    pub fn put_users(&self, records: &[(&str, &UserRecord)]) -> BotResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        for (user_id, record) in records {
            upsert_user(&tx, user_id, record)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Every record in first-contact order.
    pub fn all_users(&self) -> BotResult<Vec<(UserId, UserRecord)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {USER_COLUMNS} FROM bot_user ORDER BY seq ASC"
        ))?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, map_user(row)?)))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn user_count(&self) -> BotResult<i64> {
        let conn = self.conn()?;
        let count = conn.query_row("SELECT COUNT(*) FROM bot_user", [], |row| row.get(0))?;
        Ok(count)
    }
}

pub(super) fn select_user(conn: &Connection, user_id: &str) -> BotResult<Option<UserRecord>> {
    let record = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM bot_user WHERE user_id = ?1"),
            params![user_id],
            map_user,
        )
        .optional()?;
    Ok(record)
}

pub(super) fn upsert_user(conn: &Connection, user_id: &str, r: &UserRecord) -> BotResult<()> {
    conn.execute(
        "INSERT INTO bot_user (user_id, balance, spins, last_bonus_ms, referrals, invited_by)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(user_id) DO UPDATE SET
            balance       = excluded.balance,
            spins         = excluded.spins,
            last_bonus_ms = excluded.last_bonus_ms,
            referrals     = excluded.referrals,
            invited_by    = excluded.invited_by",
        params![
            user_id,
            r.balance as i64,
            r.spins as i64,
            r.last_bonus_time.map(to_millis),
            r.referrals as i64,
            r.invited_by,
        ],
    )?;
    Ok(())
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<UserRecord> {
    Ok(UserRecord {
        balance: row.get::<_, i64>(1)? as u64,
        spins: row.get::<_, i64>(2)? as u64,
        last_bonus_time: row
            .get::<_, Option<i64>>(3)?
            .map(from_millis)
            .transpose()?,
        referrals: row.get::<_, i64>(4)? as u64,
        invited_by: row.get(5)?,
    })
}
