use super::{from_millis, to_millis, user::upsert_user, BotStore};
use crate::{engagement::UserRecord, error::BotResult, withdrawal::WithdrawalRequest};
use rusqlite::params;

impl BotStore {
    // ── Withdrawal queue ──────────────────────────────────────────

    /// Debit the user and queue the payout in one transaction.
    pub fn commit_withdrawal(
        &self,
        request: &WithdrawalRequest,
        debited: &UserRecord,
    ) -> BotResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        upsert_user(&tx, &request.user_id, debited)?;
        tx.execute(
            "INSERT INTO withdrawal_request
                (request_id, user_id, amount, card_number, status, requested_ms)
             VALUES (?1, ?2, ?3, ?4, 'pending', ?5)",
            params![
                request.request_id,
                request.user_id,
                request.amount as i64,
                request.card_number,
                to_millis(request.requested_at),
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn pending_withdrawals(&self) -> BotResult<Vec<WithdrawalRequest>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT request_id, user_id, amount, card_number, requested_ms
             FROM withdrawal_request WHERE status = 'pending'
             ORDER BY requested_ms ASC, rowid ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(WithdrawalRequest {
                request_id: row.get(0)?,
                user_id: row.get(1)?,
                amount: row.get::<_, i64>(2)? as u64,
                card_number: row.get(3)?,
                requested_at: from_millis(row.get(4)?)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}
