//! Withdrawal dialogue — amount, then card, then the request is queued.
//!
//! States per user:
//!
//! ```text
//!   Idle ──start──▶ AwaitingAmount ──amount──▶ AwaitingCard ──card──▶ Committed
//!    ▲                   │                         │
//!    └──── any rejection, cancel, expiry ──────────┘
//! ```
//!
//! RULES:
//!   - One session per user. Starting again replaces the old session.
//!   - Every step is one-shot: a bad input ends the dialogue (back to Idle).
//!   - Sessions idle longer than the configured TTL count as abandoned.
//!   - Each step runs under the user's lock, so a step never interleaves
//!     with another step or with a spin/bonus/referral write for that user.
//!   - The balance debit and the queued request commit together. The admin
//!     notice goes out afterwards and may fail without undoing anything.

use crate::{
    clock::Clock,
    config::BotConfig,
    error::{BotResult, Rejection},
    event::{self, BotEvent},
    locks::KeyedLocks,
    notify::{card_last4, send_best_effort, Notice, Notifier},
    store::BotStore,
    types::{Amount, UserId},
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

pub const CARD_NUMBER_LEN: usize = 16;

/// Where a user currently is in the dialogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum WithdrawalState {
    Idle,
    AwaitingAmount,
    AwaitingCard { amount: Amount },
}

#[derive(Debug, Clone)]
struct WithdrawalSession {
    state: WithdrawalState,
    touched_at: DateTime<Utc>,
}

/// A queued payout, as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub request_id: String,
    pub user_id: UserId,
    pub amount: Amount,
    pub card_number: String,
    pub requested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WithdrawalStarted {
    pub balance: Amount,
    pub minimum: Amount,
    /// True when an earlier unfinished dialogue was thrown away.
    pub replaced: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WithdrawalReceipt {
    pub request_id: String,
    pub amount: Amount,
    pub card_number: String,
    pub balance: Amount,
}

pub struct WithdrawalFlow {
    store: Arc<BotStore>,
    locks: Arc<KeyedLocks>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    sessions: Mutex<HashMap<UserId, WithdrawalSession>>,
    min_withdrawal: Amount,
    starting_spins: Amount,
    session_ttl: Duration,
    admin_id: UserId,
}

impl WithdrawalFlow {
    pub fn new(
        config: &BotConfig,
        store: Arc<BotStore>,
        locks: Arc<KeyedLocks>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            locks,
            clock,
            notifier,
            sessions: Mutex::new(HashMap::new()),
            min_withdrawal: config.min_withdrawal,
            starting_spins: config.starting_spins,
            session_ttl: Duration::seconds(config.withdrawal_session_ttl_secs),
            admin_id: config.admin_id.clone(),
        }
    }

    pub fn min_withdrawal(&self) -> Amount {
        self.min_withdrawal
    }

    /// Idle → AwaitingAmount, if the balance reaches the minimum.
    pub fn start(&self, user_id: &str) -> BotResult<WithdrawalStarted> {
        self.locks.with_lock(user_id, || -> BotResult<_> {
            let now = self.clock.now();
            let replaced = self.take_live(user_id, now).is_some();
            let record = self.store.get_or_create_user(user_id, self.starting_spins)?;
            if record.balance < self.min_withdrawal {
                return Err(Rejection::BelowMinimumBalance {
                    balance: record.balance,
                    minimum: self.min_withdrawal,
                }
                .into());
            }
            if replaced {
                log::info!("withdrawal: {user_id} restarted, previous dialogue dropped");
            }
            self.put_session(user_id, WithdrawalState::AwaitingAmount, now);
            Ok(WithdrawalStarted {
                balance: record.balance,
                minimum: self.min_withdrawal,
                replaced,
            })
        })
    }

    /// AwaitingAmount → AwaitingCard. Any failure returns the user to Idle.
    pub fn submit_amount(&self, user_id: &str, input: &str) -> BotResult<Amount> {
        self.locks.with_lock(user_id, || -> BotResult<_> {
            let now = self.clock.now();
            match self.take_live(user_id, now) {
                Some(WithdrawalSession { state: WithdrawalState::AwaitingAmount, .. }) => {}
                Some(other) => {
                    // Wrong step: leave the dialogue exactly where it was.
                    self.restore_session(user_id, other);
                    return Err(Rejection::NoWithdrawalInProgress.into());
                }
                None => return Err(Rejection::NoWithdrawalInProgress.into()),
            }

            let typed = parse_amount(input)?;
            let record = self.store.get_or_create_user(user_id, self.starting_spins)?;
            let amount = match Amount::try_from(typed) {
                Ok(a) if a >= self.min_withdrawal && a <= record.balance => a,
                _ => {
                    return Err(Rejection::AmountOutOfRange {
                        amount: typed,
                        minimum: self.min_withdrawal,
                        balance: record.balance,
                    }
                    .into());
                }
            };
            self.put_session(user_id, WithdrawalState::AwaitingCard { amount }, now);
            Ok(amount)
        })
    }

    /// AwaitingCard → Committed. Debits the balance and queues the payout.
    pub fn submit_card(&self, user_id: &str, input: &str) -> BotResult<WithdrawalReceipt> {
        let receipt = self.locks.with_lock(user_id, || -> BotResult<_> {
            let now = self.clock.now();
            let amount = match self.take_live(user_id, now) {
                Some(WithdrawalSession { state: WithdrawalState::AwaitingCard { amount }, .. }) => amount,
                Some(other) => {
                    self.restore_session(user_id, other);
                    return Err(Rejection::NoWithdrawalInProgress.into());
                }
                None => return Err(Rejection::NoWithdrawalInProgress.into()),
            };

            let card_number = parse_card(input)?;
            let mut record = self.store.get_or_create_user(user_id, self.starting_spins)?;
            // The amount was checked one step ago; check again against the live balance.
            if amount > record.balance {
                return Err(Rejection::AmountOutOfRange {
                    amount: i128::from(amount),
                    minimum: self.min_withdrawal,
                    balance: record.balance,
                }
                .into());
            }
            record.balance -= amount;

            let request = WithdrawalRequest {
                request_id: uuid::Uuid::new_v4().to_string(),
                user_id: user_id.to_string(),
                amount,
                card_number,
                requested_at: now,
            };
            self.store.commit_withdrawal(&request, &record)?;
            Ok(WithdrawalReceipt {
                request_id: request.request_id,
                amount,
                card_number: request.card_number,
                balance: record.balance,
            })
        })?;

        log::info!(
            "withdrawal: {user_id} queued {} to card ****{} (request {})",
            receipt.amount,
            card_last4(&receipt.card_number),
            receipt.request_id
        );
        event::record(
            &self.store,
            &BotEvent::WithdrawalRequested {
                user_id: user_id.to_string(),
                request_id: receipt.request_id.clone(),
                amount: receipt.amount,
                card_last4: card_last4(&receipt.card_number),
            },
            self.clock.now(),
        );
        send_best_effort(
            self.notifier.as_ref(),
            &self.admin_id,
            &Notice::WithdrawalRequested {
                user_id: user_id.to_string(),
                amount: receipt.amount,
                card_number: receipt.card_number.clone(),
            },
        );
        Ok(receipt)
    }

    /// Drop the user's dialogue, if any. Returns whether one was live.
    pub fn cancel(&self, user_id: &str) -> bool {
        let dropped = self
            .locks
            .with_lock(user_id, || self.take_live(user_id, self.clock.now()).is_some());
        if dropped {
            log::debug!("withdrawal: {user_id} dialogue abandoned");
        }
        dropped
    }

    pub fn state(&self, user_id: &str) -> WithdrawalState {
        let now = self.clock.now();
        let sessions = self.sessions();
        match sessions.get(user_id) {
            Some(s) if !self.expired(s, now) => s.state,
            _ => WithdrawalState::Idle,
        }
    }

    /// Remove every expired session. Returns how many were dropped.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let mut sessions = self.sessions();
        let before = sessions.len();
        sessions.retain(|_, s| now - s.touched_at < self.session_ttl);
        before - sessions.len()
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions().len()
    }

    /// Remove the user's session and return it if it has not expired.
    fn take_live(&self, user_id: &str, now: DateTime<Utc>) -> Option<WithdrawalSession> {
        let session = self.sessions().remove(user_id)?;
        if self.expired(&session, now) {
            log::debug!("withdrawal: {user_id} dialogue expired");
            return None;
        }
        Some(session)
    }

    /// Put back a session taken by `take_live`, idle clock included.
    fn restore_session(&self, user_id: &str, session: WithdrawalSession) {
        self.sessions().insert(user_id.to_string(), session);
    }

    fn put_session(&self, user_id: &str, state: WithdrawalState, now: DateTime<Utc>) {
        self.sessions().insert(
            user_id.to_string(),
            WithdrawalSession { state, touched_at: now },
        );
    }

    fn expired(&self, session: &WithdrawalSession, now: DateTime<Utc>) -> bool {
        now - session.touched_at >= self.session_ttl
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<UserId, WithdrawalSession>> {
        // Only ever mutated by single insert/remove calls; never left half-written.
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Any integer: optional sign, then ASCII digits, surrounding whitespace
/// allowed. Range checks happen later, so "-5" is a number (out of range)
/// while "abc" or "12.5" is not a number at all. Magnitudes beyond `i128`
/// saturate, which keeps them out of range.
fn parse_amount(input: &str) -> Result<i128, Rejection> {
    let text = input.trim();
    let (negative, digits) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Rejection::InvalidAmountFormat);
    }
    let magnitude = digits.parse::<i128>().unwrap_or(i128::MAX);
    Ok(if negative { -magnitude } else { magnitude })
}

/// Exactly 16 ASCII digits, surrounding whitespace allowed.
fn parse_card(input: &str) -> Result<String, Rejection> {
    let card = input.trim();
    if card.len() == CARD_NUMBER_LEN && card.bytes().all(|b| b.is_ascii_digit()) {
        Ok(card.to_string())
    } else {
        Err(Rejection::InvalidCardFormat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amount_parsing() {
        assert_eq!(parse_amount(" 120000 "), Ok(120_000));
        assert_eq!(parse_amount("+120000"), Ok(120_000));
        assert_eq!(parse_amount("-100000"), Ok(-100_000));
        assert_eq!(parse_amount("99999999999999999999999"), Ok(99_999_999_999_999_999_999_999));
        assert_eq!(parse_amount(&"9".repeat(60)), Ok(i128::MAX));
        assert_eq!(parse_amount("abc"), Err(Rejection::InvalidAmountFormat));
        assert_eq!(parse_amount("12.5"), Err(Rejection::InvalidAmountFormat));
        assert_eq!(parse_amount("-"), Err(Rejection::InvalidAmountFormat));
        assert_eq!(parse_amount("1 000"), Err(Rejection::InvalidAmountFormat));
        assert_eq!(parse_amount(""), Err(Rejection::InvalidAmountFormat));
    }

    #[test]
    fn card_parsing() {
        assert_eq!(parse_card("8600123412345678").as_deref(), Ok("8600123412345678"));
        assert_eq!(parse_card(" 8600123412345678\n").as_deref(), Ok("8600123412345678"));
        assert_eq!(parse_card("12345"), Err(Rejection::InvalidCardFormat));
        assert_eq!(parse_card("8600 1234 1234 5678"), Err(Rejection::InvalidCardFormat));
        assert_eq!(parse_card("860012341234567a"), Err(Rejection::InvalidCardFormat));
        assert_eq!(parse_card("86001234123456789"), Err(Rejection::InvalidCardFormat));
        // Non-ASCII digits are not card digits.
        assert_eq!(parse_card("٨٦٠٠١٢٣٤١٢٣٤٥٦٧٨"), Err(Rejection::InvalidCardFormat));
    }
}
