//! Outbound notices: referral credit and withdrawal requests.
//!
//! RULE: Notices go out after the state change has committed, outside any
//! user lock. A failed notice is logged and dropped; it never rolls back
//! or blocks the change that triggered it.

use crate::types::{Amount, UserId};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Sent to the referrer when someone joins through their link.
    ReferralJoined {
        new_user: UserId,
        handle: Option<String>,
    },
    /// Sent to the admin when a withdrawal is queued.
    WithdrawalRequested {
        user_id: UserId,
        amount: Amount,
        card_number: String,
    },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReferralJoined { new_user, handle } => match handle {
                Some(h) => write!(f, "@{h} joined through your referral link, +1 spin"),
                None => write!(f, "ID:{new_user} joined through your referral link, +1 spin"),
            },
            Self::WithdrawalRequested { user_id, amount, card_number } => write!(
                f,
                "Withdrawal request\nID: {user_id}\nAmount: {amount}\nCard: {card_number}"
            ),
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, recipient: &str, notice: &Notice) -> anyhow::Result<()>;
}

/// Writes notices to the log. Used when no messaging transport is wired in.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, recipient: &str, notice: &Notice) -> anyhow::Result<()> {
        log::info!("notify: to={recipient} {}", redact(notice));
        Ok(())
    }
}

/// Fire and forget. Returns whether delivery succeeded, for logging only.
pub fn send_best_effort(notifier: &dyn Notifier, recipient: &str, notice: &Notice) -> bool {
    match notifier.notify(recipient, notice) {
        Ok(()) => true,
        Err(e) => {
            log::warn!("notify: delivery to {recipient} failed, dropped: {e}");
            false
        }
    }
}

/// Last four digits of a card number, for logs and audit rows.
pub fn card_last4(card_number: &str) -> String {
    let len = card_number.chars().count();
    card_number.chars().skip(len.saturating_sub(4)).collect()
}

fn redact(notice: &Notice) -> String {
    match notice {
        Notice::WithdrawalRequested { user_id, amount, card_number } => format!(
            "withdrawal user={user_id} amount={amount} card=****{}",
            card_last4(card_number)
        ),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Failing;

    impl Notifier for Failing {
        fn notify(&self, _: &str, _: &Notice) -> anyhow::Result<()> {
            anyhow::bail!("chat not found")
        }
    }

    #[test]
    fn failures_are_swallowed() {
        let notice = Notice::ReferralJoined { new_user: "5".into(), handle: None };
        assert!(!send_best_effort(&Failing, "9", &notice));
        assert!(send_best_effort(&LogNotifier, "9", &notice));
    }

    #[test]
    fn referral_notice_prefers_handle() {
        let with = Notice::ReferralJoined { new_user: "5".into(), handle: Some("ann".into()) };
        let without = Notice::ReferralJoined { new_user: "5".into(), handle: None };
        assert!(with.to_string().starts_with("@ann"));
        assert!(without.to_string().starts_with("ID:5"));
    }

    #[test]
    fn log_line_masks_card() {
        let notice = Notice::WithdrawalRequested {
            user_id: "5".into(),
            amount: 120_000,
            card_number: "8600123412345678".into(),
        };
        let line = redact(&notice);
        assert!(line.contains("****5678"));
        assert!(!line.contains("86001234"));
        assert_eq!(card_last4("12"), "12");
    }
}
